use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Object header model used to reconstruct shallow sizes.
///
/// The dump does not record whether the JVM ran with compressed oops, so the
/// caller picks the model; `Compressed` matches the common case of heaps
/// below 32 GiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    Compressed,
    Uncompressed,
}

impl SizeMode {
    /// Plain object header size in bytes.
    pub const fn header_size(self) -> u64 {
        match self {
            SizeMode::Compressed => 12,
            SizeMode::Uncompressed => 16,
        }
    }

    /// In-heap reference width in bytes.
    pub const fn ref_size(self) -> u64 {
        match self {
            SizeMode::Compressed => 4,
            SizeMode::Uncompressed => 8,
        }
    }
}

impl fmt::Display for SizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeMode::Compressed => write!(f, "compressed"),
            SizeMode::Uncompressed => write!(f, "uncompressed"),
        }
    }
}

/// How retained sizes are produced from the dominator tree.
///
/// `Standard` is the exact bottom-up accumulation. `ShallowOnly` is a lossy
/// estimate (retained = shallow) used by fast mode; results computed with it
/// carry the `retained_size_estimated` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetainedSizeStrategy {
    #[default]
    Standard,
    ShallowOnly,
}

/// Progress callback invoked from the analysis progress ticker.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub phase: &'static str,
    pub done: usize,
    pub total: usize,
}

#[derive(Clone)]
pub struct ParallelConfig {
    pub enabled: bool,
    pub max_workers: usize,
    pub timeout: Option<Duration>,
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        let hardware = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            enabled: true,
            max_workers: hardware,
            timeout: None,
            progress_callback: None,
        }
    }
}

impl ParallelConfig {
    /// Effective pool width, never zero.
    pub fn worker_count(&self) -> usize {
        if self.enabled {
            self.max_workers.max(1)
        } else {
            1
        }
    }
}

impl fmt::Debug for ParallelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelConfig")
            .field("enabled", &self.enabled)
            .field("max_workers", &self.max_workers)
            .field("timeout", &self.timeout)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SamplingConfig {
    pub max_samples: usize,
    pub min_sample_ratio: f64,
    pub size_weighted: bool,
    pub stratified_by_size: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_samples: 1000,
            min_sample_ratio: 0.01,
            size_weighted: true,
            stratified_by_size: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusinessConfig {
    pub max_per_target: usize,
    pub sample_size: usize,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            max_per_target: 10,
            sample_size: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Number of classes in the histogram; 0 means unbounded.
    pub top_classes_n: usize,
    pub analyze_retainers: bool,
    pub top_retainers_n: usize,
    /// Number of classes receiving a retainer table.
    pub retainer_classes_n: usize,
    /// BFS depth for the retainer tables.
    pub retainer_max_depth: u8,
    /// Number of classes receiving a reference subgraph.
    pub graph_classes_n: usize,
    /// Node cap for each reference subgraph.
    pub graph_max_nodes: usize,
    /// Number of classes receiving a business retainer table.
    pub business_classes_n: usize,
    pub fast_mode: bool,
    pub skip_business_retainers: bool,
    pub size_mode: SizeMode,
    pub include_unreachable: bool,
    pub strategy: RetainedSizeStrategy,
    pub parallel: ParallelConfig,
    pub sampling: SamplingConfig,
    pub business: BusinessConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_classes_n: 50,
            analyze_retainers: true,
            top_retainers_n: 20,
            retainer_classes_n: 20,
            retainer_max_depth: 3,
            graph_classes_n: 5,
            graph_max_nodes: 50,
            business_classes_n: 10,
            fast_mode: false,
            skip_business_retainers: false,
            size_mode: SizeMode::Compressed,
            include_unreachable: true,
            strategy: RetainedSizeStrategy::Standard,
            parallel: ParallelConfig::default(),
            sampling: SamplingConfig::default(),
            business: BusinessConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Strategy after applying fast mode.
    pub fn effective_strategy(&self) -> RetainedSizeStrategy {
        if self.fast_mode {
            RetainedSizeStrategy::ShallowOnly
        } else {
            self.strategy
        }
    }

    pub fn business_enabled(&self) -> bool {
        !self.skip_business_retainers && !self.fast_mode
    }

    pub fn graphs_enabled(&self) -> bool {
        !self.fast_mode
    }
}
