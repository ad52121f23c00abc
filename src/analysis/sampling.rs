//! Stratified size-based sampling for the retainer analyses.
//!
//! Large target populations are cut down to a budget while preserving both
//! the big contributors and the long tail: the population is sorted by
//! shallow size, split into top-10% / mid-40% / bottom-50% strata, and each
//! stratum yields a fixed share of the budget (40% / 35% / 25%) picked by
//! uniform stride.

use crate::config::SamplingConfig;

/// `(object_id, shallow_size)` pairs.
pub type Target = (u64, u64);

#[derive(Debug)]
pub struct SampleResult {
    pub sampled: Vec<Target>,
    pub ratio: f64,
}

pub fn stratified_sample(mut targets: Vec<Target>, config: &SamplingConfig) -> SampleResult {
    let population = targets.len();
    if population == 0 {
        return SampleResult {
            sampled: targets,
            ratio: 1.0,
        };
    }
    let mut budget = config.max_samples.max(1);
    if (budget as f64) < population as f64 * config.min_sample_ratio {
        budget = (population as f64 * config.min_sample_ratio).ceil() as usize;
    }
    if population <= budget {
        return SampleResult {
            sampled: targets,
            ratio: 1.0,
        };
    }

    if !config.stratified_by_size {
        if config.size_weighted {
            targets.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        }
        let sampled = stride_pick(&targets, budget);
        let ratio = sampled.len() as f64 / population as f64;
        return SampleResult { sampled, ratio };
    }

    targets.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let top_len = (population / 10).max(1);
    let mid_len = (population * 4 / 10).max(1);
    let top = &targets[..top_len.min(population)];
    let mid_end = (top_len + mid_len).min(population);
    let mid = &targets[top_len.min(population)..mid_end];
    let bottom = &targets[mid_end..];

    let top_budget = budget * 40 / 100;
    let mid_budget = budget * 35 / 100;
    let bottom_budget = budget - top_budget - mid_budget;

    let mut sampled = stride_pick(top, top_budget);
    sampled.extend(stride_pick(mid, mid_budget));
    sampled.extend(stride_pick(bottom, bottom_budget));
    let ratio = sampled.len() as f64 / population as f64;
    SampleResult { sampled, ratio }
}

/// Picks up to `quota` items at a uniform stride, always including the first.
fn stride_pick(stratum: &[Target], quota: usize) -> Vec<Target> {
    if stratum.is_empty() || quota == 0 {
        return Vec::new();
    }
    if stratum.len() <= quota {
        return stratum.to_vec();
    }
    let mut picked = Vec::with_capacity(quota);
    for k in 0..quota {
        let idx = k * stratum.len() / quota;
        picked.push(stratum[idx]);
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_samples: usize) -> SamplingConfig {
        SamplingConfig {
            max_samples,
            ..SamplingConfig::default()
        }
    }

    fn population(n: usize) -> Vec<Target> {
        (0..n as u64).map(|i| (i, (n as u64 - i) * 8)).collect()
    }

    #[test]
    fn small_populations_pass_through_unchanged() {
        let targets = population(100);
        let result = stratified_sample(targets.clone(), &config(100));
        assert_eq!(result.sampled, targets);
        assert_eq!(result.ratio, 1.0);
        let result = stratified_sample(targets.clone(), &config(1000));
        assert_eq!(result.sampled, targets);
        assert_eq!(result.ratio, 1.0);
    }

    #[test]
    fn budget_and_ratio_are_respected() {
        let result = stratified_sample(population(10_000), &config(1000));
        assert!(result.sampled.len() <= 1000);
        assert!(result.sampled.len() >= 900);
        let expected = result.sampled.len() as f64 / 10_000.0;
        assert!((result.ratio - expected).abs() < 1e-9);
    }

    #[test]
    fn strata_preserve_large_and_small_contributors() {
        let result = stratified_sample(population(10_000), &config(1000));
        // the single largest object is always sampled
        assert!(result.sampled.iter().any(|&(_, size)| size == 10_000 * 8));
        // the bottom stratum contributes too
        assert!(result
            .sampled
            .iter()
            .any(|&(_, size)| size <= 5_000 * 8));
    }

    #[test]
    fn no_duplicates_in_sample() {
        let result = stratified_sample(population(10_000), &config(1000));
        let mut ids: Vec<u64> = result.sampled.iter().map(|&(id, _)| id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), result.sampled.len());
    }

    #[test]
    fn min_sample_ratio_raises_budget() {
        let sampling = SamplingConfig {
            max_samples: 10,
            min_sample_ratio: 0.05,
            ..SamplingConfig::default()
        };
        let result = stratified_sample(population(1000), &sampling);
        assert!(result.sampled.len() >= 45);
    }

    #[test]
    fn unstratified_size_weighted_takes_stride_over_sorted() {
        let sampling = SamplingConfig {
            max_samples: 10,
            stratified_by_size: false,
            ..SamplingConfig::default()
        };
        let result = stratified_sample(population(1000), &sampling);
        assert_eq!(result.sampled.len(), 10);
        // first pick is the largest
        assert_eq!(result.sampled[0].1, 1000 * 8);
    }
}
