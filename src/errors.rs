use thiserror::Error;

#[derive(Error, Debug)]
pub enum HprofRetainError {
    #[error("input file '{name}' not found")]
    InputFileNotFound { name: String },
    #[error("invalid hprof file: {message}")]
    InvalidHprofFile { message: String },
    #[error("invalid identifier size in header (must be 4 or 8)")]
    InvalidIdSize,
    #[error("invalid hprof file header size")]
    InvalidHeaderSize,
    #[error("truncated input at offset {offset}: {message}")]
    Truncated { offset: u64, message: String },
    #[error("malformed record at offset {offset}: {message}")]
    Malformed { offset: u64, message: String },
    #[error("analysis cancelled during {phase}")]
    Cancelled { phase: String },
    #[error("analysis deadline exceeded during {phase}")]
    DeadlineExceeded { phase: String },
    #[error("worker panicked: {message}")]
    WorkerPanic { message: String },
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error(transparent)]
    ClapError(#[from] clap::Error),
    #[error(transparent)]
    StdIoError(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("thread error")]
    StdThreadError {
        e: Box<dyn std::any::Any + Send + 'static>,
    },
}
