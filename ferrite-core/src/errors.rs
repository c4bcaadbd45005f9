//! Ferrite error types with granular categories

use thiserror::Error;

/// Top-level error type for all core operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("argument error: {0}")]
    Arg(#[from] ArgError),

    #[error("demodulation error: {0}")]
    Demod(#[from] DemodError),

    #[error("clock detection error: {0}")]
    Clock(#[from] ClockError),

    #[error("trace error: {0}")]
    Trace(#[from] TraceError),
}

/// Argument validation failures; no session state is changed
#[derive(Debug, Error)]
pub enum ArgError {
    #[error("conflicting flags, select only one of {flags}")]
    ConflictingFlags { flags: &'static str },

    #[error("index {index} out of bounds for trace of {len} samples")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("unknown modulation tag '{tag}'")]
    UnknownModulation { tag: String },

    #[error("invalid value {value} for {name}")]
    InvalidValue { name: &'static str, value: i64 },

    #[error("window {window} must be smaller than the trace ({len} samples)")]
    WindowTooLarge { window: usize, len: usize },
}

/// Soft algorithmic failures; previous demod state is preserved
#[derive(Debug, Error)]
pub enum DemodError {
    #[error("signal amplitude below the noise floor")]
    Noise,

    #[error("not enough samples: need {needed}, have {have}")]
    TooFewSamples { needed: usize, have: usize },

    #[error("too many errors: {errors} over budget {budget}")]
    TooManyErrors { errors: usize, budget: usize },

    #[error("no data found ({bits} bits decoded)")]
    NoData { bits: usize },

    #[error("demod buffer is empty")]
    EmptyDemodBuffer,

    #[error("demod buffer holds non-binary data, raw demod first")]
    NotBinary,
}

/// Clock recovery failures
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("no clock found")]
    NotFound,

    #[error("no FSK field clocks found")]
    NoFieldClocks,

    #[error("no carrier found")]
    NoCarrier,
}

/// Trace I/O and device-link failures
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace is empty")]
    Empty,

    #[error("bad sample '{value}' on line {line}")]
    BadSample { line: usize, value: String },

    #[error("device timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("no device attached")]
    NoDevice,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
