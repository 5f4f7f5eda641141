use thiserror::Error;

/// Errors that can occur while configuring or running a trace.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    #[error("failed to load image: {0}")]
    ImageLoad(String),

    /// A configuration value outside its domain. `field` uses the public
    /// option name (`turnPolicy`, `threshold`, `optCurve`, ...).
    #[error("Bad {field} value \"{value}\". Allowed values are: {allowed}")]
    InvalidOption {
        field: &'static str,
        value: String,
        allowed: &'static str,
    },

    #[error("unknown option \"{0}\"")]
    UnknownOption(String),

    #[error("image should be loaded first")]
    NotLoaded,

    #[error("RGBA buffer holds {found} bytes, expected {expected}")]
    BufferSize { expected: usize, found: usize },

    #[error("image has {pixels} pixels, configured limit is {limit}")]
    ImageTooLarge { pixels: u64, limit: u64 },

    #[error("tracing cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type TraceResult<T> = Result<T, TraceError>;
