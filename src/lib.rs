pub mod candidate;
pub mod gpu;
pub mod input;
pub mod lookup3;
pub mod metrics;
pub mod pattern;
pub mod scheduler;
pub mod source;

#[cfg(test)]
mod validation;

/// Error types for jenhash operations.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum JhError {
    /// A pattern expression could not be parsed.
    Pattern { position: usize, reason: String },
    /// Invalid configuration or unreadable input.
    Config(String),
    /// No usable compute device was found.
    Unsupported,
    /// A buffer allocation would exceed the device budget.
    OutOfMemory,
    /// The compute shader could not be loaded or compiled.
    Shader(String),
    /// Queue submission or device synchronization failed.
    Submission,
}

impl std::fmt::Display for JhError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pattern { position, reason } => {
                write!(f, "pattern error at byte {position}: {reason}")
            }
            Self::Config(msg) => write!(f, "{msg}"),
            Self::Unsupported => write!(f, "no usable compute device"),
            Self::OutOfMemory => write!(f, "device memory budget exceeded"),
            Self::Shader(msg) => write!(f, "shader load failed: {msg}"),
            Self::Submission => write!(f, "device submission failed"),
        }
    }
}

impl std::error::Error for JhError {}

pub type JhResult<T> = Result<T, JhError>;
