use thiserror::Error;

/// Failure of a single call into the core.
///
/// Partial batch outcomes (a deployment where some services failed, a bulk
/// start where some containers refused to start) are not errors; they are
/// reported through `Deployment` and `StartAllReport`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The engine could not be reached at all. Stops scheduled refresh.
    #[error("engine unreachable: {0}")]
    Connectivity(String),

    /// One engine call failed. Reported to the caller, never fatal.
    #[error("{op} failed: {message}")]
    Operation { op: &'static str, message: String },

    /// Local input was rejected before any engine call was attempted.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Reading or writing persisted client-local state failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn operation(op: &'static str, message: impl Into<String>) -> Self {
        Error::Operation {
            op,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
