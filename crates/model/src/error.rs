use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// The kind of error that occurred while running a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The request was rejected, e.g. the model is unknown to the engine.
    InvalidRequest,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Moderated => write!(f, "moderated"),
            ErrorKind::RateLimitExceeded => write!(f, "rate limit exceeded"),
            ErrorKind::InvalidRequest => write!(f, "invalid request"),
            ErrorKind::Other => write!(f, "other"),
        }
    }
}

/// The error type for a generation engine.
pub trait EngineError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}
