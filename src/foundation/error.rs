use std::fmt;

pub type ReelResult<T> = Result<T, ReelError>;

/// Why a synthesis request failed.
///
/// The cause decides whether the failure is worth retrying; see [`SynthesisCause::is_transient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SynthesisCause {
    /// The request did not complete within the configured timeout.
    Timeout,
    /// Connection could not be established or was reset.
    Network,
    /// Provider answered 429.
    RateLimited,
    /// Provider answered 5xx (or 408).
    Server(u16),
    /// Provider answered 401/403.
    Unauthorized(u16),
    /// Provider rejected the request itself (other 4xx).
    BadRequest(u16),
    /// Provider answered 2xx with a body we cannot use.
    InvalidResponse,
}

impl SynthesisCause {
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network | Self::RateLimited | Self::Server(_)
        )
    }

    /// Map an HTTP status to a cause. Returns `None` for success codes.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 | 403 => Some(Self::Unauthorized(status)),
            408 => Some(Self::Server(status)),
            429 => Some(Self::RateLimited),
            400..=499 => Some(Self::BadRequest(status)),
            _ => Some(Self::Server(status)),
        }
    }
}

impl fmt::Display for SynthesisCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = if self.is_transient() {
            "transient"
        } else {
            "fatal"
        };
        match self {
            Self::Timeout => write!(f, "{class}: timeout"),
            Self::Network => write!(f, "{class}: network"),
            Self::RateLimited => write!(f, "{class}: rate limited"),
            Self::Server(s) => write!(f, "{class}: server status {s}"),
            Self::Unauthorized(s) => write!(f, "{class}: unauthorized (status {s})"),
            Self::BadRequest(s) => write!(f, "{class}: bad request (status {s})"),
            Self::InvalidResponse => write!(f, "{class}: invalid response"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("synthesis error ({cause}): {message}")]
    Synthesis {
        cause: SynthesisCause,
        message: String,
    },

    #[error("timeline error: {0}")]
    Timeline(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse error classification carried by the pipeline's `Failed` state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    Validation,
    SynthesisTransient,
    SynthesisFatal,
    Timeline,
    Render,
    Cancelled,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validation => "validation",
            Self::SynthesisTransient => "synthesis/transient",
            Self::SynthesisFatal => "synthesis/fatal",
            Self::Timeline => "timeline",
            Self::Render => "render",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        })
    }
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn synthesis(cause: SynthesisCause, msg: impl Into<String>) -> Self {
        Self::Synthesis {
            cause,
            message: msg.into(),
        }
    }

    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Synthesis { cause, .. } if cause.is_transient())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Synthesis { cause, .. } if cause.is_transient() => ErrorKind::SynthesisTransient,
            Self::Synthesis { .. } => ErrorKind::SynthesisFatal,
            Self::Timeline(_) => ErrorKind::Timeline,
            Self::Render(_) => ErrorKind::Render,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}
