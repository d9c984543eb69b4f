use crate::api::ApiName;
use crate::behavior::Status;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error returned by a CRI call, either from the runtime or injected.
    #[error(transparent)]
    Status(#[from] Status),

    #[error("fault injection unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("{api} cancelled during injected delay")]
    Cancelled { api: ApiName },

    #[error("control request rejected: {0}")]
    Control(String),

    #[error("unknown CRI API name: {0}")]
    UnknownApi(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Error::Unavailable {
            reason: reason.into(),
        }
    }

    /// True when fault injection is not wired up in this environment.
    /// Scenario drivers treat this as a skip, not a failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Unavailable { .. })
    }

    /// The CRI status carried by this error, if it came from a call.
    pub fn status(&self) -> Option<&Status> {
        match self {
            Error::Status(s) => Some(s),
            _ => None,
        }
    }
}
