use std::time::Duration;

pub type Result<T> = std::result::Result<T, E2eError>;

#[derive(thiserror::Error, Debug)]
pub enum E2eError {
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("kubernetes api: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Proxy(#[from] cri_proxy::Error),

    #[error(transparent)]
    Timeline(#[from] pull_timeline::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl E2eError {
    /// The proxy is not present, so the scenario should be skipped.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, E2eError::Proxy(e) if e.is_unavailable())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, E2eError::Timeout { .. })
    }
}
