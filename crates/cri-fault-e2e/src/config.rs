use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SOCKET: &str = "/var/run/cri-proxy/control.sock";
pub const DEFAULT_PAUSE_IMAGE: &str = "registry.k8s.io/pause:3.9";

/// Where the scenarios find the proxy and the cluster, and how long they
/// wait for things to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct E2eConfig {
    /// Control socket of the CRI proxy (`CRI_PROXY_SOCKET`)
    pub socket: PathBuf,
    /// Namespace test pods are created in (`E2E_NAMESPACE`)
    pub namespace: String,
    /// Image pulled by test pods (`E2E_PAUSE_IMAGE`)
    pub pause_image: String,
    pub condition_timeout: Duration,
    /// How long repeated pull failures are left to back off
    pub backoff_window: Duration,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from(DEFAULT_SOCKET),
            namespace: "default".to_string(),
            pause_image: DEFAULT_PAUSE_IMAGE.to_string(),
            condition_timeout: Duration::from_secs(60),
            backoff_window: Duration::from_secs(40),
        }
    }
}

impl E2eConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let set = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = set("CRI_PROXY_SOCKET") {
            cfg.socket = PathBuf::from(v);
        }
        if let Some(v) = set("E2E_NAMESPACE") {
            cfg.namespace = v;
        }
        if let Some(v) = set("E2E_PAUSE_IMAGE") {
            cfg.pause_image = v;
        }
        cfg
    }
}
