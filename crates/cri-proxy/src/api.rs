//! The subset of the CRI runtime and image services that the proxy can
//! intercept.
//!
//! The traits mirror the gRPC services a node agent talks to. Every call
//! takes a [`CallContext`] so implementations can observe the caller's
//! cancellation.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Name of an interceptable CRI method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApiName {
    Version,
    RunPodSandbox,
    StopPodSandbox,
    RemovePodSandbox,
    CreateContainer,
    StartContainer,
    StopContainer,
    RemoveContainer,
    ListImages,
    ImageStatus,
    PullImage,
    RemoveImage,
}

impl ApiName {
    pub const ALL: [ApiName; 12] = [
        ApiName::Version,
        ApiName::RunPodSandbox,
        ApiName::StopPodSandbox,
        ApiName::RemovePodSandbox,
        ApiName::CreateContainer,
        ApiName::StartContainer,
        ApiName::StopContainer,
        ApiName::RemoveContainer,
        ApiName::ListImages,
        ApiName::ImageStatus,
        ApiName::PullImage,
        ApiName::RemoveImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiName::Version => "Version",
            ApiName::RunPodSandbox => "RunPodSandbox",
            ApiName::StopPodSandbox => "StopPodSandbox",
            ApiName::RemovePodSandbox => "RemovePodSandbox",
            ApiName::CreateContainer => "CreateContainer",
            ApiName::StartContainer => "StartContainer",
            ApiName::StopContainer => "StopContainer",
            ApiName::RemoveContainer => "RemoveContainer",
            ApiName::ListImages => "ListImages",
            ApiName::ImageStatus => "ImageStatus",
            ApiName::PullImage => "PullImage",
            ApiName::RemoveImage => "RemoveImage",
        }
    }
}

impl fmt::Display for ApiName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ApiName::ALL
            .iter()
            .copied()
            .find(|api| api.as_str() == s)
            .ok_or_else(|| Error::UnknownApi(s.to_string()))
    }
}

/// Per-call context handed to every service method.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose cancellation follows `token`.
    pub fn with_cancel(token: CancellationToken) -> Self {
        Self { cancel: token }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionResponse {
    pub runtime_name: String,
    pub runtime_version: String,
    pub runtime_api_version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodSandboxConfig {
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    pub name: String,
    pub image: ImageSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateContainerRequest {
    pub pod_sandbox_id: String,
    pub config: ContainerConfig,
    pub sandbox_config: PodSandboxConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImageSpec {
    pub image: String,
}

impl ImageSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Image {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub size: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullImageRequest {
    pub image: ImageSpec,
    pub sandbox_config: Option<PodSandboxConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullImageResponse {
    pub image_ref: String,
}

#[async_trait]
pub trait RuntimeService: Send + Sync {
    async fn version(&self, ctx: &CallContext) -> Result<VersionResponse>;

    /// Returns the id of the new sandbox.
    async fn run_pod_sandbox(&self, ctx: &CallContext, config: PodSandboxConfig)
        -> Result<String>;

    async fn stop_pod_sandbox(&self, ctx: &CallContext, pod_sandbox_id: &str) -> Result<()>;

    async fn remove_pod_sandbox(&self, ctx: &CallContext, pod_sandbox_id: &str) -> Result<()>;

    /// Returns the id of the new container.
    async fn create_container(
        &self,
        ctx: &CallContext,
        req: CreateContainerRequest,
    ) -> Result<String>;

    async fn start_container(&self, ctx: &CallContext, container_id: &str) -> Result<()>;

    async fn stop_container(
        &self,
        ctx: &CallContext,
        container_id: &str,
        timeout_secs: i64,
    ) -> Result<()>;

    async fn remove_container(&self, ctx: &CallContext, container_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn list_images(&self, ctx: &CallContext) -> Result<Vec<Image>>;

    async fn image_status(&self, ctx: &CallContext, image: &ImageSpec) -> Result<Option<Image>>;

    async fn pull_image(&self, ctx: &CallContext, req: PullImageRequest)
        -> Result<PullImageResponse>;

    async fn remove_image(&self, ctx: &CallContext, image: &ImageSpec) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_names_parse_back() {
        for api in ApiName::ALL {
            assert_eq!(api.as_str().parse::<ApiName>().unwrap(), api);
        }
    }

    #[test]
    fn unknown_api_name_is_rejected() {
        let err = "PullImages".parse::<ApiName>().unwrap_err();
        assert!(matches!(err, Error::UnknownApi(ref n) if n == "PullImages"));
    }

    #[test]
    fn api_name_serializes_as_method_name() {
        let json = serde_json::to_string(&ApiName::PullImage).unwrap();
        assert_eq!(json, "\"PullImage\"");
    }
}
