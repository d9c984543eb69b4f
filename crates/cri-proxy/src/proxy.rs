use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::api::{
    ApiName, CallContext, CreateContainerRequest, Image, ImageService, ImageSpec,
    PodSandboxConfig, PullImageRequest, PullImageResponse, RuntimeService, VersionResponse,
};
use crate::behavior::Behavior;
use crate::error::{Error, Result};
use crate::registry::InjectorRegistry;

/// Decorator around a runtime client that applies the registry's
/// behaviors before each call.
///
/// Implements the same service traits as the wrapped client, so it can
/// stand in wherever the node agent expects a runtime.
pub struct CriProxy<R> {
    inner: R,
    registry: Arc<InjectorRegistry>,
    injected: AtomicUsize,
}

impl<R> CriProxy<R> {
    pub fn new(inner: R, registry: Arc<InjectorRegistry>) -> Self {
        Self {
            inner,
            registry,
            injected: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<InjectorRegistry> {
        &self.registry
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of calls that met a failure or a delay.
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::Relaxed)
    }

    /// Run one call named `api` through the installed behavior.
    ///
    /// `call` builds the real call and is only invoked when the behavior
    /// lets the call through. Injected statuses are returned as installed.
    pub async fn intercept<T, F, Fut>(&self, ctx: &CallContext, api: ApiName, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let behavior = match self.registry.lookup(api) {
            Ok(b) => b,
            Err(e) => {
                warn!("cri-proxy: refusing {}: {}", api, e);
                return Err(e);
            }
        };

        match behavior {
            Behavior::Pass => {
                debug!("cri-proxy: {} passed through", api);
                call().await
            }
            Behavior::Fail(status) => {
                self.injected.fetch_add(1, Ordering::Relaxed);
                info!("cri-proxy: injecting error into {}: {}", api, status);
                Err(Error::Status(status))
            }
            Behavior::Delay(delay) => {
                self.injected.fetch_add(1, Ordering::Relaxed);
                info!("cri-proxy: delaying {} by {:?}", api, delay);
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => {
                        warn!("cri-proxy: {} cancelled during injected delay", api);
                        return Err(Error::Cancelled { api });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                call().await
            }
        }
    }
}

#[async_trait]
impl<R: RuntimeService> RuntimeService for CriProxy<R> {
    async fn version(&self, ctx: &CallContext) -> Result<VersionResponse> {
        self.intercept(ctx, ApiName::Version, || self.inner.version(ctx)).await
    }

    async fn run_pod_sandbox(
        &self,
        ctx: &CallContext,
        config: PodSandboxConfig,
    ) -> Result<String> {
        self.intercept(ctx, ApiName::RunPodSandbox, move || self.inner.run_pod_sandbox(ctx, config))
            .await
    }

    async fn stop_pod_sandbox(&self, ctx: &CallContext, pod_sandbox_id: &str) -> Result<()> {
        self.intercept(ctx, ApiName::StopPodSandbox, || {
            self.inner.stop_pod_sandbox(ctx, pod_sandbox_id)
        })
        .await
    }

    async fn remove_pod_sandbox(&self, ctx: &CallContext, pod_sandbox_id: &str) -> Result<()> {
        self.intercept(ctx, ApiName::RemovePodSandbox, || {
            self.inner.remove_pod_sandbox(ctx, pod_sandbox_id)
        })
        .await
    }

    async fn create_container(
        &self,
        ctx: &CallContext,
        req: CreateContainerRequest,
    ) -> Result<String> {
        self.intercept(ctx, ApiName::CreateContainer, move || self.inner.create_container(ctx, req))
            .await
    }

    async fn start_container(&self, ctx: &CallContext, container_id: &str) -> Result<()> {
        self.intercept(ctx, ApiName::StartContainer, || {
            self.inner.start_container(ctx, container_id)
        })
        .await
    }

    async fn stop_container(
        &self,
        ctx: &CallContext,
        container_id: &str,
        timeout_secs: i64,
    ) -> Result<()> {
        self.intercept(ctx, ApiName::StopContainer, || {
            self.inner.stop_container(ctx, container_id, timeout_secs)
        })
        .await
    }

    async fn remove_container(&self, ctx: &CallContext, container_id: &str) -> Result<()> {
        self.intercept(ctx, ApiName::RemoveContainer, || {
            self.inner.remove_container(ctx, container_id)
        })
        .await
    }
}

#[async_trait]
impl<R: ImageService> ImageService for CriProxy<R> {
    async fn list_images(&self, ctx: &CallContext) -> Result<Vec<Image>> {
        self.intercept(ctx, ApiName::ListImages, || self.inner.list_images(ctx)).await
    }

    async fn image_status(&self, ctx: &CallContext, image: &ImageSpec) -> Result<Option<Image>> {
        self.intercept(ctx, ApiName::ImageStatus, || self.inner.image_status(ctx, image)).await
    }

    async fn pull_image(
        &self,
        ctx: &CallContext,
        req: PullImageRequest,
    ) -> Result<PullImageResponse> {
        self.intercept(ctx, ApiName::PullImage, move || self.inner.pull_image(ctx, req)).await
    }

    async fn remove_image(&self, ctx: &CallContext, image: &ImageSpec) -> Result<()> {
        self.intercept(ctx, ApiName::RemoveImage, || self.inner.remove_image(ctx, image)).await
    }
}
