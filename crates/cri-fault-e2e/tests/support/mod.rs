//! A simulated node: a kubelet-like pull loop talking to a fake image
//! service through the CRI proxy, recording the events a kubelet would.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cri_proxy::api::{Image, ImageSpec, PullImageRequest, PullImageResponse};
use cri_proxy::{CallContext, CriProxy, ImageService, InjectorRegistry};
use pull_timeline::{BackoffPolicy, EventLog, Reason};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const NAMESPACE: &str = "default";
pub const PAUSE_IMAGE: &str = "registry.k8s.io/pause:3.9";
const PULL_TIME: Duration = Duration::from_millis(500);
// the kubelet reports the backoff on the sync after the failure
const SYNC_DELAY: Duration = Duration::from_secs(1);

pub struct FakeImages;

#[async_trait]
impl ImageService for FakeImages {
    async fn list_images(&self, _ctx: &CallContext) -> cri_proxy::Result<Vec<Image>> {
        Ok(vec![])
    }

    async fn image_status(
        &self,
        _ctx: &CallContext,
        _image: &ImageSpec,
    ) -> cri_proxy::Result<Option<Image>> {
        Ok(None)
    }

    async fn pull_image(
        &self,
        _ctx: &CallContext,
        req: PullImageRequest,
    ) -> cri_proxy::Result<PullImageResponse> {
        tokio::time::sleep(PULL_TIME).await;
        Ok(PullImageResponse {
            image_ref: format!("sha256:{}", req.image.image),
        })
    }

    async fn remove_image(&self, _ctx: &CallContext, _image: &ImageSpec) -> cri_proxy::Result<()> {
        Ok(())
    }
}

pub struct Node {
    pub registry: Arc<InjectorRegistry>,
    pub events: Arc<EventLog>,
    proxy: Arc<CriProxy<FakeImages>>,
    base: DateTime<Utc>,
    origin: Instant,
}

impl Node {
    pub fn new(events: EventLog) -> Self {
        let registry = Arc::new(InjectorRegistry::new());
        Self {
            proxy: Arc::new(CriProxy::new(FakeImages, registry.clone())),
            registry,
            events: Arc::new(events),
            base: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            origin: Instant::now(),
        }
    }

    /// Start pulling the pod's image until it succeeds. The task finishes
    /// when the container would start.
    pub fn start_pod(&self, pod: &str) -> JoinHandle<()> {
        let proxy = self.proxy.clone();
        let events = self.events.clone();
        let pod = pod.to_string();
        let (base, origin) = (self.base, self.origin);
        let now = move || base + chrono::Duration::from_std(origin.elapsed()).unwrap();

        tokio::spawn(async move {
            let policy = BackoffPolicy::default();
            let mut backoff = policy.initial;
            let image = PAUSE_IMAGE;
            loop {
                events.record(
                    NAMESPACE,
                    &pod,
                    Reason::PullingImage,
                    format!("Pulling image \"{image}\""),
                    now(),
                );
                let req = PullImageRequest {
                    image: ImageSpec::new(image),
                    sandbox_config: None,
                };
                match proxy.pull_image(&CallContext::new(), req).await {
                    Ok(_) => {
                        events.record(
                            NAMESPACE,
                            &pod,
                            Reason::PulledImage,
                            format!("Successfully pulled image \"{image}\""),
                            now(),
                        );
                        return;
                    }
                    Err(e) => {
                        events.record(
                            NAMESPACE,
                            &pod,
                            Reason::FailedToPullImage,
                            format!("Failed to pull image \"{image}\": {e}"),
                            now(),
                        );
                        tokio::time::sleep(SYNC_DELAY).await;
                        events.record(
                            NAMESPACE,
                            &pod,
                            Reason::BackOffPullImage,
                            format!("Back-off pulling image \"{image}\""),
                            now(),
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * policy.factor).min(policy.max);
                    }
                }
            }
        })
    }
}
