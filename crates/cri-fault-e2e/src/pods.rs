//! Test pod helpers.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, PostParams, ResourceExt};
use log::{debug, info};
use serde_json::json;
use tokio::time::Instant;

use crate::error::{E2eError, Result};

pub const POD_PREFIX: &str = "cri-proxy-test-";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pod with a single container that always pulls `image`, so every start
/// goes through the runtime's PullImage.
pub fn new_pull_always_pod(image: &str) -> Result<Pod> {
    let name = format!("{}{}", POD_PREFIX, uuid::Uuid::new_v4());
    let pod: Pod = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "labels": { "app": "cri-proxy-test" }
        },
        "spec": {
            "containers": [{
                "name": name,
                "image": image,
                "imagePullPolicy": "Always"
            }]
        }
    }))?;
    Ok(pod)
}

pub async fn create_pod(api: &Api<Pod>, pod: &Pod) -> Result<Pod> {
    let created = api.create(&PostParams::default(), pod).await?;
    info!("Created pod: {}", created.name_any());
    Ok(created)
}

pub async fn delete_pod(api: &Api<Pod>, name: &str) -> Result<()> {
    let dp = DeleteParams {
        grace_period_seconds: Some(0),
        ..DeleteParams::default()
    };
    api.delete(name, &dp).await?;
    info!("Deleted pod: {}", name);
    Ok(())
}

/// Run `check` every `interval` until it yields a value or `timeout`
/// elapses.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(E2eError::Timeout {
                what: what.to_string(),
                after: timeout,
            });
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Wait until `pred` holds for the named pod.
pub async fn wait_for_pod_condition<P>(
    api: &Api<Pod>,
    name: &str,
    desc: &str,
    timeout: Duration,
    pred: P,
) -> Result<Pod>
where
    P: Fn(&Pod) -> bool,
{
    let pred = &pred;
    let what = format!("pod {name} to be {desc}");
    let pod = poll_until(&what, timeout, POLL_INTERVAL, move || async move {
        let pod = api.get(name).await?;
        Ok::<_, E2eError>(pred(&pod).then_some(pod))
    })
    .await?;
    debug!("pod {} is {}", name, desc);
    Ok(pod)
}

pub async fn wait_for_pod_running(api: &Api<Pod>, name: &str, timeout: Duration) -> Result<Pod> {
    wait_for_pod_condition(api, name, "running", timeout, is_running).await
}

pub async fn wait_for_container_started(
    api: &Api<Pod>,
    name: &str,
    timeout: Duration,
) -> Result<Pod> {
    wait_for_pod_condition(api, name, "started", timeout, container_started).await
}

pub fn is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Running")
}

pub fn container_started(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .is_some_and(|statuses| {
            statuses.iter().any(|c| {
                c.started == Some(true)
                    || c.state.as_ref().is_some_and(|st| st.running.is_some())
            })
        })
}

/// A container is waiting because its image could not be pulled.
pub fn is_pull_backing_off(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .is_some_and(|statuses| {
            statuses.iter().any(|c| {
                c.state
                    .as_ref()
                    .and_then(|st| st.waiting.as_ref())
                    .and_then(|w| w.reason.as_deref())
                    .is_some_and(|r| r == "ErrImagePull" || r == "ImagePullBackOff")
            })
        })
}
