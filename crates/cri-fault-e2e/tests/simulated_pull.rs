//! Image pull scenarios against a simulated node on paused time.

mod support;

use std::time::Duration;

use cri_proxy::{ApiName, FaultScope, InjectionPlan};
use pull_timeline::{
    backoff_durations, check_backoff_growth, failed_pull_message, pull_duration, BackoffPolicy,
    EventLog, EventSource,
};
use support::{Node, NAMESPACE};

const POD: &str = "cri-proxy-test-sim";

fn approx(observed: Duration, expected: Duration, tolerance: Duration) -> bool {
    let off = if observed > expected {
        observed - expected
    } else {
        expected - observed
    };
    off <= tolerance
}

#[tokio::test(start_paused = true)]
async fn pull_error_surfaces_in_failed_event() -> anyhow::Result<()> {
    let node = Node::new(EventLog::new());
    let plan = InjectionPlan::new().fail(ApiName::PullImage, "PullImage failed");

    let sim = &node;
    let msg = FaultScope::new(&*node.registry, plan)
        .run(move || async move {
            let pod = sim.start_pod(POD);
            tokio::time::sleep(Duration::from_secs(5)).await;
            assert!(!pod.is_finished(), "pull succeeded despite injected error");
            pod.abort();

            sim.events
                .list(NAMESPACE)
                .await
                .and_then(|events| failed_pull_message(&events, POD))
        })
        .await??;

    assert!(msg.contains("PullImage failed"), "unexpected message: {msg}");
    assert!(node.registry.snapshot()?.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn repeated_pull_errors_back_off_exponentially() -> anyhow::Result<()> {
    let cfg = cri_fault_e2e::E2eConfig::default();
    let node = Node::new(EventLog::new());
    node.registry
        .install(InjectionPlan::new().fail(ApiName::PullImage, "PullImage failed"))?;

    let pod = node.start_pod(POD);
    tokio::time::sleep(cfg.backoff_window).await;
    assert!(!pod.is_finished(), "container started while pulls were failing");

    let events = node.events.list(NAMESPACE).await?;
    assert!(failed_pull_message(&events, POD)?.contains("PullImage failed"));

    // after the next backoff the pull goes through
    node.registry.reset()?;
    pod.await?;

    let events = node.events.list(NAMESPACE).await?;
    let backoffs = backoff_durations(&events, POD)?;
    assert_eq!(backoffs.len(), 3, "backoffs: {backoffs:?}");
    assert!(approx(
        backoffs[0],
        Duration::from_secs(10),
        Duration::from_secs(2)
    ));
    check_backoff_growth(&backoffs, &BackoffPolicy::default())?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn coalesced_events_hide_the_backoff_sequence() -> anyhow::Result<()> {
    let node = Node::new(EventLog::coalescing());
    node.registry
        .install(InjectionPlan::new().fail(ApiName::PullImage, "PullImage failed"))?;

    let pod = node.start_pod(POD);
    tokio::time::sleep(Duration::from_secs(40)).await;
    node.registry.reset()?;
    pod.await?;

    let events = node.events.list(NAMESPACE).await?;
    assert!(backoff_durations(&events, POD)?.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn delayed_pull_takes_at_least_the_delay() -> anyhow::Result<()> {
    let node = Node::new(EventLog::new());
    let delay = Duration::from_secs(10);
    let plan = InjectionPlan::new().delay(ApiName::PullImage, delay);

    let sim = &node;
    FaultScope::new(&*node.registry, plan)
        .run(move || async move {
            let pod = sim.start_pod(POD);
            tokio::time::timeout(Duration::from_secs(60), pod).await
        })
        .await???;

    let events = node.events.list(NAMESPACE).await?;
    let took = pull_duration(&events, POD)?;
    assert!(took >= delay, "pull took {took:?}");
    assert!(failed_pull_message(&events, POD).is_err());
    Ok(())
}
