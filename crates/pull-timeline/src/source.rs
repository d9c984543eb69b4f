use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Event;
use kube::api::{Api, ListParams};
use kube::Client;
use log::debug;

use crate::error::{Error, Result};
use crate::event::{LifecycleEvent, Reason};

/// Anything that can hand out the lifecycle events of a namespace.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// One consistent snapshot of the namespace's events.
    async fn list(&self, namespace: &str) -> Result<Vec<LifecycleEvent>>;
}

/// In-memory event recorder.
///
/// A coalescing log folds repeats of the same (subject, reason, message)
/// into one event, the way the Kubernetes event recorder does.
#[derive(Debug, Default)]
pub struct EventLog {
    coalesce: bool,
    events: Mutex<HashMap<String, Vec<LifecycleEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coalescing() -> Self {
        Self {
            coalesce: true,
            ..Self::default()
        }
    }

    pub fn record(
        &self,
        namespace: &str,
        subject: &str,
        reason: Reason,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        let message = message.into();
        debug!("event {namespace}/{subject}: {reason} {message:?}");

        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let list = events.entry(namespace.to_string()).or_default();

        if self.coalesce {
            if let Some(existing) = list
                .iter_mut()
                .find(|e| e.subject == subject && e.reason == reason && e.message == message)
            {
                existing.count += 1;
                existing.last_timestamp = Some(at);
                return;
            }
        }
        list.push(LifecycleEvent::new(subject, reason, at, message));
    }
}

#[async_trait]
impl EventSource for EventLog {
    async fn list(&self, namespace: &str) -> Result<Vec<LifecycleEvent>> {
        let events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(events.get(namespace).cloned().unwrap_or_default())
    }
}

/// Lists `v1/Event` objects from the cluster.
#[derive(Clone)]
pub struct KubeEventSource {
    client: Client,
}

impl KubeEventSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.map_err(|source| Error::Kube {
            namespace: String::new(),
            source,
        })?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl EventSource for KubeEventSource {
    async fn list(&self, namespace: &str) -> Result<Vec<LifecycleEvent>> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|source| Error::Kube {
                namespace: namespace.to_string(),
                source,
            })?;
        let total = list.items.len();
        let events: Vec<LifecycleEvent> =
            list.items.iter().filter_map(LifecycleEvent::from_kube).collect();
        debug!(
            "listed {} events in {}, {} about image pulls",
            total,
            namespace,
            events.len()
        );
        Ok(events)
    }
}
