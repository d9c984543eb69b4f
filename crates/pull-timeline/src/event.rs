use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Event;
use log::trace;
use serde::{Deserialize, Serialize};

/// Image pull related reasons the kubelet reports on a pod.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    /// A pull attempt started.
    PullingImage,
    /// The kubelet entered a backoff before the next attempt.
    BackOffPullImage,
    /// A pull attempt succeeded.
    PulledImage,
    /// A pull attempt failed; the message carries the runtime error.
    FailedToPullImage,
}

impl Reason {
    /// The reason string on the kubelet's events.
    pub fn kubelet_reason(&self) -> &'static str {
        match self {
            Reason::PullingImage => "Pulling",
            Reason::BackOffPullImage => "BackOff",
            Reason::PulledImage => "Pulled",
            Reason::FailedToPullImage => "Failed",
        }
    }

    pub fn from_kubelet_reason(reason: &str) -> Option<Self> {
        match reason {
            "Pulling" => Some(Reason::PullingImage),
            "BackOff" => Some(Reason::BackOffPullImage),
            "Pulled" => Some(Reason::PulledImage),
            "Failed" => Some(Reason::FailedToPullImage),
            _ => None,
        }
    }

    // Order among events sharing a timestamp: an attempt's failure and
    // backoff close it before the next attempt starts.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Reason::FailedToPullImage => 0,
            Reason::BackOffPullImage => 1,
            Reason::PullingImage => 2,
            Reason::PulledImage => 3,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reason::PullingImage => "PullingImage",
            Reason::BackOffPullImage => "BackOffPullImage",
            Reason::PulledImage => "PulledImage",
            Reason::FailedToPullImage => "FailedToPullImage",
        };
        f.write_str(name)
    }
}

/// One lifecycle event about a subject (a pod).
///
/// Stores that coalesce repeats keep the first occurrence in
/// `first_timestamp`, the latest in `last_timestamp` and the number of
/// occurrences in `count`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub subject: String,
    pub reason: Reason,
    pub first_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,
    #[serde(default = "one")]
    pub count: u32,
    #[serde(default)]
    pub message: String,
}

fn one() -> u32 {
    1
}

impl LifecycleEvent {
    pub fn new(
        subject: impl Into<String>,
        reason: Reason,
        at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            reason,
            first_timestamp: at,
            last_timestamp: None,
            count: 1,
            message: message.into(),
        }
    }

    /// Latest known occurrence.
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_timestamp.unwrap_or(self.first_timestamp)
    }

    /// Convert a Kubernetes core/v1 event.
    ///
    /// Returns `None` for events unrelated to image pulls and for events
    /// carrying no timestamp at all.
    pub fn from_kube(ev: &Event) -> Option<Self> {
        let reason = ev.reason.as_deref().and_then(Reason::from_kubelet_reason)?;
        let subject = ev.involved_object.name.clone()?;
        let first_timestamp = match (&ev.first_timestamp, &ev.event_time) {
            (Some(t), _) => t.0,
            (None, Some(t)) => t.0,
            (None, None) => {
                trace!("pull-timeline: skipping {} event without timestamp", reason);
                return None;
            }
        };
        Some(Self {
            subject,
            reason,
            first_timestamp,
            last_timestamp: ev.last_timestamp.as_ref().map(|t| t.0),
            count: ev.count.map(|c| c.max(1) as u32).unwrap_or(1),
            message: ev.message.clone().unwrap_or_default(),
        })
    }
}

/// The events of one subject out of a namespace snapshot.
pub fn for_subject<'a>(
    events: &'a [LifecycleEvent],
    subject: &'a str,
) -> impl Iterator<Item = &'a LifecycleEvent> + 'a {
    events.iter().filter(move |e| e.subject == subject)
}
