use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::event::Reason;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no {reason} event for {subject}")]
    IncompleteTimeline { subject: String, reason: Reason },

    #[error("malformed timeline for {subject}: {detail}")]
    MalformedTimeline { subject: String, detail: String },

    #[error("backoff {attempt} was {observed:?}, expected {expected:?}")]
    UnexpectedBackoff {
        attempt: usize,
        expected: Duration,
        observed: Duration,
    },

    #[error("listing events in {namespace}: {source}")]
    Kube {
        namespace: String,
        source: kube::Error,
    },
}

impl Error {
    pub(crate) fn incomplete(subject: &str, reason: Reason) -> Self {
        Error::IncompleteTimeline {
            subject: subject.to_string(),
            reason,
        }
    }

    pub(crate) fn malformed(subject: &str, detail: impl Into<String>) -> Self {
        Error::MalformedTimeline {
            subject: subject.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn negative_interval(
        subject: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Self {
        Error::malformed(subject, format!("interval from {from} to {to} is negative"))
    }
}
