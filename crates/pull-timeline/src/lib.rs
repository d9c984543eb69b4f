//! Image pull timings reconstructed from kubelet lifecycle events.
//!
//! Events come from an [`EventSource`]: the cluster's event API through
//! [`KubeEventSource`], or an in-memory [`EventLog`]. The [`timeline`]
//! functions turn one snapshot into a pull duration and the sequence of
//! retry backoffs.

pub use error::{Error, Result};

mod error;
mod event;
mod source;
pub mod timeline;

pub use event::{for_subject, LifecycleEvent, Reason};
pub use source::{EventLog, EventSource, KubeEventSource};
pub use timeline::{
    backoff_durations, backoff_records, check_backoff_growth, failed_pull_message, pull_duration,
    BackoffPolicy, BackoffRecord,
};
