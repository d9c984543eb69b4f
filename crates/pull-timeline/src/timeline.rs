//! Pull timing facts derived from a snapshot of lifecycle events.
//!
//! Everything here is a pure read over the slice it is given. Events may
//! arrive in any order; they are sorted before use. Answers that the
//! snapshot cannot support are errors, never zero durations.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::event::{for_subject, LifecycleEvent, Reason};

/// Wait before one retry: `attempt` is the 0-based index of the attempt
/// that ended, `interval` the time until the next attempt started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffRecord {
    pub attempt: usize,
    pub interval: Duration,
}

struct Attempt {
    started: DateTime<Utc>,
    // (first, last) occurrence of each backoff event seen during the attempt
    backoffs: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Attempt {
    fn new(started: DateTime<Utc>) -> Self {
        Self {
            started,
            backoffs: Vec::new(),
        }
    }

    // Latest backoff signal before `next`. A coalesced event whose last
    // occurrence lies past `next` also covers later attempts, so only its
    // first occurrence is attributed to this one.
    fn signal_before(&self, next: DateTime<Utc>) -> DateTime<Utc> {
        self.backoffs
            .iter()
            .map(|&(first, last)| if last <= next { last } else { first })
            .max()
            .unwrap_or(self.started)
    }
}

fn interval(subject: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Duration> {
    (to - from)
        .to_std()
        .map_err(|_| Error::negative_interval(subject, from, to))
}

fn sorted_for_subject<'a>(
    events: &'a [LifecycleEvent],
    subject: &'a str,
) -> Result<Vec<&'a LifecycleEvent>> {
    let mut evs: Vec<&LifecycleEvent> = for_subject(events, subject).collect();
    if let Some(bad) = evs.iter().find(|e| e.last_seen() < e.first_timestamp) {
        return Err(Error::malformed(
            subject,
            format!("{} event last seen before it first occurred", bad.reason),
        ));
    }
    evs.sort_by(|a, b| {
        a.first_timestamp
            .cmp(&b.first_timestamp)
            .then(a.reason.rank().cmp(&b.reason.rank()))
            .then_with(|| a.last_seen().cmp(&b.last_seen()))
    });
    Ok(evs)
}

/// Time from the first pull attempt starting to the final successful pull.
pub fn pull_duration(events: &[LifecycleEvent], subject: &str) -> Result<Duration> {
    let evs = sorted_for_subject(events, subject)?;

    let start = evs
        .iter()
        .filter(|e| e.reason == Reason::PullingImage)
        .map(|e| e.first_timestamp)
        .min()
        .ok_or_else(|| Error::incomplete(subject, Reason::PullingImage))?;
    let end = evs
        .iter()
        .filter(|e| e.reason == Reason::PulledImage)
        .map(|e| e.last_seen())
        .max()
        .ok_or_else(|| Error::incomplete(subject, Reason::PulledImage))?;

    interval(subject, start, end)
}

/// Waits between consecutive pull attempts, in attempt order.
///
/// A new attempt is a `PullingImage` strictly later than the current
/// attempt's start. Its wait is measured from the latest backoff seen
/// during the previous attempt, or from that attempt's start when it saw
/// none. Coalesced backoffs reaching past the new attempt count from
/// their first occurrence. An empty result means no retry was observed.
pub fn backoff_records(events: &[LifecycleEvent], subject: &str) -> Result<Vec<BackoffRecord>> {
    let evs = sorted_for_subject(events, subject)?;

    let mut records = Vec::new();
    let mut current: Option<Attempt> = None;

    for ev in evs {
        match ev.reason {
            Reason::PullingImage => {
                let at = ev.first_timestamp;
                if let Some(prev) = current.as_ref() {
                    // same instant: duplicate report of the running attempt
                    if at <= prev.started {
                        continue;
                    }
                    let from = prev.signal_before(at);
                    records.push(BackoffRecord {
                        attempt: records.len(),
                        interval: interval(subject, from, at)?,
                    });
                }
                current = Some(Attempt::new(at));
            }
            Reason::BackOffPullImage => match current.as_mut() {
                Some(attempt) => attempt.backoffs.push((ev.first_timestamp, ev.last_seen())),
                None => {
                    return Err(Error::malformed(
                        subject,
                        "backoff reported before any pull attempt",
                    ))
                }
            },
            Reason::PulledImage | Reason::FailedToPullImage => {}
        }
    }

    Ok(records)
}

pub fn backoff_durations(events: &[LifecycleEvent], subject: &str) -> Result<Vec<Duration>> {
    Ok(backoff_records(events, subject)?
        .into_iter()
        .map(|r| r.interval)
        .collect())
}

/// Message of the first failed pull, which carries the runtime's error.
pub fn failed_pull_message(events: &[LifecycleEvent], subject: &str) -> Result<String> {
    sorted_for_subject(events, subject)?
        .into_iter()
        .find(|e| e.reason == Reason::FailedToPullImage)
        .map(|e| e.message.clone())
        .ok_or_else(|| Error::incomplete(subject, Reason::FailedToPullImage))
}

/// Expected exponential retry schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub factor: u32,
    pub max: Duration,
    pub tolerance: Duration,
}

impl Default for BackoffPolicy {
    /// The kubelet's image pull backoff.
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            factor: 2,
            max: Duration::from_secs(300),
            tolerance: Duration::from_secs(2),
        }
    }
}

impl BackoffPolicy {
    pub fn expected(&self, attempt: usize) -> Duration {
        let mut d = self.initial;
        for _ in 0..attempt {
            if d >= self.max {
                break;
            }
            d = d.saturating_mul(self.factor);
        }
        d.min(self.max)
    }
}

/// Check each observed wait against the policy's schedule.
pub fn check_backoff_growth(durations: &[Duration], policy: &BackoffPolicy) -> Result<()> {
    for (attempt, &observed) in durations.iter().enumerate() {
        let expected = policy.expected(attempt);
        let off = if observed > expected {
            observed - expected
        } else {
            expected - observed
        };
        if off > policy.tolerance {
            return Err(Error::UnexpectedBackoff {
                attempt,
                expected,
                observed,
            });
        }
    }
    Ok(())
}
