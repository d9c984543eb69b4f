use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ApiName;

/// gRPC status codes a CRI call can fail with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Code {
    Cancelled,
    #[default]
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Unimplemented,
    Internal,
    Unavailable,
}

impl Code {
    pub const ALL: [Code; 12] = [
        Code::Cancelled,
        Code::Unknown,
        Code::InvalidArgument,
        Code::DeadlineExceeded,
        Code::NotFound,
        Code::AlreadyExists,
        Code::PermissionDenied,
        Code::ResourceExhausted,
        Code::FailedPrecondition,
        Code::Unimplemented,
        Code::Internal,
        Code::Unavailable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Cancelled => "Cancelled",
            Code::Unknown => "Unknown",
            Code::InvalidArgument => "InvalidArgument",
            Code::DeadlineExceeded => "DeadlineExceeded",
            Code::NotFound => "NotFound",
            Code::AlreadyExists => "AlreadyExists",
            Code::PermissionDenied => "PermissionDenied",
            Code::ResourceExhausted => "ResourceExhausted",
            Code::FailedPrecondition => "FailedPrecondition",
            Code::Unimplemented => "Unimplemented",
            Code::Internal => "Internal",
            Code::Unavailable => "Unavailable",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Code {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Code::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown status code: {s}"))
    }
}

/// Error value of a CRI call.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// What the proxy does with one intercepted call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Forward to the runtime untouched.
    #[default]
    Pass,
    /// Return the status without touching the runtime.
    Fail(Status),
    /// Hold the caller for the duration, then forward.
    Delay(Duration),
}

impl Behavior {
    pub fn fail(message: impl Into<String>) -> Self {
        Behavior::Fail(Status::new(Code::Unknown, message))
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Behavior::Pass)
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Behavior::Pass => f.write_str("pass"),
            Behavior::Fail(status) => write!(f, "fail({status})"),
            Behavior::Delay(d) => write!(f, "delay({d:?})"),
        }
    }
}

/// The full set of installed behaviors, keyed by API name.
///
/// A name maps to at most one behavior; inserting again replaces it.
/// Names without an entry pass through.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InjectionPlan {
    behaviors: BTreeMap<ApiName, Behavior>,
}

impl InjectionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`InjectionPlan::set`].
    pub fn with(mut self, api: ApiName, behavior: Behavior) -> Self {
        self.set(api, behavior);
        self
    }

    pub fn fail(self, api: ApiName, message: impl Into<String>) -> Self {
        self.with(api, Behavior::fail(message))
    }

    pub fn delay(self, api: ApiName, delay: Duration) -> Self {
        self.with(api, Behavior::Delay(delay))
    }

    /// Install `behavior` for `api`, returning the one it replaced.
    /// Setting `Pass` removes the entry.
    pub fn set(&mut self, api: ApiName, behavior: Behavior) -> Option<Behavior> {
        if behavior.is_pass() {
            self.behaviors.remove(&api)
        } else {
            self.behaviors.insert(api, behavior)
        }
    }

    pub fn behavior_for(&self, api: ApiName) -> Behavior {
        self.behaviors.get(&api).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ApiName, &Behavior)> {
        self.behaviors.iter().map(|(api, b)| (*api, b))
    }
}

impl fmt::Display for InjectionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.behaviors.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{")?;
        for (i, (api, behavior)) in self.behaviors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{api}: {behavior}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_names_pass_through() {
        let plan = InjectionPlan::new().fail(ApiName::PullImage, "PullImage failed");
        assert_eq!(plan.behavior_for(ApiName::ListImages), Behavior::Pass);
        assert_eq!(
            plan.behavior_for(ApiName::PullImage),
            Behavior::Fail(Status::new(Code::Unknown, "PullImage failed"))
        );
    }

    #[test]
    fn set_replaces_previous_behavior() {
        let mut plan = InjectionPlan::new().fail(ApiName::PullImage, "first");
        let old = plan.set(ApiName::PullImage, Behavior::Delay(Duration::from_secs(1)));
        assert_eq!(old, Some(Behavior::fail("first")));
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.behavior_for(ApiName::PullImage),
            Behavior::Delay(Duration::from_secs(1))
        );
    }

    #[test]
    fn setting_pass_clears_entry() {
        let mut plan = InjectionPlan::new().fail(ApiName::PullImage, "x");
        plan.set(ApiName::PullImage, Behavior::Pass);
        assert!(plan.is_empty());
    }

    #[test]
    fn plan_json_is_keyed_by_api_name() {
        let plan = InjectionPlan::new()
            .fail(ApiName::PullImage, "PullImage failed")
            .delay(ApiName::ImageStatus, Duration::from_millis(1500));
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["PullImage"]["fail"]["message"], "PullImage failed");
        assert_eq!(json["ImageStatus"]["delay"]["secs"], 1);

        let back: InjectionPlan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn codes_parse_case_insensitively() {
        assert_eq!("deadlineexceeded".parse::<Code>().unwrap(), Code::DeadlineExceeded);
        assert!("Teapot".parse::<Code>().is_err());
    }

    #[test]
    fn display_lists_behaviors() {
        let plan = InjectionPlan::new().fail(ApiName::PullImage, "boom");
        assert_eq!(plan.to_string(), "{PullImage: fail(Unknown: boom)}");
        assert_eq!(InjectionPlan::new().to_string(), "{}");
    }
}
