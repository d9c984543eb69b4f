//! Fault injection for CRI clients.
//!
//! [`CriProxy`] wraps a runtime client and consults an
//! [`InjectorRegistry`] on every call: the call is forwarded, failed with
//! an injected [`Status`], or held for an injected delay first. Test
//! controllers drive the registry directly, through a [`FaultScope`], or
//! remotely over the [`control`] socket.

pub use error::{Error, Result};

pub mod api;
mod behavior;
pub mod control;
mod error;
mod proxy;
mod registry;
mod scope;

pub use api::{ApiName, CallContext, ImageService, RuntimeService};
pub use behavior::{Behavior, Code, InjectionPlan, Status};
pub use control::ControlClient;
pub use proxy::CriProxy;
pub use registry::{Injector, InjectorRegistry};
pub use scope::FaultScope;

#[cfg(test)]
mod test_utils;
