//! Image pull failure scenarios driven through the CRI fault-injection
//! proxy, observed through the kubelet's pod events.

pub use error::{E2eError, Result};

mod config;
mod error;
mod harness;
pub mod pods;

pub use config::E2eConfig;
pub use harness::Harness;
