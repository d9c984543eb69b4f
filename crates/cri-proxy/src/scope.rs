use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use log::{error, warn};

use crate::behavior::InjectionPlan;
use crate::error::Result;
use crate::registry::Injector;

/// Installs a plan for the duration of one scenario body.
///
/// The injector is reset on every way out of the body, including a
/// panic and the scope's future being dropped before it finished, so
/// faults never leak into the next scenario.
pub struct FaultScope<'a, I: ?Sized> {
    injector: &'a I,
    plan: InjectionPlan,
}

// Armed while a plan may be installed; a drop in that state means the
// scope future was abandoned mid-scenario.
struct ResetOnDrop<'a, I: Injector + ?Sized> {
    injector: &'a I,
    armed: bool,
}

impl<I: Injector + ?Sized> Drop for ResetOnDrop<'_, I> {
    fn drop(&mut self) {
        if self.armed {
            warn!("cri-proxy: fault scope dropped before completion, resetting");
            self.injector.reset_in_background();
        }
    }
}

impl<'a, I: Injector + ?Sized> FaultScope<'a, I> {
    pub fn new(injector: &'a I, plan: InjectionPlan) -> Self {
        Self { injector, plan }
    }

    /// Install, run `body`, reset.
    ///
    /// Returns `Err(Unavailable)` without running the body when the plan
    /// cannot be installed. A failed reset after the body completed is
    /// returned as the error and the body's output is dropped. Dropping
    /// the returned future early starts a reset in the background.
    pub async fn run<F, Fut, T>(self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut guard = ResetOnDrop {
            injector: self.injector,
            armed: true,
        };
        if let Err(e) = self.injector.install(self.plan).await {
            guard.armed = false;
            return Err(e);
        }

        let outcome = AssertUnwindSafe(body()).catch_unwind().await;
        let reset = self.injector.reset().await;
        guard.armed = false;

        match outcome {
            Ok(value) => match reset {
                Ok(()) => Ok(value),
                Err(e) => {
                    warn!("cri-proxy: reset after scenario failed: {}", e);
                    Err(e)
                }
            },
            Err(panic) => {
                if let Err(e) = reset {
                    error!("cri-proxy: reset after panicking scenario failed: {}", e);
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}
