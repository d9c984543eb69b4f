use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::{info, warn};

use crate::api::ApiName;
use crate::behavior::{Behavior, InjectionPlan};
use crate::error::{Error, Result};

/// Controller side of fault injection.
///
/// Implemented by the in-process [`InjectorRegistry`] and by the
/// control socket client, so scenarios do not care where the proxy runs.
#[async_trait]
pub trait Injector: Send + Sync {
    /// Replace every installed behavior with `plan`.
    async fn install(&self, plan: InjectionPlan) -> Result<()>;

    /// Drop every installed behavior.
    async fn reset(&self) -> Result<()>;

    /// Start a reset without awaiting it, for teardown paths that cannot
    /// await such as a dropped scope. Failures are only logged.
    fn reset_in_background(&self);
}

/// Table of injected behaviors consulted by the proxy on every call.
///
/// The plan is swapped as a whole, so a reader sees either the previous
/// or the new plan. Once closed, every operation reports
/// [`Error::Unavailable`].
#[derive(Debug)]
pub struct InjectorRegistry {
    // None once closed
    plan: RwLock<Option<Arc<InjectionPlan>>>,
}

impl Default for InjectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InjectorRegistry {
    pub fn new() -> Self {
        Self {
            plan: RwLock::new(Some(Arc::new(InjectionPlan::new()))),
        }
    }

    pub fn install(&self, plan: InjectionPlan) -> Result<()> {
        let mut slot = self
            .plan
            .write()
            .map_err(|_| Error::unavailable("injector registry lock poisoned"))?;
        if slot.is_none() {
            warn!("cri-proxy: install on closed injector registry");
            return Err(Error::unavailable("injector registry closed"));
        }
        info!("cri-proxy: installing injection plan {}", plan);
        *slot = Some(Arc::new(plan));
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        let mut slot = self
            .plan
            .write()
            .map_err(|_| Error::unavailable("injector registry lock poisoned"))?;
        if slot.is_none() {
            warn!("cri-proxy: reset on closed injector registry");
            return Err(Error::unavailable("injector registry closed"));
        }
        info!("cri-proxy: resetting injection plan");
        *slot = Some(Arc::new(InjectionPlan::new()));
        Ok(())
    }

    /// The plan in force right now.
    pub fn snapshot(&self) -> Result<Arc<InjectionPlan>> {
        let slot = self
            .plan
            .read()
            .map_err(|_| Error::unavailable("injector registry lock poisoned"))?;
        slot.clone()
            .ok_or_else(|| Error::unavailable("injector registry closed"))
    }

    pub fn lookup(&self, api: ApiName) -> Result<Behavior> {
        Ok(self.snapshot()?.behavior_for(api))
    }

    /// Detach the registry. Proxies built on it fail every call from now on.
    pub fn close(&self) {
        match self.plan.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
        info!("cri-proxy: injector registry closed");
    }

    pub fn is_closed(&self) -> bool {
        self.plan.read().map(|s| s.is_none()).unwrap_or(true)
    }
}

#[async_trait]
impl Injector for InjectorRegistry {
    async fn install(&self, plan: InjectionPlan) -> Result<()> {
        InjectorRegistry::install(self, plan)
    }

    async fn reset(&self) -> Result<()> {
        InjectorRegistry::reset(self)
    }

    fn reset_in_background(&self) {
        if let Err(e) = InjectorRegistry::reset(self) {
            warn!("cri-proxy: teardown reset failed: {}", e);
        }
    }
}
