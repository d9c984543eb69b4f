use std::time::Duration;

use cri_proxy::{ControlClient, FaultScope, InjectionPlan, Injector};
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::Client;
use log::info;
use pull_timeline::{EventSource, KubeEventSource, LifecycleEvent};

use crate::config::E2eConfig;
use crate::error::Result;
use crate::pods;

/// Everything a cluster scenario needs: the proxy's control socket, the
/// test namespace's pods and its events.
pub struct Harness {
    config: E2eConfig,
    control: ControlClient,
    pods: Api<Pod>,
    events: KubeEventSource,
}

impl Harness {
    /// Connect to the proxy and the cluster.
    ///
    /// Fails with an unavailable proxy error when the control socket does
    /// not exist; scenarios treat that as a skip.
    pub async fn connect(config: E2eConfig) -> Result<Self> {
        if !config.socket.exists() {
            return Err(cri_proxy::Error::Unavailable {
                reason: format!("no control socket at {}", config.socket.display()),
            }
            .into());
        }
        let control = ControlClient::new(config.socket.clone());
        // the proxy may have been left with faults by an aborted run
        control.reset().await?;

        let client = Client::try_default().await?;
        info!(
            "Using namespace {} and proxy at {}",
            config.namespace,
            config.socket.display()
        );
        Ok(Self {
            pods: Api::namespaced(client.clone(), &config.namespace),
            events: KubeEventSource::new(client),
            control,
            config,
        })
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    pub fn control(&self) -> &ControlClient {
        &self.control
    }

    pub fn pods(&self) -> &Api<Pod> {
        &self.pods
    }

    pub fn scope(&self, plan: InjectionPlan) -> FaultScope<'_, ControlClient> {
        FaultScope::new(&self.control, plan)
    }

    /// Create a pull-always pod for the configured pause image.
    pub async fn start_pull_always_pod(&self) -> Result<String> {
        let pod = pods::new_pull_always_pod(&self.config.pause_image)?;
        let created = pods::create_pod(&self.pods, &pod).await?;
        Ok(kube::ResourceExt::name_any(&created))
    }

    pub async fn wait_running(&self, name: &str) -> Result<Pod> {
        pods::wait_for_pod_running(&self.pods, name, self.config.condition_timeout).await
    }

    pub async fn wait_started(&self, name: &str, timeout: Duration) -> Result<Pod> {
        pods::wait_for_container_started(&self.pods, name, timeout).await
    }

    pub async fn wait_pull_backing_off(&self, name: &str) -> Result<Pod> {
        pods::wait_for_pod_condition(
            &self.pods,
            name,
            "backing off image pulls",
            self.config.condition_timeout,
            pods::is_pull_backing_off,
        )
        .await
    }

    /// Current event snapshot of the test namespace.
    pub async fn events(&self) -> Result<Vec<LifecycleEvent>> {
        Ok(self.events.list(&self.config.namespace).await?)
    }

    pub async fn cleanup(&self, name: &str) -> Result<()> {
        pods::delete_pod(&self.pods, name).await
    }
}
