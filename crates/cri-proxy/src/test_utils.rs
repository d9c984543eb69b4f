#[cfg(test)]
pub mod mock_runtime {
    #![allow(dead_code)]
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use crate::api::{
        ApiName, CallContext, CreateContainerRequest, Image, ImageService, ImageSpec,
        PodSandboxConfig, PullImageRequest, PullImageResponse, RuntimeService, VersionResponse,
    };
    use crate::behavior::Status;
    use crate::error::{Error, Result};

    #[derive(Default)]
    pub struct MockRuntimeState {
        pub calls: HashMap<ApiName, Vec<Instant>>,
        pub fail_next: HashMap<ApiName, Status>,
    }

    /// Runtime double recording when each API was reached.
    #[derive(Clone, Default)]
    pub struct MockRuntime {
        state: Arc<Mutex<MockRuntimeState>>,
    }

    impl MockRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self, api: ApiName) -> usize {
            let st = self.state.lock().unwrap();
            st.calls.get(&api).map(Vec::len).unwrap_or(0)
        }

        pub fn first_call_at(&self, api: ApiName) -> Option<Instant> {
            let st = self.state.lock().unwrap();
            st.calls.get(&api).and_then(|v| v.first().copied())
        }

        /// Make the next real call to `api` fail with `status`.
        pub fn fail_next(&self, api: ApiName, status: Status) {
            let mut st = self.state.lock().unwrap();
            st.fail_next.insert(api, status);
        }

        fn record(&self, api: ApiName) -> Result<()> {
            let mut st = self.state.lock().unwrap();
            st.calls.entry(api).or_default().push(Instant::now());
            match st.fail_next.remove(&api) {
                Some(status) => Err(Error::Status(status)),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl RuntimeService for MockRuntime {
        async fn version(&self, _ctx: &CallContext) -> Result<VersionResponse> {
            self.record(ApiName::Version)?;
            Ok(VersionResponse {
                runtime_name: "mock".into(),
                runtime_version: "0.0.1".into(),
                runtime_api_version: "v1".into(),
            })
        }

        async fn run_pod_sandbox(
            &self,
            _ctx: &CallContext,
            config: PodSandboxConfig,
        ) -> Result<String> {
            self.record(ApiName::RunPodSandbox)?;
            Ok(format!("sandbox-{}", config.name))
        }

        async fn stop_pod_sandbox(&self, _ctx: &CallContext, _id: &str) -> Result<()> {
            self.record(ApiName::StopPodSandbox)
        }

        async fn remove_pod_sandbox(&self, _ctx: &CallContext, _id: &str) -> Result<()> {
            self.record(ApiName::RemovePodSandbox)
        }

        async fn create_container(
            &self,
            _ctx: &CallContext,
            req: CreateContainerRequest,
        ) -> Result<String> {
            self.record(ApiName::CreateContainer)?;
            Ok(format!("ctr-{}", req.config.name))
        }

        async fn start_container(&self, _ctx: &CallContext, _id: &str) -> Result<()> {
            self.record(ApiName::StartContainer)
        }

        async fn stop_container(&self, _ctx: &CallContext, _id: &str, _timeout: i64) -> Result<()> {
            self.record(ApiName::StopContainer)
        }

        async fn remove_container(&self, _ctx: &CallContext, _id: &str) -> Result<()> {
            self.record(ApiName::RemoveContainer)
        }
    }

    #[async_trait]
    impl ImageService for MockRuntime {
        async fn list_images(&self, _ctx: &CallContext) -> Result<Vec<Image>> {
            self.record(ApiName::ListImages)?;
            Ok(vec![])
        }

        async fn image_status(
            &self,
            _ctx: &CallContext,
            image: &ImageSpec,
        ) -> Result<Option<Image>> {
            self.record(ApiName::ImageStatus)?;
            Ok(Some(Image {
                id: format!("sha256:{}", image.image),
                repo_tags: vec![image.image.clone()],
                size: 0,
            }))
        }

        async fn pull_image(
            &self,
            _ctx: &CallContext,
            req: PullImageRequest,
        ) -> Result<PullImageResponse> {
            self.record(ApiName::PullImage)?;
            Ok(PullImageResponse {
                image_ref: format!("sha256:{}", req.image.image),
            })
        }

        async fn remove_image(&self, _ctx: &CallContext, _image: &ImageSpec) -> Result<()> {
            self.record(ApiName::RemoveImage)
        }
    }
}
