//! Unix socket control channel for installing behaviors from outside the
//! process that hosts the proxy.
//!
//! The protocol is one JSON request per line answered by one JSON
//! response per line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::behavior::InjectionPlan;
use crate::error::{Error, Result};
use crate::registry::{Injector, InjectorRegistry};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Install { plan: InjectionPlan },
    Reset,
    Show,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Plan { plan: InjectionPlan },
    Unavailable { reason: String },
    Error { message: String },
}

fn apply(registry: &InjectorRegistry, req: Request) -> Response {
    let res = match req {
        Request::Install { plan } => registry.install(plan).map(|_| Response::Ok),
        Request::Reset => registry.reset().map(|_| Response::Ok),
        Request::Show => registry.snapshot().map(|plan| Response::Plan {
            plan: (*plan).clone(),
        }),
    };
    match res {
        Ok(resp) => resp,
        Err(Error::Unavailable { reason }) => Response::Unavailable { reason },
        Err(e) => Response::Error {
            message: e.to_string(),
        },
    }
}

async fn handle_connection(
    stream: UnixStream,
    registry: Arc<InjectorRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("cri-proxy control: closing connection on shutdown");
                break;
            }
            next = lines.next_line() => next?,
        };
        let Some(line) = next else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let resp = match serde_json::from_str::<Request>(&line) {
            Ok(req) => {
                debug!("cri-proxy control: request {:?}", req);
                apply(&registry, req)
            }
            Err(e) => {
                warn!("cri-proxy control: malformed request: {}", e);
                Response::Error {
                    message: format!("malformed request: {e}"),
                }
            }
        };
        let mut out = serde_json::to_vec(&resp)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
    }
    Ok(())
}

/// Bind the control socket at `path`, replacing a stale socket file.
pub fn bind(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(UnixListener::bind(path)?)
}

/// Serve control requests against `registry` until `shutdown` fires.
pub async fn serve(
    listener: UnixListener,
    registry: Arc<InjectorRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("cri-proxy control: listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("cri-proxy control: shutting down");
                break;
            }
            accept_res = listener.accept() => {
                match accept_res {
                    Ok((stream, _peer)) => {
                        let registry = registry.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, registry, shutdown).await {
                                warn!("cri-proxy control: connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("cri-proxy control: accept error: {}", e);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Client for a proxy's control socket.
///
/// A socket that cannot be reached means fault injection is not wired up
/// here, reported as [`Error::Unavailable`].
#[derive(Clone, Debug)]
pub struct ControlClient {
    path: PathBuf,
}

impl ControlClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn request(&self, req: &Request) -> Result<Response> {
        let stream = UnixStream::connect(&self.path).await.map_err(|e| {
            Error::unavailable(format!(
                "cannot reach control socket {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let (reader, mut writer) = stream.into_split();

        let mut out = serde_json::to_vec(req)?;
        out.push(b'\n');
        writer.write_all(&out).await?;

        let mut lines = BufReader::new(reader).lines();
        let line = lines
            .next_line()
            .await?
            .ok_or_else(|| Error::unavailable("control socket closed before responding"))?;
        Ok(serde_json::from_str(&line)?)
    }

    async fn expect_ok(&self, req: Request) -> Result<()> {
        match self.request(&req).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// The plan currently installed in the remote registry.
    pub async fn show(&self) -> Result<InjectionPlan> {
        match self.request(&Request::Show).await? {
            Response::Plan { plan } => Ok(plan),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(resp: Response) -> Error {
    match resp {
        Response::Unavailable { reason } => Error::Unavailable { reason },
        Response::Error { message } => Error::Control(message),
        other => Error::Control(format!("unexpected response {other:?}")),
    }
}

#[async_trait]
impl Injector for ControlClient {
    async fn install(&self, plan: InjectionPlan) -> Result<()> {
        self.expect_ok(Request::Install { plan }).await
    }

    async fn reset(&self) -> Result<()> {
        self.expect_ok(Request::Reset).await
    }

    fn reset_in_background(&self) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                error!(
                    "cri-proxy: no runtime to reset {} from, faults may remain installed",
                    self.path.display()
                );
                return;
            }
        };
        let client = self.clone();
        handle.spawn(async move {
            if let Err(e) = client.expect_ok(Request::Reset).await {
                warn!("cri-proxy: teardown reset failed: {}", e);
            }
        });
    }
}
