//! Bus client: the extension-side proxy to the status daemon.
//!
//! One `BusClient` owns (or borrows) a tokio runtime, keeps a connection
//! state machine alive against the daemon endpoint, and bridges the daemon's
//! pushed events into a local broadcast channel of typed [`ClientEvent`]s.
//! Wire integers are decoded into [`FileState`] here and nowhere else;
//! nothing variant-shaped leaks past this crate.
//!
//! Blocking and `*_background` variants exist for hosts without an async
//! context (the file manager's threads). The blocking calls must not be
//! issued from runtime threads.

mod sse;

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures_util::StreamExt;
use protocol::{
    BusEvent, StatusMap,
    messages::{FileStatusesRequest, HealthInfo, RepositoryRequest, ServiceStatus},
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::sse::SseDecoder;

/// Retry cadence while the daemon is unreachable.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Per-call timeout for the request/response methods. The event stream has
/// no timeout; it lives as long as the connection does.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(25);

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("status daemon is not reachable")]
    Disconnected,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response from daemon: {0}")]
    UnexpectedResponse(String),
    #[error("failed to start client runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Locally re-emitted events, decoded to typed values.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    RepositoryStatusChanged { root: PathBuf, changes: StatusMap },
    RepositoryDiscovered { root: PathBuf },
    /// Result of a [`BusClient::get_file_statuses_async`] fetch.
    FileStatusesReady { statuses: StatusMap },
    /// Connection to the daemon came up or went away.
    ServiceAvailability { available: bool },
}

struct ClientInner {
    http: reqwest::Client,
    endpoint: String,
    connected: AtomicBool,
    events: broadcast::Sender<ClientEvent>,
}

pub struct BusClient {
    inner: Arc<ClientInner>,
    handle: tokio::runtime::Handle,
    // Present when this client brought its own runtime; shut down on drop.
    runtime: Option<tokio::runtime::Runtime>,
}

impl BusClient {
    /// Connect to the well-known daemon endpoint.
    pub fn new() -> Result<Self, ClientError> {
        Self::with_endpoint(protocol::default_endpoint())
    }

    /// Connect to a specific endpoint (tests, non-default setups). When no
    /// tokio runtime is active, a small private one is created so host
    /// processes need none of their own.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        let (runtime, handle) = match tokio::runtime::Handle::try_current() {
            Ok(handle) => (None, handle),
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .thread_name("git-bus-client")
                    .enable_all()
                    .build()?;
                let handle = runtime.handle().clone();
                (Some(runtime), handle)
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(ClientInner {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            connected: AtomicBool::new(false),
            events,
        });

        handle.spawn(connection_loop(Arc::clone(&inner)));

        Ok(Self {
            inner,
            handle,
            runtime,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Subscribe to locally re-emitted daemon events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Runtime handle for callers that want to park their own tasks next to
    /// the client's I/O.
    pub fn handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }

    // --- request/response methods -------------------------------------

    pub async fn register_repository(&self, path: &Path) -> Result<bool, ClientError> {
        self.inner.call_bool("/register-repository", path).await
    }

    pub async fn unregister_repository(&self, path: &Path) -> Result<bool, ClientError> {
        self.inner.call_bool("/unregister-repository", path).await
    }

    pub async fn refresh_repository(&self, path: &Path) -> Result<bool, ClientError> {
        self.inner.call_bool("/refresh-repository", path).await
    }

    pub async fn clear_repository_cache(&self, path: &Path) -> Result<bool, ClientError> {
        self.inner.call_bool("/clear-repository-cache", path).await
    }

    pub async fn clear_all_resources(&self) -> Result<bool, ClientError> {
        self.inner.post_json("/clear-all-resources", &()).await
    }

    pub async fn get_file_statuses(&self, paths: Vec<PathBuf>) -> Result<StatusMap, ClientError> {
        self.inner
            .post_json("/file-statuses", &FileStatusesRequest { paths })
            .await
    }

    pub async fn get_repository_status(&self, path: &Path) -> Result<StatusMap, ClientError> {
        self.inner
            .post_json(
                "/repository-status",
                &RepositoryRequest {
                    path: path.to_path_buf(),
                },
            )
            .await
    }

    pub async fn get_registered_repositories(&self) -> Result<Vec<PathBuf>, ClientError> {
        self.inner.get_json("/registered-repositories").await
    }

    pub async fn get_service_status(&self) -> Result<ServiceStatus, ClientError> {
        self.inner.get_json("/service-status").await
    }

    // --- blocking conveniences (host threads only) ---------------------

    pub fn register_repository_blocking(&self, path: &Path) -> Result<bool, ClientError> {
        self.handle.block_on(self.register_repository(path))
    }

    pub fn refresh_repository_blocking(&self, path: &Path) -> Result<bool, ClientError> {
        self.handle.block_on(self.refresh_repository(path))
    }

    pub fn clear_all_resources_blocking(&self) -> Result<bool, ClientError> {
        self.handle.block_on(self.clear_all_resources())
    }

    // --- fire-and-forget ------------------------------------------------

    /// Register without waiting for the round trip. Failures are logged and
    /// otherwise invisible; registration is retried naturally the next time
    /// the path is seen.
    pub fn register_repository_background(&self, path: &Path) {
        let inner = Arc::clone(&self.inner);
        let path = path.to_path_buf();
        self.handle.spawn(async move {
            if let Err(err) = inner.call_bool("/register-repository", &path).await {
                tracing::debug!(repo = %path.display(), error = %err, "background registration failed");
            }
        });
    }

    pub fn refresh_repository_background(&self, path: &Path) {
        let inner = Arc::clone(&self.inner);
        let path = path.to_path_buf();
        self.handle.spawn(async move {
            if let Err(err) = inner.call_bool("/refresh-repository", &path).await {
                tracing::debug!(repo = %path.display(), error = %err, "background refresh failed");
            }
        });
    }

    /// Batch fetch that returns immediately; the result arrives as a
    /// [`ClientEvent::FileStatusesReady`] on the local event channel.
    pub fn get_file_statuses_async(&self, paths: Vec<PathBuf>) {
        let inner = Arc::clone(&self.inner);
        self.handle.spawn(async move {
            match inner
                .post_json::<_, StatusMap>("/file-statuses", &FileStatusesRequest { paths })
                .await
            {
                Ok(statuses) => {
                    let _ = inner
                        .events
                        .send(ClientEvent::FileStatusesReady { statuses });
                }
                Err(err) => {
                    tracing::debug!(error = %err, "async status fetch failed");
                }
            }
        });
    }
}

impl Drop for BusClient {
    fn drop(&mut self) {
        // Never block a host thread on teardown.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl ClientInner {
    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.endpoint, protocol::API_PREFIX, path)
    }

    fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::AcqRel);
        if was != connected {
            tracing::info!(connected, "daemon availability changed");
            let _ = self.events.send(ClientEvent::ServiceAvailability {
                available: connected,
            });
        }
    }

    async fn call_bool(&self, route: &str, path: &Path) -> Result<bool, ClientError> {
        self.post_json(
            route,
            &RepositoryRequest {
                path: path.to_path_buf(),
            },
        )
        .await
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<R, ClientError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ClientError::Disconnected);
        }
        let response = self
            .http
            .post(self.url(route))
            .timeout(CALL_TIMEOUT)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get_json<R: DeserializeOwned>(&self, route: &str) -> Result<R, ClientError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ClientError::Disconnected);
        }
        let response = self
            .http
            .get(self.url(route))
            .timeout(CALL_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// One health round trip, verifying we reached the status daemon and not
    /// some unrelated local server.
    async fn health_check(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .get(self.url("/health"))
            .timeout(RECONNECT_INTERVAL)
            .send()
            .await?
            .error_for_status()?;
        let info: HealthInfo = response.json().await?;
        if !info.is_this_service() {
            return Err(ClientError::UnexpectedResponse(format!(
                "unknown service `{}` on endpoint",
                info.service
            )));
        }
        Ok(())
    }

    /// Consume the SSE stream until it ends or errors. Each decoded frame is
    /// re-emitted locally as a typed event. Only once the stream is open is
    /// the client reported as connected: the daemon registers the subscriber
    /// before answering, so events published after this point are not lost.
    async fn consume_events(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .get(self.url("/events"))
            .send()
            .await?
            .error_for_status()?;
        self.set_connected(true);
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for payload in decoder.feed(&chunk) {
                match serde_json::from_str::<BusEvent>(&payload) {
                    Ok(event) => self.emit(event),
                    Err(err) => {
                        tracing::warn!(error = %err, "undecodable event payload");
                    }
                }
            }
        }
        Ok(())
    }

    fn emit(&self, event: BusEvent) {
        let local = match event {
            BusEvent::RepositoryStatusChanged { root, changes } => {
                ClientEvent::RepositoryStatusChanged { root, changes }
            }
            BusEvent::RepositoryDiscovered { root } => ClientEvent::RepositoryDiscovered { root },
        };
        let _ = self.events.send(local);
    }
}

/// Connection state machine: health-check, then sit on the event stream
/// (which flips the connected flag once it is truly open); any failure
/// re-arms the retry timer. Runs for the life of the client.
async fn connection_loop(inner: Arc<ClientInner>) {
    loop {
        match inner.health_check().await {
            Ok(()) => {
                match inner.consume_events().await {
                    Ok(()) => tracing::debug!("event stream closed by daemon"),
                    Err(err) => tracing::debug!(error = %err, "event stream failed"),
                }
                inner.set_connected(false);
            }
            Err(err) => {
                tracing::trace!(error = %err, "daemon not reachable");
                inner.set_connected(false);
            }
        }
        tokio::time::sleep(RECONNECT_INTERVAL).await;
    }
}
