//! # CacheKit Proxy
//!
//! Network-first offline cache proxy: mediates every intercepted fetch
//! between the network and a named, versioned response store.
//!
//! ## Features
//!
//! - **Lifecycle**: install (best-effort precache), activate (generation
//!   eviction, immediate control)
//! - **Fetch interception**: per-class policies with cache and synthesized
//!   fallbacks; the caller always receives an outcome
//! - **Message channel**: page protocol (`STORE_OFFLINE_DATA`,
//!   `SKIP_WAITING`)
//! - **Background sync**: placeholder replay trigger for a fixed tag
//! - **Push**: fixed-template notifications
//!
//! ## Architecture
//!
//! ```text
//! Host (request pipeline)
//!     │  WorkerEvent
//!     ▼
//! OfflineProxy ── classify ──► Passthrough | VendorAsset | SameOrigin
//!     │                            │             │
//!     │                     proxy→cache→net   net→cache→synthesize
//!     ▼                            ▼             ▼
//! Fetcher (network)        StoreRegistry ("<prefix>-<version>")
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace, warn};
use url::Url;

use http::header::{CACHE_CONTROL, PRAGMA};
use http::HeaderValue;

use cachekit_common::{retry_with_backoff, RetryConfig};
use cachekit_net::{Fetcher, Request, Response, ResponseKind};
use cachekit_store::StoreRegistry;

pub mod classify;
pub mod push;
pub mod queue;
pub mod respond;

pub use classify::{classify, AssetKind, PatternType, RequestClass, UrlPattern};
pub use push::{Notification, NotificationAction};
pub use queue::{PendingQueue, DEFAULT_PENDING_CAPACITY};

// ==================== Errors ====================

/// Errors that can occur in proxy operations.
///
/// Fetch handling never produces one of these; only lifecycle misuse and
/// install-time plumbing do.
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Precache failed: {0}")]
    Precache(String),
}

// ==================== Types ====================

/// Proxy lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created, not installed.
    Idle,
    /// Install phase running.
    Installing,
    /// Installed, eligible for activation.
    Installed,
    /// Activation phase running.
    Activating,
    /// Controlling; fetch interception is live.
    Active,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Page → proxy message protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageMessage {
    /// Queue a payload for later replay.
    #[serde(rename = "STORE_OFFLINE_DATA")]
    StoreOfflineData { payload: JsonValue },

    /// Activate immediately instead of waiting.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

/// Events the host routes into the proxy.
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(PageMessage),
    Sync(String),
    Push(String),
}

/// Result of handling one fetch event.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The proxy produced the response.
    Response(Response),
    /// Not intercepted; the host's normal request path applies.
    Passthrough,
}

/// Result of dispatching one worker event.
#[derive(Debug)]
pub enum EventOutcome {
    Lifecycle(LifecycleState),
    Fetch(FetchOutcome),
    Message,
    Sync { recognized: bool },
    Push(Notification),
}

/// Events emitted to the host.
#[derive(Debug, Clone)]
pub enum ProxyEvent {
    /// Lifecycle state changed.
    StateChange { state: LifecycleState },
    /// Generation eviction removed these stores.
    StoresPurged { deleted: Vec<String> },
    /// The proxy took control of open pages.
    ClientsClaimed,
    /// A payload joined the pending queue.
    PayloadQueued { pending: usize },
    /// The replay placeholder for a recognized sync tag finished.
    SyncCompleted { tag: String },
    /// A notification the host should display.
    Notification(Notification),
}

// ==================== Config ====================

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// The origin this proxy serves.
    pub origin: Url,

    /// Store name prefix.
    pub store_prefix: String,

    /// Version tag; names the current store generation.
    pub version: String,

    /// Root-relative paths precached at install.
    pub precache_manifest: Vec<String>,

    /// Pattern of the pinned third-party script on its public CDN.
    pub vendor_pattern: UrlPattern,

    /// Root-relative path of the precached local copy of that script.
    pub vendor_local_path: String,

    /// Root-relative path of the local vendor proxy endpoint.
    pub vendor_proxy_path: String,

    /// Path marker of the primary stylesheet.
    pub stylesheet_marker: String,

    /// Path marker of the primary script bundle.
    pub script_marker: String,

    /// Background sync tag recognized by the replay trigger.
    pub sync_tag: String,

    /// Fixed notification title.
    pub notification_title: String,

    /// Pending-payload queue capacity.
    pub pending_capacity: usize,

    /// Retry budget for individual precache entries.
    pub precache_retry: RetryConfig,
}

impl ProxyConfig {
    /// Configuration for the given origin, with the stock manifest.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            store_prefix: "offline-cache".to_string(),
            version: "v1".to_string(),
            precache_manifest: vec![
                "/".to_string(),
                "/assets/styles.css".to_string(),
                "/assets/app.js".to_string(),
                "/manifest.json".to_string(),
                "/vendor/pdf.min.js".to_string(),
            ],
            vendor_pattern: UrlPattern::contains("cdnjs.cloudflare.com/ajax/libs/pdf.js"),
            vendor_local_path: "/vendor/pdf.min.js".to_string(),
            vendor_proxy_path: "/api/vendor/pdf.min.js".to_string(),
            stylesheet_marker: "styles.css".to_string(),
            script_marker: "app.js".to_string(),
            sync_tag: "sync-offline-data".to_string(),
            notification_title: "Update available".to_string(),
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            precache_retry: RetryConfig::best_effort(),
        }
    }

    /// Version-tagged name of the current store.
    pub fn store_name(&self) -> String {
        format!("{}-{}", self.store_prefix, self.version)
    }
}

// ==================== Offline Proxy ====================

/// How long the placeholder replay task holds before resolving.
const REPLAY_HOLD: Duration = Duration::from_millis(100);

/// The offline cache proxy.
///
/// One logical instance per controlled origin. Handlers are cooperative:
/// each runs to completion or suspends on awaited I/O, and concurrent fetch
/// events are handled independently (store writes race last-writer-wins).
pub struct OfflineProxy {
    config: ProxyConfig,
    fetcher: Arc<dyn Fetcher>,
    stores: Arc<RwLock<StoreRegistry>>,
    state: Arc<RwLock<LifecycleState>>,
    pending: Arc<RwLock<PendingQueue>>,
    event_tx: mpsc::UnboundedSender<ProxyEvent>,
}

impl OfflineProxy {
    /// Create a proxy with a fresh store registry.
    pub fn new(
        config: ProxyConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<ProxyEvent>) {
        Self::with_registry(config, fetcher, Arc::new(RwLock::new(StoreRegistry::new())))
    }

    /// Create a proxy attached to an existing registry.
    ///
    /// The registry outlives proxy generations; a successor version attaches
    /// here and sweeps its predecessors' stores at activation.
    pub fn with_registry(
        config: ProxyConfig,
        fetcher: Arc<dyn Fetcher>,
        stores: Arc<RwLock<StoreRegistry>>,
    ) -> (Self, mpsc::UnboundedReceiver<ProxyEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pending_capacity = config.pending_capacity;

        (
            Self {
                config,
                fetcher,
                stores,
                state: Arc::new(RwLock::new(LifecycleState::Idle)),
                pending: Arc::new(RwLock::new(PendingQueue::new(pending_capacity))),
                event_tx,
            },
            event_rx,
        )
    }

    /// Proxy configuration.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Shared store registry.
    pub fn registry(&self) -> Arc<RwLock<StoreRegistry>> {
        Arc::clone(&self.stores)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    async fn set_state(&self, state: LifecycleState) {
        *self.state.write().await = state;
        let _ = self.event_tx.send(ProxyEvent::StateChange { state });
    }

    /// Number of queued offline payloads.
    pub async fn pending_len(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Hand all queued payloads, oldest first, to the replay collaborator.
    pub async fn drain_pending(&self) -> Vec<JsonValue> {
        self.pending.write().await.drain()
    }

    // -------------------- Lifecycle --------------------

    /// Install phase: open the current store and precache the manifest.
    ///
    /// Each manifest entry is fetched independently; an entry that still
    /// fails after its retry budget is skipped. Idempotent for a given
    /// version tag.
    pub async fn install(&self) -> Result<(), ProxyError> {
        self.set_state(LifecycleState::Installing).await;

        let store_name = self.config.store_name();
        self.stores.write().await.open(&store_name);
        info!(store = %store_name, "Installing");

        let mut cached = 0usize;
        for path in &self.config.precache_manifest {
            match self.precache_entry(&store_name, path).await {
                Ok(()) => cached += 1,
                Err(e) => warn!(path = %path, error = %e, "Precache entry skipped"),
            }
        }

        info!(
            cached,
            total = self.config.precache_manifest.len(),
            "Install complete"
        );
        self.set_state(LifecycleState::Installed).await;
        Ok(())
    }

    async fn precache_entry(&self, store_name: &str, path: &str) -> Result<(), ProxyError> {
        let url = self
            .config
            .origin
            .join(path)
            .map_err(|e| ProxyError::InvalidUrl(format!("{path}: {e}")))?;

        let fetcher = Arc::clone(&self.fetcher);
        let response = retry_with_backoff(&self.config.precache_retry, || {
            let fetcher = Arc::clone(&fetcher);
            let request = Request::get(url.clone());
            async move { fetcher.fetch(request).await }
        })
        .await
        .map_err(|e| ProxyError::Precache(e.to_string()))?;

        if !response.ok() {
            return Err(ProxyError::Precache(format!(
                "{} for {}",
                response.status, url
            )));
        }

        let entry = respond::to_stored(&url, &response);
        self.stores
            .write()
            .await
            .open(store_name)
            .put(entry)
            .map_err(|e| ProxyError::Precache(e.to_string()))?;

        trace!(url = %url, "Precached");
        Ok(())
    }

    /// Activation phase: sweep stale store generations and take control.
    pub async fn activate(&self) -> Result<(), ProxyError> {
        let state = self.state().await;
        if state != LifecycleState::Installed {
            return Err(ProxyError::Lifecycle(format!(
                "activation requires an installed proxy, state is {state:?}"
            )));
        }

        self.set_state(LifecycleState::Activating).await;

        let current = self.config.store_name();
        let deleted = self.stores.write().await.purge_except(&current);
        if !deleted.is_empty() {
            info!(?deleted, "Purged stale stores");
        }
        let _ = self.event_tx.send(ProxyEvent::StoresPurged { deleted });

        self.set_state(LifecycleState::Active).await;
        let _ = self.event_tx.send(ProxyEvent::ClientsClaimed);
        info!("Active, controlling open pages immediately");
        Ok(())
    }

    // -------------------- Fetch --------------------

    /// Handle one intercepted fetch.
    ///
    /// Infallible by contract: the outcome is either a response or an
    /// explicit passthrough. Until activation completes every request passes
    /// through.
    pub async fn handle_fetch(&self, request: Request) -> FetchOutcome {
        if self.state().await != LifecycleState::Active {
            trace!(url = %request.url, "Not active, passing through");
            return FetchOutcome::Passthrough;
        }

        match classify(&self.config, &request.method, &request.url) {
            RequestClass::Passthrough => {
                trace!(url = %request.url, method = %request.method, "Passing through");
                FetchOutcome::Passthrough
            }
            RequestClass::VendorAsset => FetchOutcome::Response(self.fetch_vendor(request).await),
            RequestClass::SameOrigin(kind) => {
                FetchOutcome::Response(self.fetch_same_origin(request, kind).await)
            }
        }
    }

    /// Vendor chain: local proxy endpoint, precached copy, original request.
    async fn fetch_vendor(&self, request: Request) -> Response {
        if let Ok(proxy_url) = self.config.origin.join(&self.config.vendor_proxy_path) {
            match self.fetcher.fetch(Request::get(proxy_url.clone())).await {
                Ok(response) if response.ok() => {
                    debug!(url = %request.url, via = %proxy_url, "Vendor asset served by local proxy");
                    return response;
                }
                Ok(response) => {
                    debug!(via = %proxy_url, status = %response.status, "Vendor proxy refused")
                }
                Err(e) => debug!(via = %proxy_url, error = %e, "Vendor proxy unreachable"),
            }
        }

        if let Ok(local_url) = self.config.origin.join(&self.config.vendor_local_path) {
            if let Some(response) = self.lookup_cached(local_url.as_str(), &request.url).await {
                debug!(url = %request.url, "Vendor asset served from precached copy");
                return response;
            }
        }

        // Last resort is the original request itself; only its outright
        // rejection degrades to the placeholder.
        let url = request.url.clone();
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Vendor asset unreachable everywhere");
                respond::offline_placeholder(url)
            }
        }
    }

    /// Same-origin: network first with caching disabled, then cache, then
    /// synthesis.
    async fn fetch_same_origin(&self, request: Request, kind: AssetKind) -> Response {
        let url = request.url.clone();

        let mut net_request = request;
        net_request
            .headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        net_request
            .headers
            .insert(PRAGMA, HeaderValue::from_static("no-cache"));

        match self.fetcher.fetch(net_request).await {
            Ok(response) if response.ok() => {
                if response.kind == ResponseKind::Basic {
                    self.store_in_background(&url, &response);
                } else {
                    trace!(url = %url, kind = ?response.kind, "Response not basic, not cached");
                }
                response
            }
            Ok(response) => {
                debug!(url = %url, status = %response.status, "Network degraded, falling back");
                self.fallback(&url, kind).await
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Network failed, falling back");
                self.fallback(&url, kind).await
            }
        }
    }

    /// Clone and persist a successful response off the response path.
    /// Store failures never reach the caller.
    fn store_in_background(&self, url: &Url, response: &Response) {
        let entry = respond::to_stored(url, response);
        let stores = Arc::clone(&self.stores);
        let store_name = self.config.store_name();

        tokio::spawn(async move {
            if let Err(e) = stores.write().await.open(&store_name).put(entry) {
                warn!(store = %store_name, error = %e, "Cache refresh skipped");
            }
        });
    }

    async fn lookup_cached(&self, probe: &str, serve_as: &Url) -> Option<Response> {
        let stores = self.stores.read().await;
        let store = stores.store(&self.config.store_name())?;
        let entry = store.match_ignore_query(probe)?;
        Some(respond::from_stored(serve_as, entry))
    }

    async fn fallback(&self, url: &Url, kind: AssetKind) -> Response {
        if let Some(response) = self.lookup_cached(url.as_str(), url).await {
            debug!(url = %url, "Served from cache");
            return response;
        }

        match kind {
            AssetKind::Stylesheet => respond::empty_stylesheet(url.clone()),
            AssetKind::Script => respond::empty_script(url.clone()),
            AssetKind::Other => respond::offline_placeholder(url.clone()),
        }
    }

    // -------------------- Messages / Sync / Push --------------------

    /// Handle one page message.
    pub async fn handle_message(&self, message: PageMessage) -> Result<(), ProxyError> {
        match message {
            PageMessage::StoreOfflineData { payload } => {
                let pending = {
                    let mut queue = self.pending.write().await;
                    queue.push(payload);
                    queue.len()
                };
                debug!(pending, "Offline payload queued");
                let _ = self.event_tx.send(ProxyEvent::PayloadQueued { pending });
                Ok(())
            }
            PageMessage::SkipWaiting => {
                if self.state().await == LifecycleState::Installed {
                    info!("Skip waiting requested, activating now");
                    self.activate().await
                } else {
                    debug!("Skip waiting ignored, nothing is waiting");
                    Ok(())
                }
            }
        }
    }

    /// Background replay trigger.
    ///
    /// The recognized tag runs the placeholder replay task: hold briefly,
    /// then resolve. The pending queue is drained by the external replay
    /// collaborator, not here. Returns whether the tag was recognized.
    pub async fn handle_sync(&self, tag: &str) -> bool {
        if tag != self.config.sync_tag {
            debug!(tag, "Unknown sync tag ignored");
            return false;
        }

        tokio::time::sleep(REPLAY_HOLD).await;
        let _ = self.event_tx.send(ProxyEvent::SyncCompleted {
            tag: tag.to_string(),
        });
        info!(tag, "Sync placeholder completed");
        true
    }

    /// Build and emit the fixed-template notification for a push payload.
    /// Only the body text is consumed from the payload.
    pub async fn handle_push(&self, body: &str) -> Notification {
        let notification = push::build_notification(&self.config.notification_title, body);
        let _ = self
            .event_tx
            .send(ProxyEvent::Notification(notification.clone()));
        notification
    }

    // -------------------- Dispatch --------------------

    /// Route one worker event to its handler.
    ///
    /// | Event      | Handler          | Contract                                    |
    /// |------------|------------------|---------------------------------------------|
    /// | `Install`  | [`install`]      | may suspend on I/O; precache is best-effort |
    /// | `Activate` | [`activate`]     | purges stale generations, then controls     |
    /// | `Fetch`    | [`handle_fetch`] | always resolves to an outcome, never errors |
    /// | `Message`  | [`handle_message`] | may activate on `SKIP_WAITING`            |
    /// | `Sync`     | [`handle_sync`]  | recognized tag runs the replay placeholder  |
    /// | `Push`     | [`handle_push`]  | emits a fixed-template notification        |
    ///
    /// [`install`]: OfflineProxy::install
    /// [`activate`]: OfflineProxy::activate
    /// [`handle_fetch`]: OfflineProxy::handle_fetch
    /// [`handle_message`]: OfflineProxy::handle_message
    /// [`handle_sync`]: OfflineProxy::handle_sync
    /// [`handle_push`]: OfflineProxy::handle_push
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, ProxyError> {
        match event {
            WorkerEvent::Install => {
                self.install().await?;
                Ok(EventOutcome::Lifecycle(self.state().await))
            }
            WorkerEvent::Activate => {
                self.activate().await?;
                Ok(EventOutcome::Lifecycle(self.state().await))
            }
            WorkerEvent::Fetch(request) => {
                Ok(EventOutcome::Fetch(self.handle_fetch(request).await))
            }
            WorkerEvent::Message(message) => {
                self.handle_message(message).await?;
                Ok(EventOutcome::Message)
            }
            WorkerEvent::Sync(tag) => Ok(EventOutcome::Sync {
                recognized: self.handle_sync(&tag).await,
            }),
            WorkerEvent::Push(body) => Ok(EventOutcome::Push(self.handle_push(&body).await)),
        }
    }
}
