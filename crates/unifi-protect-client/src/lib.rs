//! Live-synchronizing client for UniFi Protect controllers.
//!
//! The controller exposes a cookie-authenticated HTTPS API plus a
//! binary-framed WebSocket stream. [`ProtectClient`] logs in, fetches the
//! bootstrap graph, and keeps it synchronized by applying every stream
//! packet in order. Local mutations go through typed pending handles that
//! PATCH minimal diffs and suppress their own echo.
//!
//! ```rust,ignore
//! use unifi_protect_client::{ProtectClient, ProtectConfig};
//!
//! let client = ProtectClient::new(ProtectConfig::from_env()?)?;
//! client.login().await?;
//! client.update().await?;
//! client.connect()?;
//!
//! let subscription = client.subscribe(|notification| {
//!     println!("{notification:?}");
//! });
//!
//! let mut camera = client.edit_camera("61ddb66b018e2703e7008c19").await?;
//! camera.set_recording_mode(unifi_protect_data::types::RecordingMode::Always);
//! camera.save().await?;
//!
//! subscription.unsubscribe();
//! client.close().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use unifi_protect_data::bootstrap::ProtectObject;
use unifi_protect_data::convert::{to_js_time, update_in_place, ConvertCache};
use unifi_protect_data::devices::{Camera, Chime, Doorlock, Light, Sensor, Viewer};
use unifi_protect_data::engine::SyncEngine;
use unifi_protect_data::events::Event;
use unifi_protect_data::nvr::Nvr;
use unifi_protect_data::types::ModelType;
use unifi_protect_data::websocket::WsPacket;
use unifi_protect_data::Bootstrap;

pub mod config;
pub mod mutate;
pub mod session;
pub mod subscription;

mod error;

pub use config::ProtectConfig;
pub use error::{Error, Result};
pub use mutate::PendingDevice;
pub use session::ConnectionState;
pub use subscription::{ProtectNotification, Subscription};

const PRIVATE_API_PATH: &str = "/proxy/protect/api";
const PUBLIC_API_PATH: &str = "/proxy/protect/integration/v1";
const PRIVATE_WS_PATH: &str = "/proxy/protect/ws/updates";
const LOGIN_PATH: &str = "/api/auth/login";

const MAX_GET_ATTEMPTS: u32 = 5;

#[derive(Default)]
struct AuthState {
    csrf_token: Option<String>,
    authenticated: bool,
}

struct GraphState {
    bootstrap: Bootstrap,
    engine: SyncEngine,
}

struct SessionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ClientInner {
    config: ProtectConfig,
    http: reqwest::Client,
    jar: Arc<Jar>,
    base_url: Url,
    ws_url: Url,
    auth: ArcSwap<AuthState>,
    // serializes re-authentication so concurrent 401s trigger one login
    auth_mutex: Mutex<()>,
    // the graph is single-writer: only the reader task (and the commit of
    // a local save) takes the write half
    graph: RwLock<Option<GraphState>>,
    subscribers: subscription::Subscribers,
    state_tx: broadcast::Sender<ConnectionState>,
    state: std::sync::Mutex<ConnectionState>,
    session: std::sync::Mutex<Option<SessionHandle>>,
    force_refresh: AtomicBool,
}

/// Handle to one controller session. Cheaply cloneable; all clones share
/// the same cookie jar, graph, and subscriptions.
#[derive(Clone)]
pub struct ProtectClient {
    inner: Arc<ClientInner>,
}

impl ProtectClient {
    pub fn new(config: ProtectConfig) -> Result<Self> {
        config.validate().map_err(|err| {
            warn!(error = %err, "rejecting client configuration");
            err
        })?;

        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .timeout(config.request_timeout())
            .cookie_provider(jar.clone())
            .build()?;

        let base_url = Url::parse(&format!("https://{}:{}", config.address, config.port))?;
        let ws_url = Url::parse(&format!(
            "wss://{}:{}{}",
            config.address, config.port, PRIVATE_WS_PATH
        ))?;

        let (state_tx, _) = broadcast::channel(config.state_channel_capacity.max(1));

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                http,
                jar,
                base_url,
                ws_url,
                auth: ArcSwap::new(Arc::new(AuthState::default())),
                auth_mutex: Mutex::new(()),
                graph: RwLock::new(None),
                subscribers: subscription::Subscribers::default(),
                state_tx,
                state: std::sync::Mutex::new(ConnectionState::Idle),
                session: std::sync::Mutex::new(None),
                force_refresh: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &ProtectConfig {
        &self.inner.config
    }

    // ── Auth ─────────────────────────────────────────────────────────

    /// Logs in with username/password. The session cookie lands in the
    /// cookie jar; the CSRF token is taken from the response header, with
    /// the legacy CSRF cookie as fallback for older controllers.
    pub async fn login(&self) -> Result<()> {
        let _guard = self.inner.auth_mutex.lock().await;
        // a re-auth triggered by a 401 mid-operation stays silent; state
        // transitions are only visible from the login/reconnect path
        let announce = matches!(
            self.state(),
            ConnectionState::Idle
                | ConnectionState::Authenticating
                | ConnectionState::Reconnecting { .. }
                | ConnectionState::Failed
        );
        if announce {
            self.publish_state(ConnectionState::Authenticating);
        }

        let url = self.inner.base_url.join(LOGIN_PATH)?;
        let body = serde_json::json!({
            "username": self.inner.config.username,
            "password": self.inner.config.password,
            "rememberMe": true,
        });

        let response = self.inner.http.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if announce {
                self.publish_state(ConnectionState::Failed);
            }
            return Err(Error::Auth(format!("login rejected ({status}): {message}")));
        }

        let csrf_token = response
            .headers()
            .get("x-csrf-token")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
            .or_else(|| {
                response
                    .cookies()
                    .find(|cookie| cookie.name().eq_ignore_ascii_case("csrf-token"))
                    .map(|cookie| cookie.value().to_string())
            });

        self.inner.auth.store(Arc::new(AuthState {
            csrf_token,
            authenticated: true,
        }));
        info!("authenticated with controller");
        Ok(())
    }

    async fn ensure_authenticated(&self) -> Result<()> {
        if self.inner.auth.load().authenticated {
            return Ok(());
        }
        self.login().await
    }

    /// Picks up a rotated CSRF token from any response that carries one.
    fn capture_csrf(&self, response: &Response) {
        let Some(token) = response
            .headers()
            .get("x-csrf-token")
            .and_then(|value| value.to_str().ok())
        else {
            return;
        };
        let current = self.inner.auth.load();
        if current.csrf_token.as_deref() != Some(token) {
            self.inner.auth.store(Arc::new(AuthState {
                csrf_token: Some(token.to_string()),
                authenticated: current.authenticated,
            }));
        }
    }

    fn add_headers(&self, mut builder: RequestBuilder, public: bool) -> RequestBuilder {
        if public {
            if let Some(api_key) = &self.inner.config.api_key {
                builder = builder.header("X-API-KEY", api_key);
            }
            return builder;
        }
        if let Some(csrf) = &self.inner.auth.load().csrf_token {
            builder = builder.header("X-CSRF-Token", csrf);
        }
        builder
    }

    // ── Request plumbing ─────────────────────────────────────────────

    fn api_url(&self, path: &str) -> Result<Url> {
        Ok(self
            .inner
            .base_url
            .join(&format!("{PRIVATE_API_PATH}/{path}"))?)
    }

    fn public_api_url(&self, path: &str) -> Result<Url> {
        Ok(self
            .inner
            .base_url
            .join(&format!("{PUBLIC_API_PATH}/{path}"))?)
    }

    /// GET with retries: 5xx and transport failures back off (0.5 s base,
    /// 30 s cap, five attempts); a 401 triggers one re-login.
    async fn send_get(&self, url: Url, public: bool) -> Result<Response> {
        if !public {
            self.ensure_authenticated().await?;
        }

        let mut reauthed = false;
        let mut attempt: u32 = 0;
        loop {
            let builder = self.add_headers(self.inner.http.get(url.clone()), public);
            match builder.send().await {
                Ok(response) => {
                    self.capture_csrf(&response);
                    let status = response.status();

                    if status == StatusCode::UNAUTHORIZED && !reauthed && !public {
                        reauthed = true;
                        self.login().await?;
                        continue;
                    }
                    if status.is_server_error() && attempt + 1 < MAX_GET_ATTEMPTS {
                        let delay = session::request_backoff(attempt);
                        debug!(status = %status, delay_ms = delay.as_millis() as u64, "retrying GET");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    if !status.is_success() {
                        let message = response.text().await.unwrap_or_default();
                        return Err(Error::from_status(status.as_u16(), message));
                    }
                    return Ok(response);
                }
                Err(err)
                    if (err.is_timeout() || err.is_connect()) && attempt + 1 < MAX_GET_ATTEMPTS =>
                {
                    let delay = session::request_backoff(attempt);
                    debug!(error = %err, delay_ms = delay.as_millis() as u64, "retrying GET after transport error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Mutating request. Never retried on server errors; a 401 means the
    /// request was not processed, so it is resent once after re-login.
    async fn send_mutation(&self, method: Method, url: Url, body: Option<Value>) -> Result<Response> {
        self.ensure_authenticated().await?;

        let mut reauthed = false;
        loop {
            let mut builder = self.inner.http.request(method.clone(), url.clone());
            if let Some(body) = &body {
                builder = builder.json(body);
            }
            let response = self.add_headers(builder, false).send().await?;
            self.capture_csrf(&response);

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !reauthed {
                reauthed = true;
                self.login().await?;
                continue;
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(Error::from_status(status.as_u16(), message));
            }
            return Ok(response);
        }
    }

    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>> {
        let response = self.send_get(url, false).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ── Bootstrap lifecycle ──────────────────────────────────────────

    /// Fetches a fresh bootstrap document without touching the graph.
    pub async fn get_bootstrap(&self) -> Result<Bootstrap> {
        let raw = self.get_bytes(self.api_url("bootstrap")?).await?;
        Ok(Bootstrap::from_json(&raw)?)
    }

    /// Initializes (or wholesale replaces) the in-memory graph.
    ///
    /// Replacing an existing graph emits a single `Reset` notification
    /// before any notification for the new graph.
    pub async fn update(&self) -> Result<Bootstrap> {
        self.ensure_authenticated().await?;
        self.publish_state(ConnectionState::Bootstrapping);
        let bootstrap = self.get_bootstrap().await.inspect_err(|_| {
            self.publish_state(ConnectionState::Failed);
        })?;
        self.install_bootstrap(bootstrap.clone()).await;
        Ok(bootstrap)
    }

    async fn install_bootstrap(&self, bootstrap: Bootstrap) {
        let mut guard = self.inner.graph.write().await;
        let replaced = guard.is_some();
        let engine = match guard.take() {
            Some(mut state) => {
                // pending echo-suppression entries describe writes still in
                // flight and survive the swap
                state.engine.reset_stream_state();
                state.engine
            }
            None => SyncEngine::new(self.inner.config.engine_config()),
        };
        *guard = Some(GraphState { bootstrap, engine });
        if replaced {
            // emitted before the lock drops so no packet for the new graph
            // can get in front of the reset
            self.inner.subscribers.emit(&ProtectNotification::Reset);
        }
        drop(guard);
        debug!(replaced, "bootstrap installed");
    }

    /// Clone of the current graph snapshot.
    pub async fn bootstrap(&self) -> Result<Bootstrap> {
        let guard = self.inner.graph.read().await;
        guard
            .as_ref()
            .map(|state| state.bootstrap.clone())
            .ok_or(Error::State("bootstrap not loaded, call update() first"))
    }

    /// Snapshot of one device by model and id.
    pub async fn device(&self, model: &ModelType, id: &str) -> Option<ProtectObject> {
        let guard = self.inner.graph.read().await;
        guard.as_ref().and_then(|state| state.bootstrap.device_by_id(model, id))
    }

    /// Snapshot of one device by MAC address (any separator style).
    pub async fn device_by_mac(&self, mac: &str) -> Option<ProtectObject> {
        let guard = self.inner.graph.read().await;
        guard.as_ref().and_then(|state| state.bootstrap.device_by_mac(mac))
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Spawns the reader task. `update()` must have succeeded first so the
    /// stream can resume from the bootstrap's lastUpdateId.
    pub fn connect(&self) -> Result<()> {
        let mut session = self.inner.session.lock().expect("session mutex poisoned");
        if session.is_some() {
            return Err(Error::State("session already connected"));
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(session::run_session(self.clone(), cancel.clone()));
        *session = Some(SessionHandle { cancel, task });
        Ok(())
    }

    /// Cancels the reader, waits for it to drain, and closes the session.
    /// Pending saves observe the cancellation and fail with `Cancelled`.
    pub async fn close(&self) {
        let handle = self
            .inner
            .session
            .lock()
            .expect("session mutex poisoned")
            .take();
        let Some(handle) = handle else {
            return;
        };

        self.publish_state(ConnectionState::Closing);
        handle.cancel.cancel();
        if let Err(err) = handle.task.await {
            warn!(error = %err, "session task panicked during close");
        }
        self.publish_state(ConnectionState::Closed);
    }

    pub(crate) fn is_closing(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Closing | ConnectionState::Closed
        )
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribes to applied packets. The callback runs on the reader task
    /// in apply order and must not block.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ProtectNotification) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Subscribes to connection state transitions. A receiver more than
    /// `state_channel_capacity` messages behind observes `Lagged` and is
    /// effectively dropped.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().expect("state mutex poisoned").clone()
    }

    pub(crate) fn publish_state(&self, next: ConnectionState) {
        {
            let mut current = self.inner.state.lock().expect("state mutex poisoned");
            if *current == next {
                return;
            }
            debug!(from = ?current, to = ?next, "connection state change");
            *current = next.clone();
        }
        // send fails only when nobody subscribes to state changes
        let _ = self.inner.state_tx.send(next);
    }

    // ── Reader-task plumbing (called from session.rs) ────────────────

    pub(crate) fn verify_ssl(&self) -> bool {
        self.inner.config.verify_ssl
    }

    pub(crate) fn cookie_header(&self) -> Option<String> {
        self.inner
            .jar
            .cookies(&self.inner.base_url)
            .and_then(|value| value.to_str().map(ToString::to_string).ok())
    }

    /// Update-socket URL carrying the current stream position.
    pub(crate) async fn ws_resume_url(&self) -> Url {
        let mut url = self.inner.ws_url.clone();
        let guard = self.inner.graph.read().await;
        if let Some(state) = guard.as_ref() {
            if !state.bootstrap.last_update_id.is_empty() {
                url.query_pairs_mut()
                    .append_pair("lastUpdateId", &state.bootstrap.last_update_id);
            }
        }
        url
    }

    /// Decodes and applies one binary frame, then fans out notifications.
    pub(crate) async fn process_frame(&self, data: &[u8], ring_tx: &mpsc::Sender<String>) {
        let packet = match WsPacket::decode(data) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(error = %err, len = data.len(), "undecodable frame, dropping");
                return;
            }
        };

        let messages = {
            let mut guard = self.inner.graph.write().await;
            let Some(state) = guard.as_mut() else {
                return;
            };
            state.engine.apply(&mut state.bootstrap, &packet)
        };
        if messages.is_empty() {
            return;
        }

        let raw = Arc::new(data.to_vec());
        for message in messages {
            self.schedule_ring_reset(&message, ring_tx);
            self.inner.subscribers.emit(&ProtectNotification::Message {
                message: Arc::new(message),
                raw: Some(raw.clone()),
            });
        }
    }

    /// The controller does not always send a ring end packet; arm a reset
    /// timer whenever a ring starts.
    fn schedule_ring_reset(&self, message: &unifi_protect_data::SyncMessage, ring_tx: &mpsc::Sender<String>) {
        if message.model != ModelType::Camera || !message.changed_fields.contains("is_ringing") {
            return;
        }
        let ringing = message
            .new_object
            .as_ref()
            .and_then(ProtectObject::as_camera)
            .is_some_and(|camera| camera.is_ringing);
        if !ringing {
            return;
        }

        let camera_id = message.id.clone();
        let delay = self.inner.config.ring_reset();
        let ring_tx = ring_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = ring_tx.send(camera_id).await;
        });
    }

    /// Clears a ring flag whose end packet never came and notifies
    /// subscribers with a synthetic message.
    pub(crate) async fn handle_ring_expiry(&self, camera_id: &str) {
        let message = {
            let mut guard = self.inner.graph.write().await;
            let Some(state) = guard.as_mut() else {
                return;
            };
            state.engine.expire_ring(&mut state.bootstrap, camera_id)
        };
        if let Some(message) = message {
            debug!(camera = camera_id, "ring reset timer fired");
            self.inner.subscribers.emit(&ProtectNotification::Message {
                message: Arc::new(message),
                raw: None,
            });
        }
    }

    pub(crate) fn force_refresh_soon(&self) {
        self.inner.force_refresh.store(true, Ordering::Relaxed);
    }

    /// Re-bootstraps when the engine flagged unrecoverable divergence.
    /// Returns whether a refresh happened (the caller reconnects so the
    /// resume position matches the new graph).
    pub(crate) async fn refresh_if_diverged(&self) -> bool {
        let diverged = {
            let mut guard = self.inner.graph.write().await;
            match guard.as_mut() {
                Some(state) => state.engine.take_needs_refresh(),
                None => false,
            }
        } || self.inner.force_refresh.swap(false, Ordering::Relaxed);

        if !diverged {
            return false;
        }

        info!("stream diverged, fetching fresh bootstrap");
        match self.get_bootstrap().await {
            Ok(bootstrap) => {
                self.install_bootstrap(bootstrap).await;
                true
            }
            Err(err) => {
                warn!(error = %err, "re-bootstrap failed, will retry after reconnect");
                self.force_refresh_soon();
                true
            }
        }
    }

    /// Commits a successful PATCH to the local graph.
    pub(crate) async fn apply_local_patch(&self, model: &ModelType, id: &str, patch: &Value) {
        let mut guard = self.inner.graph.write().await;
        let Some(state) = guard.as_mut() else {
            return;
        };
        let mut cache = ConvertCache::new();

        fn merge<T: serde::Serialize + serde::de::DeserializeOwned>(
            device: Option<&mut T>,
            patch: &Value,
            cache: &mut ConvertCache,
        ) {
            if let Some(device) = device {
                if let Err(err) = update_in_place(device, patch, cache) {
                    warn!(error = %err, "could not commit local patch");
                }
            }
        }

        let bootstrap = &mut state.bootstrap;
        match model {
            ModelType::Camera => merge(bootstrap.cameras.get_mut(id), patch, &mut cache),
            ModelType::Light => merge(bootstrap.lights.get_mut(id), patch, &mut cache),
            ModelType::Sensor => merge(bootstrap.sensors.get_mut(id), patch, &mut cache),
            ModelType::Viewer => merge(bootstrap.viewers.get_mut(id), patch, &mut cache),
            ModelType::Chime => merge(bootstrap.chimes.get_mut(id), patch, &mut cache),
            ModelType::Doorlock => merge(bootstrap.doorlocks.get_mut(id), patch, &mut cache),
            ModelType::Nvr => merge(Some(&mut bootstrap.nvr), patch, &mut cache),
            _ => {}
        }
    }

    /// Registers pending-echo entries for every leaf of a PATCH body.
    pub(crate) async fn register_pending_write(&self, id: &str, patch: &Value) {
        let mut guard = self.inner.graph.write().await;
        let Some(state) = guard.as_mut() else {
            return;
        };
        let mut cache = ConvertCache::new();
        for path in unifi_protect_data::convert::leaf_paths(patch, &mut cache) {
            state.engine.ignore.register(id, &path);
        }
    }

    // ── Device + media endpoints ─────────────────────────────────────

    fn device_path(model: &ModelType, id: &str) -> Result<String> {
        if *model == ModelType::Nvr {
            return Ok("nvr".to_string());
        }
        model
            .devices_path()
            .map(|segment| format!("{segment}/{id}"))
            .ok_or(Error::State("model has no REST collection"))
    }

    /// Raw device record straight from the controller.
    pub async fn get_device_raw(&self, model: &ModelType, id: &str) -> Result<Value> {
        let url = self.api_url(&Self::device_path(model, id)?)?;
        let raw = self.get_bytes(url).await?;
        Ok(serde_json::from_slice(&raw).map_err(unifi_protect_data::Error::from)?)
    }

    pub async fn get_nvr(&self) -> Result<Nvr> {
        let raw = self.get_bytes(self.api_url("nvr")?).await?;
        Ok(serde_json::from_slice(&raw).map_err(unifi_protect_data::Error::from)?)
    }

    /// PATCHes a sparse body to a device. Used by the save path; callers
    /// normally go through [`PendingDevice`].
    pub async fn update_device(&self, model: &ModelType, id: &str, body: Value) -> Result<()> {
        let url = self.api_url(&Self::device_path(model, id)?)?;
        self.send_mutation(Method::PATCH, url, Some(body)).await?;
        Ok(())
    }

    pub async fn reboot_device(&self, model: &ModelType, id: &str) -> Result<()> {
        let url = self.api_url(&format!("{}/reboot", Self::device_path(model, id)?))?;
        self.send_mutation(Method::POST, url, None).await?;
        Ok(())
    }

    /// Recent events from the REST API (the stream is the primary source;
    /// this backfills).
    pub async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Vec<Event>> {
        let mut url = self.api_url("events")?;
        url.query_pairs_mut()
            .append_pair("start", &to_js_time(start).to_string())
            .append_pair("end", &to_js_time(end).to_string());
        if let Some(limit) = limit {
            url.query_pairs_mut().append_pair("limit", &limit.to_string());
        }
        let raw = self.get_bytes(url).await?;
        Ok(serde_json::from_slice(&raw).map_err(unifi_protect_data::Error::from)?)
    }

    /// JPEG snapshot bytes for a camera.
    pub async fn get_snapshot(
        &self,
        camera_id: &str,
        high_quality: bool,
        ts: Option<DateTime<Utc>>,
    ) -> Result<Vec<u8>> {
        let mut url = self.api_url(&format!("cameras/{camera_id}/snapshot"))?;
        url.query_pairs_mut()
            .append_pair("highQuality", if high_quality { "true" } else { "false" });
        if let Some(ts) = ts {
            url.query_pairs_mut()
                .append_pair("ts", &to_js_time(ts).to_string());
        }
        self.get_bytes(url).await
    }

    /// Exported MP4 bytes for a camera/time range.
    pub async fn save_video(
        &self,
        camera_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let mut url = self.api_url("video/export")?;
        url.query_pairs_mut()
            .append_pair("camera", camera_id)
            .append_pair("start", &to_js_time(start).to_string())
            .append_pair("end", &to_js_time(end).to_string());
        self.get_bytes(url).await
    }

    /// URL of the talkback audio ingest for a camera. The caller owns the
    /// upload pipe; the core only hands out the endpoint.
    pub fn talkback_url(&self, camera_id: &str) -> Result<Url> {
        self.api_url(&format!("cameras/{camera_id}/talkback-stream"))
    }

    /// Public integration API GET (API-key authenticated).
    pub async fn public_api_get(&self, path: &str) -> Result<Value> {
        if self.inner.config.api_key.is_none() {
            return Err(Error::Auth("api-key required for public API".to_string()));
        }
        let url = self.public_api_url(path)?;
        let response = self.send_get(url, true).await?;
        Ok(response.json().await?)
    }

    // ── Pending-device editors ───────────────────────────────────────

    pub async fn edit_camera(&self, id: &str) -> Result<PendingDevice<Camera>> {
        let guard = self.inner.graph.read().await;
        let camera = guard
            .as_ref()
            .and_then(|state| state.bootstrap.cameras.get(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("camera {id}")))?;
        Ok(PendingDevice::new(self.clone(), ModelType::Camera, id, camera))
    }

    pub async fn edit_light(&self, id: &str) -> Result<PendingDevice<Light>> {
        let guard = self.inner.graph.read().await;
        let light = guard
            .as_ref()
            .and_then(|state| state.bootstrap.lights.get(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("light {id}")))?;
        Ok(PendingDevice::new(self.clone(), ModelType::Light, id, light))
    }

    pub async fn edit_sensor(&self, id: &str) -> Result<PendingDevice<Sensor>> {
        let guard = self.inner.graph.read().await;
        let sensor = guard
            .as_ref()
            .and_then(|state| state.bootstrap.sensors.get(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("sensor {id}")))?;
        Ok(PendingDevice::new(self.clone(), ModelType::Sensor, id, sensor))
    }

    pub async fn edit_viewer(&self, id: &str) -> Result<PendingDevice<Viewer>> {
        let guard = self.inner.graph.read().await;
        let viewer = guard
            .as_ref()
            .and_then(|state| state.bootstrap.viewers.get(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("viewer {id}")))?;
        Ok(PendingDevice::new(self.clone(), ModelType::Viewer, id, viewer))
    }

    pub async fn edit_chime(&self, id: &str) -> Result<PendingDevice<Chime>> {
        let guard = self.inner.graph.read().await;
        let chime = guard
            .as_ref()
            .and_then(|state| state.bootstrap.chimes.get(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("chime {id}")))?;
        Ok(PendingDevice::new(self.clone(), ModelType::Chime, id, chime))
    }

    pub async fn edit_doorlock(&self, id: &str) -> Result<PendingDevice<Doorlock>> {
        let guard = self.inner.graph.read().await;
        let doorlock = guard
            .as_ref()
            .and_then(|state| state.bootstrap.doorlocks.get(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("doorlock {id}")))?;
        Ok(PendingDevice::new(self.clone(), ModelType::Doorlock, id, doorlock))
    }
}
