// ── Sync session ──
//
// Full lifecycle of one panel session against a controller: the poll
// timer, the event stream, the command channel, and the dispatcher that
// funnels all of them through the single `Reconciler`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use railsync_api::command_channel::{ChannelEvent, ChannelRequest, ChannelState};
use railsync_api::event_stream::{StreamItem, StreamState};
use railsync_api::models::{CreateConnection, Role};
use railsync_api::{CommandChannelHandle, ControllerClient, EventStreamHandle};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::model::{FocusedThrottle, StatusMessage, ThrottleKey, ThrottlePatch, clamp_speed};
use crate::reconcile::{Effect, Reconciler};
use crate::store::MirrorStore;

const STREAM_CHANNEL_SIZE: usize = 256;
const COMMAND_CHANNEL_SIZE: usize = 256;

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SessionInner>`. [`start`](Self::start)
/// spawns the background tasks, [`shutdown`](Self::shutdown) cancels and
/// joins them. User operations validate their input, talk to the
/// controller, and report the outcome through the store's status message.
#[derive(Clone)]
pub struct SyncSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SyncConfig,
    client: ControllerClient,
    store: Arc<MirrorStore>,
    engine: Mutex<Reconciler>,
    cancel: CancellationToken,
    started: AtomicBool,
    command_channel: Mutex<Option<CommandChannelHandle>>,
    event_stream: Mutex<Option<EventStreamHandle>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncSession {
    /// Build the HTTP client and an empty store. Does NOT contact the
    /// controller; call [`start`](Self::start) for that.
    pub fn new(config: SyncConfig) -> Result<Self, CoreError> {
        let client = ControllerClient::new(config.base_url.clone(), &config.transport())?;
        let store = Arc::new(MirrorStore::new(
            config.transport_log_capacity,
            config.channel_log_capacity,
        ));
        let engine = Reconciler::new(Arc::clone(&store), config.version_refresh_delay);

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                client,
                store,
                engine: Mutex::new(engine),
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                command_channel: Mutex::new(None),
                event_stream: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<MirrorStore> {
        &self.inner.store
    }

    pub fn client(&self) -> &ControllerClient {
        &self.inner.client
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the poll loop, the one-off systems load, the event stream,
    /// the command channel, and the dispatcher.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(CoreError::Internal("session already started".into()));
        }
        let config = &self.inner.config;
        let cancel = &self.inner.cancel;
        if config.poll_interval.is_zero() {
            return Err(CoreError::Config {
                message: "poll interval must be greater than zero".into(),
            });
        }

        let (stream_tx, stream_rx) = mpsc::channel(STREAM_CHANNEL_SIZE);
        let (channel_tx, channel_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        if config.event_stream_enabled {
            let http = config.transport().build_streaming_client()?;
            let handle = EventStreamHandle::spawn(
                config.event_stream_url()?,
                http,
                config.reconnect_delay,
                stream_tx,
                cancel,
            );
            *self.inner.event_stream.lock().await = Some(handle);
        } else {
            drop(stream_tx);
        }

        if config.command_channel_enabled {
            let url = config.resolved_channel_url()?;
            info!(url = %url, "opening command channel");
            let handle =
                CommandChannelHandle::spawn(url, config.reconnect_delay, channel_tx, cancel);
            *self.inner.command_channel.lock().await = Some(handle);
        } else {
            drop(channel_tx);
        }

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(dispatch_task(
            self.clone(),
            stream_rx,
            channel_rx,
            cancel.clone(),
        )));
        handles.push(tokio::spawn(poll_task(
            self.clone(),
            config.poll_interval,
            cancel.clone(),
        )));

        let session = self.clone();
        handles.push(tokio::spawn(async move {
            // Failure already lands in the status message.
            let _ = session.load_systems().await;
        }));

        info!(url = %config.base_url, "sync session started");
        Ok(())
    }

    /// Cancel every task and timer, close both push channels, and wait
    /// for everything to exit. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.command_channel.lock().await.take() {
            handle.shutdown().await;
        }
        if let Some(handle) = self.inner.event_stream.lock().await.take() {
            handle.shutdown().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("sync session stopped");
    }

    /// `true` once [`shutdown`](Self::shutdown) has been requested.
    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Fetch the registry and replace it wholesale. On failure the prior
    /// registry is kept and an error status is set.
    pub async fn refresh_connections(&self) -> Result<(), CoreError> {
        match self.inner.client.list_connections().await {
            Ok(records) => {
                self.inner.engine.lock().await.apply_connections(records);
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.inner.engine.lock().await.apply_poll_failure(&err);
                Err(err)
            }
        }
    }

    pub async fn refresh_ports(&self) -> Result<(), CoreError> {
        match self.inner.client.list_ports().await {
            Ok(ports) => {
                self.inner.engine.lock().await.apply_ports(ports);
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.inner.engine.lock().await.apply_ports_failure(&err);
                Err(err)
            }
        }
    }

    pub async fn load_systems(&self) -> Result<(), CoreError> {
        match self.inner.client.list_systems().await {
            Ok(systems) => {
                self.inner.engine.lock().await.apply_systems(systems);
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.inner.engine.lock().await.apply_systems_failure(&err);
                Err(err)
            }
        }
    }

    // ── Throttle operations ──────────────────────────────────────────

    /// Open a throttle and focus it, discarding any previous throttle
    /// state.
    pub async fn open_throttle(&self, address: u32, long_address: bool) -> Result<(), CoreError> {
        if address == 0 {
            return self.reject(CoreError::validation("Please enter an address")).await;
        }
        let opened = match self.inner.client.open_throttle(address, long_address).await {
            Ok(opened) => opened,
            Err(e) => return self.reject(e.into()).await,
        };
        debug!(address, long_address, throttle = %opened.id, "throttle opened");

        let mut engine = self.inner.engine.lock().await;
        engine.focus_throttle(ThrottleKey::new(address, long_address), Some(opened.id));
        engine.set_status(StatusMessage::success("Throttle opened successfully"));
        Ok(())
    }

    /// Release the focused throttle.
    pub async fn close_throttle(&self) -> Result<(), CoreError> {
        let (_, id) = self.focused().await?;
        if let Err(e) = self.inner.client.close_throttle(&id).await {
            return self.reject(e.into()).await;
        }
        let mut engine = self.inner.engine.lock().await;
        engine.release_throttle();
        engine.set_status(StatusMessage::success("Throttle closed"));
        Ok(())
    }

    /// Set the focused throttle's speed. Out-of-range values are clamped
    /// to `[0.0, 1.0]` before sending.
    pub async fn set_speed(&self, fraction: f64) -> Result<(), CoreError> {
        let (focused, id) = self.focused().await?;
        let speed = clamp_speed(fraction);
        if let Err(e) = self.inner.client.set_speed(&id, speed).await {
            return self.reject(e.into()).await;
        }
        self.apply_local(focused.key, &id, &ThrottlePatch::speed(speed))
            .await;
        Ok(())
    }

    /// Speed as a whole percentage, the way the panel slider reports it.
    pub async fn set_speed_percent(&self, percent: u8) -> Result<(), CoreError> {
        if percent > 100 {
            return self
                .reject(CoreError::validation("Speed must be between 0 and 100"))
                .await;
        }
        self.set_speed(f64::from(percent) / 100.0).await
    }

    pub async fn toggle_direction(&self) -> Result<(), CoreError> {
        let (focused, id) = self.focused().await?;
        let forward = !focused.state.forward;
        if let Err(e) = self.inner.client.set_direction(&id, forward).await {
            return self.reject(e.into()).await;
        }
        self.apply_local(focused.key, &id, &ThrottlePatch::forward(forward))
            .await;
        Ok(())
    }

    pub async fn set_function(&self, number: u32, on: bool) -> Result<(), CoreError> {
        let (focused, id) = self.focused().await?;
        if let Err(e) = self.inner.client.set_function(&id, number, on).await {
            return self.reject(e.into()).await;
        }
        self.apply_local(focused.key, &id, &ThrottlePatch::function(number, on))
            .await;
        Ok(())
    }

    pub async fn toggle_function(&self, number: u32) -> Result<(), CoreError> {
        let (focused, _) = self.focused().await?;
        self.set_function(number, !focused.state.function(number))
            .await
    }

    // ── Accessory operations ─────────────────────────────────────────

    /// Throw or close a turnout by address.
    pub async fn set_accessory(&self, address: u32, closed: bool) -> Result<(), CoreError> {
        if address == 0 {
            return self.reject(CoreError::validation("Please enter an address")).await;
        }
        if let Err(e) = self.inner.client.set_accessory(address, closed).await {
            return self.reject(e.into()).await;
        }
        let mut engine = self.inner.engine.lock().await;
        engine.apply_local_accessory(address, closed);
        let state = if closed { "CLOSED" } else { "THROWN" };
        engine.set_status(StatusMessage::success(format!(
            "Accessory {address} set to {state}"
        )));
        Ok(())
    }

    // ── Connection operations ────────────────────────────────────────

    /// Ask a command station for its version; the registry is refreshed
    /// once the station has had time to answer.
    pub async fn request_version(&self, connection_id: &str) -> Result<(), CoreError> {
        if connection_id.is_empty() {
            return self
                .reject(CoreError::validation("Please select a connection"))
                .await;
        }
        if let Err(e) = self.inner.client.request_version(connection_id).await {
            return self.reject(e.into()).await;
        }
        self.inner.engine.lock().await.set_status(StatusMessage::success(
            "Version request sent. Waiting for response...",
        ));
        self.run_effect(Effect::RefreshConnections {
            after: self.inner.config.request_version_refresh_delay,
        });
        Ok(())
    }

    /// Grant or revoke a controller role. The registry is refreshed either
    /// way so the role view matches the server.
    pub async fn set_role(
        &self,
        connection_id: &str,
        role: Role,
        enabled: bool,
    ) -> Result<(), CoreError> {
        if connection_id.is_empty() {
            return self
                .reject(CoreError::validation("Please select a connection"))
                .await;
        }
        if role == Role::Other {
            return self.reject(CoreError::validation("Unknown role")).await;
        }
        let result = self
            .inner
            .client
            .set_role(connection_id, role, enabled)
            .await;
        let _ = self.refresh_connections().await;
        match result {
            Ok(()) => {
                self.inner
                    .engine
                    .lock()
                    .await
                    .set_status(StatusMessage::success("Controller role updated"));
                Ok(())
            }
            Err(e) => self.reject(e.into()).await,
        }
    }

    pub async fn create_connection(&self, request: &CreateConnection) -> Result<(), CoreError> {
        if request.id.trim().is_empty() {
            return self
                .reject(CoreError::validation("Please enter a connection ID"))
                .await;
        }
        if request.system_type.trim().is_empty() {
            return self
                .reject(CoreError::validation("Please select a system type"))
                .await;
        }
        if let Err(e) = self.inner.client.create_connection(request).await {
            return self.reject(e.into()).await;
        }
        self.inner
            .engine
            .lock()
            .await
            .set_status(StatusMessage::success("Connection created successfully!"));
        let _ = self.refresh_connections().await;
        Ok(())
    }

    // ── Command channel ──────────────────────────────────────────────

    /// Queue a request on the command channel and return its id.
    pub async fn send_channel(&self, request: &ChannelRequest) -> Result<String, CoreError> {
        let sent = match self.inner.command_channel.lock().await.as_ref() {
            Some(channel) => channel.send(request).map_err(CoreError::from),
            None => Err(CoreError::ChannelNotOpen),
        };
        match sent {
            Ok(id) => Ok(id),
            Err(e) => self.reject(e).await,
        }
    }

    /// Reconnect the command channel now, skipping any pending delay.
    pub async fn reconnect_command_channel(&self) -> Result<(), CoreError> {
        match self.inner.command_channel.lock().await.as_ref() {
            Some(channel) => {
                channel.reconnect();
                Ok(())
            }
            None => Err(CoreError::ChannelNotOpen),
        }
    }

    /// Watch the command channel state. `None` when the channel is
    /// disabled or the session has not been started.
    pub async fn subscribe_channel_state(&self) -> Option<watch::Receiver<ChannelState>> {
        self.inner
            .command_channel
            .lock()
            .await
            .as_ref()
            .map(CommandChannelHandle::subscribe_state)
    }

    /// Watch the event stream state. `None` when the stream is disabled or
    /// the session has not been started.
    pub async fn subscribe_stream_state(&self) -> Option<watch::Receiver<StreamState>> {
        self.inner
            .event_stream
            .lock()
            .await
            .as_ref()
            .map(EventStreamHandle::subscribe_state)
    }

    /// Switch track power through the command channel.
    pub async fn set_power(&self, connection_id: &str, on: bool) -> Result<String, CoreError> {
        if connection_id.is_empty() {
            return self
                .reject(CoreError::validation("Please select a connection"))
                .await;
        }
        self.send_channel(&ChannelRequest::power(connection_id, on))
            .await
    }

    /// Clear both user-visible logs.
    pub async fn clear_logs(&self) {
        self.inner.engine.lock().await.clear_logs();
    }

    // ── Helpers ──────────────────────────────────────────────────────

    /// The focused throttle and its server id.
    async fn focused(&self) -> Result<(FocusedThrottle, String), CoreError> {
        let focused = self.inner.store.focused_throttle();
        match focused {
            Some(focused) => match focused.throttle_id.clone() {
                Some(id) => Ok((focused, id)),
                None => self.reject(CoreError::NoFocusedThrottle).await,
            },
            None => self.reject(CoreError::NoFocusedThrottle).await,
        }
    }

    /// Apply a confirmed command only to the throttle it was sent to.
    async fn apply_local(&self, key: ThrottleKey, throttle_id: &str, patch: &ThrottlePatch) {
        let applied = self
            .inner
            .engine
            .lock()
            .await
            .apply_local_throttle(key, throttle_id, patch);
        if !applied {
            debug!(
                address = key.address,
                throttle_id, "focus changed before the command was confirmed; dropping"
            );
        }
    }

    /// Surface `err` as the user-visible status and return it.
    async fn reject<T>(&self, err: CoreError) -> Result<T, CoreError> {
        let text = match &err {
            CoreError::Validation { message } => message.clone(),
            CoreError::NoFocusedThrottle | CoreError::ChannelNotOpen => err.to_string(),
            other => format!("Error: {other}"),
        };
        warn!(error = %err, "operation failed");
        self.inner
            .engine
            .lock()
            .await
            .set_status(StatusMessage::error(text));
        Err(err)
    }

    fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::RefreshConnections { after } => {
                let session = self.clone();
                let cancel = self.inner.cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {}
                        () = tokio::time::sleep(after) => {
                            let _ = session.refresh_connections().await;
                        }
                    }
                });
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Poll the registry and port list. The first tick fires immediately.
/// Each tick spawns its own requests; overlapping responses are applied
/// in completion order. Requests still in flight at shutdown are dropped.
async fn poll_task(session: SyncSession, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let connections = session.clone();
                let stop = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        () = stop.cancelled() => {}
                        _ = connections.refresh_connections() => {}
                    }
                });
                let ports = session.clone();
                let stop = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        () = stop.cancelled() => {}
                        _ = ports.refresh_ports() => {}
                    }
                });
            }
        }
    }
}

/// Feed both push channels through the engine, preserving arrival order
/// within each channel.
async fn dispatch_task(
    session: SyncSession,
    mut stream_rx: mpsc::Receiver<StreamItem>,
    mut channel_rx: mpsc::Receiver<ChannelEvent>,
    cancel: CancellationToken,
) {
    loop {
        let effects = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(item) = stream_rx.recv() => {
                session.inner.engine.lock().await.apply_stream_item(item)
            }
            Some(event) = channel_rx.recv() => {
                session.inner.engine.lock().await.apply_channel_event(event)
            }
            else => break,
        };
        for effect in effects {
            session.run_effect(effect);
        }
    }
}
