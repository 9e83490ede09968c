//! MirrorSession: connection lifecycle supervisor for one mirrored device.
//!
//! The session owns at most one device server, transport and decoder at a
//! time, and is the only component that runs timers.  The server (when a
//! launcher is configured) is started before the transport opens and stopped
//! whenever the transport is released.  It is an explicit state machine: each
//! input (a command, a transport event, an elapsed timer) has one method, and
//! every piece of mutable state lives on the struct.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!                ┌──────────────┐  open ok   ┌─────────────┐
//!   connect ───► │  Connecting  │ ─────────► │  Connected  │
//!                └──────────────┘            └─────────────┘
//!                   ▲       │ open failed       │      │
//!    reconnect      │       ▼                   ▼      ▼
//!    (backoff) ─────┴── Disconnected ◄─── closed    Error ◄── decoder failure
//!                                                          ◄── fallback timeout
//! ```
//!
//! # Generations
//!
//! Every connection attempt and every teardown bumps a monotonically
//! increasing [`Generation`].  Transport events and timers carry the
//! generation they were created under; anything tagged with an older
//! generation, or with a different device, is ignored.  Cancelling a timer is
//! therefore an optimisation, not a correctness requirement.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mirror_core::{
    DeviceId, FrameReassembler, Ingress, ProtocolError, ReassemblerConfig, Size,
    VideoStreamMetadata,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::application::decoder::{DecodeOutcome, DecoderError, DecoderFactory, StreamDecoder};
use crate::application::recovery::{ReconnectBackoff, RecoveryAction, RecoveryCounter};

/// Capacity of the transport → session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Public types ──────────────────────────────────────────────────────────────

/// Connection attempt counter.  Strictly increasing within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Session connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Connected,
    Error,
    Disconnected,
}

/// Snapshot published to observers whenever the session changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub device: Option<DeviceId>,
    pub state: SessionState,
    pub generation: Generation,
    /// Native panel resolution, once known.
    pub device_size: Option<Size>,
    /// Resolution of the most recently decoded frame.
    pub stream_size: Option<Size>,
}

/// Lifecycle notifications for the embedding UI.
///
/// The listener is swappable at any time via [`MirrorSession::set_listener`],
/// independently of the connection lifecycle.
pub trait SessionListener: Send + Sync {
    /// The transport is open and the decoder is ready.
    fn on_ready(&self, device: &DeviceId);

    /// The session for `device` ended.  Sent once per device.
    fn on_closed(&self, device: &DeviceId);

    /// No data arrived in time; the UI should switch to its fallback view.
    fn on_fallback(&self, device: &DeviceId);

    fn on_state_changed(&self, _status: &SessionStatus) {}

    fn on_stream_resized(&self, _device: &DeviceId, _size: Size) {}
}

/// Identifies the connection a transport belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportTarget {
    pub device: DeviceId,
    pub generation: Generation,
}

/// Errors opening or reading a video transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Opens video transports.  Implementations push every read into `events`,
/// tagged with `target`, and finish with [`SessionEvent::TransportClosed`].
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn open(
        &self,
        target: TransportTarget,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn TransportHandle>, TransportError>;
}

/// An open transport.
pub trait TransportHandle: Send {
    /// Stops delivery.  Must tolerate repeated calls.
    fn close(&mut self);
}

/// Errors starting the on-device stream server.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("adb failed: {0}")]
    Adb(String),

    #[error("server port still in use after {attempts} attempts")]
    AddressInUse { attempts: u32 },

    #[error("server exited during startup: {0}")]
    Exited(String),
}

/// Starts the process on the device that serves the video socket.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn launch(&self, device: &DeviceId) -> Result<Box<dyn ServerHandle>, LaunchError>;
}

/// A running device server.
pub trait ServerHandle: Send {
    /// Kills the server and removes its port forward.  Must tolerate
    /// repeated calls.
    fn stop(&mut self);
}

/// Errors from the device metadata query.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata command failed: {0}")]
    Command(String),

    #[error("could not parse device size from {0:?}")]
    Parse(String),
}

/// Synchronous query for a device's native resolution.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceMetadataSource: Send + Sync {
    fn device_size(&self, device: &DeviceId) -> Result<Size, MetadataError>;
}

/// Inputs delivered to the session by transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ingress {
        target: TransportTarget,
        ingress: Ingress,
    },
    StreamMetadata {
        target: TransportTarget,
        metadata: VideoStreamMetadata,
    },
    TransportClosed {
        target: TransportTarget,
        reason: Option<String>,
    },
}

impl SessionEvent {
    pub fn target(&self) -> &TransportTarget {
        match self {
            SessionEvent::Ingress { target, .. }
            | SessionEvent::StreamMetadata { target, .. }
            | SessionEvent::TransportClosed { target, .. } => target,
        }
    }
}

/// Commands accepted by [`MirrorSession::run`].
pub enum SessionCommand {
    Connect(DeviceId),
    Teardown,
    SetListener(Option<Arc<dyn SessionListener>>),
    Shutdown,
}

impl fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCommand::Connect(device) => f.debug_tuple("Connect").field(device).finish(),
            SessionCommand::Teardown => f.write_str("Teardown"),
            SessionCommand::SetListener(l) => {
                f.debug_tuple("SetListener").field(&l.is_some()).finish()
            }
            SessionCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Timing and recovery parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub reassembler: ReassemblerConfig,
    /// Time allowed between opening the transport and the first data.
    pub fallback_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// Pause after disposing a decoder before creating the next one.
    pub decoder_grace: Duration,
    pub max_decoder_resets: u32,
    pub reset_debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reassembler: ReassemblerConfig::default(),
            fallback_timeout: Duration::from_millis(5_000),
            reconnect_base: Duration::from_millis(1_000),
            reconnect_max: Duration::from_millis(10_000),
            decoder_grace: Duration::from_millis(100),
            max_decoder_resets: 3,
            reset_debounce: Duration::from_millis(1_000),
        }
    }
}

/// Collaborators injected into the session.
#[derive(Clone)]
pub struct SessionDeps {
    pub connector: Arc<dyn TransportConnector>,
    pub decoders: Arc<dyn DecoderFactory>,
    pub metadata: Arc<dyn DeviceMetadataSource>,
    /// `None` when the video socket is served by something started out of
    /// band.
    pub launcher: Option<Arc<dyn ServerLauncher>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerSlot {
    deadline: Instant,
    generation: Generation,
}

// ── MirrorSession ─────────────────────────────────────────────────────────────

pub struct MirrorSession {
    config: SessionConfig,
    deps: SessionDeps,
    session_id: Uuid,

    device: Option<DeviceId>,
    state: SessionState,
    generation: Generation,

    server: Option<Box<dyn ServerHandle>>,
    transport: Option<Box<dyn TransportHandle>>,
    decoder: Option<StreamDecoder>,
    /// When the last decoder was disposed; the next one waits out the grace.
    decoder_released_at: Option<Instant>,
    reassembler: FrameReassembler,
    recovery: RecoveryCounter,
    backoff: ReconnectBackoff,

    listener: Option<Arc<dyn SessionListener>>,
    fallback_timer: Option<TimerSlot>,
    reconnect_timer: Option<TimerSlot>,
    reconnect_suppressed: bool,
    closed_notified: bool,
    first_data_seen: bool,

    device_sizes: HashMap<DeviceId, Size>,
    stream_size: Option<Size>,
    stale_events: u64,

    events_tx: mpsc::Sender<SessionEvent>,
    status_tx: watch::Sender<SessionStatus>,
}

impl MirrorSession {
    /// Creates an idle session.  The returned receiver must be passed to
    /// [`run`](Self::run) (or drained by the caller in tests).
    pub fn new(config: SessionConfig, deps: SessionDeps) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session_id = Uuid::new_v4();
        let (status_tx, _) = watch::channel(SessionStatus {
            session_id,
            device: None,
            state: SessionState::Disconnected,
            generation: Generation::default(),
            device_size: None,
            stream_size: None,
        });

        let session = Self {
            reassembler: FrameReassembler::new(config.reassembler.clone()),
            recovery: RecoveryCounter::new(config.max_decoder_resets, config.reset_debounce),
            backoff: ReconnectBackoff::new(config.reconnect_base, config.reconnect_max),
            config,
            deps,
            session_id,
            device: None,
            state: SessionState::Disconnected,
            generation: Generation::default(),
            server: None,
            transport: None,
            decoder: None,
            decoder_released_at: None,
            listener: None,
            fallback_timer: None,
            reconnect_timer: None,
            reconnect_suppressed: false,
            closed_notified: true,
            first_data_seen: false,
            device_sizes: HashMap::new(),
            stream_size: None,
            stale_events: 0,
            events_tx,
            status_tx,
        };
        (session, events_rx)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn device(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    /// Transport events dropped because they belonged to a superseded
    /// connection.
    pub fn stale_events(&self) -> u64 {
        self.stale_events
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    pub fn is_fallback_armed(&self) -> bool {
        self.fallback_timer.is_some()
    }

    /// Current snapshot, as published to subscribers.
    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn set_listener(&mut self, listener: Option<Arc<dyn SessionListener>>) {
        self.listener = listener;
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Starts (or restarts) mirroring `device`.
    ///
    /// Any previous connection is released first and its late events become
    /// stale.  Switching to a different device notifies `closed` for the old
    /// one.
    pub async fn connect(&mut self, device: DeviceId) {
        let switching = self.device.as_ref() != Some(&device);
        if switching {
            self.notify_closed();
        }

        self.generation = self.generation.next();
        let generation = self.generation;
        self.release_resources();
        self.recovery.clear();
        self.fallback_timer = None;
        self.reconnect_timer = None;
        self.reconnect_suppressed = false;
        self.first_data_seen = false;
        if switching {
            self.device = Some(device.clone());
            self.closed_notified = false;
            self.stream_size = None;
            self.backoff.reset();
        }

        info!(session = %self.session_id, %device, %generation, "connecting");
        self.set_state(SessionState::Connecting);

        if let Some(released_at) = self.decoder_released_at.take() {
            let ready_at = released_at + self.config.decoder_grace;
            if ready_at > Instant::now() {
                debug!(grace = ?self.config.decoder_grace, "waiting before creating decoder");
                sleep_until(ready_at).await;
            }
        }

        let codec = self.config.reassembler.codec;
        match self.deps.decoders.create(codec) {
            Ok(inner) => self.decoder = Some(StreamDecoder::new(inner, codec)),
            Err(e) => {
                warn!(%device, "decoder creation failed: {e}");
                self.set_state(SessionState::Error);
                self.schedule_reconnect();
                return;
            }
        }

        self.ensure_device_size(&device);

        if let Some(launcher) = self.deps.launcher.clone() {
            match launcher.launch(&device).await {
                Ok(server) => self.server = Some(server),
                Err(e) => {
                    warn!(%device, %generation, "server launch failed: {e}");
                    self.release_resources();
                    self.set_state(SessionState::Disconnected);
                    self.schedule_reconnect();
                    return;
                }
            }
        }

        let target = TransportTarget {
            device: device.clone(),
            generation,
        };
        match self.deps.connector.open(target, self.events_tx.clone()).await {
            Ok(mut handle) => {
                if self.generation != generation {
                    handle.close();
                    return;
                }
                self.transport = Some(handle);
                self.fallback_timer = Some(TimerSlot {
                    deadline: Instant::now() + self.config.fallback_timeout,
                    generation,
                });
                self.set_state(SessionState::Connected);
                info!(%device, %generation, "transport open");
                if let Some(listener) = &self.listener {
                    listener.on_ready(&device);
                }
            }
            Err(e) => {
                warn!(%device, %generation, "transport open failed: {e}");
                self.release_resources();
                self.set_state(SessionState::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    /// Ends the session on request.  No reconnect follows.
    pub fn teardown(&mut self) {
        self.generation = self.generation.next();
        self.reconnect_suppressed = true;
        self.fallback_timer = None;
        self.reconnect_timer = None;
        self.release_resources();
        self.set_state(SessionState::Disconnected);
        self.notify_closed();
        if let Some(device) = self.device.take() {
            info!(session = %self.session_id, %device, "session torn down");
        }
        self.stream_size = None;
        self.publish();
    }

    // ── Transport events ──────────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: SessionEvent, now: Instant) {
        if !self.is_current(event.target()) {
            self.stale_events += 1;
            trace!(target_generation = %event.target().generation, "ignoring stale event");
            return;
        }

        match event {
            SessionEvent::Ingress { ingress, .. } => self.on_ingress(ingress, now),
            SessionEvent::StreamMetadata { metadata, .. } => {
                info!(
                    device_name = metadata.device_name.as_deref().unwrap_or("-"),
                    codec = ?metadata.codec,
                    width = ?metadata.width,
                    height = ?metadata.height,
                    "stream metadata"
                );
                if let (Some(width), Some(height)) = (metadata.width, metadata.height) {
                    let size = Size::new(width, height);
                    if !size.is_empty() && self.stream_size.is_none() {
                        self.stream_size = Some(size);
                        self.publish();
                    }
                }
            }
            SessionEvent::TransportClosed { reason, .. } => self.on_transport_closed(reason),
        }
    }

    fn is_current(&self, target: &TransportTarget) -> bool {
        target.generation == self.generation
            && self.device.as_ref() == Some(&target.device)
            && self.transport.is_some()
    }

    fn on_ingress(&mut self, ingress: Ingress, now: Instant) {
        if !self.first_data_seen {
            self.first_data_seen = true;
            self.fallback_timer = None;
            self.backoff.reset();
            debug!(generation = %self.generation, "first data received");
        }

        for unit in self.reassembler.feed(ingress) {
            let Some(decoder) = self.decoder.as_mut() else {
                break;
            };
            match decoder.push(&unit) {
                Ok(DecodeOutcome::Resized(size)) => self.on_stream_resized(size),
                Ok(_) => {}
                Err(e) => {
                    if !self.on_decoder_error(e, now) {
                        break;
                    }
                }
            }
        }
    }

    fn on_stream_resized(&mut self, size: Size) {
        debug!(width = size.width, height = size.height, "stream resized");
        self.stream_size = Some(size);
        self.publish();
        if let (Some(listener), Some(device)) = (&self.listener, &self.device) {
            listener.on_stream_resized(device, size);
        }
    }

    /// Returns `false` when the connection was torn down for a reconnect.
    fn on_decoder_error(&mut self, error: DecoderError, now: Instant) -> bool {
        let recovering = self.decoder.as_ref().is_some_and(StreamDecoder::is_recovering);
        if !error.is_recoverable() || recovering {
            warn!(recovering, "decoder failed: {error}; reconnecting");
            self.escalate();
            return false;
        }

        match self.recovery.evaluate(now) {
            RecoveryAction::LightweightReset => {
                let reset = self.decoder.as_mut().map(StreamDecoder::reset);
                match reset {
                    Some(Ok(())) => {
                        info!(
                            attempt = self.recovery.attempts(),
                            "decoder error: {error}; reset in place"
                        );
                        true
                    }
                    Some(Err(e)) => {
                        warn!("decoder reset failed: {e}; reconnecting");
                        self.escalate();
                        false
                    }
                    None => false,
                }
            }
            RecoveryAction::Debounced => {
                debug!("decoder error inside debounce window: {error}");
                true
            }
            RecoveryAction::Escalate => {
                warn!("decoder resets exhausted: {error}; reconnecting");
                self.escalate();
                false
            }
        }
    }

    fn escalate(&mut self) {
        self.set_state(SessionState::Error);
        self.release_resources();
        self.schedule_reconnect();
    }

    fn on_transport_closed(&mut self, reason: Option<String>) {
        info!(
            generation = %self.generation,
            reason = reason.as_deref().unwrap_or("end of stream"),
            "transport closed"
        );
        self.release_resources();
        self.fallback_timer = None;
        self.set_state(SessionState::Disconnected);
        if !self.reconnect_suppressed {
            self.schedule_reconnect();
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    /// Earliest armed timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.fallback_timer, self.reconnect_timer]
            .into_iter()
            .flatten()
            .map(|slot| slot.deadline)
            .min()
    }

    /// Fires every timer whose deadline is at or before `now`.
    pub async fn handle_timers(&mut self, now: Instant) {
        if let Some(slot) = self.fallback_timer.filter(|s| s.deadline <= now) {
            self.fallback_timer = None;
            if slot.generation == self.generation {
                self.on_fallback_elapsed();
            }
        }
        if let Some(slot) = self.reconnect_timer.filter(|s| s.deadline <= now) {
            self.reconnect_timer = None;
            self.on_reconnect_due(slot.generation).await;
        }
    }

    fn on_fallback_elapsed(&mut self) {
        let Some(device) = self.device.clone() else {
            return;
        };
        warn!(%device, timeout = ?self.config.fallback_timeout, "no video received; falling back");
        self.set_state(SessionState::Error);
        self.reconnect_suppressed = true;
        self.release_resources();
        if let Some(listener) = &self.listener {
            listener.on_fallback(&device);
        }
    }

    /// Reconnects the same device if `generation` is still current.
    pub async fn on_reconnect_due(&mut self, generation: Generation) {
        if generation != self.generation || self.reconnect_suppressed {
            trace!(%generation, "ignoring stale reconnect");
            return;
        }
        let Some(device) = self.device.clone() else {
            return;
        };
        self.connect(device).await;
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay();
        info!(delay = ?delay, generation = %self.generation, "reconnect scheduled");
        self.reconnect_timer = Some(TimerSlot {
            deadline: Instant::now() + delay,
            generation: self.generation,
        });
    }

    // ── Event loop ────────────────────────────────────────────────────────────

    /// Drives the session until [`SessionCommand::Shutdown`] or until every
    /// command sender is dropped.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::Receiver<SessionEvent>,
    ) {
        info!(session = %self.session_id, "session loop started");
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Connect(device)) => self.connect(device).await,
                    Some(SessionCommand::Teardown) => self.teardown(),
                    Some(SessionCommand::SetListener(listener)) => self.set_listener(listener),
                    Some(SessionCommand::Shutdown) | None => {
                        self.teardown();
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event, Instant::now()),
                () = sleep_until_opt(deadline) => self.handle_timers(Instant::now()).await,
            }
        }
        info!(session = %self.session_id, "session loop stopped");
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Closes the transport, stops the device server and disposes the
    /// decoder, remembering when so the next decoder honours the grace
    /// period.
    fn release_resources(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
            self.decoder_released_at = Some(Instant::now());
        }
        self.reassembler.reset();
    }

    fn ensure_device_size(&mut self, device: &DeviceId) {
        if self.device_sizes.contains_key(device) {
            return;
        }
        match self.deps.metadata.device_size(device) {
            Ok(size) => {
                info!(%device, width = size.width, height = size.height, "device size");
                self.device_sizes.insert(device.clone(), size);
                self.publish();
            }
            Err(e) => warn!(%device, "device size query failed: {e}"),
        }
    }

    fn notify_closed(&mut self) {
        if self.closed_notified {
            return;
        }
        self.closed_notified = true;
        if let (Some(listener), Some(device)) = (&self.listener, &self.device) {
            listener.on_closed(device);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "state change");
        }
        self.state = state;
        self.publish();
    }

    fn publish(&mut self) {
        let status = SessionStatus {
            session_id: self.session_id,
            device: self.device.clone(),
            state: self.state,
            generation: self.generation,
            device_size: self
                .device
                .as_ref()
                .and_then(|d| self.device_sizes.get(d).copied()),
            stream_size: self.stream_size,
        };
        if *self.status_tx.borrow() == status {
            return;
        }
        self.status_tx.send_replace(status.clone());
        if let Some(listener) = &self.listener {
            listener.on_state_changed(&status);
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Default channel for session commands.
pub fn command_channel() -> (mpsc::Sender<SessionCommand>, mpsc::Receiver<SessionCommand>) {
    mpsc::channel(32)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
