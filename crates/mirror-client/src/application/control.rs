//! PointerController: pointer and wheel events to device commands.
//!
//! Owns the mapper, gesture classifier and scroll translator for the UI side.
//! Geometry comes from the session's status channel, so the mapper always
//! reflects the latest device and stream sizes.
//!
//! Commands are not sent inline.  Each one is tagged with the device and
//! generation it was produced for and queued to a [`CommandDispatcher`],
//! which runs as its own task and talks to the [`DeviceController`].  A slow
//! `adb` call therefore never stalls the UI loop.
//!
//! A command is only delivered while the session is `Connected` to the same
//! device under the same generation it was produced for.  A reconnect in the
//! middle of a drag cancels the gesture instead of sending half of it to the
//! new connection, and anything still queued for the old connection is
//! dropped at delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use mirror_core::{
    CoordinateMapper, DeviceCommand, DeviceId, DevicePoint, GestureClassifier, GestureConfig,
    ScreenPoint, ScrollConfig, ScrollTranslator, Size,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::application::session::{Generation, SessionState, SessionStatus};

/// Commands buffered between the UI loop and the dispatcher.
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Device-side input channel.  Errors are reported as plain strings.
#[async_trait]
pub trait DeviceController: Send + Sync {
    async fn tap(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String>;
    async fn touch_down(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String>;
    async fn touch_move(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String>;
    async fn touch_up(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String>;
    async fn swipe(
        &self,
        device: &DeviceId,
        from: DevicePoint,
        to: DevicePoint,
        duration_ms: u64,
    ) -> Result<(), String>;
}

/// Routes one command to the matching controller method.
pub async fn dispatch(
    controller: &dyn DeviceController,
    device: &DeviceId,
    command: &DeviceCommand,
) -> Result<(), String> {
    match *command {
        DeviceCommand::Tap { at } => controller.tap(device, at).await,
        DeviceCommand::TouchDown { at } => controller.touch_down(device, at).await,
        DeviceCommand::TouchMove { at } => controller.touch_move(device, at).await,
        DeviceCommand::TouchUp { at } => controller.touch_up(device, at).await,
        DeviceCommand::Swipe {
            from,
            to,
            duration_ms,
        } => controller.swipe(device, from, to, duration_ms).await,
    }
}

/// A command bound to the connection it was produced for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetedCommand {
    pub device: DeviceId,
    pub generation: Generation,
    pub command: DeviceCommand,
}

/// Delivery counters shared by the pointer controller and the dispatcher.
#[derive(Debug, Default)]
pub struct DispatchStats {
    sent: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    /// Commands delivered to the controller.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Commands withheld because the queue was full or the session had moved
    /// on from the connection they were produced for.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Commands the controller rejected.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn count(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ── CommandDispatcher ─────────────────────────────────────────────────────────

/// Delivers queued commands to the device, one at a time, in order.
pub struct CommandDispatcher {
    controller: Arc<dyn DeviceController>,
    status: watch::Receiver<SessionStatus>,
    commands: mpsc::Receiver<TargetedCommand>,
    stats: Arc<DispatchStats>,
}

impl CommandDispatcher {
    /// Runs until every [`PointerController`] feeding this dispatcher is
    /// dropped and the queue is empty.
    pub async fn run(mut self) {
        while let Some(targeted) = self.commands.recv().await {
            self.deliver(targeted).await;
        }
        debug!("command dispatcher stopped");
    }

    async fn deliver(&self, targeted: TargetedCommand) {
        let live = {
            let status = self.status.borrow();
            status.state == SessionState::Connected
                && status.generation == targeted.generation
                && status.device.as_ref() == Some(&targeted.device)
        };
        let name = targeted.command.name();
        if !live {
            DispatchStats::count(&self.stats.dropped);
            trace!(command = name, generation = %targeted.generation, "dropping command for inactive session");
            return;
        }
        match dispatch(self.controller.as_ref(), &targeted.device, &targeted.command).await {
            Ok(()) => DispatchStats::count(&self.stats.sent),
            Err(e) => {
                DispatchStats::count(&self.stats.failed);
                warn!(command = name, device = %targeted.device, "device command failed: {e}");
            }
        }
    }
}

// ── PointerController ─────────────────────────────────────────────────────────

pub struct PointerController {
    queue: mpsc::Sender<TargetedCommand>,
    stats: Arc<DispatchStats>,
    status: watch::Receiver<SessionStatus>,
    mapper: CoordinateMapper,
    gestures: GestureClassifier,
    scroll: ScrollTranslator,
    /// Generation the active gesture or scroll burst belongs to.
    input_generation: Option<Generation>,
}

impl PointerController {
    /// Creates the controller and the dispatcher that drains its queue.  The
    /// dispatcher must be driven with [`CommandDispatcher::run`].
    pub fn new(
        controller: Arc<dyn DeviceController>,
        status: watch::Receiver<SessionStatus>,
        gesture_config: GestureConfig,
        scroll_config: ScrollConfig,
    ) -> (Self, CommandDispatcher) {
        let (queue, commands) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let stats = Arc::new(DispatchStats::default());
        let dispatcher = CommandDispatcher {
            controller,
            status: status.clone(),
            commands,
            stats: Arc::clone(&stats),
        };
        let pointer = Self {
            queue,
            stats,
            status,
            mapper: CoordinateMapper::new(),
            gestures: GestureClassifier::new(gesture_config),
            scroll: ScrollTranslator::new(scroll_config),
            input_generation: None,
        };
        (pointer, dispatcher)
    }

    /// Size of the UI element showing the video.
    pub fn set_viewport(&mut self, size: Option<Size>) {
        self.mapper.set_viewport(size);
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    /// Counters shared with the dispatcher.  Stay readable after the
    /// controller is dropped.
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    pub fn sent(&self) -> u64 {
        self.stats.sent()
    }

    pub fn dropped(&self) -> u64 {
        self.stats.dropped()
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed()
    }

    pub fn pointer_down(&mut self, point: ScreenPoint, now: Instant) {
        let Some((device, generation)) = self.sync() else {
            return;
        };
        let commands = self.gestures.down(&self.mapper, point, now);
        self.enqueue(commands, &device, generation);
    }

    pub fn pointer_move(&mut self, point: ScreenPoint, now: Instant) {
        let Some((device, generation)) = self.sync() else {
            return;
        };
        let commands = self.gestures.moved(&self.mapper, point, now);
        self.enqueue(commands, &device, generation);
    }

    pub fn pointer_up(&mut self, point: ScreenPoint, now: Instant) {
        let Some((device, generation)) = self.sync() else {
            return;
        };
        let commands = self.gestures.up(&self.mapper, point, now);
        self.enqueue(commands, &device, generation);
    }

    pub fn pointer_leave(&mut self) {
        let Some((device, generation)) = self.sync() else {
            return;
        };
        let commands = self.gestures.leave();
        self.enqueue(commands, &device, generation);
    }

    pub fn wheel(&mut self, point: ScreenPoint, delta_x: f64, delta_y: f64, now: Instant) {
        if self.sync().is_none() {
            return;
        }
        self.scroll.wheel(&self.mapper, point, delta_x, delta_y, now);
    }

    /// Flushes throttled moves, deferred touch-downs and finished scroll
    /// bursts.  Call at [`next_deadline`](Self::next_deadline).
    pub fn tick(&mut self, now: Instant) {
        let Some((device, generation)) = self.sync() else {
            return;
        };
        let mut commands = self.gestures.poll(now);
        if let Some(swipe) = self.scroll.poll(&self.mapper, now) {
            commands.push(swipe);
        }
        self.enqueue(commands, &device, generation);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.gestures.next_deadline(), self.scroll.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Refreshes geometry from the session.  Returns the connection input may
    /// target, or `None` (after discarding any gesture in flight) when the
    /// session is not connected.
    fn sync(&mut self) -> Option<(DeviceId, Generation)> {
        let (state, device, generation, device_size, stream_size) = {
            let status = self.status.borrow_and_update();
            (
                status.state,
                status.device.clone(),
                status.generation,
                status.device_size,
                status.stream_size,
            )
        };
        self.mapper.set_device_size(device_size);
        self.mapper.set_stream_size(stream_size);

        let device = match (state, device) {
            (SessionState::Connected, Some(device)) => device,
            _ => {
                self.discard_input();
                self.input_generation = None;
                return None;
            }
        };
        if self.input_generation != Some(generation) {
            if self.input_generation.is_some() {
                debug!(%generation, "session generation changed; cancelling gesture");
            }
            self.discard_input();
            self.input_generation = Some(generation);
        }
        Some((device, generation))
    }

    fn discard_input(&mut self) {
        self.gestures.cancel();
        self.scroll.reset();
    }

    fn enqueue(&mut self, commands: Vec<DeviceCommand>, device: &DeviceId, generation: Generation) {
        for command in commands {
            let name = command.name();
            let targeted = TargetedCommand {
                device: device.clone(),
                generation,
                command,
            };
            match self.queue.try_send(targeted) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    DispatchStats::count(&self.stats.dropped);
                    warn!(command = name, "device command queue full; dropping");
                }
                Err(TrySendError::Closed(_)) => {
                    DispatchStats::count(&self.stats.dropped);
                    trace!(command = name, "dispatcher stopped; dropping");
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
