//! Recording test doubles for the application-layer traits.
//!
//! # Why doubles instead of the real adapters?
//!
//! The real adapters spawn `adb`, open sockets and drive hardware decoders.
//! None of that is available (or observable) in a unit test.  The doubles
//! here record every call in a `Mutex<Vec<...>>` or an atomic counter so that
//! assertions can check exactly what the session or pointer controller did,
//! and in what order.
//!
//! # Usage in tests
//!
//! ```ignore
//! let connector = Arc::new(ScriptedConnector::new());
//! let deps = SessionDeps { connector: connector.clone(), .. };
//! let (mut session, _events) = MirrorSession::new(SessionConfig::default(), deps);
//!
//! session.connect(DeviceId::from("emulator-5554")).await;
//!
//! assert_eq!(connector.opens().len(), 1);
//! ```
//!
//! # Failure injection
//!
//! `RecordingDeviceController::should_fail`, `ScriptedConnector::fail_next_opens`,
//! `ScriptedLauncher::fail_next_launches`, `ScriptedAdbRunner::script_exits`
//! and `ScriptedDecoderFactory::fail_next_decodes` let tests drive the error
//! paths without a broken device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mirror_core::{AccessUnit, DeviceCommand, DeviceId, DevicePoint, Size, VideoCodec};
use tokio::sync::mpsc;

use crate::application::control::DeviceController;
use crate::application::decoder::{DecoderError, DecoderFactory, VideoDecoder};
use crate::application::session::{
    LaunchError, ServerHandle, ServerLauncher, SessionEvent, SessionListener, SessionState,
    SessionStatus, TransportConnector, TransportError, TransportHandle, TransportTarget,
};
use crate::infrastructure::adb::{AdbError, AdbProcess, AdbRunner};

// ── Device controller ─────────────────────────────────────────────────────────

/// Records every command instead of sending it to a device.
#[derive(Default)]
pub struct RecordingDeviceController {
    pub commands: Mutex<Vec<DeviceCommand>>,
    /// Device each recorded command was addressed to.
    pub targets: Mutex<Vec<DeviceId>>,
    /// When `true`, every method returns an error and records nothing.
    pub should_fail: bool,
}

impl RecordingDeviceController {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, device: &DeviceId, command: DeviceCommand) -> Result<(), String> {
        if self.should_fail {
            return Err(format!("simulated {} failure", command.name()));
        }
        self.commands
            .lock()
            .map_err(|_| "command log poisoned".to_string())?
            .push(command);
        push(&self.targets, device.clone());
        Ok(())
    }
}

#[async_trait]
impl DeviceController for RecordingDeviceController {
    async fn tap(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String> {
        self.record(device, DeviceCommand::Tap { at })
    }

    async fn touch_down(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String> {
        self.record(device, DeviceCommand::TouchDown { at })
    }

    async fn touch_move(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String> {
        self.record(device, DeviceCommand::TouchMove { at })
    }

    async fn touch_up(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String> {
        self.record(device, DeviceCommand::TouchUp { at })
    }

    async fn swipe(
        &self,
        device: &DeviceId,
        from: DevicePoint,
        to: DevicePoint,
        duration_ms: u64,
    ) -> Result<(), String> {
        self.record(
            device,
            DeviceCommand::Swipe {
                from,
                to,
                duration_ms,
            },
        )
    }
}

// ── adb ───────────────────────────────────────────────────────────────────────

/// Records `adb` invocations and plays back scripted server exits.
#[derive(Default)]
pub struct ScriptedAdbRunner {
    calls: Mutex<Vec<String>>,
    exits: Mutex<VecDeque<Option<String>>>,
    failing: Mutex<Vec<String>>,
    spawned: AtomicUsize,
    killed: Arc<AtomicUsize>,
}

impl ScriptedAdbRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// How each spawned process behaves, in spawn order: `Some(output)`
    /// means it has exited with that output, `None` that it keeps running.
    /// Processes beyond the script keep running.
    pub fn script_exits<'a>(&self, exits: impl IntoIterator<Item = Option<&'a str>>) {
        if let Ok(mut queue) = self.exits.lock() {
            queue.extend(exits.into_iter().map(|e| e.map(str::to_string)));
        }
    }

    /// Makes every `output` call whose arguments contain `needle` fail.
    pub fn fail_when(&self, needle: &str) {
        push(&self.failing, needle.to_string());
    }

    /// Every invocation, arguments joined by spaces, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn killed(&self) -> usize {
        self.killed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdbRunner for ScriptedAdbRunner {
    async fn output(&self, args: &[String]) -> Result<String, AdbError> {
        let line = args.join(" ");
        push(&self.calls, line.clone());
        let fails = self
            .failing
            .lock()
            .map(|needles| needles.iter().any(|n| line.contains(n.as_str())))
            .unwrap_or(false);
        if fails {
            return Err(AdbError::Failed {
                command: line,
                detail: "simulated failure".to_string(),
            });
        }
        Ok(String::new())
    }

    fn spawn(&self, args: &[String]) -> Result<Box<dyn AdbProcess>, AdbError> {
        push(&self.calls, args.join(" "));
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let exit = self
            .exits
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .flatten();
        Ok(Box::new(ScriptedProcess {
            exit,
            killed: Arc::clone(&self.killed),
            done: false,
        }))
    }
}

struct ScriptedProcess {
    exit: Option<String>,
    killed: Arc<AtomicUsize>,
    done: bool,
}

#[async_trait]
impl AdbProcess for ScriptedProcess {
    async fn exited(&mut self) -> Option<String> {
        self.exit.clone()
    }

    fn kill(&mut self) {
        if !self.done {
            self.done = true;
            self.killed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ── Server launcher ───────────────────────────────────────────────────────────

/// Pretends to start device servers and counts how many were stopped.
#[derive(Default)]
pub struct ScriptedLauncher {
    launches: Mutex<Vec<DeviceId>>,
    fail_remaining: AtomicU32,
    stopped: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` launches fail.
    pub fn fail_next_launches(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Every device passed to `launch`, successful or not.
    pub fn launches(&self) -> Vec<DeviceId> {
        self.launches.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn stopped_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerLauncher for ScriptedLauncher {
    async fn launch(&self, device: &DeviceId) -> Result<Box<dyn ServerHandle>, LaunchError> {
        push(&self.launches, device.clone());
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LaunchError::Exited("simulated server crash".to_string()));
        }
        Ok(Box::new(ScriptedServer {
            stopped: Arc::clone(&self.stopped),
            done: false,
        }))
    }
}

struct ScriptedServer {
    stopped: Arc<AtomicUsize>,
    done: bool,
}

impl ServerHandle for ScriptedServer {
    fn stop(&mut self) {
        if !self.done {
            self.done = true;
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ── Session listener ──────────────────────────────────────────────────────────

/// Records lifecycle notifications.
#[derive(Default)]
pub struct RecordingListener {
    pub ready: Mutex<Vec<DeviceId>>,
    pub closed: Mutex<Vec<DeviceId>>,
    pub fallback: Mutex<Vec<DeviceId>>,
    pub states: Mutex<Vec<SessionState>>,
    pub resized: Mutex<Vec<Size>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }
}

fn push<T>(log: &Mutex<Vec<T>>, value: T) {
    if let Ok(mut entries) = log.lock() {
        entries.push(value);
    }
}

impl SessionListener for RecordingListener {
    fn on_ready(&self, device: &DeviceId) {
        push(&self.ready, device.clone());
    }

    fn on_closed(&self, device: &DeviceId) {
        push(&self.closed, device.clone());
    }

    fn on_fallback(&self, device: &DeviceId) {
        push(&self.fallback, device.clone());
    }

    fn on_state_changed(&self, status: &SessionStatus) {
        push(&self.states, status.state);
    }

    fn on_stream_resized(&self, _device: &DeviceId, size: Size) {
        push(&self.resized, size);
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// Opens fake transports and keeps their event senders so tests can inject
/// traffic for any connection, including superseded ones.
#[derive(Default)]
pub struct ScriptedConnector {
    opens: Mutex<Vec<(TransportTarget, mpsc::Sender<SessionEvent>)>>,
    fail_remaining: AtomicU32,
    closed: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `open` fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Every target passed to `open`, successful or not, in call order.
    pub fn opens(&self) -> Vec<TransportTarget> {
        self.opens
            .lock()
            .map(|opens| opens.iter().map(|(t, _)| t.clone()).collect())
            .unwrap_or_default()
    }

    /// Event sender handed to the `index`-th open.
    pub fn sender(&self, index: usize) -> Option<mpsc::Sender<SessionEvent>> {
        self.opens
            .lock()
            .ok()
            .and_then(|opens| opens.get(index).map(|(_, tx)| tx.clone()))
    }

    /// Number of handles the session has closed.
    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn open(
        &self,
        target: TransportTarget,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        if let Ok(mut opens) = self.opens.lock() {
            opens.push((target, events));
        }
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        Ok(Box::new(ScriptedHandle {
            closed: Arc::clone(&self.closed),
            done: false,
        }))
    }
}

struct ScriptedHandle {
    closed: Arc<AtomicUsize>,
    done: bool,
}

impl TransportHandle for ScriptedHandle {
    fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ── Decoder ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct DecoderCounters {
    created: AtomicU32,
    decoded: AtomicU32,
    resets: AtomicU32,
    closed: AtomicU32,
    fail_decodes: AtomicU32,
}

/// Creates decoders that report a fixed frame size and count their calls.
pub struct ScriptedDecoderFactory {
    size: Size,
    counters: Arc<DecoderCounters>,
}

impl ScriptedDecoderFactory {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            counters: Arc::default(),
        }
    }

    /// Makes the next `count` decode calls fail with a buffer error.
    pub fn fail_next_decodes(&self, count: u32) {
        self.counters.fail_decodes.store(count, Ordering::SeqCst);
    }

    pub fn created(&self) -> u32 {
        self.counters.created.load(Ordering::SeqCst)
    }

    pub fn decoded(&self) -> u32 {
        self.counters.decoded.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> u32 {
        self.counters.resets.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u32 {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

impl DecoderFactory for ScriptedDecoderFactory {
    fn create(&self, _codec: VideoCodec) -> Result<Box<dyn VideoDecoder>, DecoderError> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDecoder {
            size: self.size,
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

struct ScriptedDecoder {
    size: Size,
    counters: Arc<DecoderCounters>,
    closed: bool,
}

impl VideoDecoder for ScriptedDecoder {
    fn configure(&mut self, _config: &[u8]) -> Result<(), DecoderError> {
        Ok(())
    }

    fn decode(&mut self, _unit: &AccessUnit) -> Result<Option<Size>, DecoderError> {
        let failing = self
            .counters
            .fail_decodes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DecoderError::Buffer("simulated buffer error".to_string()));
        }
        self.counters.decoded.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.size))
    }

    fn reset(&mut self) -> Result<(), DecoderError> {
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::Generation;

    #[tokio::test]
    async fn test_scripted_connector_fails_then_succeeds() {
        // Arrange
        let connector = ScriptedConnector::new();
        connector.fail_next_opens(1);
        let (tx, _rx) = mpsc::channel(1);
        let target = TransportTarget {
            device: DeviceId::from("emulator-5554"),
            generation: Generation(1),
        };

        // Act
        let first = connector.open(target.clone(), tx.clone()).await;
        let second = connector.open(target, tx).await;

        // Assert
        assert!(first.is_err());
        assert!(second.is_ok());
        assert_eq!(connector.opens().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_handle_counts_one_close() {
        let connector = ScriptedConnector::new();
        let (tx, _rx) = mpsc::channel(1);
        let target = TransportTarget {
            device: DeviceId::from("emulator-5554"),
            generation: Generation(1),
        };
        let mut handle = connector.open(target, tx).await.unwrap();

        handle.close();
        handle.close();

        assert_eq!(connector.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_controller_records_nothing() {
        let controller = RecordingDeviceController {
            should_fail: true,
            ..RecordingDeviceController::default()
        };

        let result = controller
            .tap(&DeviceId::from("emulator-5554"), DevicePoint::new(1, 1))
            .await;

        assert!(result.is_err());
        assert!(controller.commands.lock().unwrap().is_empty());
        assert!(controller.targets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_launcher_fails_then_stops_once() {
        // Arrange
        let launcher = ScriptedLauncher::new();
        launcher.fail_next_launches(1);
        let device = DeviceId::from("emulator-5554");

        // Act
        let first = launcher.launch(&device).await;
        let mut second = launcher.launch(&device).await.unwrap();
        second.stop();
        second.stop();

        // Assert
        assert!(first.is_err());
        assert_eq!(launcher.launches().len(), 2);
        assert_eq!(launcher.stopped_count(), 1);
    }
}
