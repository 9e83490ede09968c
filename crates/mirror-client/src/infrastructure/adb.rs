//! `adb`-backed device command channel, metadata query and stream server
//! launcher.
//!
//! Touch input goes through `adb shell input`:
//!
//! ```text
//! tap          → input tap X Y
//! touch_down   → input motionevent DOWN X Y
//! touch_move   → input motionevent MOVE X Y
//! touch_up     → input motionevent UP X Y
//! swipe        → input swipe X0 Y0 X1 Y1 DURATION_MS
//! ```
//!
//! The native resolution comes from `adb shell wm size`.  When a size
//! override is active the device renders (and accepts input) at the override
//! size, so it takes precedence over the physical size.
//!
//! # Server lifecycle
//!
//! [`AdbServerLauncher`] prepares the device before every connection:
//!
//! 1. kill any server left over from an earlier run and remove its forward;
//! 2. push the server jar to `/data/local/tmp/scrcpy-server`;
//! 3. `adb forward tcp:PORT localabstract:scrcpy`;
//! 4. start the server with `app_process` and give it time to bind.  If it
//!    exits complaining that the address is in use, clean up and try again.
//!
//! Stopping the returned handle kills the server and removes the forward.
//!
//! Every `adb` invocation goes through [`AdbRunner`], so the launcher and the
//! controller can be driven by a scripted runner in tests.

use std::path::PathBuf;
use std::process::{Command as StdCommand, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mirror_core::{DeviceCommand, DeviceId, DevicePoint, Size, StreamHeaderOptions};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, trace, warn};

use crate::application::control::DeviceController;
use crate::application::session::{
    DeviceMetadataSource, LaunchError, MetadataError, ServerHandle, ServerLauncher,
};

/// Where the server jar is pushed on the device.
pub const REMOTE_SERVER_PATH: &str = "/data/local/tmp/scrcpy-server";
/// Abstract socket the server listens on when tunnelled through a forward.
pub const SERVER_SOCKET_NAME: &str = "scrcpy";
const SERVER_CLASS: &str = "com.genymobile.scrcpy.Server";
const ADDRESS_IN_USE: &str = "Address already in use";

/// Errors running `adb`.
#[derive(Debug, Error)]
pub enum AdbError {
    /// The executable could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// `adb` ran and reported failure.
    #[error("`adb {command}` failed: {detail}")]
    Failed { command: String, detail: String },
}

impl From<AdbError> for LaunchError {
    fn from(e: AdbError) -> Self {
        LaunchError::Adb(e.to_string())
    }
}

// ── Runner ────────────────────────────────────────────────────────────────────

/// Runs `adb` with a given argument list.
#[async_trait]
pub trait AdbRunner: Send + Sync {
    /// Runs to completion and returns stdout.
    async fn output(&self, args: &[String]) -> Result<String, AdbError>;

    /// Starts a long-running command without waiting for it.
    fn spawn(&self, args: &[String]) -> Result<Box<dyn AdbProcess>, AdbError>;
}

/// A command started with [`AdbRunner::spawn`].
#[async_trait]
pub trait AdbProcess: Send {
    /// The process output if it has already exited, `None` while it runs.
    async fn exited(&mut self) -> Option<String>;

    fn kill(&mut self);
}

/// Runs the real `adb` executable.
pub struct TokioAdbRunner {
    adb: PathBuf,
}

impl TokioAdbRunner {
    pub fn new(adb: PathBuf) -> Self {
        Self { adb }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.adb);
        command.args(args).stdin(Stdio::null());
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> AdbError {
        AdbError::Spawn {
            program: self.adb.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl AdbRunner for TokioAdbRunner {
    async fn output(&self, args: &[String]) -> Result<String, AdbError> {
        trace!(adb = %self.adb.display(), ?args, "running adb");
        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdbError::Failed {
                command: args.join(" "),
                detail: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn(&self, args: &[String]) -> Result<Box<dyn AdbProcess>, AdbError> {
        debug!(adb = %self.adb.display(), ?args, "spawning adb");
        let child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;
        Ok(Box::new(TokioAdbProcess { child }))
    }
}

struct TokioAdbProcess {
    child: Child,
}

#[async_trait]
impl AdbProcess for TokioAdbProcess {
    async fn exited(&mut self) -> Option<String> {
        match self.child.try_wait() {
            Ok(None) => None,
            Ok(Some(status)) => {
                let mut text = String::new();
                if let Some(mut stderr) = self.child.stderr.take() {
                    let _ = stderr.read_to_string(&mut text).await;
                }
                if let Some(mut stdout) = self.child.stdout.take() {
                    let _ = stdout.read_to_string(&mut text).await;
                }
                Some(format!("{status}: {}", text.trim()))
            }
            Err(e) => Some(format!("could not poll process: {e}")),
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("server process already gone: {e}");
        }
    }
}

// ── Input ─────────────────────────────────────────────────────────────────────

/// Builds the `adb` argument list for `command` on device `serial`.
pub fn input_args(serial: &DeviceId, command: &DeviceCommand) -> Vec<String> {
    let mut args = device_args(serial);
    args.push("shell".to_string());
    args.push("input".to_string());
    let point = |p: DevicePoint| [p.x.to_string(), p.y.to_string()];
    match *command {
        DeviceCommand::Tap { at } => {
            args.push("tap".to_string());
            args.extend(point(at));
        }
        DeviceCommand::TouchDown { at } => motion(&mut args, "DOWN", point(at)),
        DeviceCommand::TouchMove { at } => motion(&mut args, "MOVE", point(at)),
        DeviceCommand::TouchUp { at } => motion(&mut args, "UP", point(at)),
        DeviceCommand::Swipe {
            from,
            to,
            duration_ms,
        } => {
            args.push("swipe".to_string());
            args.extend(point(from));
            args.extend(point(to));
            args.push(duration_ms.to_string());
        }
    }
    args
}

fn device_args(serial: &DeviceId) -> Vec<String> {
    vec!["-s".to_string(), serial.as_str().to_string()]
}

fn motion(args: &mut Vec<String>, action: &str, at: [String; 2]) {
    args.push("motionevent".to_string());
    args.push(action.to_string());
    args.extend(at);
}

/// Parses `wm size` output.  `Override size` wins over `Physical size`.
pub fn parse_wm_size(output: &str) -> Result<Size, MetadataError> {
    let mut physical = None;
    let mut overridden = None;
    for line in output.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let size = parse_dimensions(value.trim());
        match label.trim() {
            "Physical size" => physical = size,
            "Override size" => overridden = size,
            _ => {}
        }
    }
    overridden
        .or(physical)
        .ok_or_else(|| MetadataError::Parse(output.trim().to_string()))
}

fn parse_dimensions(value: &str) -> Option<Size> {
    let (w, h) = value.split_once('x')?;
    let size = Size::new(w.trim().parse().ok()?, h.trim().parse().ok()?);
    (!size.is_empty()).then_some(size)
}

/// Sends touch input to the device each command is addressed to.
pub struct AdbDeviceController {
    runner: Arc<dyn AdbRunner>,
}

impl AdbDeviceController {
    pub fn new(runner: Arc<dyn AdbRunner>) -> Self {
        Self { runner }
    }

    async fn run(&self, device: &DeviceId, command: DeviceCommand) -> Result<(), String> {
        self.runner
            .output(&input_args(device, &command))
            .await
            .map(|_| ())
            .map_err(|e| format!("{} on {device}: {e}", command.name()))
    }
}

#[async_trait]
impl DeviceController for AdbDeviceController {
    async fn tap(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String> {
        self.run(device, DeviceCommand::Tap { at }).await
    }

    async fn touch_down(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String> {
        self.run(device, DeviceCommand::TouchDown { at }).await
    }

    async fn touch_move(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String> {
        self.run(device, DeviceCommand::TouchMove { at }).await
    }

    async fn touch_up(&self, device: &DeviceId, at: DevicePoint) -> Result<(), String> {
        self.run(device, DeviceCommand::TouchUp { at }).await
    }

    async fn swipe(
        &self,
        device: &DeviceId,
        from: DevicePoint,
        to: DevicePoint,
        duration_ms: u64,
    ) -> Result<(), String> {
        self.run(
            device,
            DeviceCommand::Swipe {
                from,
                to,
                duration_ms,
            },
        )
        .await
    }
}

/// Queries the native resolution with `adb shell wm size`.
pub struct AdbMetadataSource {
    adb: PathBuf,
}

impl AdbMetadataSource {
    pub fn new(adb: PathBuf) -> Self {
        Self { adb }
    }
}

impl DeviceMetadataSource for AdbMetadataSource {
    fn device_size(&self, device: &DeviceId) -> Result<Size, MetadataError> {
        let output = StdCommand::new(&self.adb)
            .args(["-s", device.as_str(), "shell", "wm", "size"])
            .output()
            .map_err(|e| MetadataError::Command(format!("{}: {e}", self.adb.display())))?;
        if !output.status.success() {
            return Err(MetadataError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(%device, output = %stdout.trim(), "wm size");
        parse_wm_size(&stdout)
    }
}

// ── Server launcher ───────────────────────────────────────────────────────────

/// How the device server is installed and started.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Server jar on this machine.
    pub jar: PathBuf,
    /// Must match the jar; the server refuses to start otherwise.
    pub version: String,
    /// Local end of `adb forward`; the video socket connects here.
    pub local_port: u16,
    pub max_size: u32,
    pub bit_rate: u32,
    pub max_fps: u32,
    /// Seconds between forced keyframes.
    pub keyframe_interval_s: u32,
    pub header: StreamHeaderOptions,
    /// Pause after killing a stale server so the device releases its socket.
    pub settle: Duration,
    /// How long a fresh server gets to bind before it is checked.
    pub startup_wait: Duration,
    pub retry_delay: Duration,
    pub launch_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            jar: PathBuf::from("scrcpy-server"),
            version: "3.3.3".to_string(),
            local_port: 27183,
            max_size: 1280,
            bit_rate: 1_000_000,
            max_fps: 20,
            keyframe_interval_s: 1,
            header: StreamHeaderOptions::default(),
            settle: Duration::from_secs(2),
            startup_wait: Duration::from_secs(2),
            retry_delay: Duration::from_secs(2),
            launch_attempts: 3,
        }
    }
}

/// `adb` arguments that start the server on `serial`.
pub fn server_args(serial: &DeviceId, config: &ServerConfig) -> Vec<String> {
    let flag = |key: &str, value: bool| format!("{key}={value}");
    let mut args = device_args(serial);
    args.extend([
        "shell".to_string(),
        format!("CLASSPATH={REMOTE_SERVER_PATH}"),
        "app_process".to_string(),
        "/".to_string(),
        SERVER_CLASS.to_string(),
        config.version.clone(),
        format!("max_size={}", config.max_size),
        format!("video_bit_rate={}", config.bit_rate),
        format!("max_fps={}", config.max_fps),
        flag("tunnel_forward", true),
        flag("audio", false),
        flag("control", false),
        flag("cleanup", false),
        format!("video_codec={}", config.header.codec.name()),
        flag("send_frame_meta", config.header.send_frame_meta),
        flag("send_device_meta", config.header.send_device_meta),
        flag("send_codec_meta", config.header.send_codec_meta),
        flag("send_dummy_byte", config.header.send_dummy_byte),
        format!(
            "video_codec_options=i-frame-interval={}",
            config.keyframe_interval_s
        ),
    ]);
    args
}

fn forward_args(serial: &DeviceId, port: u16) -> Vec<String> {
    let mut args = device_args(serial);
    args.extend([
        "forward".to_string(),
        format!("tcp:{port}"),
        format!("localabstract:{SERVER_SOCKET_NAME}"),
    ]);
    args
}

fn remove_forward_args(serial: &DeviceId, port: u16) -> Vec<String> {
    let mut args = device_args(serial);
    args.extend([
        "forward".to_string(),
        "--remove".to_string(),
        format!("tcp:{port}"),
    ]);
    args
}

/// Installs and starts the stream server over `adb`.
pub struct AdbServerLauncher {
    runner: Arc<dyn AdbRunner>,
    config: ServerConfig,
}

impl AdbServerLauncher {
    pub fn new(runner: Arc<dyn AdbRunner>, config: ServerConfig) -> Self {
        Self { runner, config }
    }

    /// Kills leftover servers and removes the forward.  Failures are expected
    /// when nothing was running.
    async fn cleanup(&self, device: &DeviceId) {
        let mut kill = device_args(device);
        kill.extend(["shell", "pkill", "-9", "-f", "app_process.*scrcpy"].map(String::from));
        if let Err(e) = self.runner.output(&kill).await {
            trace!(%device, "no stale server killed: {e}");
        }
        let remove = remove_forward_args(device, self.config.local_port);
        if let Err(e) = self.runner.output(&remove).await {
            trace!(%device, "no stale forward removed: {e}");
        }
        tokio::time::sleep(self.config.settle).await;
    }

    async fn push(&self, device: &DeviceId) -> Result<(), AdbError> {
        let mut args = device_args(device);
        args.extend([
            "push".to_string(),
            self.config.jar.display().to_string(),
            REMOTE_SERVER_PATH.to_string(),
        ]);
        self.runner.output(&args).await.map(|_| ())
    }

    async fn forward(&self, device: &DeviceId) -> Result<(), AdbError> {
        let args = forward_args(device, self.config.local_port);
        self.runner.output(&args).await.map(|_| ())
    }

    async fn remove_forward(&self, device: &DeviceId) {
        let args = remove_forward_args(device, self.config.local_port);
        if let Err(e) = self.runner.output(&args).await {
            warn!(%device, "failed to remove port forward: {e}");
        }
    }

    async fn start(&self, device: &DeviceId) -> Result<Box<dyn AdbProcess>, LaunchError> {
        let args = server_args(device, &self.config);
        let attempts = self.config.launch_attempts.max(1);
        for attempt in 1..=attempts {
            info!(%device, attempt, "starting device server");
            let mut process = self.runner.spawn(&args)?;
            tokio::time::sleep(self.config.startup_wait).await;
            let Some(output) = process.exited().await else {
                return Ok(process);
            };
            if !output.contains(ADDRESS_IN_USE) {
                return Err(LaunchError::Exited(output));
            }
            if attempt < attempts {
                warn!(%device, attempt, retry_in = ?self.config.retry_delay, "server port in use; retrying");
                self.cleanup(device).await;
                tokio::time::sleep(self.config.retry_delay).await;
                self.forward(device).await?;
            }
        }
        Err(LaunchError::AddressInUse { attempts })
    }
}

#[async_trait]
impl ServerLauncher for AdbServerLauncher {
    async fn launch(&self, device: &DeviceId) -> Result<Box<dyn ServerHandle>, LaunchError> {
        debug!(%device, "cleaning up stale server");
        self.cleanup(device).await;
        self.push(device).await?;
        self.forward(device).await?;

        match self.start(device).await {
            Ok(process) => {
                info!(%device, port = self.config.local_port, "device server running");
                Ok(Box::new(AdbServerHandle {
                    runner: Arc::clone(&self.runner),
                    device: device.clone(),
                    port: self.config.local_port,
                    process: Some(process),
                }))
            }
            Err(e) => {
                self.remove_forward(device).await;
                Err(e)
            }
        }
    }
}

/// A running server.  Stopped on drop if not stopped explicitly.
pub struct AdbServerHandle {
    runner: Arc<dyn AdbRunner>,
    device: DeviceId,
    port: u16,
    process: Option<Box<dyn AdbProcess>>,
}

impl ServerHandle for AdbServerHandle {
    fn stop(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        info!(device = %self.device, "stopping device server");
        process.kill();

        // Forward removal needs an `adb` round trip; run it in the background.
        let args = remove_forward_args(&self.device, self.port);
        let runner = Arc::clone(&self.runner);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = runner.output(&args).await {
                        warn!("failed to remove port forward: {e}");
                    }
                });
            }
            Err(_) => warn!(device = %self.device, "no runtime; port forward left in place"),
        }
    }
}

impl Drop for AdbServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::ScriptedAdbRunner;

    fn serial() -> DeviceId {
        DeviceId::from("R58M123ABC")
    }

    #[test]
    fn test_tap_args() {
        let args = input_args(&serial(), &DeviceCommand::Tap { at: DevicePoint::new(540, 1200) });
        assert_eq!(args, ["-s", "R58M123ABC", "shell", "input", "tap", "540", "1200"]);
    }

    #[test]
    fn test_touch_primitives_use_motionevent() {
        // Arrange
        let at = DevicePoint::new(10, 20);

        // Act
        let down = input_args(&serial(), &DeviceCommand::TouchDown { at });
        let up = input_args(&serial(), &DeviceCommand::TouchUp { at });

        // Assert
        assert_eq!(&down[4..], ["motionevent", "DOWN", "10", "20"]);
        assert_eq!(&up[4..], ["motionevent", "UP", "10", "20"]);
    }

    #[test]
    fn test_swipe_args_include_duration() {
        let args = input_args(
            &serial(),
            &DeviceCommand::Swipe {
                from: DevicePoint::new(500, 1000),
                to: DevicePoint::new(500, 800),
                duration_ms: 150,
            },
        );
        assert_eq!(&args[4..], ["swipe", "500", "1000", "500", "800", "150"]);
    }

    #[test]
    fn test_parse_wm_size_physical_only() {
        let size = parse_wm_size("Physical size: 1080x2400\n").unwrap();
        assert_eq!(size, Size::new(1080, 2400));
    }

    #[test]
    fn test_parse_wm_size_override_wins() {
        // Arrange
        let output = "Physical size: 1440x3120\nOverride size: 1080x2340\n";

        // Act
        let size = parse_wm_size(output).unwrap();

        // Assert
        assert_eq!(size, Size::new(1080, 2340));
    }

    #[test]
    fn test_parse_wm_size_rejects_garbage() {
        assert!(matches!(
            parse_wm_size("error: device offline"),
            Err(MetadataError::Parse(_))
        ));
        assert!(parse_wm_size("Physical size: 0x0").is_err());
    }

    #[tokio::test]
    async fn test_controller_addresses_the_given_device() {
        // Arrange
        let runner = Arc::new(ScriptedAdbRunner::new());
        let controller = AdbDeviceController::new(runner.clone());

        // Act
        controller.tap(&serial(), DevicePoint::new(540, 1200)).await.unwrap();
        controller
            .tap(&DeviceId::from("emulator-5554"), DevicePoint::new(1, 2))
            .await
            .unwrap();

        // Assert
        assert_eq!(
            runner.calls(),
            [
                "-s R58M123ABC shell input tap 540 1200",
                "-s emulator-5554 shell input tap 1 2",
            ]
        );
    }

    #[tokio::test]
    async fn test_controller_reports_adb_failure() {
        let runner = Arc::new(ScriptedAdbRunner::new());
        runner.fail_when("input swipe");
        let controller = AdbDeviceController::new(runner);

        let result = controller
            .swipe(&serial(), DevicePoint::new(0, 0), DevicePoint::new(0, 10), 100)
            .await;

        let message = result.unwrap_err();
        assert!(message.starts_with("swipe on R58M123ABC"), "{message}");
    }

    fn fast_config() -> ServerConfig {
        ServerConfig {
            jar: PathBuf::from("/opt/scrcpy/scrcpy-server"),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_server_args_follow_header_options() {
        // Arrange
        let mut config = fast_config();
        config.header.send_dummy_byte = false;

        // Act
        let args = server_args(&serial(), &config);

        // Assert
        assert_eq!(
            &args[..8],
            [
                "-s",
                "R58M123ABC",
                "shell",
                "CLASSPATH=/data/local/tmp/scrcpy-server",
                "app_process",
                "/",
                "com.genymobile.scrcpy.Server",
                "3.3.3",
            ]
        );
        assert!(args.contains(&"tunnel_forward=true".to_string()));
        assert!(args.contains(&"video_codec=h264".to_string()));
        assert!(args.contains(&"send_dummy_byte=false".to_string()));
        assert!(args.contains(&"max_size=1280".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("video_codec_options=i-frame-interval=1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_cleans_up_pushes_and_forwards_before_starting() {
        // Arrange
        let runner = Arc::new(ScriptedAdbRunner::new());
        let launcher = AdbServerLauncher::new(runner.clone(), fast_config());

        // Act
        let handle = launcher.launch(&serial()).await;

        // Assert
        assert!(handle.is_ok());
        let calls = runner.calls();
        assert_eq!(calls[0], "-s R58M123ABC shell pkill -9 -f app_process.*scrcpy");
        assert_eq!(calls[1], "-s R58M123ABC forward --remove tcp:27183");
        assert_eq!(
            calls[2],
            "-s R58M123ABC push /opt/scrcpy/scrcpy-server /data/local/tmp/scrcpy-server"
        );
        assert_eq!(calls[3], "-s R58M123ABC forward tcp:27183 localabstract:scrcpy");
        assert!(calls[4].contains("com.genymobile.scrcpy.Server"));
        assert_eq!(runner.spawned(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_in_use_is_retried_after_cleanup() {
        // Arrange – the first server finds the port taken, the second runs
        let runner = Arc::new(ScriptedAdbRunner::new());
        runner.script_exits([Some("java.net.BindException: Address already in use"), None]);
        let launcher = AdbServerLauncher::new(runner.clone(), fast_config());
        let started = tokio::time::Instant::now();

        // Act
        let handle = launcher.launch(&serial()).await;

        // Assert – settle, wait, settle, retry delay, wait
        assert!(handle.is_ok());
        assert_eq!(runner.spawned(), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        let forwards = runner
            .calls()
            .iter()
            .filter(|c| c.ends_with("localabstract:scrcpy"))
            .count();
        assert_eq!(forwards, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_in_use_on_every_attempt_gives_up() {
        // Arrange
        let runner = Arc::new(ScriptedAdbRunner::new());
        let in_use = Some("bind failed: Address already in use");
        runner.script_exits([in_use, in_use, in_use]);
        let launcher = AdbServerLauncher::new(runner.clone(), fast_config());

        // Act
        let result = launcher.launch(&serial()).await;

        // Assert
        assert!(matches!(result, Err(LaunchError::AddressInUse { attempts: 3 })));
        assert_eq!(runner.spawned(), 3);
        assert_eq!(
            runner.calls().last().map(String::as_str),
            Some("-s R58M123ABC forward --remove tcp:27183")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_server_exit_fails_without_retry() {
        let runner = Arc::new(ScriptedAdbRunner::new());
        runner.script_exits([Some("java.lang.ClassNotFoundException")]);
        let launcher = AdbServerLauncher::new(runner.clone(), fast_config());

        let result = launcher.launch(&serial()).await;

        assert!(matches!(result, Err(LaunchError::Exited(ref out)) if out.contains("ClassNotFound")));
        assert_eq!(runner.spawned(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_push_aborts_launch() {
        let runner = Arc::new(ScriptedAdbRunner::new());
        runner.fail_when(" push ");
        let launcher = AdbServerLauncher::new(runner.clone(), fast_config());

        let result = launcher.launch(&serial()).await;

        assert!(matches!(result, Err(LaunchError::Adb(_))));
        assert_eq!(runner.spawned(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_kills_server_and_removes_forward_once() {
        // Arrange
        let runner = Arc::new(ScriptedAdbRunner::new());
        let launcher = AdbServerLauncher::new(runner.clone(), fast_config());
        let mut handle = launcher.launch(&serial()).await.unwrap();
        let calls_before = runner.calls().len();

        // Act
        handle.stop();
        handle.stop();
        drop(handle);
        tokio::task::yield_now().await;

        // Assert
        assert_eq!(runner.killed(), 1);
        assert_eq!(
            &runner.calls()[calls_before..],
            ["-s R58M123ABC forward --remove tcp:27183"]
        );
    }
}
