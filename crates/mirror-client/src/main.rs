//! MirrorLink client entry point.
//!
//! Mirrors an Android device's screen and forwards pointer input to it.  The
//! process is driven by an embedding UI over stdin/stdout (newline-delimited
//! JSON, see `infrastructure::ui_bridge`); log output goes to stderr so it
//! never mixes with that channel.
//!
//! # Usage
//!
//! ```text
//! mirror-client [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Config file [default: platform config dir]
//!   --device <SERIAL> Connect to this device at startup
//!   --host <HOST>     Host of the forwarded video socket
//!   --port <PORT>     Port of the forwarded video socket
//!   --adb <PATH>      adb executable
//!   --server-jar <PATH>
//!                     Server jar pushed to the device
//!   --no-server       Do not start the device server; something else does
//!   --print-config    Print the effective configuration and exit
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable         | Overrides        |
//! |------------------|------------------|
//! | `MIRROR_CONFIG`  | `--config`       |
//! | `MIRROR_DEVICE`  | `--device`       |
//! | `MIRROR_HOST`    | `--host`         |
//! | `MIRROR_PORT`    | `--port`         |
//! | `MIRROR_ADB`     | `--adb`          |
//! | `MIRROR_SERVER_JAR` | `--server-jar` |
//!
//! CLI flags and environment variables take precedence over the config file.
//!
//! # Architecture overview
//!
//! ```text
//! UI process  (JSON lines on stdin/stdout)
//!       ↕
//! mirror-client  ← this process
//!   PointerController ─► CommandDispatcher ── adb shell input ──► device
//!   MirrorSession ── adb push / forward / app_process ──► device server
//!   MirrorSession ◄── TCP (adb forward) ◄── device video socket
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context};
use clap::Parser;
use mirror_core::{DeviceId, ScreenPoint, Size};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mirror_client::application::control::PointerController;
use mirror_client::application::session::{
    command_channel, MirrorSession, ServerLauncher, SessionCommand, SessionDeps,
};
use mirror_client::infrastructure::adb::{
    AdbDeviceController, AdbMetadataSource, AdbServerLauncher, TokioAdbRunner,
};
use mirror_client::infrastructure::openh264_decoder::OpenH264DecoderFactory;
use mirror_client::infrastructure::storage::config::{load_config, AppConfig};
use mirror_client::infrastructure::transport::TcpTransportConnector;
use mirror_client::infrastructure::ui_bridge::{
    parse_command, JsonLinesListener, UiCommand, UiNotification,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// MirrorLink device mirroring client.
#[derive(Debug, Parser)]
#[command(
    name = "mirror-client",
    about = "Mirror an Android device screen and control it with the pointer",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "MIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Device serial to connect to at startup.
    #[arg(long, env = "MIRROR_DEVICE")]
    device: Option<String>,

    /// Host of the forwarded video socket.
    #[arg(long, env = "MIRROR_HOST")]
    host: Option<String>,

    /// Port of the forwarded video socket.
    #[arg(long, env = "MIRROR_PORT")]
    port: Option<u16>,

    /// Path to the `adb` executable.
    #[arg(long, env = "MIRROR_ADB")]
    adb: Option<PathBuf>,

    /// Server jar pushed to the device before each connection.
    #[arg(long, env = "MIRROR_SERVER_JAR")]
    server_jar: Option<PathBuf>,

    /// Assume the device server and port forward are already running.
    #[arg(long)]
    no_server: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Applies flags on top of the file configuration.
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(device) = &self.device {
            config.adb.device = Some(device.clone());
        }
        if let Some(host) = &self.host {
            config.stream.host = host.clone();
        }
        if let Some(port) = self.port {
            config.stream.port = port;
        }
        if let Some(adb) = &self.adb {
            config.adb.path = adb.clone();
        }
        if let Some(jar) = &self.server_jar {
            config.server.jar = jar.clone();
        }
        if self.no_server {
            config.server.enabled = false;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    // `RUST_LOG` wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .init();

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    info!(
        "mirror client starting: video={}:{}, adb={}",
        config.stream.host,
        config.stream.port,
        config.adb.path.display()
    );

    // ── Session ───────────────────────────────────────────────────────────────
    let runner = Arc::new(TokioAdbRunner::new(config.adb.path.clone()));
    let launcher = config.server.enabled.then(|| {
        Arc::new(AdbServerLauncher::new(runner.clone(), config.server_config()))
            as Arc<dyn ServerLauncher>
    });
    let deps = SessionDeps {
        connector: Arc::new(TcpTransportConnector::new(config.transport_config())),
        decoders: Arc::new(OpenH264DecoderFactory),
        metadata: Arc::new(AdbMetadataSource::new(config.adb.path.clone())),
        launcher,
    };
    let (mut session, events) = MirrorSession::new(config.session_config(), deps);
    let listener = Arc::new(JsonLinesListener::stdout());
    session.set_listener(Some(listener.clone()));
    let status = session.subscribe();
    let (commands, commands_rx) = command_channel();
    let session_task = tokio::spawn(session.run(commands_rx, events));

    // ── Input ─────────────────────────────────────────────────────────────────
    let controller = Arc::new(AdbDeviceController::new(runner));
    let (mut pointer, dispatcher) = PointerController::new(
        controller,
        status,
        config.gesture_config(),
        config.scroll_config(),
    );
    let dispatch_task = tokio::spawn(dispatcher.run());

    if let Some(device) = config.adb.device.clone() {
        send(&commands, SessionCommand::Connect(DeviceId::new(device))).await?;
    }

    // ── UI loop ───────────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let deadline = pointer.next_deadline();
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(command) => {
                        if !handle_ui_command(command, &mut pointer, &commands).await? {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("ignoring malformed UI command: {e}");
                        listener.emit(&UiNotification::Error {
                            message: format!("malformed command: {e}"),
                        });
                    }
                },
                Ok(None) => {
                    info!("stdin closed; shutting down");
                    break;
                }
                Err(e) => {
                    warn!("failed to read stdin: {e}");
                    break;
                }
            },
            () = sleep_until_opt(deadline) => pointer.tick(Instant::now()),
            result = &mut ctrl_c => {
                match result {
                    Ok(()) => info!("received Ctrl+C; shutting down"),
                    Err(e) => warn!("failed to listen for Ctrl+C: {e}"),
                }
                break;
            }
        }
    }

    if send(&commands, SessionCommand::Shutdown).await.is_err() {
        warn!("session loop already stopped");
    }
    session_task.await.context("session task failed")?;

    // Dropping the pointer closes the queue; the dispatcher drains and exits.
    let stats = pointer.stats();
    drop(pointer);
    dispatch_task.await.context("command dispatcher failed")?;

    info!(
        sent = stats.sent(),
        dropped = stats.dropped(),
        failed = stats.failed(),
        "mirror client stopped"
    );
    Ok(())
}

/// Applies one UI command.  Returns `false` when the UI asked to quit.
async fn handle_ui_command(
    command: UiCommand,
    pointer: &mut PointerController,
    commands: &mpsc::Sender<SessionCommand>,
) -> anyhow::Result<bool> {
    let now = Instant::now();
    match command {
        UiCommand::Connect { device } => {
            send(commands, SessionCommand::Connect(DeviceId::new(device))).await?
        }
        UiCommand::Teardown => send(commands, SessionCommand::Teardown).await?,
        UiCommand::Viewport { width, height } => {
            pointer.set_viewport(Some(Size::new(width, height)));
        }
        UiCommand::PointerDown { x, y } => pointer.pointer_down(ScreenPoint::new(x, y), now),
        UiCommand::PointerMove { x, y } => pointer.pointer_move(ScreenPoint::new(x, y), now),
        UiCommand::PointerUp { x, y } => pointer.pointer_up(ScreenPoint::new(x, y), now),
        UiCommand::PointerLeave => pointer.pointer_leave(),
        UiCommand::Wheel {
            x,
            y,
            delta_x,
            delta_y,
        } => pointer.wheel(ScreenPoint::new(x, y), delta_x, delta_y, now),
        UiCommand::Shutdown => return Ok(false),
    }
    Ok(true)
}

async fn send(commands: &mpsc::Sender<SessionCommand>, command: SessionCommand) -> anyhow::Result<()> {
    commands
        .send(command)
        .await
        .map_err(|_| anyhow!("session loop has stopped"))
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
