//! JSON-lines bridge to the embedding UI process.
//!
//! The UI (a desktop shell, a browser host, or a test script) talks to the
//! client over stdin/stdout, one JSON object per line.
//!
//! # Wire format (for beginners)
//!
//! Every message carries a `"type"` tag naming its variant, plus that
//! variant's fields:
//!
//! ```text
//! UI → client (stdin)                                client → UI (stdout)
//! ────────────────────────────────────────────────────────────────────────
//! {"type":"connect","device":"emulator-5554"}        {"type":"ready","device":"emulator-5554"}
//! {"type":"viewport","width":800,"height":600}       {"type":"resized","device":"…","width":576,"height":1280}
//! {"type":"pointer_down","x":120.5,"y":300.0}        {"type":"state","status":{...}}
//! {"type":"wheel","x":10,"y":20,"delta_x":0,"delta_y":40}
//! {"type":"teardown"}                                {"type":"closed","device":"emulator-5554"}
//! ```
//!
//! Pointer coordinates are relative to the top-left corner of the element
//! that shows the video.  Wheel deltas follow browser conventions: positive
//! `delta_y` scrolls down.

use std::io::Write;
use std::sync::Mutex;

use mirror_core::{DeviceId, Size};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::application::session::{SessionListener, SessionStatus};

/// Messages accepted from the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCommand {
    Connect { device: String },
    Teardown,
    Viewport { width: u32, height: u32 },
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    PointerLeave,
    Wheel {
        x: f64,
        y: f64,
        #[serde(default)]
        delta_x: f64,
        delta_y: f64,
    },
    Shutdown,
}

/// Messages emitted to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiNotification {
    Ready { device: DeviceId },
    Closed { device: DeviceId },
    Fallback { device: DeviceId },
    Resized { device: DeviceId, width: u32, height: u32 },
    State { status: SessionStatus },
    Error { message: String },
}

/// Parses one inbound line.
///
/// # Errors
///
/// Returns the `serde_json` error for malformed or unknown messages.
pub fn parse_command(line: &str) -> Result<UiCommand, serde_json::Error> {
    serde_json::from_str(line.trim())
}

/// Session listener that writes each notification as one JSON line.
pub struct JsonLinesListener {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesListener {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Writes `notification` and flushes.  Failures are logged, never raised:
    /// a UI that stopped reading must not take the session down.
    pub fn emit(&self, notification: &UiNotification) {
        let line = match serde_json::to_string(notification) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to encode UI notification: {e}");
                return;
            }
        };
        let Ok(mut out) = self.out.lock() else {
            warn!("UI output lock poisoned");
            return;
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!("failed to write UI notification: {e}");
        }
    }
}

impl SessionListener for JsonLinesListener {
    fn on_ready(&self, device: &DeviceId) {
        self.emit(&UiNotification::Ready {
            device: device.clone(),
        });
    }

    fn on_closed(&self, device: &DeviceId) {
        self.emit(&UiNotification::Closed {
            device: device.clone(),
        });
    }

    fn on_fallback(&self, device: &DeviceId) {
        self.emit(&UiNotification::Fallback {
            device: device.clone(),
        });
    }

    fn on_state_changed(&self, status: &SessionStatus) {
        self.emit(&UiNotification::State {
            status: status.clone(),
        });
    }

    fn on_stream_resized(&self, device: &DeviceId, size: Size) {
        self.emit(&UiNotification::Resized {
            device: device.clone(),
            width: size.width,
            height: size.height,
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// `Write` sink shared with the test so output can be inspected.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn test_parse_connect_command() {
        let cmd = parse_command(r#"{"type":"connect","device":"emulator-5554"}"#).unwrap();
        assert_eq!(
            cmd,
            UiCommand::Connect {
                device: "emulator-5554".to_string()
            }
        );
    }

    #[test]
    fn test_parse_wheel_defaults_horizontal_delta() {
        // Act
        let cmd = parse_command(r#"{"type":"wheel","x":10,"y":20,"delta_y":-40.5}"#).unwrap();

        // Assert
        assert_eq!(
            cmd,
            UiCommand::Wheel {
                x: 10.0,
                y: 20.0,
                delta_x: 0.0,
                delta_y: -40.5
            }
        );
    }

    #[test]
    fn test_parse_unit_variants_and_whitespace() {
        assert_eq!(parse_command("  {\"type\":\"teardown\"}\n").unwrap(), UiCommand::Teardown);
        assert_eq!(
            parse_command(r#"{"type":"pointer_leave"}"#).unwrap(),
            UiCommand::PointerLeave
        );
    }

    #[test]
    fn test_parse_unknown_type_is_an_error() {
        assert!(parse_command(r#"{"type":"explode"}"#).is_err());
        assert!(parse_command("not json").is_err());
    }

    #[test]
    fn test_listener_writes_one_line_per_notification() {
        // Arrange
        let buffer = SharedBuffer::default();
        let listener = JsonLinesListener::new(Box::new(buffer.clone()));
        let device = DeviceId::from("emulator-5554");

        // Act
        listener.on_ready(&device);
        listener.on_stream_resized(&device, Size::new(576, 1280));
        listener.on_closed(&device);

        // Assert
        let lines = buffer.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], r#"{"type":"ready","device":"emulator-5554"}"#);
        assert_eq!(
            lines[1],
            r#"{"type":"resized","device":"emulator-5554","width":576,"height":1280}"#
        );
        assert_eq!(lines[2], r#"{"type":"closed","device":"emulator-5554"}"#);
    }

    #[test]
    fn test_state_notification_uses_lowercase_state() {
        let buffer = SharedBuffer::default();
        let listener = JsonLinesListener::new(Box::new(buffer.clone()));
        let status = SessionStatus {
            session_id: uuid::Uuid::nil(),
            device: None,
            state: crate::application::session::SessionState::Connecting,
            generation: crate::application::session::Generation(4),
            device_size: None,
            stream_size: None,
        };

        listener.on_state_changed(&status);

        let line = &buffer.lines()[0];
        assert!(line.contains(r#""state":"connecting""#), "{line}");
        assert!(line.contains(r#""generation":4"#), "{line}");
    }
}
