//! Device identity and command vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::geometry::DevicePoint;

/// Identifier of a mirrored device (an ADB serial such as `emulator-5554`
/// or `192.168.1.20:5555`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A discrete touch primitive executed on the device, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceCommand {
    Tap { at: DevicePoint },
    TouchDown { at: DevicePoint },
    TouchMove { at: DevicePoint },
    TouchUp { at: DevicePoint },
    Swipe {
        from: DevicePoint,
        to: DevicePoint,
        duration_ms: u64,
    },
}

impl DeviceCommand {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::Tap { .. } => "tap",
            DeviceCommand::TouchDown { .. } => "touch_down",
            DeviceCommand::TouchMove { .. } => "touch_move",
            DeviceCommand::TouchUp { .. } => "touch_up",
            DeviceCommand::Swipe { .. } => "swipe",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_displays_raw_serial() {
        assert_eq!(DeviceId::from("emulator-5554").to_string(), "emulator-5554");
    }

    #[test]
    fn test_command_names_match_wire_vocabulary() {
        let p = DevicePoint::new(1, 2);
        assert_eq!(DeviceCommand::Tap { at: p }.name(), "tap");
        assert_eq!(
            DeviceCommand::Swipe {
                from: p,
                to: p,
                duration_ms: 100
            }
            .name(),
            "swipe"
        );
    }
}
