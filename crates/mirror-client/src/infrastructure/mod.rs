//! Infrastructure layer for the mirroring client.
//!
//! Contains the adapters that touch the outside world: the TCP video socket,
//! the `adb` command line, configuration on disk, and the JSON-lines bridge to
//! the embedding UI.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `mirror_core`, but MUST NOT be imported by the `application` layer (the
//! test doubles in `mock` are the only exception, and only from tests).
//!
//! # Sub-modules
//!
//! - **`adb`** – `DeviceController`, `DeviceMetadataSource` and
//!   `ServerLauncher` backed by the `adb` command line.
//! - **`mock`** – recording test doubles for every application-layer trait.
//! - **`openh264_decoder`** – software H.264 `VideoDecoder` on Cisco OpenH264.
//! - **`storage`** – TOML configuration persistence.
//! - **`transport`** – TCP connector for the forwarded video socket.
//! - **`ui_bridge`** – newline-delimited JSON commands and notifications.

pub mod adb;
pub mod mock;
pub mod openh264_decoder;
pub mod storage;
pub mod transport;
pub mod ui_bridge;
