//! # mirror-core
//!
//! Shared library for the device mirroring client containing the video stream
//! reassembler, the scrcpy socket parser, and the pointer-to-device input logic.
//!
//! This crate has zero dependencies on OS APIs, UI frameworks, async runtimes,
//! or network sockets.  Every type is driven by explicit method calls and
//! explicit timestamps, so the whole crate can be unit-tested deterministically.
//!
//! # Architecture overview (for beginners)
//!
//! The client shows a live picture of a remote device (for example an Android
//! phone) and turns clicks, drags, and mouse-wheel input on that picture into
//! touch commands executed on the device.
//!
//! - **`protocol`** – How video bytes arrive.  Either as a raw H.264/H.265
//!   Annex-B byte stream (units separated by start codes) or as discrete
//!   packets tagged `configuration` or `data`.  The [`FrameReassembler`] turns
//!   both into complete [`AccessUnit`]s in the order a decoder needs them.
//!
//! - **`domain`** – Pure input logic.  The [`CoordinateMapper`] converts a
//!   pointer position on screen into device pixels through the letterboxed,
//!   downscaled video; the [`GestureClassifier`] decides between taps and
//!   drags; the [`ScrollTranslator`] turns wheel bursts into single swipes.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mirror_core::FrameReassembler` instead of the full module path.
pub use domain::device::{DeviceCommand, DeviceId};
pub use domain::geometry::{CoordinateMapper, DeviceGeometry, DevicePoint, Rect, ScreenPoint, Size};
pub use domain::gesture::{GestureClassifier, GestureConfig};
pub use domain::scroll::{ScrollConfig, ScrollTranslator};
pub use protocol::reassembly::{
    AccessUnit, ChunkAlignment, FrameReassembler, Ingress, ReadySegments, ReassemblerConfig,
    ReassemblyError, ReassemblyMode, UnitKind,
};
pub use protocol::scrcpy::{
    MediaPacket, MediaStreamParser, PacketKind, ProtocolError, StreamHeaderOptions, StreamItem,
    VideoCodec, VideoStreamMetadata,
};
