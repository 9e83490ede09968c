//! mirror-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does mirror-client do? (for beginners)
//!
//! The client shows the screen of an Android device and lets the user operate
//! it with mouse and wheel.  Two independent channels are involved:
//!
//! 1. **Video** – a TCP socket (usually an `adb forward` of the scrcpy server
//!    socket) carrying H.264/H.265 data.  The [`application::session`] state
//!    machine owns that connection, reassembles the byte stream into access
//!    units, feeds a decoder, and reconnects when things go wrong.
//! 2. **Control** – discrete `adb shell input ...` commands.  The
//!    [`application::control`] pointer controller turns UI pointer events into
//!    taps, touch sequences, and swipes, and refuses to send anything for a
//!    session that is not connected.

/// Application layer: session lifecycle, decoding, recovery, and input control.
pub mod application;

/// Infrastructure layer: TCP transport, adb adapter, config, and UI bridge.
pub mod infrastructure;
