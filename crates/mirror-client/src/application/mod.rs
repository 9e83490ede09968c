//! Application layer use cases for the mirroring client.
//!
//! # What use cases does the client have?
//!
//! - **`session`** – The connection supervisor.  One [`session::MirrorSession`]
//!   per window: it connects to a device, pushes incoming video through the
//!   reassembler into the decoder, arms the fallback and reconnect timers,
//!   and reports `ready` / `closed` / `fallback` to the UI.
//!
//! - **`decoder`** – Wraps a platform video decoder behind the
//!   [`decoder::VideoDecoder`] trait and adds keyframe gating, cached
//!   configuration, and idempotent disposal.
//!
//! - **`recovery`** – Bounded, debounced decoder resets and exponential
//!   reconnect backoff.
//!
//! - **`control`** – Pointer and wheel input to device commands, gated on the
//!   session state and generation.

pub mod control;
pub mod decoder;
pub mod recovery;
pub mod session;
