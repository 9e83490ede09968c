//! Domain entities for device mirroring input.
//!
//! Pure logic with no infrastructure dependencies: nothing here opens a
//! socket, spawns a process, or reads the clock.  Every operation that depends
//! on time takes the current instant as a parameter, which keeps the gesture
//! and scroll state machines deterministic under test.
//!
//! # How a click becomes a device tap (for beginners)
//!
//! 1. The UI reports a pointer position in its own pixels ([`geometry::ScreenPoint`]).
//! 2. [`geometry::CoordinateMapper`] removes the letterbox margin and rescales
//!    twice: rendered box → video stream → device native resolution.
//! 3. [`gesture::GestureClassifier`] watches down/move/up and decides whether
//!    the gesture was a tap or a drag, producing [`device::DeviceCommand`]s.
//! 4. Wheel input takes a separate path through [`scroll::ScrollTranslator`],
//!    which collapses a burst of wheel events into one swipe.

/// Device identity and the command vocabulary sent to a device.
pub mod device;

/// Sizes, points, letterboxing, and the pointer → device coordinate transform.
pub mod geometry;

/// Tap vs. drag disambiguation with throttled motion.
pub mod gesture;

/// Wheel burst → single swipe synthesis.
pub mod scroll;
