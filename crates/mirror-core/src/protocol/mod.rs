//! Protocol module: video socket parsing, Annex-B scanning, and reassembly.

pub mod annexb;
pub mod reassembly;
pub mod scrcpy;
pub mod sps;

pub use reassembly::{AccessUnit, FrameReassembler, Ingress, ReassemblyError, UnitKind};
pub use scrcpy::{MediaPacket, MediaStreamParser, PacketKind, ProtocolError, VideoCodec};
