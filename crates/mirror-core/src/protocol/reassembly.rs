//! Frame reassembly: turns ingress chunks into decodable access units.
//!
//! # Two ingress variants
//!
//! **Annex-B byte stream.** Bytes arrive in arbitrary chunks.  A chunk may hold
//! zero, one, or many start codes, and one unit can straddle several chunks.
//! The reassembler keeps a carry-over buffer that always begins with a start
//! code once synchronised.  After each chunk it emits every unit that is now
//! known to be complete (everything before the *last* start code) and retains
//! the rest.  A unit is only known to be complete once the next start code has
//! arrived, so a single start code in the buffer keeps buffering.
//!
//! ```text
//! carry: [00 00 01 65 .. ..]          chunk: [.. 00 00 01 41 ..]
//!          └──── emitted ────────────────────┘└── retained ──┘
//! ```
//!
//! **Packetized.** Each ingress item is a complete [`MediaPacket`] tagged
//! configuration or data.  Data that arrives before the first configuration
//! is held and released, in order, directly after the configuration unit.
//!
//! # Protocol violations
//!
//! Malformed input never panics and never surfaces to the caller as an error.
//! It is recovered locally (buffer dropped, queue cleared) and recorded as a
//! [`ReassemblyError`] available from [`FrameReassembler::last_violation`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::annexb::{self, StartCode};
use crate::protocol::scrcpy::{MediaPacket, PacketKind, VideoCodec};

/// Default cap on the carry-over buffer (4 MiB).
pub const DEFAULT_BUFFER_CAP: usize = 4 * 1024 * 1024;

/// Default number of data packets held while waiting for a configuration.
pub const DEFAULT_MAX_PENDING_PACKETS: usize = 64;

/// Protocol violations recovered by the reassembler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    /// The carry-over buffer grew past its cap; it was dropped.
    #[error("reassembly buffer of {len} bytes exceeded cap of {cap} bytes")]
    BufferOverflow { len: usize, cap: usize },

    /// Bytes preceding the first start code were discarded.
    #[error("discarded {0} bytes before the first start code")]
    LeadingGarbage(usize),

    /// Too many data packets arrived without a configuration; the queue was cleared.
    #[error("dropped {0} data packets queued without a configuration")]
    PendingOverflow(usize),

    /// The ingress item does not match the configured mode.
    #[error("{0} ingress is not accepted in this mode")]
    UnexpectedIngress(&'static str),
}

/// Whether the transport delivers chunks that start on unit boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkAlignment {
    /// Every chunk that begins with a start code holds whole units only.
    Aligned,
    /// Chunk boundaries are arbitrary (plain TCP reads).
    Unaligned,
}

/// Which ingress variant the reassembler expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyMode {
    AnnexB { alignment: ChunkAlignment },
    Packetized,
}

/// Construction parameters for [`FrameReassembler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblerConfig {
    pub mode: ReassemblyMode,
    pub codec: VideoCodec,
    /// Hard cap on the Annex-B carry-over buffer, in bytes.
    pub buffer_cap: usize,
    /// Maximum data packets held before the first configuration.
    pub max_pending_packets: usize,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            mode: ReassemblyMode::AnnexB {
                alignment: ChunkAlignment::Unaligned,
            },
            codec: VideoCodec::H264,
            buffer_cap: DEFAULT_BUFFER_CAP,
            max_pending_packets: DEFAULT_MAX_PENDING_PACKETS,
        }
    }
}

/// One item from the video ingress channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingress {
    /// A chunk of an Annex-B byte stream.
    Bytes(Vec<u8>),
    /// A complete framed packet.
    Packet(MediaPacket),
}

/// Role of an access unit for the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Parameter sets only; configures the decoder.
    Configuration,
    /// Picture data.
    Data,
}

/// A complete unit ready for the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub kind: UnitKind,
    /// The unit holds a self-contained picture.
    pub keyframe: bool,
    /// The unit carries codec parameter sets (possibly alongside a picture).
    pub parameter_sets: bool,
    pub pts: Option<u64>,
    pub data: Vec<u8>,
}

/// Units released by one call to [`FrameReassembler::feed`], in decode order.
pub type ReadySegments = Vec<AccessUnit>;

/// Stateful reassembler for one connection.
///
/// Call [`reset`](Self::reset) before reusing it for a new connection; stale
/// partial data must never be prepended to a fresh stream.
pub struct FrameReassembler {
    config: ReassemblerConfig,
    buffer: Vec<u8>,
    /// Length of the start code at `buffer[0]`, or 0 while unsynchronised.
    head_len: usize,
    /// Index from which the next scan for start code tails resumes.
    scan_offset: usize,
    configured: bool,
    pending: VecDeque<MediaPacket>,
    violations: u64,
    last_violation: Option<ReassemblyError>,
}

impl FrameReassembler {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            head_len: 0,
            scan_offset: 0,
            configured: false,
            pending: VecDeque::new(),
            violations: 0,
            last_violation: None,
        }
    }

    pub fn config(&self) -> &ReassemblerConfig {
        &self.config
    }

    /// Bytes currently carried over between chunks.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Data packets currently waiting for a configuration.
    pub fn pending_packets(&self) -> usize {
        self.pending.len()
    }

    /// Total protocol violations recovered since construction.
    pub fn violations(&self) -> u64 {
        self.violations
    }

    pub fn last_violation(&self) -> Option<&ReassemblyError> {
        self.last_violation.as_ref()
    }

    /// Feeds one ingress item and returns the units it completed.
    pub fn feed(&mut self, ingress: Ingress) -> ReadySegments {
        match (self.config.mode, ingress) {
            (ReassemblyMode::AnnexB { .. }, Ingress::Bytes(chunk)) => self.feed_bytes(&chunk),
            (ReassemblyMode::Packetized, Ingress::Packet(packet)) => self.feed_packet(packet),
            (ReassemblyMode::AnnexB { .. }, Ingress::Packet(_)) => {
                self.record(ReassemblyError::UnexpectedIngress("packet"));
                Vec::new()
            }
            (ReassemblyMode::Packetized, Ingress::Bytes(_)) => {
                self.record(ReassemblyError::UnexpectedIngress("byte"));
                Vec::new()
            }
        }
    }

    /// Feeds one Annex-B chunk.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> ReadySegments {
        let mut ready = Vec::new();
        if chunk.is_empty() {
            return ready;
        }

        let aligned = matches!(
            self.config.mode,
            ReassemblyMode::AnnexB {
                alignment: ChunkAlignment::Aligned
            }
        );
        if aligned && self.buffer.is_empty() && annexb::leading_start_code(chunk).is_some() {
            ready.push(self.annexb_unit(chunk.to_vec()));
            return ready;
        }

        self.buffer.extend_from_slice(chunk);

        if self.head_len == 0 && !self.synchronise() {
            self.scan_offset = self.buffer.len().saturating_sub(2);
            self.enforce_cap();
            return ready;
        }

        let boundaries: Vec<StartCode> = annexb::find_start_codes(&self.buffer, self.scan_offset);
        if let Some(last) = boundaries.last().copied() {
            let mut start = 0;
            for code in &boundaries {
                let unit = self.buffer[start..code.offset].to_vec();
                ready.push(self.annexb_unit(unit));
                start = code.offset;
            }
            self.buffer.drain(..last.offset);
            self.head_len = last.len;
        }
        self.scan_offset = self.buffer.len().saturating_sub(2).max(self.head_len - 2);

        self.enforce_cap();
        ready
    }

    /// Feeds one framed packet.
    pub fn feed_packet(&mut self, packet: MediaPacket) -> ReadySegments {
        let mut ready = Vec::new();
        match packet.kind {
            PacketKind::Configuration => {
                let first = !self.configured;
                self.configured = true;
                ready.push(self.packet_unit(packet));
                if first && !self.pending.is_empty() {
                    debug!("releasing {} data packets held for configuration", self.pending.len());
                }
                while let Some(held) = self.pending.pop_front() {
                    ready.push(self.packet_unit(held));
                }
            }
            PacketKind::Data if self.configured => ready.push(self.packet_unit(packet)),
            PacketKind::Data => {
                if self.pending.len() >= self.config.max_pending_packets {
                    let dropped = self.pending.len();
                    self.pending.clear();
                    self.record(ReassemblyError::PendingOverflow(dropped));
                }
                self.pending.push_back(packet);
            }
        }
        ready
    }

    /// Releases the carried tail at end of stream.
    ///
    /// The last unit of an Annex-B stream has no following start code, so it
    /// is only known to be complete once the stream ends.
    pub fn flush(&mut self) -> ReadySegments {
        let mut ready = Vec::new();
        if self.head_len > 0 && self.buffer.len() > self.head_len {
            let tail = std::mem::take(&mut self.buffer);
            ready.push(self.annexb_unit(tail));
        }
        self.clear_buffer();
        ready
    }

    /// Drops all carried state, ready for a new connection.
    pub fn reset(&mut self) {
        self.clear_buffer();
        self.configured = false;
        self.pending.clear();
    }

    /// Drops bytes before the first start code.  Returns `false` while no
    /// start code has been seen.
    fn synchronise(&mut self) -> bool {
        let Some(first) = annexb::find_start_codes(&self.buffer, self.scan_offset).first().copied() else {
            return false;
        };
        if first.offset > 0 {
            self.buffer.drain(..first.offset);
            self.record(ReassemblyError::LeadingGarbage(first.offset));
        }
        self.head_len = first.len;
        // Resume scanning just past the head code's 00 00 01 tail.
        self.scan_offset = first.len - 2;
        true
    }

    fn enforce_cap(&mut self) {
        if self.buffer.len() > self.config.buffer_cap {
            let len = self.buffer.len();
            self.clear_buffer();
            self.record(ReassemblyError::BufferOverflow {
                len,
                cap: self.config.buffer_cap,
            });
        }
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.head_len = 0;
        self.scan_offset = 0;
    }

    fn record(&mut self, violation: ReassemblyError) {
        warn!("reassembly violation recovered: {violation}");
        self.violations += 1;
        self.last_violation = Some(violation);
    }

    fn annexb_unit(&self, data: Vec<u8>) -> AccessUnit {
        let traits = annexb::inspect(self.config.codec, &data);
        AccessUnit {
            kind: if traits.parameter_sets && !traits.picture {
                UnitKind::Configuration
            } else {
                UnitKind::Data
            },
            keyframe: traits.keyframe,
            parameter_sets: traits.parameter_sets,
            pts: None,
            data,
        }
    }

    fn packet_unit(&self, packet: MediaPacket) -> AccessUnit {
        match packet.kind {
            PacketKind::Configuration => AccessUnit {
                kind: UnitKind::Configuration,
                keyframe: false,
                parameter_sets: true,
                pts: packet.pts,
                data: packet.payload,
            },
            PacketKind::Data => {
                let traits = if self.config.codec.supports_annex_b() {
                    annexb::inspect(self.config.codec, &packet.payload)
                } else {
                    annexb::UnitTraits::default()
                };
                AccessUnit {
                    kind: UnitKind::Data,
                    keyframe: packet.keyframe.unwrap_or(traits.keyframe),
                    parameter_sets: traits.parameter_sets,
                    pts: packet.pts,
                    data: packet.payload,
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
