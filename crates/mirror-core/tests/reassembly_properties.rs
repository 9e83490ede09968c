//! Integration tests for stream reassembly through the public API.
//!
//! These exercise the properties the decoder relies on: every access unit
//! comes out whole, in order, and starting with a start code no matter how
//! the transport chunked the bytes; the carry-over buffer stays under its cap;
//! and framed data never overtakes its configuration.

use mirror_core::protocol::annexb::leading_start_code;
use mirror_core::{
    ChunkAlignment, FrameReassembler, Ingress, MediaPacket, ReassemblerConfig, ReassemblyError,
    ReassemblyMode, UnitKind,
};

/// Builds `count` distinct access units.  Payload bytes never form a start
/// code, and every third unit uses the 4-byte prefix.
fn make_units(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let mut unit = if i % 3 == 0 {
                vec![0, 0, 0, 1]
            } else {
                vec![0, 0, 1]
            };
            let header = match i {
                0 => 0x67,
                1 => 0x68,
                2 => 0x65,
                _ => 0x41,
            };
            unit.push(header);
            let len = 5 + (i * 37) % 400;
            unit.extend((0..len).map(|j| 0x10 + ((i + j) % 0xE0) as u8));
            unit
        })
        .collect()
}

/// Tiny deterministic generator for chunk sizes.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

fn reassemble(stream: &[u8], chunk_sizes: impl Iterator<Item = usize>) -> Vec<Vec<u8>> {
    let mut r = FrameReassembler::new(ReassemblerConfig::default());
    let mut out = Vec::new();
    let mut pos = 0;
    for size in chunk_sizes {
        if pos >= stream.len() {
            break;
        }
        let end = (pos + size.max(1)).min(stream.len());
        out.extend(r.feed(Ingress::Bytes(stream[pos..end].to_vec())));
        pos = end;
    }
    if pos < stream.len() {
        out.extend(r.feed_bytes(&stream[pos..]));
    }
    out.extend(r.flush());
    out.into_iter().map(|u| u.data).collect()
}

#[test]
fn test_every_chunking_yields_the_same_units_in_order() {
    let units = make_units(40);
    let stream = units.concat();

    let mut chunkings: Vec<Vec<usize>> = vec![
        vec![1; stream.len()],
        vec![2; stream.len()],
        vec![3; stream.len()],
        vec![stream.len()],
    ];
    for seed in 1..=25u64 {
        let mut rng = XorShift(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        chunkings.push((0..stream.len()).map(|_| 1 + (rng.next() % 700) as usize).collect());
    }

    for sizes in chunkings {
        let out = reassemble(&stream, sizes.into_iter());
        assert_eq!(out.len(), units.len());
        for (got, want) in out.iter().zip(&units) {
            assert!(leading_start_code(got).is_some());
            assert_eq!(got, want);
        }
    }
}

#[test]
fn test_buffer_never_exceeds_cap_on_garbage_input() {
    // Arrange
    let cap = 1024;
    let mut r = FrameReassembler::new(ReassemblerConfig {
        buffer_cap: cap,
        ..Default::default()
    });
    let mut rng = XorShift(42);

    // Act / Assert
    for _ in 0..500 {
        let len = 1 + (rng.next() % 300) as usize;
        let chunk: Vec<u8> = (0..len).map(|_| 0x02 | (rng.next() as u8)).collect();
        r.feed_bytes(&chunk);
        assert!(r.buffered_len() <= cap);
    }
    assert!(r.violations() > 0);
}

#[test]
fn test_oversized_unit_resets_and_stream_recovers() {
    // Arrange
    let mut r = FrameReassembler::new(ReassemblerConfig {
        buffer_cap: 256,
        ..Default::default()
    });
    let mut huge = vec![0, 0, 1, 0x65];
    huge.extend(std::iter::repeat(0x55).take(400));
    let tail = make_units(4).concat();

    // Act
    let mut out = r.feed_bytes(&huge);
    out.extend(r.feed_bytes(&tail));
    out.extend(r.flush());

    // Assert – the oversized unit is gone, later units survive
    assert!(matches!(
        r.last_violation(),
        Some(ReassemblyError::BufferOverflow { cap: 256, .. })
    ));
    assert_eq!(out.len(), 4);
}

#[test]
fn test_data_packets_before_configuration_keep_their_order() {
    // Arrange
    let mut r = FrameReassembler::new(ReassemblerConfig {
        mode: ReassemblyMode::Packetized,
        ..Default::default()
    });

    // Act
    let mut out = Vec::new();
    for i in 0..10u8 {
        out.extend(r.feed(Ingress::Packet(MediaPacket::data(vec![i], i == 0, u64::from(i)))));
    }
    assert!(out.is_empty());
    out.extend(r.feed(Ingress::Packet(MediaPacket::configuration(vec![0xCC]))));
    out.extend(r.feed(Ingress::Packet(MediaPacket::data(vec![10], false, 10))));

    // Assert
    assert_eq!(out[0].kind, UnitKind::Configuration);
    let data: Vec<u8> = out[1..].iter().map(|u| u.data[0]).collect();
    assert_eq!(data, (0..=10).collect::<Vec<u8>>());
    assert!(out[1].keyframe);
}

#[test]
fn test_aligned_mode_passes_whole_messages_through() {
    let mut r = FrameReassembler::new(ReassemblerConfig {
        mode: ReassemblyMode::AnnexB {
            alignment: ChunkAlignment::Aligned,
        },
        ..Default::default()
    });
    let units = make_units(3);

    let out: Vec<_> = units.iter().flat_map(|u| r.feed_bytes(u)).collect();

    assert_eq!(out.len(), 3);
    assert_eq!(out[0].kind, UnitKind::Configuration);
    assert!(out[2].keyframe);
    assert_eq!(r.buffered_len(), 0);
}
