//! Incremental parser for the scrcpy video socket.
//!
//! Wire format (all multi-byte integers big-endian):
//! ```text
//! [dummy:1]?                                  -- only when send_dummy_byte
//! [device_name:64]?                           -- NUL padded, when send_device_meta
//! [codec_id:4][width:4][height:4]?            -- when send_codec_meta
//! then, when send_frame_meta:
//!   [pts:8][len:4][payload:len]  repeated
//! otherwise:
//!   raw Annex-B bytes until the socket closes
//! ```
//!
//! A PTS equal to bit 63 marks a configuration packet (codec parameter sets).
//! Bit 62 set on a data packet marks a keyframe and is stripped from the PTS.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of the NUL padded device name field.
pub const DEVICE_NAME_FIELD_LENGTH: usize = 64;

/// PTS value identifying a configuration packet.
pub const PTS_CONFIG: u64 = 1 << 63;

/// PTS flag identifying a keyframe data packet.
pub const PTS_KEYFRAME: u64 = 1 << 62;

/// Size of the per-packet frame header: pts (8) + length (4).
pub const FRAME_HEADER_SIZE: usize = 12;

/// Upper bound for a single packet payload; anything larger is a corrupt header.
pub const MAX_PACKET_LENGTH: usize = 16 * 1024 * 1024;

/// Errors produced while parsing the video socket.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// A frame header declared a payload larger than [`MAX_PACKET_LENGTH`].
    #[error("packet length {declared} exceeds limit of {limit} bytes")]
    PacketTooLarge { declared: usize, limit: usize },

    /// A bitstream structure ended before all required fields were read.
    #[error("truncated {0}")]
    Truncated(&'static str),

    /// A field held a value outside its legal range.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Video codecs the device can be asked to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
    Av1,
}

impl VideoCodec {
    /// The four-character code sent in the codec metadata field.
    pub fn wire_id(self) -> u32 {
        match self {
            VideoCodec::H264 => 0x6832_3634, // "h264"
            VideoCodec::H265 => 0x6832_3635, // "h265"
            VideoCodec::Av1 => 0x0061_7631,  // "\0av1"
        }
    }

    /// Maps a codec metadata value back to a codec, if recognised.
    pub fn from_wire_id(id: u32) -> Option<Self> {
        [VideoCodec::H264, VideoCodec::H265, VideoCodec::Av1]
            .into_iter()
            .find(|codec| codec.wire_id() == id)
    }

    /// Name the device server expects in its `video_codec=` option.
    pub fn name(self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
            VideoCodec::Av1 => "av1",
        }
    }

    /// Whether the codec can be carried as an Annex-B byte stream.
    pub fn supports_annex_b(self) -> bool {
        !matches!(self, VideoCodec::Av1)
    }
}

/// Which optional sections the device side writes on the video socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeaderOptions {
    pub send_dummy_byte: bool,
    pub send_device_meta: bool,
    pub send_codec_meta: bool,
    /// When `false` the socket carries raw Annex-B bytes after the header.
    pub send_frame_meta: bool,
    /// Codec assumed when no codec metadata is sent.
    pub codec: VideoCodec,
}

impl Default for StreamHeaderOptions {
    fn default() -> Self {
        Self {
            send_dummy_byte: true,
            send_device_meta: true,
            send_codec_meta: true,
            send_frame_meta: true,
            codec: VideoCodec::H264,
        }
    }
}

/// Information from the socket header, read once per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStreamMetadata {
    pub device_name: Option<String>,
    pub codec: VideoCodec,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Tag of a framed media packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Decoder parameter sets; must reach the decoder before any data.
    Configuration,
    /// Encoded picture data.
    Data,
}

/// One complete framed unit from a packetized ingress channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub kind: PacketKind,
    pub payload: Vec<u8>,
    /// Only meaningful for [`PacketKind::Data`].
    pub keyframe: Option<bool>,
    pub pts: Option<u64>,
}

impl MediaPacket {
    /// Creates a configuration packet.
    pub fn configuration(payload: Vec<u8>) -> Self {
        Self {
            kind: PacketKind::Configuration,
            payload,
            keyframe: None,
            pts: None,
        }
    }

    /// Creates a data packet.
    pub fn data(payload: Vec<u8>, keyframe: bool, pts: u64) -> Self {
        Self {
            kind: PacketKind::Data,
            payload,
            keyframe: Some(keyframe),
            pts: Some(pts),
        }
    }
}

/// Output of [`MediaStreamParser::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// The header has been fully read. Emitted exactly once.
    Metadata(VideoStreamMetadata),
    /// A framed packet (packetized mode).
    Packet(MediaPacket),
    /// Unframed Annex-B bytes (raw mode).
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    DummyByte,
    DeviceName,
    CodecMeta,
    LegacySize,
    Body,
}

/// Incremental parser that accepts socket reads of any size.
///
/// Bytes are buffered until a complete structure is available, so the caller
/// can hand over whatever `read()` returned without framing it first.
pub struct MediaStreamParser {
    options: StreamHeaderOptions,
    stage: Stage,
    buffer: Vec<u8>,
    device_name: Option<String>,
    codec: VideoCodec,
    width: Option<u32>,
    height: Option<u32>,
    metadata_sent: bool,
}

impl MediaStreamParser {
    /// Creates a parser expecting the header sections described by `options`.
    pub fn new(options: StreamHeaderOptions) -> Self {
        let stage = if options.send_dummy_byte {
            Stage::DummyByte
        } else {
            Self::stage_after_dummy(&options)
        };
        Self {
            options,
            stage,
            buffer: Vec::new(),
            device_name: None,
            codec: options.codec,
            width: None,
            height: None,
            metadata_sent: false,
        }
    }

    /// Returns `true` once the header has been consumed.
    pub fn header_complete(&self) -> bool {
        self.stage == Stage::Body
    }

    /// Number of bytes waiting for the rest of their structure.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds newly read bytes and returns every item they completed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PacketTooLarge`] when a frame header is corrupt.
    /// The parser is unusable afterwards; the connection should be dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<StreamItem>, ProtocolError> {
        let mut items = Vec::new();
        self.buffer.extend_from_slice(bytes);
        let mut cursor = 0usize;

        loop {
            if self.stage == Stage::Body && !self.metadata_sent {
                self.metadata_sent = true;
                items.push(StreamItem::Metadata(self.metadata()));
            }
            let available = &self.buffer[cursor..];
            match self.stage {
                Stage::DummyByte => {
                    if available.is_empty() {
                        break;
                    }
                    cursor += 1;
                    self.stage = Self::stage_after_dummy(&self.options);
                }
                Stage::DeviceName => {
                    if available.len() < DEVICE_NAME_FIELD_LENGTH {
                        break;
                    }
                    let raw = &available[..DEVICE_NAME_FIELD_LENGTH];
                    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
                    self.device_name = Some(String::from_utf8_lossy(&raw[..end]).into_owned());
                    cursor += DEVICE_NAME_FIELD_LENGTH;
                    self.stage = if self.options.send_codec_meta {
                        Stage::CodecMeta
                    } else {
                        Stage::LegacySize
                    };
                }
                Stage::CodecMeta => {
                    if available.len() < 4 {
                        break;
                    }
                    let value = read_u32(available, 0);
                    match VideoCodec::from_wire_id(value) {
                        Some(codec) => {
                            if available.len() < 12 {
                                break;
                            }
                            self.codec = codec;
                            self.width = Some(read_u32(available, 4));
                            self.height = Some(read_u32(available, 8));
                            cursor += 12;
                        }
                        None => {
                            // Older servers send width/height as two u16 here.
                            self.width = Some(value >> 16);
                            self.height = Some(value & 0xFFFF);
                            cursor += 4;
                        }
                    }
                    self.stage = Stage::Body;
                }
                Stage::LegacySize => {
                    if available.len() < 4 {
                        break;
                    }
                    self.width = Some(u32::from(read_u16(available, 0)));
                    self.height = Some(u32::from(read_u16(available, 2)));
                    cursor += 4;
                    self.stage = Stage::Body;
                }
                Stage::Body => {
                    if !self.options.send_frame_meta {
                        if !available.is_empty() {
                            items.push(StreamItem::Raw(available.to_vec()));
                            cursor = self.buffer.len();
                        }
                        break;
                    }
                    if available.len() < FRAME_HEADER_SIZE {
                        break;
                    }
                    let pts = read_u64(available, 0);
                    let len = read_u32(available, 8) as usize;
                    if len > MAX_PACKET_LENGTH {
                        return Err(ProtocolError::PacketTooLarge {
                            declared: len,
                            limit: MAX_PACKET_LENGTH,
                        });
                    }
                    if available.len() < FRAME_HEADER_SIZE + len {
                        break;
                    }
                    let payload = available[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len].to_vec();
                    cursor += FRAME_HEADER_SIZE + len;
                    items.push(StreamItem::Packet(packet_from_pts(pts, payload)));
                }
            }
        }

        self.buffer.drain(..cursor);
        Ok(items)
    }

    fn stage_after_dummy(options: &StreamHeaderOptions) -> Stage {
        if options.send_device_meta {
            Stage::DeviceName
        } else if options.send_codec_meta {
            Stage::CodecMeta
        } else {
            Stage::Body
        }
    }

    fn metadata(&self) -> VideoStreamMetadata {
        VideoStreamMetadata {
            device_name: self.device_name.clone(),
            codec: self.codec,
            width: self.width,
            height: self.height,
        }
    }
}

fn packet_from_pts(pts: u64, payload: Vec<u8>) -> MediaPacket {
    if pts == PTS_CONFIG {
        MediaPacket::configuration(payload)
    } else {
        let keyframe = pts & PTS_KEYFRAME != 0;
        MediaPacket::data(payload, keyframe, pts & !PTS_KEYFRAME)
    }
}

/// Encodes a packet with its frame header, as the device side writes it.
pub fn encode_media_packet(packet: &MediaPacket) -> Vec<u8> {
    let pts = match packet.kind {
        PacketKind::Configuration => PTS_CONFIG,
        PacketKind::Data => {
            let base = packet.pts.unwrap_or(0) & !PTS_KEYFRAME;
            if packet.keyframe.unwrap_or(false) {
                base | PTS_KEYFRAME
            } else {
                base
            }
        }
    };
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + packet.payload.len());
    buf.extend_from_slice(&pts.to_be_bytes());
    buf.extend_from_slice(&(packet.payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&packet.payload);
    buf
}

/// Encodes a full socket header for the given options and metadata.
pub fn encode_stream_header(options: &StreamHeaderOptions, metadata: &VideoStreamMetadata) -> Vec<u8> {
    let mut buf = Vec::new();
    if options.send_dummy_byte {
        buf.push(0x00);
    }
    if options.send_device_meta {
        let mut name = [0u8; DEVICE_NAME_FIELD_LENGTH];
        if let Some(device_name) = &metadata.device_name {
            let bytes = device_name.as_bytes();
            let n = bytes.len().min(DEVICE_NAME_FIELD_LENGTH - 1);
            name[..n].copy_from_slice(&bytes[..n]);
        }
        buf.extend_from_slice(&name);
    }
    if options.send_codec_meta {
        buf.extend_from_slice(&metadata.codec.wire_id().to_be_bytes());
        buf.extend_from_slice(&metadata.width.unwrap_or(0).to_be_bytes());
        buf.extend_from_slice(&metadata.height.unwrap_or(0).to_be_bytes());
    } else if options.send_device_meta {
        buf.extend_from_slice(&(metadata.width.unwrap_or(0) as u16).to_be_bytes());
        buf.extend_from_slice(&(metadata.height.unwrap_or(0) as u16).to_be_bytes());
    }
    buf
}

// ── Byte helpers ──────────────────────────────────────────────────────────────

fn read_u16(p: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([p[off], p[off + 1]])
}

fn read_u32(p: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([p[off], p[off + 1], p[off + 2], p[off + 3]])
}

fn read_u64(p: &[u8], off: usize) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&p[off..off + 8]);
    u64::from_be_bytes(arr)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> VideoStreamMetadata {
        VideoStreamMetadata {
            device_name: Some("Pixel 7".to_string()),
            codec: VideoCodec::H264,
            width: Some(576),
            height: Some(1280),
        }
    }

    #[test]
    fn test_full_header_yields_metadata_once() {
        // Arrange
        let options = StreamHeaderOptions::default();
        let bytes = encode_stream_header(&options, &sample_metadata());
        let mut parser = MediaStreamParser::new(options);

        // Act
        let items = parser.push(&bytes).unwrap();

        // Assert
        assert_eq!(items, vec![StreamItem::Metadata(sample_metadata())]);
        assert!(parser.header_complete());
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_header_split_byte_by_byte_still_parses() {
        // Arrange
        let options = StreamHeaderOptions::default();
        let bytes = encode_stream_header(&options, &sample_metadata());
        let mut parser = MediaStreamParser::new(options);

        // Act
        let mut items = Vec::new();
        for b in &bytes {
            items.extend(parser.push(std::slice::from_ref(b)).unwrap());
        }

        // Assert
        assert_eq!(items, vec![StreamItem::Metadata(sample_metadata())]);
    }

    #[test]
    fn test_unknown_codec_value_falls_back_to_legacy_dimensions() {
        // Arrange – header with codec meta holding 1080 << 16 | 2400
        let options = StreamHeaderOptions {
            send_dummy_byte: false,
            send_device_meta: false,
            ..Default::default()
        };
        let mut parser = MediaStreamParser::new(options);
        let legacy = (1080u32 << 16) | 2400;

        // Act
        let items = parser.push(&legacy.to_be_bytes()).unwrap();

        // Assert
        match &items[..] {
            [StreamItem::Metadata(meta)] => {
                assert_eq!(meta.width, Some(1080));
                assert_eq!(meta.height, Some(2400));
                assert_eq!(meta.codec, VideoCodec::H264);
            }
            other => panic!("unexpected items: {other:?}"),
        }
    }

    #[test]
    fn test_device_meta_without_codec_meta_reads_u16_size() {
        let options = StreamHeaderOptions {
            send_dummy_byte: false,
            send_codec_meta: false,
            ..Default::default()
        };
        let mut parser = MediaStreamParser::new(options);
        let mut bytes = vec![0u8; DEVICE_NAME_FIELD_LENGTH];
        bytes[..3].copy_from_slice(b"tab");
        bytes.extend_from_slice(&800u16.to_be_bytes());
        bytes.extend_from_slice(&1280u16.to_be_bytes());

        let items = parser.push(&bytes).unwrap();

        assert_eq!(
            items,
            vec![StreamItem::Metadata(VideoStreamMetadata {
                device_name: Some("tab".to_string()),
                codec: VideoCodec::H264,
                width: Some(800),
                height: Some(1280),
            })]
        );
    }

    #[test]
    fn test_packets_carry_config_and_keyframe_flags() {
        // Arrange
        let options = StreamHeaderOptions::default();
        let mut bytes = encode_stream_header(&options, &sample_metadata());
        bytes.extend(encode_media_packet(&MediaPacket::configuration(vec![1, 2, 3])));
        bytes.extend(encode_media_packet(&MediaPacket::data(vec![4, 5], true, 1_000)));
        bytes.extend(encode_media_packet(&MediaPacket::data(vec![6], false, 2_000)));
        let mut parser = MediaStreamParser::new(options);

        // Act
        let items = parser.push(&bytes).unwrap();

        // Assert
        assert_eq!(items.len(), 4);
        assert_eq!(items[1], StreamItem::Packet(MediaPacket::configuration(vec![1, 2, 3])));
        assert_eq!(items[2], StreamItem::Packet(MediaPacket::data(vec![4, 5], true, 1_000)));
        assert_eq!(items[3], StreamItem::Packet(MediaPacket::data(vec![6], false, 2_000)));
    }

    #[test]
    fn test_partial_packet_is_held_until_complete() {
        // Arrange
        let options = StreamHeaderOptions {
            send_dummy_byte: false,
            send_device_meta: false,
            send_codec_meta: false,
            ..Default::default()
        };
        let mut parser = MediaStreamParser::new(options);
        let encoded = encode_media_packet(&MediaPacket::data(vec![9; 100], false, 7));

        // Act
        let first = parser.push(&encoded[..50]).unwrap();
        let second = parser.push(&encoded[50..]).unwrap();

        // Assert – the header-less stream still announces metadata first
        assert!(matches!(first[..], [StreamItem::Metadata(_)]));
        assert_eq!(second, vec![StreamItem::Packet(MediaPacket::data(vec![9; 100], false, 7))]);
    }

    #[test]
    fn test_oversized_packet_length_is_rejected() {
        let options = StreamHeaderOptions {
            send_dummy_byte: false,
            send_device_meta: false,
            send_codec_meta: false,
            ..Default::default()
        };
        let mut parser = MediaStreamParser::new(options);
        parser.push(&[]).unwrap();
        let mut header = 0u64.to_be_bytes().to_vec();
        header.extend_from_slice(&u32::MAX.to_be_bytes());

        let err = parser.push(&header).unwrap_err();

        assert!(matches!(err, ProtocolError::PacketTooLarge { .. }));
    }

    #[test]
    fn test_raw_mode_passes_bytes_through_after_header() {
        // Arrange
        let options = StreamHeaderOptions {
            send_frame_meta: false,
            ..Default::default()
        };
        let mut bytes = encode_stream_header(&options, &sample_metadata());
        bytes.extend_from_slice(&[0, 0, 0, 1, 0x67]);
        let mut parser = MediaStreamParser::new(options);

        // Act
        let items = parser.push(&bytes).unwrap();
        let more = parser.push(&[0xAA, 0xBB]).unwrap();

        // Assert
        assert_eq!(items[1], StreamItem::Raw(vec![0, 0, 0, 1, 0x67]));
        assert_eq!(more, vec![StreamItem::Raw(vec![0xAA, 0xBB])]);
    }

    #[test]
    fn test_codec_names_match_config_spelling() {
        for codec in [VideoCodec::H264, VideoCodec::H265, VideoCodec::Av1] {
            let json = serde_json::to_string(&codec).unwrap();
            assert_eq!(json, format!("\"{}\"", codec.name()));
        }
    }

    #[test]
    fn test_codec_wire_ids_round_trip() {
        for codec in [VideoCodec::H264, VideoCodec::H265, VideoCodec::Av1] {
            assert_eq!(VideoCodec::from_wire_id(codec.wire_id()), Some(codec));
        }
        assert_eq!(VideoCodec::from_wire_id(0xDEAD_BEEF), None);
    }
}
