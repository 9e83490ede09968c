//! Annex-B start code scanning and NAL unit classification.
//!
//! An Annex-B byte stream separates encoded units with a start code prefix,
//! either the 3-byte form `00 00 01` or the 4-byte form `00 00 00 01`.  The
//! first byte after the prefix is the NAL unit header, which tells us whether
//! the unit is a parameter set (decoder configuration), a keyframe slice, or
//! something else.
//!
//! ```text
//! 00 00 00 01 67 ...SPS...  00 00 01 68 ...PPS...  00 00 01 65 ...IDR slice...
//! └─ 4-byte ─┘ └ header     └3-byte┘ └ header      └3-byte┘ └ header
//! ```

use crate::protocol::scrcpy::VideoCodec;

/// The short start code prefix.
pub const START_CODE_SHORT: [u8; 3] = [0x00, 0x00, 0x01];

/// The long start code prefix.
pub const START_CODE_LONG: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Location of one start code inside a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCode {
    /// Offset of the first byte of the prefix.
    pub offset: usize,
    /// Prefix length: 3 or 4.
    pub len: usize,
}

impl StartCode {
    /// Offset of the NAL header byte that follows the prefix.
    pub fn payload_offset(&self) -> usize {
        self.offset + self.len
    }
}

/// Returns the start code at the very beginning of `data`, if any.
pub fn leading_start_code(data: &[u8]) -> Option<StartCode> {
    if data.starts_with(&START_CODE_LONG) {
        Some(StartCode { offset: 0, len: 4 })
    } else if data.starts_with(&START_CODE_SHORT) {
        Some(StartCode { offset: 0, len: 3 })
    } else {
        None
    }
}

/// Finds every start code whose `00 00 01` tail begins at or after `from`.
///
/// A `00` immediately preceding the tail is folded into a 4-byte code, so the
/// returned offset may be `from - 1`.
pub fn find_start_codes(data: &[u8], from: usize) -> Vec<StartCode> {
    let mut codes = Vec::new();
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i + 2] > 0x01 {
            // No start code can begin at i, i+1 or i+2.
            i += 3;
            continue;
        }
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            if i > 0 && data[i - 1] == 0x00 {
                codes.push(StartCode { offset: i - 1, len: 4 });
            } else {
                codes.push(StartCode { offset: i, len: 3 });
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    codes
}

/// Iterates over the NAL unit payloads (start codes stripped) in `data`.
pub fn nal_units(data: &[u8]) -> Vec<&[u8]> {
    let codes = find_start_codes(data, 0);
    codes
        .iter()
        .enumerate()
        .map(|(idx, code)| {
            let end = codes.get(idx + 1).map(|next| next.offset).unwrap_or(data.len());
            &data[code.payload_offset()..end]
        })
        .filter(|nal| !nal.is_empty())
        .collect()
}

/// Coarse classification of a single NAL unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalClass {
    /// SPS / PPS (H.264) or VPS / SPS / PPS (H.265).
    ParameterSet,
    /// A slice of a self-contained picture (IDR / IRAP).
    KeyframeSlice,
    /// A slice of a picture that references earlier pictures.
    Slice,
    /// SEI, access unit delimiters, filler, and anything unrecognised.
    Other,
}

/// Classifies one NAL unit from its header byte.
pub fn classify_nal(codec: VideoCodec, header: u8) -> NalClass {
    match codec {
        VideoCodec::H264 => match header & 0x1F {
            7 | 8 => NalClass::ParameterSet,
            5 => NalClass::KeyframeSlice,
            1..=4 => NalClass::Slice,
            _ => NalClass::Other,
        },
        VideoCodec::H265 => match (header >> 1) & 0x3F {
            32..=34 => NalClass::ParameterSet,
            16..=21 => NalClass::KeyframeSlice,
            0..=9 => NalClass::Slice,
            _ => NalClass::Other,
        },
        // AV1 has no Annex-B framing; it only arrives packetized.
        VideoCodec::Av1 => NalClass::Other,
    }
}

/// Aggregate traits of a buffer holding one or more NAL units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitTraits {
    /// At least one parameter set is present.
    pub parameter_sets: bool,
    /// At least one keyframe slice is present.
    pub keyframe: bool,
    /// At least one picture slice (keyframe or not) is present.
    pub picture: bool,
}

/// Inspects every NAL unit in `data` and summarises what it carries.
pub fn inspect(codec: VideoCodec, data: &[u8]) -> UnitTraits {
    let mut traits = UnitTraits::default();
    for nal in nal_units(data) {
        match classify_nal(codec, nal[0]) {
            NalClass::ParameterSet => traits.parameter_sets = true,
            NalClass::KeyframeSlice => {
                traits.keyframe = true;
                traits.picture = true;
            }
            NalClass::Slice => traits.picture = true,
            NalClass::Other => {}
        }
    }
    traits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_start_codes_detects_short_and_long_forms() {
        // Arrange
        let data = [0, 0, 0, 1, 0x67, 0xAA, 0, 0, 1, 0x68, 0xBB];

        // Act
        let codes = find_start_codes(&data, 0);

        // Assert
        assert_eq!(
            codes,
            vec![
                StartCode { offset: 0, len: 4 },
                StartCode { offset: 6, len: 3 },
            ]
        );
    }

    #[test]
    fn test_find_start_codes_returns_empty_for_plain_payload() {
        let data = [0x10, 0x20, 0x00, 0x00, 0x02, 0x00, 0x30];
        assert!(find_start_codes(&data, 0).is_empty());
    }

    #[test]
    fn test_find_start_codes_ignores_trailing_partial_prefix() {
        // "00 00" at the end is not yet a start code.
        let data = [0, 0, 1, 0x65, 0x11, 0x00, 0x00];
        assert_eq!(find_start_codes(&data, 0).len(), 1);
    }

    #[test]
    fn test_leading_start_code_prefers_long_form() {
        assert_eq!(
            leading_start_code(&[0, 0, 0, 1, 0x67]),
            Some(StartCode { offset: 0, len: 4 })
        );
        assert_eq!(
            leading_start_code(&[0, 0, 1, 0x67]),
            Some(StartCode { offset: 0, len: 3 })
        );
        assert_eq!(leading_start_code(&[0x67, 0, 0, 1]), None);
    }

    #[test]
    fn test_nal_units_strips_prefixes() {
        let data = [0, 0, 0, 1, 0x67, 0x01, 0, 0, 1, 0x68, 0x02];
        let nals = nal_units(&data);
        assert_eq!(nals, vec![&[0x67, 0x01][..], &[0x68, 0x02][..]]);
    }

    #[test]
    fn test_classify_h264_headers() {
        assert_eq!(classify_nal(VideoCodec::H264, 0x67), NalClass::ParameterSet);
        assert_eq!(classify_nal(VideoCodec::H264, 0x68), NalClass::ParameterSet);
        assert_eq!(classify_nal(VideoCodec::H264, 0x65), NalClass::KeyframeSlice);
        assert_eq!(classify_nal(VideoCodec::H264, 0x41), NalClass::Slice);
        assert_eq!(classify_nal(VideoCodec::H264, 0x06), NalClass::Other);
    }

    #[test]
    fn test_classify_h265_headers() {
        // VPS = 32, IDR_W_RADL = 19, TRAIL_R = 1; header byte is type << 1.
        assert_eq!(classify_nal(VideoCodec::H265, 32 << 1), NalClass::ParameterSet);
        assert_eq!(classify_nal(VideoCodec::H265, 19 << 1), NalClass::KeyframeSlice);
        assert_eq!(classify_nal(VideoCodec::H265, 1 << 1), NalClass::Slice);
        assert_eq!(classify_nal(VideoCodec::H265, 39 << 1), NalClass::Other);
    }

    #[test]
    fn test_inspect_keyframe_burst_reports_all_traits() {
        // SPS + PPS + IDR, as an encoder emits them for a keyframe.
        let data = [0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68, 0xCE, 0, 0, 1, 0x65, 0x88];
        let traits = inspect(VideoCodec::H264, &data);
        assert!(traits.parameter_sets);
        assert!(traits.keyframe);
        assert!(traits.picture);
    }
}
