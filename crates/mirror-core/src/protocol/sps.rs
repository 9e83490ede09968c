//! H.264 sequence parameter set probing.
//!
//! The socket header may omit the stream dimensions, and the device can change
//! its encoded size mid-session (rotation).  Both cases are covered by reading
//! the coded size straight out of the SPS, which always precedes a keyframe.

use crate::domain::geometry::Size;
use crate::protocol::annexb;
use crate::protocol::scrcpy::{ProtocolError, VideoCodec};

/// Profiles whose SPS carries the chroma / bit-depth / scaling-list extension.
const HIGH_PROFILES: [u8; 12] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134];

/// Scans an Annex-B buffer for an SPS and returns the coded picture size.
///
/// Only H.264 is parsed; other codecs return `None` and rely on the header.
pub fn coded_size_from_config(codec: VideoCodec, data: &[u8]) -> Option<Size> {
    if codec != VideoCodec::H264 {
        return None;
    }
    annexb::nal_units(data)
        .into_iter()
        .filter(|nal| nal[0] & 0x1F == 7)
        .find_map(|nal| match parse_h264_sps(nal) {
            Ok(size) => Some(size),
            Err(e) => {
                tracing::debug!("ignoring unparseable SPS: {e}");
                None
            }
        })
}

/// Parses an H.264 SPS NAL unit (header byte included, start code excluded).
///
/// # Errors
///
/// Returns [`ProtocolError::Truncated`] when the unit ends early, or
/// [`ProtocolError::MalformedPayload`] when it is not an SPS or a field is out
/// of range.
pub fn parse_h264_sps(nal: &[u8]) -> Result<Size, ProtocolError> {
    let Some((&header, body)) = nal.split_first() else {
        return Err(ProtocolError::Truncated("SPS header"));
    };
    if header & 0x1F != 7 {
        return Err(ProtocolError::MalformedPayload(format!(
            "NAL type {} is not an SPS",
            header & 0x1F
        )));
    }

    let rbsp = strip_emulation_prevention(body);
    let mut r = BitReader::new(&rbsp);

    let profile_idc = r.read_bits(8)? as u8;
    r.skip(16)?; // constraint flags + level_idc
    r.read_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1;
    let mut separate_colour_plane = false;
    if HIGH_PROFILES.contains(&profile_idc) || profile_idc == 135 {
        chroma_format_idc = r.read_ue()?;
        if chroma_format_idc > 3 {
            return Err(ProtocolError::MalformedPayload(format!(
                "chroma_format_idc {chroma_format_idc}"
            )));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane = r.read_bit()?;
        }
        r.read_ue()?; // bit_depth_luma_minus8
        r.read_ue()?; // bit_depth_chroma_minus8
        r.skip(1)?; // qpprime_y_zero_transform_bypass_flag
        if r.read_bit()? {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if r.read_bit()? {
                    skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    r.read_ue()?; // log2_max_frame_num_minus4
    match r.read_ue()? {
        0 => {
            r.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            r.skip(1)?; // delta_pic_order_always_zero_flag
            r.read_se()?; // offset_for_non_ref_pic
            r.read_se()?; // offset_for_top_to_bottom_field
            let cycle = r.read_ue()?;
            for _ in 0..cycle {
                r.read_se()?;
            }
        }
        _ => {}
    }
    r.read_ue()?; // max_num_ref_frames
    r.skip(1)?; // gaps_in_frame_num_value_allowed_flag

    let width_mbs = checked(r.read_ue()?.checked_add(1))?;
    let height_map_units = checked(r.read_ue()?.checked_add(1))?;
    let frame_mbs_only = r.read_bit()?;
    if !frame_mbs_only {
        r.skip(1)?; // mb_adaptive_frame_field_flag
    }
    r.skip(1)?; // direct_8x8_inference_flag

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0, 0, 0, 0);
    if r.read_bit()? {
        crop_left = r.read_ue()?;
        crop_right = r.read_ue()?;
        crop_top = r.read_ue()?;
        crop_bottom = r.read_ue()?;
    }

    let field_factor = if frame_mbs_only { 1 } else { 2 };
    let chroma_array_type = if separate_colour_plane { 0 } else { chroma_format_idc };
    let (crop_unit_x, crop_unit_y) = match chroma_array_type {
        0 => (1, field_factor),
        1 => (2, 2 * field_factor),
        2 => (2, field_factor),
        _ => (1, field_factor),
    };

    let coded_width = checked(width_mbs.checked_mul(16))?;
    let coded_height = checked(
        height_map_units
            .checked_mul(16)
            .and_then(|h| h.checked_mul(field_factor)),
    )?;
    let crop_x = checked(
        crop_left
            .checked_add(crop_right)
            .and_then(|c| c.checked_mul(crop_unit_x)),
    )?;
    let crop_y = checked(
        crop_top
            .checked_add(crop_bottom)
            .and_then(|c| c.checked_mul(crop_unit_y)),
    )?;
    if crop_x >= coded_width || crop_y >= coded_height {
        return Err(ProtocolError::MalformedPayload(
            "cropping exceeds coded size".to_string(),
        ));
    }

    Ok(Size::new(coded_width - crop_x, coded_height - crop_y))
}

/// Frame dimensions that do not fit in 32 bits are malformed.
fn checked(value: Option<u32>) -> Result<u32, ProtocolError> {
    value.ok_or_else(|| ProtocolError::MalformedPayload("SPS dimensions overflow".to_string()))
}

fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Result<(), ProtocolError> {
    let mut last = 8i64;
    let mut next = 8i64;
    for _ in 0..size {
        if next != 0 {
            let delta = r.read_se()?;
            next = (last + delta + 256) % 256;
        }
        if next != 0 {
            last = next;
        }
    }
    Ok(())
}

/// Removes `03` bytes inserted after every `00 00` pair.
fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

/// MSB-first bit reader with exp-Golomb support.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bit(&mut self) -> Result<bool, ProtocolError> {
        let byte = self
            .data
            .get(self.pos / 8)
            .ok_or(ProtocolError::Truncated("SPS"))?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1;
        self.pos += 1;
        Ok(bit == 1)
    }

    fn read_bits(&mut self, n: u32) -> Result<u32, ProtocolError> {
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Ok(value)
    }

    fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        if self.pos + n > self.data.len() * 8 {
            return Err(ProtocolError::Truncated("SPS"));
        }
        self.pos += n;
        Ok(())
    }

    fn read_ue(&mut self) -> Result<u32, ProtocolError> {
        let mut leading_zeros = 0u32;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(ProtocolError::MalformedPayload(
                    "exp-Golomb code too long".to_string(),
                ));
            }
        }
        let suffix = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) - 1 + u64::from(suffix)) as u32)
    }

    fn read_se(&mut self) -> Result<i64, ProtocolError> {
        let k = i64::from(self.read_ue()?);
        Ok(if k % 2 == 1 { (k + 1) / 2 } else { -(k / 2) })
    }
}
