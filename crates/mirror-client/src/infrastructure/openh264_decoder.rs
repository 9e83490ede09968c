//! Software H.264 decoder backed by Cisco OpenH264.
//!
//! Configuration units (SPS/PPS) are not decoded on their own.  They are kept
//! and prepended to the next data unit, so OpenH264 always sees parameter
//! sets and the keyframe that needs them in one call.  A reset recreates the
//! native decoder and re-arms the stored configuration.
//!
//! The decoded picture is not handed on; only its dimensions are reported.
//! Rendering belongs to the embedding UI.

use mirror_core::protocol::sps::coded_size_from_config;
use mirror_core::{AccessUnit, Size, VideoCodec};
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use tracing::{debug, info};

use crate::application::decoder::{DecoderError, DecoderFactory, VideoDecoder};

pub struct OpenH264Decoder {
    decoder: Option<Decoder>,
    config: Vec<u8>,
    /// Configuration not yet fed to the native decoder.
    config_pending: bool,
    coded_size: Option<Size>,
    frames: u64,
}

impl OpenH264Decoder {
    pub fn new() -> Result<Self, DecoderError> {
        Ok(Self {
            decoder: Some(create_native()?),
            config: Vec::new(),
            config_pending: false,
            coded_size: None,
            frames: 0,
        })
    }

    /// Frame size announced by the last configuration, before any picture
    /// has been decoded.
    pub fn coded_size(&self) -> Option<Size> {
        self.coded_size
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

fn create_native() -> Result<Decoder, DecoderError> {
    Decoder::new().map_err(|e| DecoderError::Buffer(format!("failed to create OpenH264 decoder: {e}")))
}

impl VideoDecoder for OpenH264Decoder {
    fn configure(&mut self, config: &[u8]) -> Result<(), DecoderError> {
        if self.decoder.is_none() {
            return Err(DecoderError::Closed);
        }
        let size = coded_size_from_config(VideoCodec::H264, config);
        if size.is_some() && size != self.coded_size {
            debug!(?size, "coded size from SPS");
        }
        self.coded_size = size.or(self.coded_size);
        self.config = config.to_vec();
        self.config_pending = true;
        Ok(())
    }

    fn decode(&mut self, unit: &AccessUnit) -> Result<Option<Size>, DecoderError> {
        let decoder = self.decoder.as_mut().ok_or(DecoderError::Closed)?;
        if self.config.is_empty() && !unit.parameter_sets {
            return Err(DecoderError::Decode("data before configuration".to_string()));
        }

        let mut input = Vec::new();
        let data = if self.config_pending {
            input.reserve(self.config.len() + unit.data.len());
            input.extend_from_slice(&self.config);
            input.extend_from_slice(&unit.data);
            &input[..]
        } else {
            &unit.data[..]
        };

        let decoded = decoder
            .decode(data)
            .map_err(|e| DecoderError::Decode(format!("OpenH264 decode failed: {e}")))?;
        self.config_pending = false;

        // OpenH264 may buffer a unit without producing a picture.
        let Some(yuv) = decoded else {
            return Ok(None);
        };
        let (width, height) = yuv.dimensions();
        let size = Size::new(width as u32, height as u32);
        self.frames += 1;
        if self.frames == 1 {
            info!(width = size.width, height = size.height, "first picture decoded");
        }
        Ok(Some(size))
    }

    fn reset(&mut self) -> Result<(), DecoderError> {
        if self.decoder.is_none() {
            return Err(DecoderError::Closed);
        }
        self.decoder = Some(create_native()?);
        self.config_pending = !self.config.is_empty();
        Ok(())
    }

    fn close(&mut self) {
        if self.decoder.take().is_some() {
            debug!(frames = self.frames, "OpenH264 decoder closed");
        }
    }
}

/// Creates [`OpenH264Decoder`]s.  Only H.264 is supported.
#[derive(Debug, Default)]
pub struct OpenH264DecoderFactory;

impl DecoderFactory for OpenH264DecoderFactory {
    fn create(&self, codec: VideoCodec) -> Result<Box<dyn VideoDecoder>, DecoderError> {
        match codec {
            VideoCodec::H264 => Ok(Box::new(OpenH264Decoder::new()?)),
            other => Err(DecoderError::Unsupported(format!(
                "{} has no software decoder",
                other.name()
            ))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::UnitKind;

    /// SPS from an x264 baseline encode at 1280x720.
    const SPS_720P: [u8; 27] = [
        0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xEC, 0x04, 0x40,
        0x00, 0x00, 0x03, 0x00, 0x40, 0x00, 0x00, 0x0C, 0x83, 0xC6, 0x0C, 0xA8,
    ];

    fn keyframe() -> AccessUnit {
        AccessUnit {
            kind: UnitKind::Data,
            keyframe: true,
            parameter_sets: false,
            pts: Some(0),
            data: vec![0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00],
        }
    }

    #[test]
    fn test_configuration_reports_coded_size() {
        // Arrange
        let mut d = OpenH264Decoder::new().unwrap();

        // Act
        d.configure(&SPS_720P).unwrap();

        // Assert
        assert_eq!(d.coded_size(), Some(Size::new(1280, 720)));
        assert_eq!(d.frames(), 0);
    }

    #[test]
    fn test_data_before_configuration_is_rejected() {
        let mut d = OpenH264Decoder::new().unwrap();
        assert!(matches!(d.decode(&keyframe()), Err(DecoderError::Decode(_))));
    }

    #[test]
    fn test_unparseable_configuration_keeps_previous_size() {
        let mut d = OpenH264Decoder::new().unwrap();
        d.configure(&SPS_720P).unwrap();

        d.configure(&[0, 0, 0, 1, 0x68, 0xCE, 0x38, 0x80]).unwrap();

        assert_eq!(d.coded_size(), Some(Size::new(1280, 720)));
    }

    #[test]
    fn test_reset_rearms_stored_configuration() {
        let mut d = OpenH264Decoder::new().unwrap();
        d.configure(&SPS_720P).unwrap();
        d.config_pending = false;

        d.reset().unwrap();

        assert!(d.config_pending);
    }

    #[test]
    fn test_closed_decoder_refuses_work() {
        // Arrange
        let mut d = OpenH264DecoderFactory.create(VideoCodec::H264).unwrap();

        // Act
        d.close();
        d.close();

        // Assert
        assert_eq!(d.configure(&SPS_720P), Err(DecoderError::Closed));
        assert_eq!(d.decode(&keyframe()), Err(DecoderError::Closed));
        assert_eq!(d.reset(), Err(DecoderError::Closed));
    }

    #[test]
    fn test_factory_rejects_codecs_without_software_path() {
        for codec in [VideoCodec::H265, VideoCodec::Av1] {
            let result = OpenH264DecoderFactory.create(codec);
            assert!(matches!(result, Err(DecoderError::Unsupported(_))));
        }
    }
}
