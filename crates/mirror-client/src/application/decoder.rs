//! StreamDecoder: the session's view of a platform video decoder.
//!
//! The platform decoder itself sits behind the [`VideoDecoder`] trait and is
//! created by a [`DecoderFactory`] injected at construction time.  This
//! wrapper adds what every decoder needs from the pipeline:
//!
//! - configuration units are cached so a lightweight reset can re-apply them
//!   without waiting for the device to resend parameter sets;
//! - after creation or a reset, non-keyframe data is skipped until a keyframe
//!   arrives, because a decoder cannot start from a predicted frame;
//! - data before any configuration is skipped rather than failing the decoder;
//! - disposal is idempotent.

use mirror_core::{AccessUnit, Size, UnitKind, VideoCodec};
use thiserror::Error;
use tracing::debug;

/// Errors reported by a video decoder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecoderError {
    /// The decoder's input or output buffers are in a bad state.
    #[error("decoder buffer error: {0}")]
    Buffer(String),

    /// A unit could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The codec or stream format is not supported.
    #[error("unsupported stream: {0}")]
    Unsupported(String),

    /// The decoder was already disposed.
    #[error("decoder is closed")]
    Closed,
}

impl DecoderError {
    /// Buffer and decode errors may clear after an in-place reset.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DecoderError::Buffer(_) | DecoderError::Decode(_))
    }
}

/// A platform video decoder.
pub trait VideoDecoder: Send {
    /// Applies codec parameter sets.
    fn configure(&mut self, config: &[u8]) -> Result<(), DecoderError>;

    /// Decodes one unit.  Returns the frame size when a picture was produced.
    fn decode(&mut self, unit: &AccessUnit) -> Result<Option<Size>, DecoderError>;

    /// Flushes internal state, keeping the instance alive.
    fn reset(&mut self) -> Result<(), DecoderError>;

    /// Releases platform resources.  Must tolerate repeated calls.
    fn close(&mut self);
}

/// Creates decoder instances for a session.
pub trait DecoderFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns [`DecoderError::Unsupported`] when no decoder exists for `codec`.
    fn create(&self, codec: VideoCodec) -> Result<Box<dyn VideoDecoder>, DecoderError>;
}

/// Result of pushing one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Configured,
    Decoded,
    /// A frame was decoded and its size differs from the previous frame.
    Resized(Size),
    /// The unit was not handed to the decoder (no configuration yet, or
    /// waiting for a keyframe).
    Skipped,
}

pub struct StreamDecoder {
    inner: Option<Box<dyn VideoDecoder>>,
    /// Parameter sets seen since the last data unit, re-applied on reset.
    config: Vec<u8>,
    config_sealed: bool,
    configured: bool,
    /// Keyframe gating only applies to codecs whose units we can inspect.
    gate_keyframes: bool,
    awaiting_keyframe: bool,
    recovering: bool,
    frame_size: Option<Size>,
    frames: u64,
}

impl StreamDecoder {
    pub fn new(inner: Box<dyn VideoDecoder>, codec: VideoCodec) -> Self {
        Self {
            inner: Some(inner),
            config: Vec::new(),
            config_sealed: false,
            configured: false,
            gate_keyframes: codec.supports_annex_b(),
            awaiting_keyframe: true,
            recovering: false,
            frame_size: None,
            frames: 0,
        }
    }

    /// Feeds one access unit.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error unchanged; the caller decides between a
    /// reset and a reconnect.
    pub fn push(&mut self, unit: &AccessUnit) -> Result<DecodeOutcome, DecoderError> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(DecoderError::Closed);
        };

        if unit.kind == UnitKind::Configuration {
            if self.config_sealed {
                self.config.clear();
                self.config_sealed = false;
            }
            self.config.extend_from_slice(&unit.data);
            inner.configure(&self.config)?;
            self.configured = true;
            return Ok(DecodeOutcome::Configured);
        }

        if !self.configured && !unit.parameter_sets {
            debug!("skipping data unit received before configuration");
            return Ok(DecodeOutcome::Skipped);
        }
        self.configured = true;
        self.config_sealed = true;

        if self.gate_keyframes && self.awaiting_keyframe && !unit.keyframe {
            return Ok(DecodeOutcome::Skipped);
        }

        let size = inner.decode(unit)?;
        if unit.keyframe {
            self.awaiting_keyframe = false;
            self.recovering = false;
        }
        self.frames += 1;

        match size {
            Some(size) if self.frame_size != Some(size) => {
                self.frame_size = Some(size);
                Ok(DecodeOutcome::Resized(size))
            }
            _ => Ok(DecodeOutcome::Decoded),
        }
    }

    /// Lightweight in-place reset.  The cached configuration is re-applied and
    /// the decoder waits for the next keyframe.
    ///
    /// # Errors
    ///
    /// Propagates a failing reset or configure; the caller must then fall back
    /// to a full reconnect.
    pub fn reset(&mut self) -> Result<(), DecoderError> {
        let inner = self.inner.as_mut().ok_or(DecoderError::Closed)?;
        inner.reset()?;
        if !self.config.is_empty() {
            inner.configure(&self.config)?;
        }
        self.awaiting_keyframe = true;
        self.recovering = true;
        Ok(())
    }

    /// `true` between a reset and the next decoded keyframe.
    pub fn is_recovering(&self) -> bool {
        self.recovering
    }

    pub fn frame_size(&self) -> Option<Size> {
        self.frame_size
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Disposes the platform decoder.  Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.close();
        }
    }
}

impl Drop for StreamDecoder {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
