//! Shared frame types used between pipeline stages.
//!
//! Frames travel as reference-counted [`Bytes`], so slicing a frame into
//! per-display sub-frames never copies pixel data.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// RGBA: red, green, blue, alpha.
pub const BYTES_PER_PIXEL: usize = 4;

/// Largest frame a pipeline accepts. Every transport must carry a whole
/// frame in one publish.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

// ── FrameSpec ────────────────────────────────────────────────────

/// Fixed geometry of every frame flowing through a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSpec {
    width: u32,
    height: u32,
    frame_byte_size: usize,
}

impl FrameSpec {
    /// Validate dimensions and derive the frame byte size.
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroDimension { width, height });
        }
        let frame_byte_size = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(BYTES_PER_PIXEL))
            .filter(|&bytes| bytes <= MAX_FRAME_BYTES)
            .ok_or(ConfigError::FrameTooLarge {
                width,
                height,
                limit: MAX_FRAME_BYTES,
            })?;

        Ok(Self {
            width,
            height,
            frame_byte_size,
        })
    }

    /// Width in pixels.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// `width * height * 4`, always non-zero.
    pub const fn frame_byte_size(&self) -> usize {
        self.frame_byte_size
    }

    /// Bytes in one row of pixels.
    pub const fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Rows given to each display in dual mode. An odd last row is dropped.
    pub const fn half_height(&self) -> u32 {
        self.height / 2
    }
}

impl std::fmt::Display for FrameSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} rgba", self.width, self.height)
    }
}

// ── DisplayMode ──────────────────────────────────────────────────

/// How many physical displays a frame is spread across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Whole frame to `display1`.
    #[default]
    Single,
    /// Top half to `display1`, bottom half to `display2`.
    Dual,
}

impl DisplayMode {
    /// Number of targets a frame maps to.
    pub const fn target_count(self) -> usize {
        match self {
            DisplayMode::Single => 1,
            DisplayMode::Dual => 2,
        }
    }
}

// ── TargetId ─────────────────────────────────────────────────────

/// A physical display addressed on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetId {
    Display1,
    Display2,
}

impl TargetId {
    pub const ALL: [TargetId; 2] = [TargetId::Display1, TargetId::Display2];

    /// Stable identifier used as the transport topic suffix.
    pub const fn as_str(self) -> &'static str {
        match self {
            TargetId::Display1 => "display1",
            TargetId::Display2 => "display2",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            TargetId::Display1 => 0,
            TargetId::Display2 => 1,
        }
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One complete RGBA image, exactly `frame_byte_size` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position in the session's output, starting at 0.
    pub sequence: u64,
    /// Row-major, top-to-bottom pixel data.
    pub data: Bytes,
}

impl Frame {
    pub fn new(sequence: u64, data: Bytes) -> Self {
        Self { sequence, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ── SubFrame ─────────────────────────────────────────────────────

/// The part of a frame destined for a single display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubFrame {
    pub target: TargetId,
    /// Sequence of the frame this was cut from.
    pub sequence: u64,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_spec_sizes() {
        let spec = FrameSpec::new(128, 64).unwrap();
        assert_eq!(spec.frame_byte_size(), 128 * 64 * 4);
        assert_eq!(spec.row_bytes(), 512);
        assert_eq!(spec.half_height(), 32);
        assert_eq!(spec.to_string(), "128x64 rgba");
    }

    #[test]
    fn frame_spec_rejects_zero() {
        assert_eq!(
            FrameSpec::new(0, 64),
            Err(ConfigError::ZeroDimension {
                width: 0,
                height: 64
            })
        );
        assert!(FrameSpec::new(64, 0).is_err());
    }

    #[test]
    fn frame_spec_rejects_oversized_frames() {
        // 2048x2048 RGBA is exactly the limit; one more row is not.
        let spec = FrameSpec::new(2048, 2048).unwrap();
        assert_eq!(spec.frame_byte_size(), MAX_FRAME_BYTES);

        let err = FrameSpec::new(2048, 2049).unwrap_err();
        assert_eq!(
            err,
            ConfigError::FrameTooLarge {
                width: 2048,
                height: 2049,
                limit: MAX_FRAME_BYTES,
            }
        );
        assert!(err.to_string().contains("2048x2049"));
        assert!(FrameSpec::new(u32::MAX, u32::MAX).is_err());
    }

    #[test]
    fn odd_height_halves_down() {
        let spec = FrameSpec::new(128, 65).unwrap();
        assert_eq!(spec.half_height(), 32);
    }

    #[test]
    fn display_mode_serde_names() {
        use serde::de::IntoDeserializer;
        use serde::de::value::{Error, StrDeserializer};

        let de: StrDeserializer<'_, Error> = "dual".into_deserializer();
        assert_eq!(DisplayMode::deserialize(de).unwrap(), DisplayMode::Dual);
        assert_eq!(DisplayMode::Dual.target_count(), 2);
        assert_eq!(DisplayMode::default(), DisplayMode::Single);
    }

    #[test]
    fn target_ids() {
        assert_eq!(TargetId::Display1.as_str(), "display1");
        assert_eq!(TargetId::Display2.to_string(), "display2");
        assert_eq!(TargetId::ALL.len(), 2);
    }
}
