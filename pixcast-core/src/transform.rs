//! Per-pixel brightness scaling.
//!
//! Every output channel depends only on its own input byte, so the scale
//! is precomputed once into a 256-entry table and applied with a plain
//! `chunks_exact_mut` loop over RGBA pixels.

use bytes::BytesMut;

use crate::error::ConfigError;
use crate::frame::{BYTES_PER_PIXEL, Frame};

/// Highest accepted brightness percentage.
pub const MAX_BRIGHTNESS: u32 = 100;

// ── BrightnessFactor ─────────────────────────────────────────────

/// `brightness / 100`, with the channel lookup table it implies.
#[derive(Clone)]
pub struct BrightnessFactor {
    percent: u8,
    lut: [u8; 256],
}

impl BrightnessFactor {
    /// Build a factor from a percentage in `0..=100`.
    pub fn from_percent(brightness: u32) -> Result<Self, ConfigError> {
        if brightness > MAX_BRIGHTNESS {
            return Err(ConfigError::BrightnessOutOfRange(brightness));
        }
        let factor = brightness as f64 / 100.0;
        let mut lut = [0u8; 256];
        for (value, out) in lut.iter_mut().enumerate() {
            // factor <= 1, so the result always fits in a byte.
            *out = (value as f64 * factor).round() as u8;
        }
        Ok(Self {
            percent: brightness as u8,
            lut,
        })
    }

    /// Full brightness.
    pub fn identity() -> Self {
        let mut lut = [0u8; 256];
        for (value, out) in lut.iter_mut().enumerate() {
            *out = value as u8;
        }
        Self { percent: 100, lut }
    }

    /// Configured percentage.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Scale as a fraction in `0.0..=1.0`.
    pub fn factor(&self) -> f64 {
        self.percent as f64 / 100.0
    }

    pub fn is_identity(&self) -> bool {
        self.percent == 100
    }

    /// Scaled value of a single colour channel.
    pub fn scale(&self, channel: u8) -> u8 {
        self.lut[channel as usize]
    }
}

impl std::fmt::Debug for BrightnessFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrightnessFactor")
            .field("percent", &self.percent)
            .finish()
    }
}

impl Default for BrightnessFactor {
    fn default() -> Self {
        Self::identity()
    }
}

// ── Transform ────────────────────────────────────────────────────

/// Scale R, G and B of every pixel; alpha is left alone.
///
/// The output has the same length and sequence as the input.
pub fn apply_brightness(frame: Frame, brightness: &BrightnessFactor) -> Frame {
    if brightness.is_identity() {
        return frame;
    }

    let Frame { sequence, data } = frame;
    let mut pixels = data
        .try_into_mut()
        .unwrap_or_else(|shared| BytesMut::from(&shared[..]));

    for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        px[0] = brightness.scale(px[0]);
        px[1] = brightness.scale(px[1]);
        px[2] = brightness.scale(px[2]);
    }

    Frame::new(sequence, pixels.freeze())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn frame(pixels: &[[u8; 4]]) -> Frame {
        Frame::new(7, Bytes::from(pixels.concat()))
    }

    #[test]
    fn full_brightness_is_identity() {
        let input = frame(&[[255, 128, 1, 200], [0, 17, 99, 0]]);
        let b = BrightnessFactor::from_percent(100).unwrap();
        assert_eq!(apply_brightness(input.clone(), &b), input);
    }

    #[test]
    fn half_brightness_rounds_to_nearest() {
        let input = frame(&[[255, 128, 3, 77]]);
        let b = BrightnessFactor::from_percent(50).unwrap();
        let out = apply_brightness(input, &b);

        // 127.5 -> 128, 64 -> 64, 1.5 -> 2, alpha untouched
        assert_eq!(&out.data[..], &[128, 64, 2, 77]);
        assert_eq!(out.sequence, 7);
    }

    #[test]
    fn zero_brightness_keeps_alpha() {
        let input = frame(&[[10, 20, 30, 40], [250, 251, 252, 253]]);
        let b = BrightnessFactor::from_percent(0).unwrap();
        let out = apply_brightness(input, &b);
        assert_eq!(&out.data[..], &[0, 0, 0, 40, 0, 0, 0, 253]);
    }

    #[test]
    fn length_is_preserved() {
        let input = Frame::new(0, Bytes::from(vec![200u8; 128 * 64 * 4]));
        let b = BrightnessFactor::from_percent(33).unwrap();
        let out = apply_brightness(input, &b);
        assert_eq!(out.len(), 128 * 64 * 4);
        assert_eq!(out.data[0], 66);
        assert_eq!(out.data[3], 200);
    }

    #[test]
    fn out_of_range_rejected() {
        assert_eq!(
            BrightnessFactor::from_percent(101).unwrap_err(),
            ConfigError::BrightnessOutOfRange(101)
        );
    }

    #[test]
    fn factor_accessors() {
        let b = BrightnessFactor::from_percent(25).unwrap();
        assert_eq!(b.percent(), 25);
        assert!((b.factor() - 0.25).abs() < f64::EPSILON);
        assert!(!b.is_identity());
        assert!(BrightnessFactor::default().is_identity());
        assert_eq!(b.scale(200), 50);
    }
}
