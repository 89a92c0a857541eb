//! Fixed-size frame reassembly from an arbitrarily chunked byte stream.
//!
//! The decoder writes raw RGBA frames back to back on its stdout, but the
//! pipe hands them over in chunks that have nothing to do with frame
//! boundaries. [`FrameReassembler`] keeps the carry-over bytes and cuts
//! exactly one frame at a time off the front of its accumulator.
//!
//! ```text
//!   chunk ─► [ accumulator ........ ] ─► Frame(0), Frame(1), ...
//!                              └── remainder < frame_byte_size stays
//! ```

use bytes::BytesMut;

use crate::frame::{Frame, FrameSpec};

/// Accumulates chunks and slices out complete frames.
///
/// Each instance owns its accumulator and sequence counter. Feeding the
/// same instance from two tasks at once is ruled out by `&mut self`.
#[derive(Debug)]
pub struct FrameReassembler {
    accumulator: BytesMut,
    frame_size: usize,
    next_sequence: u64,
}

impl FrameReassembler {
    /// Create an empty reassembler for the given geometry.
    pub fn new(spec: FrameSpec) -> Self {
        let frame_size = spec.frame_byte_size();
        Self {
            accumulator: BytesMut::with_capacity(frame_size),
            frame_size,
            next_sequence: 0,
        }
    }

    /// Append `chunk` and return the frames it completes.
    ///
    /// The iterator is lazy: frames not pulled from it stay in the
    /// accumulator and come out of the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Reassembled<'_> {
        self.accumulator.extend_from_slice(chunk);
        Reassembled { inner: self }
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.accumulator.len()
    }

    /// Size of one complete frame in bytes.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Sequence number the next emitted frame will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Discard any partial frame. The sequence counter is kept.
    pub fn reset(&mut self) {
        self.accumulator.clear();
    }

    fn split_frame(&mut self) -> Option<Frame> {
        if self.accumulator.len() < self.frame_size {
            return None;
        }
        let data = self.accumulator.split_to(self.frame_size).freeze();
        let frame = Frame::new(self.next_sequence, data);
        self.next_sequence += 1;
        Some(frame)
    }
}

/// Frames completed by one [`FrameReassembler::feed`] call.
#[derive(Debug)]
pub struct Reassembled<'a> {
    inner: &'a mut FrameReassembler,
}

impl Iterator for Reassembled<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.inner.split_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.inner.accumulator.len() / self.inner.frame_size;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Reassembled<'_> {}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_2x2() -> FrameSpec {
        // 16 bytes per frame
        FrameSpec::new(2, 2).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn partial_chunk_is_buffered() {
        let mut r = FrameReassembler::new(spec_2x2());
        assert_eq!(r.feed(&[1; 10]).count(), 0);
        assert_eq!(r.buffered(), 10);
    }

    #[test]
    fn frame_spanning_chunks() {
        let mut r = FrameReassembler::new(spec_2x2());
        let data = pattern(16);
        assert_eq!(r.feed(&data[..5]).count(), 0);
        assert_eq!(r.feed(&data[5..11]).count(), 0);
        let frames: Vec<_> = r.feed(&data[11..]).collect();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(&frames[0].data[..], &data[..]);
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn many_frames_in_one_chunk() {
        let mut r = FrameReassembler::new(spec_2x2());
        let data = pattern(16 * 3 + 7);
        let frames: Vec<_> = r.feed(&data).collect();

        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(|f| f.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(frames.iter().all(|f| f.len() == 16));
        assert_eq!(r.buffered(), 7);
        assert_eq!(r.next_sequence(), 3);
    }

    #[test]
    fn alignment_holds_for_any_split() {
        let total = 16 * 5 + 9;
        let data = pattern(total);

        for step in 1..=40 {
            let mut r = FrameReassembler::new(spec_2x2());
            let mut out = Vec::new();
            for chunk in data.chunks(step) {
                out.extend(r.feed(chunk));
            }

            assert_eq!(out.len(), 5, "step {step}");
            assert!(out.iter().all(|f| f.len() == 16));
            assert_eq!(r.buffered(), 9, "step {step}");

            // Nothing lost, nothing duplicated.
            let mut joined: Vec<u8> = out.iter().flat_map(|f| f.data.to_vec()).collect();
            joined.extend_from_slice(&r.accumulator);
            assert_eq!(joined, data, "step {step}");
        }
    }

    #[test]
    fn unpulled_frames_carry_over() {
        let mut r = FrameReassembler::new(spec_2x2());
        let mut it = r.feed(&pattern(32));
        assert_eq!(it.len(), 2);
        assert_eq!(it.next().map(|f| f.sequence), Some(0));
        drop(it);

        let rest: Vec<_> = r.feed(&[]).collect();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].sequence, 1);
    }

    #[test]
    fn reset_drops_partial_frame() {
        let mut r = FrameReassembler::new(spec_2x2());
        assert_eq!(r.feed(&[0xAA; 12]).count(), 0);
        r.reset();
        assert_eq!(r.buffered(), 0);

        let frames: Vec<_> = r.feed(&[0x55; 16]).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].data.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn empty_chunk_is_harmless() {
        let mut r = FrameReassembler::new(spec_2x2());
        assert_eq!(r.feed(&[]).count(), 0);
        assert_eq!(r.buffered(), 0);
        assert_eq!(r.frame_size(), 16);
    }

    #[test]
    fn accumulator_starts_at_one_frame() {
        let spec = FrameSpec::new(128, 64).unwrap();
        let r = FrameReassembler::new(spec);
        let capacity = r.accumulator.capacity();
        assert!(capacity >= spec.frame_byte_size());
        assert!(capacity < 2 * spec.frame_byte_size());
    }
}
