//! Mapping a frame onto one or two physical displays.
//!
//! ```text
//!  single                    dual
//!  ┌──────────┐              ┌──────────┐ rows 0..half        → display1
//!  │ display1 │              ├──────────┤ rows half..2*half   → display2
//!  └──────────┘              └──────────┘ row 2*half (odd h)  → dropped
//! ```

use bytes::Bytes;

use crate::frame::{DisplayMode, Frame, FrameSpec, SubFrame, TargetId};

/// Split `frame` into the ordered sub-frames for `mode`.
///
/// `display1` always comes first. Sub-frames share the frame's buffer.
pub fn distribute(frame: Frame, mode: DisplayMode, spec: &FrameSpec) -> Vec<SubFrame> {
    let Frame { sequence, data } = frame;

    match mode {
        DisplayMode::Single => vec![SubFrame {
            target: TargetId::Display1,
            sequence,
            data,
        }],
        DisplayMode::Dual => {
            let half = spec.half_height() as usize;
            let top = rows(&data, spec, 0, half);
            let bottom = rows(&data, spec, half, half);
            vec![
                SubFrame {
                    target: TargetId::Display1,
                    sequence,
                    data: top,
                },
                SubFrame {
                    target: TargetId::Display2,
                    sequence,
                    data: bottom,
                },
            ]
        }
    }
}

/// `count` rows starting at `first`, clipped to what `data` holds.
fn rows(data: &Bytes, spec: &FrameSpec, first: usize, count: usize) -> Bytes {
    let stride = spec.row_bytes();
    let start = (first * stride).min(data.len());
    let end = ((first + count) * stride).min(data.len());
    data.slice(start..end)
}

// ── Tests ────────────────────────────────────────────────────────
