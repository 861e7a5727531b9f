//! Per-pixel blend mode math.

use common::Color;
use serde::{Deserialize, Serialize};

/// Blend mode for compositing a layer's contribution onto the frame buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

/// Separable blend function on a single channel, components in 0.0 - 1.0.
fn blend_channel(mode: BlendMode, cb: f32, cs: f32) -> f32 {
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => cb * cs,
        BlendMode::Screen => cb + cs - cb * cs,
        BlendMode::Overlay => blend_channel(BlendMode::HardLight, cs, cb),
        BlendMode::Darken => cb.min(cs),
        BlendMode::Lighten => cb.max(cs),
        BlendMode::ColorDodge => {
            if cb == 0.0 {
                0.0
            } else if cs == 1.0 {
                1.0
            } else {
                (cb / (1.0 - cs)).min(1.0)
            }
        }
        BlendMode::ColorBurn => {
            if cb == 1.0 {
                1.0
            } else if cs == 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - cb) / cs).min(1.0)
            }
        }
        BlendMode::HardLight => {
            if cs <= 0.5 {
                blend_channel(BlendMode::Multiply, cb, 2.0 * cs)
            } else {
                blend_channel(BlendMode::Screen, cb, 2.0 * cs - 1.0)
            }
        }
        BlendMode::SoftLight => {
            if cs <= 0.5 {
                cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
            } else {
                let d = if cb <= 0.25 {
                    ((16.0 * cb - 12.0) * cb + 4.0) * cb
                } else {
                    cb.sqrt()
                };
                cb + (2.0 * cs - 1.0) * (d - cb)
            }
        }
        BlendMode::Difference => (cb - cs).abs(),
        BlendMode::Exclusion => cb + cs - 2.0 * cb * cs,
    }
}

/// Composite a source pixel onto a backdrop pixel.
///
/// The blend function mixes with the plain source color by the backdrop's
/// alpha, then the result is source-over composited, with the source alpha
/// scaled by `opacity`.
pub fn blend_pixel(backdrop: Color, src: Color, opacity: u8, mode: BlendMode) -> Color {
    let sa = (src.a as f32 / 255.0) * (opacity as f32 / 255.0);
    if sa == 0.0 {
        return backdrop;
    }

    let ba = backdrop.a as f32 / 255.0;
    let out_a = sa + ba * (1.0 - sa);
    if out_a == 0.0 {
        return Color::TRANSPARENT;
    }

    let channel = |cb: u8, cs: u8| -> u8 {
        let cb = cb as f32 / 255.0;
        let cs = cs as f32 / 255.0;
        // Where the backdrop is transparent the blend function has no
        // backdrop to react to, so the source color passes through.
        let mixed = (1.0 - ba) * cs + ba * blend_channel(mode, cb, cs);
        let out = (mixed * sa + cb * ba * (1.0 - sa)) / out_a;
        (out * 255.0).round() as u8
    };

    Color::rgba(
        channel(backdrop.r, src.r),
        channel(backdrop.g, src.g),
        channel(backdrop.b, src.b),
        (out_a * 255.0).round() as u8,
    )
}
