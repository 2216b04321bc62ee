//! # Blending
//!
//! Compositing modes for layers and groups, and the per-pixel math to apply them onto
//! straight-alpha RGBA8 surfaces.

use crate::util::Opacity;

#[derive(
    strum::AsRefStr,
    strum::EnumIter,
    strum::EnumString,
    PartialEq,
    Eq,
    Copy,
    Clone,
    Hash,
    Debug,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Add,
    Overlay,
    HardLight,
    SoftLight,
    Lighten,
    Darken,
    ColorBurn,
    ColorDodge,
    Difference,
    Exclusion,
    Negation,
    Reflect,
    Glow,
    Subtract,
    Divide,
    LinearBurn,
    VividLight,
    LinearLight,
    PinLight,
    HardMix,
    /// Porter-Duff XOR of the two coverages.
    Xor,
    /// Replace the destination outright, alpha included.
    Overwrite,
}
impl BlendMode {
    /// Blend a single straight-alpha color channel, each in `[0, 1]`.
    /// Only meaningful for the separable modes.
    fn channel(self, base: f32, top: f32) -> f32 {
        match self {
            Self::Normal | Self::Overwrite | Self::Xor => top,
            Self::Multiply => base * top,
            Self::Screen => 1.0 - (1.0 - base) * (1.0 - top),
            Self::Add => (base + top).min(1.0),
            Self::Overlay => overlay(base, top),
            Self::HardLight => overlay(top, base),
            Self::SoftLight => soft_light(base, top),
            Self::Lighten => base.max(top),
            Self::Darken => base.min(top),
            Self::ColorBurn => color_burn(base, top),
            Self::ColorDodge => color_dodge(base, top),
            Self::Difference => (base - top).abs(),
            Self::Exclusion => base + top - 2.0 * base * top,
            Self::Negation => 1.0 - (1.0 - base - top).abs(),
            Self::Reflect => reflect(base, top),
            Self::Glow => reflect(top, base),
            Self::Subtract => (base - top).max(0.0),
            Self::Divide => {
                if top <= 0.0 {
                    1.0
                } else {
                    (base / top).min(1.0)
                }
            }
            Self::LinearBurn => (base + top - 1.0).max(0.0),
            Self::VividLight => {
                if top <= 0.5 {
                    color_burn(base, 2.0 * top)
                } else {
                    color_dodge(base, 2.0 * (top - 0.5))
                }
            }
            Self::LinearLight => (base + 2.0 * top - 1.0).clamp(0.0, 1.0),
            Self::PinLight => {
                if top <= 0.5 {
                    base.min(2.0 * top)
                } else {
                    base.max(2.0 * (top - 0.5))
                }
            }
            Self::HardMix => {
                if base + top >= 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

fn overlay(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}
fn color_burn(base: f32, top: f32) -> f32 {
    if top <= 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - base) / top).max(0.0)
    }
}
fn color_dodge(base: f32, top: f32) -> f32 {
    if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}
fn reflect(base: f32, top: f32) -> f32 {
    if top >= 1.0 {
        1.0
    } else {
        (base * base / (1.0 - top)).min(1.0)
    }
}
/// W3C soft light.
fn soft_light(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

/// Blend mode for an object, including a mode and opacity modulate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Blend {
    pub mode: BlendMode,
    pub opacity: Opacity,
}

fn unorm(v: u8) -> f32 {
    f32::from(v) / 255.0
}
fn to_unorm8(v: f32) -> u8 {
    use az::SaturatingAs;
    // Rounding, rather than truncating, keeps opaque round trips exact.
    (v * 255.0).round().saturating_as::<u8>()
}

/// Composite `top` over `base` with the given blend. Both are straight (non-premultiplied) RGBA8.
#[must_use]
pub fn composite_pixel(base: [u8; 4], top: [u8; 4], blend: Blend) -> [u8; 4] {
    let opacity = blend.opacity.get();
    if top[3] == 0 || opacity <= 0.0 {
        return if blend.mode == BlendMode::Overwrite && opacity > 0.0 {
            [0; 4]
        } else {
            base
        };
    }
    if blend.mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let base_a = unorm(base[3]);
    let top_a = unorm(top[3]) * opacity;
    let base_rgb = [unorm(base[0]), unorm(base[1]), unorm(base[2])];
    let top_rgb = [unorm(top[0]), unorm(top[1]), unorm(top[2])];

    match blend.mode {
        BlendMode::Overwrite => {
            return [top[0], top[1], top[2], to_unorm8(top_a)];
        }
        BlendMode::Xor => {
            let out_a = base_a * (1.0 - top_a) + top_a * (1.0 - base_a);
            if out_a <= 0.0 {
                return [0; 4];
            }
            let mix = |b: f32, t: f32| {
                to_unorm8((b * base_a * (1.0 - top_a) + t * top_a * (1.0 - base_a)) / out_a)
            };
            return [
                mix(base_rgb[0], top_rgb[0]),
                mix(base_rgb[1], top_rgb[1]),
                mix(base_rgb[2], top_rgb[2]),
                to_unorm8(out_a),
            ];
        }
        _ => (),
    }

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return [0; 4];
    }
    let channel = |idx: usize| {
        // Blend against the backdrop only where it exists, as per the W3C compositing model.
        let blended = blend.mode.channel(base_rgb[idx], top_rgb[idx]);
        let source = (1.0 - base_a) * top_rgb[idx] + base_a * blended;
        to_unorm8((source * top_a + base_rgb[idx] * base_a * (1.0 - top_a)) / out_a)
    };
    [channel(0), channel(1), channel(2), to_unorm8(out_a)]
}

/// Composite all of `top` onto `base`, which must be the same size.
pub fn composite_image(
    base: &mut image::RgbaImage,
    top: &image::RgbaImage,
    blend: Blend,
) -> Result<(), crate::util::DimensionMismatch> {
    use crate::util::Size;
    Size::of_image(base).expect(Size::of_image(top))?;
    if blend.opacity.get() <= 0.0 && blend.mode != BlendMode::Overwrite {
        return Ok(());
    }
    for (dst, src) in base.pixels_mut().zip(top.pixels()) {
        dst.0 = composite_pixel(dst.0, src.0, blend);
    }
    Ok(())
}
