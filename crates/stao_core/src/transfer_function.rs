//! Transfer functions map normalized scalar values to color and opacity.
//!
//! A `TransferFunction` is a pair of piecewise-linear curves (color and
//! opacity) over [0, 1]. Engines bake it into a `TransferTable` once and
//! look colors up per sample; the table is rebuilt only when the function
//! changes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use stao_math::{Vec3, Vec4};

use crate::error::{CoreError, CoreResult};

/// Default number of entries in a baked table.
pub const DEFAULT_TABLE_SIZE: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorPoint {
    pub position: f32,
    pub color: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpacityPoint {
    pub position: f32,
    pub opacity: f32,
}

/// Piecewise-linear color and opacity curves over [0, 1].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferFunction {
    pub color_points: Vec<ColorPoint>,
    pub opacity_points: Vec<OpacityPoint>,
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self::rainbow()
    }
}

impl TransferFunction {
    /// Blue-to-red rainbow with a linear opacity ramp.
    pub fn rainbow() -> Self {
        let colors = [
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        Self {
            color_points: colors
                .iter()
                .enumerate()
                .map(|(i, &color)| ColorPoint {
                    position: i as f32 / 4.0,
                    color,
                })
                .collect(),
            opacity_points: vec![
                OpacityPoint {
                    position: 0.0,
                    opacity: 0.0,
                },
                OpacityPoint {
                    position: 1.0,
                    opacity: 1.0,
                },
            ],
        }
    }

    /// One color and one opacity everywhere.
    pub fn constant(color: Vec3, opacity: f32) -> Self {
        Self {
            color_points: vec![ColorPoint {
                position: 0.0,
                color,
            }],
            opacity_points: vec![OpacityPoint {
                position: 0.0,
                opacity,
            }],
        }
    }

    /// Load a transfer function from an image strip.
    ///
    /// The first row of the image is read left to right; RGB becomes the
    /// color curve (converted from sRGB to linear) and alpha the opacity.
    pub fn from_image(path: &Path) -> CoreResult<Self> {
        let img = image::open(path).map_err(|e| {
            CoreError::TransferFunctionLoad(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(CoreError::Empty {
                what: "transfer function image",
            });
        }

        let step = if width > 1 { 1.0 / (width - 1) as f32 } else { 0.0 };
        let mut color_points = Vec::with_capacity(width as usize);
        let mut opacity_points = Vec::with_capacity(width as usize);
        for x in 0..width {
            let p = rgba.get_pixel(x, 0);
            let position = x as f32 * step;
            color_points.push(ColorPoint {
                position,
                color: Vec3::new(srgb_to_linear(p[0]), srgb_to_linear(p[1]), srgb_to_linear(p[2])),
            });
            opacity_points.push(OpacityPoint {
                position,
                opacity: p[3] as f32 / 255.0,
            });
        }

        log::debug!("Loaded transfer function: {} ({} entries)", path.display(), width);

        Ok(Self {
            color_points,
            opacity_points,
        })
    }

    pub fn color_at(&self, t: f32) -> Vec3 {
        piecewise(&self.color_points, t, |p| p.position, |p| p.color, Vec3::ONE, |a, b, f| a.lerp(b, f))
    }

    pub fn opacity_at(&self, t: f32) -> f32 {
        piecewise(
            &self.opacity_points,
            t,
            |p| p.position,
            |p| p.opacity,
            1.0,
            |a, b, f| a + (b - a) * f,
        )
    }

    /// Evaluate the curves at `resolution` evenly spaced positions.
    pub fn bake(&self, resolution: usize) -> TransferTable {
        self.bake_scaled(resolution, 1.0)
    }

    /// Like `bake`, with the evaluated opacity multiplied by `opacity_scale`
    /// and clamped to [0, 1].
    pub fn bake_scaled(&self, resolution: usize, opacity_scale: f32) -> TransferTable {
        let resolution = resolution.max(2);
        let entries = (0..resolution)
            .map(|i| {
                let t = i as f32 / (resolution - 1) as f32;
                let opacity = (self.opacity_at(t) * opacity_scale).clamp(0.0, 1.0);
                self.color_at(t).extend(opacity)
            })
            .collect();
        TransferTable { entries }
    }
}

fn piecewise<P, T, FP, FV, FL>(points: &[P], t: f32, position: FP, value: FV, default: T, lerp: FL) -> T
where
    T: Copy,
    FP: Fn(&P) -> f32,
    FV: Fn(&P) -> T,
    FL: Fn(T, T, f32) -> T,
{
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return default,
    };
    if t <= position(first) {
        return value(first);
    }
    if t >= position(last) {
        return value(last);
    }
    for pair in points.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let (pa, pb) = (position(a), position(b));
        if t >= pa && t <= pb {
            let span = pb - pa;
            let f = if span > f32::EPSILON { (t - pa) / span } else { 0.0 };
            return lerp(value(a), value(b), f);
        }
    }
    value(last)
}

/// Convert sRGB byte value to linear float.
fn srgb_to_linear(value: u8) -> f32 {
    let v = value as f32 / 255.0;
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// A transfer function sampled into a lookup table of RGBA entries.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferTable {
    entries: Vec<Vec4>,
}

impl TransferTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Vec4] {
        &self.entries
    }

    /// Linearly interpolated lookup at normalized position `t`.
    pub fn sample(&self, t: f32) -> Vec4 {
        if self.entries.is_empty() {
            return Vec4::ONE;
        }
        let x = t.clamp(0.0, 1.0) * (self.entries.len() - 1) as f32;
        let i0 = x.floor() as usize;
        let i1 = (i0 + 1).min(self.entries.len() - 1);
        self.entries[i0].lerp(self.entries[i1], x - i0 as f32)
    }
}
