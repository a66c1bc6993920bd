//! Triangle rasterization for the software device.
//!
//! Triangles arrive in clip space. They are clipped against the near and far
//! planes (Sutherland-Hodgman), perspective-divided, mapped to pixels and
//! filled with the edge-function algorithm. Varyings are interpolated with
//! perspective correction; depth is interpolated linearly in screen space.
//!
//! Conventions follow wgpu: clip-space depth in [0, w], NDC y up, pixel
//! rows top to bottom. A triangle that winds counter-clockwise in NDC is
//! front facing.

use stao_math::{Vec2, Vec3, Vec4};

use super::framebuffer::{Framebuffer, MAX_COLOR_ATTACHMENTS};

/// Values that can be interpolated across a primitive.
pub trait Interpolate: Copy {
    fn lerp(a: &Self, b: &Self, t: f32) -> Self;

    fn barycentric(v: [&Self; 3], w: [f32; 3]) -> Self;
}

impl Interpolate for () {
    fn lerp(_: &Self, _: &Self, _: f32) -> Self {}

    fn barycentric(_: [&Self; 3], _: [f32; 3]) -> Self {}
}

macro_rules! impl_interpolate {
    ($($t:ty),*) => {
        $(
            impl Interpolate for $t {
                #[inline]
                fn lerp(a: &Self, b: &Self, t: f32) -> Self {
                    *a + (*b - *a) * t
                }

                #[inline]
                fn barycentric(v: [&Self; 3], w: [f32; 3]) -> Self {
                    *v[0] * w[0] + *v[1] * w[1] + *v[2] * w[2]
                }
            }
        )*
    };
}

impl_interpolate!(f32, Vec2, Vec3, Vec4);

/// A vertex after the vertex stage: clip-space position plus varyings.
#[derive(Clone, Copy, Debug)]
pub struct ClipVertex<V> {
    pub position: Vec4,
    pub varying: V,
}

impl<V: Interpolate> ClipVertex<V> {
    pub fn new(position: Vec4, varying: V) -> Self {
        Self { position, varying }
    }

    fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        Self {
            position: a.position.lerp(b.position, t),
            varying: V::lerp(&a.varying, &b.varying, t),
        }
    }
}

/// Everything a fragment shader gets to see.
#[derive(Clone, Copy, Debug)]
pub struct FragmentInput<V> {
    pub x: u32,
    pub y: u32,
    /// Pixel center in window coordinates, z = depth in [0, 1].
    pub frag_coord: Vec3,
    pub varying: V,
    /// Index of the source triangle in the index buffer.
    pub primitive_id: u32,
    pub front_facing: bool,
}

/// Fragment shader result: one value per color attachment and an optional
/// depth override.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FragmentOutput {
    pub colors: [Vec4; MAX_COLOR_ATTACHMENTS],
    pub depth: Option<f32>,
}

impl FragmentOutput {
    pub fn new(colors: [Vec4; MAX_COLOR_ATTACHMENTS]) -> Self {
        Self {
            colors,
            depth: None,
        }
    }

    /// Write `color` to attachment 0 only.
    pub fn color(color: Vec4) -> Self {
        Self::new([color, Vec4::ZERO, Vec4::ZERO])
    }

    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = Some(depth);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    #[default]
    None,
    Back,
    Front,
}

/// How fragment colors combine with what is already in the target.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum BlendMode {
    #[default]
    Replace,
    /// `dst + (src - dst) * weight`, the same weight for every channel.
    ConstantAlpha(f32),
}

impl BlendMode {
    #[inline]
    pub fn apply(self, src: Vec4, dst: Vec4) -> Vec4 {
        match self {
            BlendMode::Replace => src,
            BlendMode::ConstantAlpha(w) => dst + (src - dst) * w,
        }
    }
}

/// Fixed-function state for one draw call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawState {
    pub cull: CullMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            cull: CullMode::None,
            depth_test: true,
            depth_write: true,
            blend: BlendMode::Replace,
        }
    }
}

impl DrawState {
    /// State for full-screen passes: no depth test, replace.
    pub fn fullscreen() -> Self {
        Self {
            cull: CullMode::None,
            depth_test: false,
            depth_write: false,
            blend: BlendMode::Replace,
        }
    }

    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_depth_write(mut self, depth_write: bool) -> Self {
        self.depth_write = depth_write;
        self
    }
}

/// Counters for one draw call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RasterStats {
    pub triangles: u32,
    pub culled: u32,
    pub clipped: u32,
    pub fragments_shaded: u64,
    pub fragments_written: u64,
}

/// Write one shaded fragment to the target, honoring depth and blend state.
#[inline]
pub(crate) fn write_fragment(
    target: &mut Framebuffer,
    state: &DrawState,
    x: u32,
    y: u32,
    output: &FragmentOutput,
    default_depth: f32,
) -> bool {
    let depth = output.depth.unwrap_or(default_depth);
    if state.depth_test && target.depth().is_some() && depth >= target.read_depth(x, y) {
        return false;
    }
    for (index, value) in output.colors.iter().enumerate().take(target.color_count()) {
        let dst = target.read(index, x, y);
        if let Some(texture) = target.color_mut(index) {
            texture.store(x, y, state.blend.apply(*value, dst));
        }
    }
    if state.depth_write {
        if let Some(d) = target.depth_mut() {
            d.store(x, y, depth);
        }
    }
    true
}

/// Clip a polygon against `0 <= z <= w` and `w > epsilon`.
fn clip_polygon<V: Interpolate>(polygon: Vec<ClipVertex<V>>) -> Vec<ClipVertex<V>> {
    const W_EPSILON: f32 = 1e-5;
    let planes: [fn(&Vec4) -> f32; 3] = [
        |p| p.z,
        |p| p.w - p.z,
        |p| p.w - W_EPSILON,
    ];

    let mut output = polygon;
    for distance in planes {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        for i in 0..input.len() {
            let current = &input[i];
            let next = &input[(i + 1) % input.len()];
            let d0 = distance(&current.position);
            let d1 = distance(&next.position);

            if d0 >= 0.0 {
                output.push(*current);
            }
            if (d0 >= 0.0) != (d1 >= 0.0) {
                let t = d0 / (d0 - d1);
                output.push(ClipVertex::lerp(current, next, t));
            }
        }
    }
    output
}

#[inline]
fn edge_function(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (p.x - a.x) * (b.y - a.y) - (p.y - a.y) * (b.x - a.x)
}

struct ScreenVertex<V> {
    pixel: Vec2,
    depth: f32,
    inv_w: f32,
    varying: V,
}

/// Rasterize an indexed triangle list into `target`.
pub(crate) fn rasterize<V, F>(
    target: &mut Framebuffer,
    state: &DrawState,
    vertices: &[ClipVertex<V>],
    indices: &[u32],
    mut shader: F,
) -> RasterStats
where
    V: Interpolate,
    F: FnMut(&FragmentInput<V>) -> Option<FragmentOutput>,
{
    let mut stats = RasterStats::default();
    let (width, height) = target.size();
    let (fw, fh) = (width as f32, height as f32);

    for (primitive_id, tri) in indices.chunks_exact(3).enumerate() {
        stats.triangles += 1;
        let polygon = vec![
            vertices[tri[0] as usize],
            vertices[tri[1] as usize],
            vertices[tri[2] as usize],
        ];

        // Facing from the unclipped triangle
        let ndc: Vec<Vec2> = polygon
            .iter()
            .map(|v| v.position.truncate().truncate() / v.position.w)
            .collect();
        let facing_area = (ndc[1] - ndc[0]).perp_dot(ndc[2] - ndc[0]);
        let all_in_front = polygon.iter().all(|v| v.position.w > 0.0);
        let front_facing = if all_in_front {
            facing_area > 0.0
        } else {
            // Fall back to the clipped polygon's winding below
            true
        };

        let clipped = clip_polygon(polygon);
        if clipped.len() < 3 {
            stats.clipped += 1;
            continue;
        }

        let screen: Vec<ScreenVertex<V>> = clipped
            .iter()
            .map(|v| {
                let inv_w = 1.0 / v.position.w;
                let n = v.position.truncate() * inv_w;
                ScreenVertex {
                    pixel: Vec2::new((n.x + 1.0) * 0.5 * fw, (1.0 - n.y) * 0.5 * fh),
                    depth: n.z,
                    inv_w,
                    varying: v.varying,
                }
            })
            .collect();

        let front_facing = if all_in_front {
            front_facing
        } else {
            // Screen y is flipped, so CCW in NDC is negative area here
            let a = (screen[1].pixel - screen[0].pixel).perp_dot(screen[2].pixel - screen[0].pixel);
            a < 0.0
        };

        let culled = match state.cull {
            CullMode::None => false,
            CullMode::Back => !front_facing,
            CullMode::Front => front_facing,
        };
        if culled {
            stats.culled += 1;
            continue;
        }

        for k in 1..screen.len() - 1 {
            let v = [&screen[0], &screen[k], &screen[k + 1]];
            let area = edge_function(v[0].pixel, v[1].pixel, v[2].pixel);
            if area.abs() < f32::EPSILON {
                continue;
            }
            let inv_area = 1.0 / area;

            let min = v[0].pixel.min(v[1].pixel).min(v[2].pixel);
            let max = v[0].pixel.max(v[1].pixel).max(v[2].pixel);
            let min_x = (min.x.floor().max(0.0)) as u32;
            let min_y = (min.y.floor().max(0.0)) as u32;
            let max_x = (max.x.ceil().min(fw - 1.0)).max(0.0) as u32;
            let max_y = (max.y.ceil().min(fh - 1.0)).max(0.0) as u32;

            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                    let w0 = edge_function(v[1].pixel, v[2].pixel, p) * inv_area;
                    let w1 = edge_function(v[2].pixel, v[0].pixel, p) * inv_area;
                    let w2 = edge_function(v[0].pixel, v[1].pixel, p) * inv_area;
                    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                        continue;
                    }

                    let depth = w0 * v[0].depth + w1 * v[1].depth + w2 * v[2].depth;
                    if !(0.0..=1.0).contains(&depth) {
                        continue;
                    }
                    if state.depth_test && target.depth().is_some() && depth >= target.read_depth(x, y) {
                        continue;
                    }

                    // Perspective-correct weights
                    let pw = [w0 * v[0].inv_w, w1 * v[1].inv_w, w2 * v[2].inv_w];
                    let sum = pw[0] + pw[1] + pw[2];
                    if sum <= 0.0 {
                        continue;
                    }
                    let pw = [pw[0] / sum, pw[1] / sum, pw[2] / sum];

                    let input = FragmentInput {
                        x,
                        y,
                        frag_coord: Vec3::new(p.x, p.y, depth),
                        varying: V::barycentric([&v[0].varying, &v[1].varying, &v[2].varying], pw),
                        primitive_id: primitive_id as u32,
                        front_facing,
                    };

                    stats.fragments_shaded += 1;
                    if let Some(output) = shader(&input) {
                        if write_fragment(target, state, x, y, &output, depth) {
                            stats.fragments_written += 1;
                        }
                    }
                }
            }
        }
    }

    stats
}
