//! Triangle surfaces shared by the polygon and tube engines.

use stao_math::{Vec3, Vec4};

use crate::gpu::{
    ClipVertex, DrawState, FragmentOutput, GpuResult, GraphicsContext, Interpolate,
    RasterStats,
};
use crate::random::{random_indices, RandomTexture};
use crate::shading::GeometryUniforms;

/// Vertex and index buffers of a surface, in object space.
#[derive(Clone, Debug, Default)]
pub(crate) struct SurfaceBuffers {
    pub positions: Vec<Vec3>,
    /// `None` draws the surface unlit.
    pub normals: Option<Vec<Vec3>>,
    pub colors: Vec<Vec3>,
    pub indices: Vec<u32>,
    random_index: Vec<[u16; 2]>,
    texture_size: u32,
}

#[derive(Clone, Copy, Debug)]
struct SurfaceVarying {
    position: Vec3,
    normal: Vec3,
    color: Vec3,
}

impl Interpolate for SurfaceVarying {
    fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        Self {
            position: a.position.lerp(b.position, t),
            normal: a.normal.lerp(b.normal, t),
            color: a.color.lerp(b.color, t),
        }
    }

    fn barycentric(v: [&Self; 3], w: [f32; 3]) -> Self {
        Self {
            position: v[0].position * w[0] + v[1].position * w[1] + v[2].position * w[2],
            normal: v[0].normal * w[0] + v[1].normal * w[1] + v[2].normal * w[2],
            color: v[0].color * w[0] + v[1].color * w[1] + v[2].color * w[2],
        }
    }
}

impl SurfaceBuffers {
    pub fn new(
        positions: Vec<Vec3>,
        normals: Option<Vec<Vec3>>,
        colors: Vec<Vec3>,
        indices: Vec<u32>,
        texture_size: u32,
    ) -> Self {
        let random_index = random_indices(positions.len(), texture_size);
        Self {
            positions,
            normals,
            colors,
            indices,
            random_index,
            texture_size,
        }
    }

    pub fn is_lit(&self) -> bool {
        self.normals.is_some()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Recompute the random index attribute for a new texture size.
    pub fn reindex(&mut self, texture_size: u32) {
        if texture_size != self.texture_size {
            self.random_index = random_indices(self.positions.len(), texture_size);
            self.texture_size = texture_size;
        }
    }

    /// Draw into the bound target, discarding fragments whose random value
    /// is not below their opacity.
    pub fn draw(
        &self,
        gpu: &mut GraphicsContext,
        uniforms: &GeometryUniforms,
        texture: &RandomTexture,
        opacity: f32,
    ) -> GpuResult<RasterStats> {
        let model_view = uniforms.model_view;
        let lit = self.is_lit();
        let vertices: Vec<ClipVertex<SurfaceVarying>> = self
            .positions
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let position = model_view.transform_point3(p);
                let normal = match &self.normals {
                    Some(normals) => (uniforms.normal_matrix * normals[i]).normalize_or_zero(),
                    None => Vec3::ZERO,
                };
                ClipVertex::new(
                    uniforms.projection * position.extend(1.0),
                    SurfaceVarying {
                        position,
                        normal,
                        color: self.colors.get(i).copied().unwrap_or(Vec3::ONE),
                    },
                )
            })
            .collect();

        let base_alpha = opacity.clamp(0.0, 1.0);
        let edge_factor = uniforms.edge_factor;
        let offset = uniforms.random_offset;
        let state = DrawState::default();

        gpu.draw_indexed(&state, &vertices, &self.indices, |fragment| {
            let v = &fragment.varying;
            let normal = v.normal.normalize_or_zero();

            let mut alpha = base_alpha;
            if lit && edge_factor > 0.0 && alpha < 1.0 {
                let facing = normal.dot((-v.position).normalize_or_zero()).abs().max(1e-3);
                alpha = (alpha / facing.powf(edge_factor)).min(1.0);
            }

            let provoking = self.indices[fragment.primitive_id as usize * 3] as usize;
            let rnd = texture.lookup(self.random_index[provoking], (fragment.x, fragment.y), offset);
            if rnd >= alpha {
                return None;
            }

            let normal = if lit { normal.extend(1.0) } else { Vec4::ZERO };
            Some(FragmentOutput::new([
                v.color.extend(1.0),
                v.position.extend(1.0),
                normal,
            ]))
        })
    }
}
