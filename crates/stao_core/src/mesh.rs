use serde::{Deserialize, Serialize};
use stao_math::{Aabb, Vec3};

use crate::error::{check_indices, check_len, check_range, CoreError, CoreResult};

/// Color source for a geometry: one color for everything or one per vertex.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VertexColors {
    Uniform(Vec3),
    PerVertex(Vec<Vec3>),
}

impl VertexColors {
    /// Color of vertex `i`.
    pub fn get(&self, i: usize) -> Vec3 {
        match self {
            VertexColors::Uniform(c) => *c,
            VertexColors::PerVertex(colors) => colors.get(i).copied().unwrap_or(Vec3::ONE),
        }
    }

    pub(crate) fn validate(&self, vertex_count: usize) -> CoreResult<()> {
        if let VertexColors::PerVertex(colors) = self {
            check_len("colors", vertex_count, colors.len())?;
        }
        Ok(())
    }
}

impl Default for VertexColors {
    fn default() -> Self {
        VertexColors::Uniform(Vec3::splat(0.8))
    }
}

/// Indexed triangle mesh.
///
/// Triangles wind counter-clockwise when seen from the front. A mesh
/// without normals is drawn unlit.
#[derive(Clone, Debug)]
pub struct PolygonMesh {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub colors: VertexColors,
    pub indices: Vec<u32>,
    pub opacity: f32,
    pub bounds: Aabb,
}

impl PolygonMesh {
    /// Create a mesh from positions and triangle indices.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let bounds = Aabb::from_point_set(&positions);
        Self {
            positions,
            normals: None,
            colors: VertexColors::default(),
            indices,
            opacity: 1.0,
            bounds,
        }
    }

    pub fn with_colors(mut self, colors: VertexColors) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    /// Compute smooth vertex normals by accumulating area-weighted face normals.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];

        for tri in self.indices.chunks_exact(3) {
            let i0 = tri[0] as usize;
            let i1 = tri[1] as usize;
            let i2 = tri[2] as usize;
            if i0 >= normals.len() || i1 >= normals.len() || i2 >= normals.len() {
                continue;
            }

            let v0 = self.positions[i0];
            let v1 = self.positions[i1];
            let v2 = self.positions[i2];

            let face_normal = (v1 - v0).cross(v2 - v0);

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for n in &mut normals {
            *n = n.normalize_or_zero();
        }

        self.normals = Some(normals);
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check array lengths and index ranges.
    pub fn validate(&self) -> CoreResult<()> {
        if self.positions.is_empty() {
            return Err(CoreError::Empty { what: "positions" });
        }
        if self.indices.is_empty() {
            return Err(CoreError::Empty { what: "indices" });
        }
        if self.indices.len() % 3 != 0 {
            return Err(CoreError::LengthMismatch {
                what: "indices",
                expected: self.indices.len() - self.indices.len() % 3,
                found: self.indices.len(),
            });
        }
        let n = self.positions.len();
        check_indices("triangle", &self.indices, n)?;
        if let Some(normals) = &self.normals {
            check_len("normals", n, normals.len())?;
        }
        self.colors.validate(n)?;
        check_range("opacity", self.opacity, 0.0, 1.0)
    }
}
