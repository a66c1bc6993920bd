//! Volumetric payloads: structured grids and tetrahedral meshes.

use stao_math::{Aabb, Interval, UVec3, Vec3};

use crate::error::{check_indices, check_len, check_range, CoreError, CoreResult};

/// Scalar field sampled on a regular grid.
///
/// Values are stored x-fastest: `values[i + nx * (j + ny * k)]`.
#[derive(Clone, Debug)]
pub struct UniformGrid {
    pub resolution: UVec3,
    pub values: Vec<f32>,
    pub origin: Vec3,
    pub spacing: Vec3,
}

impl UniformGrid {
    /// Grid with unit spacing at the origin.
    pub fn new(resolution: UVec3, values: Vec<f32>) -> Self {
        Self {
            resolution,
            values,
            origin: Vec3::ZERO,
            spacing: Vec3::ONE,
        }
    }

    /// Build a grid by evaluating `f` at each sample position.
    pub fn from_fn<F>(resolution: UVec3, origin: Vec3, spacing: Vec3, f: F) -> Self
    where
        F: Fn(Vec3) -> f32,
    {
        let mut values = Vec::with_capacity((resolution.x * resolution.y * resolution.z) as usize);
        for k in 0..resolution.z {
            for j in 0..resolution.y {
                for i in 0..resolution.x {
                    let p = origin + spacing * Vec3::new(i as f32, j as f32, k as f32);
                    values.push(f(p));
                }
            }
        }
        Self {
            resolution,
            values,
            origin,
            spacing,
        }
    }

    pub fn value(&self, i: u32, j: u32, k: u32) -> f32 {
        let r = self.resolution;
        let i = i.min(r.x - 1) as usize;
        let j = j.min(r.y - 1) as usize;
        let k = k.min(r.z - 1) as usize;
        self.values[i + r.x as usize * (j + r.y as usize * k)]
    }

    /// Convert an object-space point to continuous grid coordinates.
    pub fn to_grid(&self, p: Vec3) -> Vec3 {
        (p - self.origin) / self.spacing
    }

    /// Trilinear sample at continuous grid coordinates, clamped to the grid.
    pub fn sample(&self, g: Vec3) -> f32 {
        let max = (self.resolution - UVec3::ONE).as_vec3();
        let g = g.clamp(Vec3::ZERO, max);
        let base = g.floor().min(max - Vec3::ONE).max(Vec3::ZERO);
        let f = g - base;
        let (i, j, k) = (base.x as u32, base.y as u32, base.z as u32);

        let c000 = self.value(i, j, k);
        let c100 = self.value(i + 1, j, k);
        let c010 = self.value(i, j + 1, k);
        let c110 = self.value(i + 1, j + 1, k);
        let c001 = self.value(i, j, k + 1);
        let c101 = self.value(i + 1, j, k + 1);
        let c011 = self.value(i, j + 1, k + 1);
        let c111 = self.value(i + 1, j + 1, k + 1);

        let c00 = c000 + (c100 - c000) * f.x;
        let c10 = c010 + (c110 - c010) * f.x;
        let c01 = c001 + (c101 - c001) * f.x;
        let c11 = c011 + (c111 - c011) * f.x;
        let c0 = c00 + (c10 - c00) * f.y;
        let c1 = c01 + (c11 - c01) * f.y;
        c0 + (c1 - c0) * f.z
    }

    /// Central-difference gradient in object space.
    pub fn gradient(&self, g: Vec3) -> Vec3 {
        let h = 0.5;
        let dx = self.sample(g + Vec3::X * h) - self.sample(g - Vec3::X * h);
        let dy = self.sample(g + Vec3::Y * h) - self.sample(g - Vec3::Y * h);
        let dz = self.sample(g + Vec3::Z * h) - self.sample(g - Vec3::Z * h);
        Vec3::new(dx, dy, dz) / (2.0 * h * self.spacing)
    }

    pub fn value_range(&self) -> Interval {
        Interval::from_values(self.values.iter().copied())
    }

    /// Object-space box spanned by the sample positions.
    pub fn bounds(&self) -> Aabb {
        let extent = (self.resolution.max(UVec3::ONE) - UVec3::ONE).as_vec3() * self.spacing;
        Aabb::from_points(self.origin, self.origin + extent)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let r = self.resolution;
        if r.x < 2 || r.y < 2 || r.z < 2 {
            return Err(CoreError::InvalidResolution(r.to_array()));
        }
        check_len("values", (r.x * r.y * r.z) as usize, self.values.len())?;
        for s in self.spacing.to_array() {
            check_range("spacing", s, f32::MIN_POSITIVE, f32::MAX)?;
        }
        Ok(())
    }
}

/// Unstructured tetrahedral mesh with one scalar per vertex.
#[derive(Clone, Debug)]
pub struct TetraMesh {
    pub positions: Vec<Vec3>,
    pub values: Vec<f32>,
    pub cells: Vec<[u32; 4]>,
}

impl TetraMesh {
    pub fn new(positions: Vec<Vec3>, values: Vec<f32>, cells: Vec<[u32; 4]>) -> Self {
        Self {
            positions,
            values,
            cells,
        }
    }

    /// Split an axis-aligned hexahedral grid into five tetrahedra per cube.
    pub fn from_grid(grid: &UniformGrid) -> Self {
        let r = grid.resolution;
        let mut positions = Vec::with_capacity(grid.values.len());
        for k in 0..r.z {
            for j in 0..r.y {
                for i in 0..r.x {
                    positions.push(grid.origin + grid.spacing * Vec3::new(i as f32, j as f32, k as f32));
                }
            }
        }
        let index = |i: u32, j: u32, k: u32| i + r.x * (j + r.y * k);

        let mut cells = Vec::new();
        for k in 0..r.z.saturating_sub(1) {
            for j in 0..r.y.saturating_sub(1) {
                for i in 0..r.x.saturating_sub(1) {
                    let v = [
                        index(i, j, k),
                        index(i + 1, j, k),
                        index(i, j + 1, k),
                        index(i + 1, j + 1, k),
                        index(i, j, k + 1),
                        index(i + 1, j, k + 1),
                        index(i, j + 1, k + 1),
                        index(i + 1, j + 1, k + 1),
                    ];
                    // Alternate the split so shared faces match between neighbors
                    if (i + j + k) % 2 == 0 {
                        cells.push([v[0], v[1], v[2], v[4]]);
                        cells.push([v[1], v[3], v[2], v[7]]);
                        cells.push([v[1], v[4], v[5], v[7]]);
                        cells.push([v[2], v[4], v[7], v[6]]);
                        cells.push([v[1], v[2], v[4], v[7]]);
                    } else {
                        cells.push([v[0], v[1], v[3], v[5]]);
                        cells.push([v[0], v[3], v[2], v[6]]);
                        cells.push([v[0], v[5], v[4], v[6]]);
                        cells.push([v[3], v[5], v[6], v[7]]);
                        cells.push([v[0], v[3], v[5], v[6]]);
                    }
                }
            }
        }

        Self {
            positions,
            values: grid.values.clone(),
            cells,
        }
    }

    pub fn value_range(&self) -> Interval {
        Interval::from_values(self.values.iter().copied())
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_point_set(&self.positions)
    }

    /// Signed volume of a cell. The sign depends on vertex order.
    pub fn cell_volume(&self, cell: usize) -> f32 {
        let [a, b, c, d] = self.cells[cell].map(|i| self.positions[i as usize]);
        (b - a).cross(c - a).dot(d - a) / 6.0
    }

    pub fn validate(&self) -> CoreResult<()> {
        let n = self.positions.len();
        if n == 0 {
            return Err(CoreError::Empty { what: "positions" });
        }
        if self.cells.is_empty() {
            return Err(CoreError::Empty { what: "cells" });
        }
        check_len("values", n, self.values.len())?;
        check_indices("cell", self.cells.iter().flatten(), n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> UniformGrid {
        UniformGrid::from_fn(UVec3::new(3, 3, 3), Vec3::ZERO, Vec3::splat(0.5), |p| p.x)
    }

    #[test]
    fn test_grid_indexing() {
        let grid = ramp();
        assert_eq!(grid.values.len(), 27);
        assert!((grid.value(2, 0, 0) - 1.0).abs() < 1e-6);
        assert!((grid.value(0, 2, 2) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_trilinear_sample() {
        let grid = ramp();
        // Halfway between i = 0 and i = 1, object x = 0.25
        assert!((grid.sample(Vec3::new(0.5, 1.0, 1.0)) - 0.25).abs() < 1e-6);
        // Clamped outside the grid
        assert!((grid.sample(Vec3::new(9.0, 0.0, 0.0)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_of_ramp() {
        let grid = ramp();
        let g = grid.gradient(Vec3::splat(1.0));
        assert!((g - Vec3::X).length() < 1e-4);
    }

    #[test]
    fn test_grid_bounds_and_range() {
        let grid = ramp();
        let bounds = grid.bounds();
        assert!((bounds.max() - Vec3::ONE).length() < 1e-5);
        assert_eq!(grid.value_range(), Interval::new(0.0, 1.0));
    }

    #[test]
    fn test_grid_validate() {
        assert!(ramp().validate().is_ok());

        let flat = UniformGrid::new(UVec3::new(4, 4, 1), vec![0.0; 16]);
        assert!(matches!(flat.validate(), Err(CoreError::InvalidResolution(_))));

        let short = UniformGrid::new(UVec3::new(2, 2, 2), vec![0.0; 7]);
        assert!(matches!(short.validate(), Err(CoreError::LengthMismatch { .. })));
    }

    #[test]
    fn test_tetra_from_grid_fills_volume() {
        let grid = UniformGrid::from_fn(UVec3::splat(3), Vec3::ZERO, Vec3::ONE, |p| p.y);
        let tets = TetraMesh::from_grid(&grid);

        assert_eq!(tets.cells.len(), 8 * 5);
        assert!(tets.validate().is_ok());

        let total: f32 = (0..tets.cells.len()).map(|c| tets.cell_volume(c).abs()).sum();
        assert!((total - 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_tetra_validate_indices() {
        let tets = TetraMesh::new(vec![Vec3::ZERO; 4], vec![0.0; 4], vec![[0, 1, 2, 4]]);
        assert!(matches!(tets.validate(), Err(CoreError::IndexOutOfRange { .. })));
    }
}
