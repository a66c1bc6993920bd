// Transform utilities for Mat4
//
// Extends glam::Mat4 with the helpers the engines need for per-frame uniforms.

use glam::{Mat3, Mat4, Vec3};

use crate::Aabb;

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Inverse-transpose of the upper 3x3, for transforming normals.
    fn normal_matrix(&self) -> Mat3;

    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;

    /// Project a view-space point to normalized device coordinates.
    /// Returns None for points at or behind the eye plane.
    fn project_point(&self, point: Vec3) -> Option<Vec3>;
}

impl Mat4Ext for Mat4 {
    fn normal_matrix(&self) -> Mat3 {
        let m = Mat3::from_mat4(*self);
        if m.determinant().abs() < 1e-12 {
            return m;
        }
        m.inverse().transpose()
    }

    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return *aabb;
        }
        let corners: Vec<Vec3> = aabb
            .corners()
            .iter()
            .map(|&corner| self.transform_point3(corner))
            .collect();
        Aabb::from_point_set(&corners)
    }

    fn project_point(&self, point: Vec3) -> Option<Vec3> {
        let clip = *self * point.extend(1.0);
        if clip.w <= 1e-6 {
            return None;
        }
        Some(clip.truncate() / clip.w)
    }
}
