//! Renderable objects: a named geometry payload with a modeling transform.

use stao_math::{Aabb, Mat4, Mat4Ext, Quat, Vec3};

use crate::error::CoreResult;
use crate::line::LineSet;
use crate::mesh::PolygonMesh;
use crate::volume::{TetraMesh, UniformGrid};

/// Transform components that can be composed into a matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Decompose a 4x4 matrix into translation, rotation and scale.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Discriminant of a geometry payload, used to pick an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Polygon,
    Line,
    UniformGrid,
    Tetrahedra,
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GeometryKind::Polygon => "polygon mesh",
            GeometryKind::Line => "line set",
            GeometryKind::UniformGrid => "uniform grid",
            GeometryKind::Tetrahedra => "tetrahedral mesh",
        };
        f.write_str(name)
    }
}

/// Geometry payload of a renderable object.
#[derive(Clone, Debug)]
pub enum Geometry {
    Polygon(PolygonMesh),
    Line(LineSet),
    UniformGrid(UniformGrid),
    Tetrahedra(TetraMesh),
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::Line(_) => GeometryKind::Line,
            Geometry::UniformGrid(_) => GeometryKind::UniformGrid,
            Geometry::Tetrahedra(_) => GeometryKind::Tetrahedra,
        }
    }

    /// Object-space bounds.
    pub fn bounds(&self) -> Aabb {
        match self {
            Geometry::Polygon(mesh) => mesh.bounds,
            Geometry::Line(lines) => lines.bounds(),
            Geometry::UniformGrid(grid) => grid.bounds(),
            Geometry::Tetrahedra(tets) => tets.bounds(),
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        match self {
            Geometry::Polygon(mesh) => mesh.validate(),
            Geometry::Line(lines) => lines.validate(),
            Geometry::UniformGrid(grid) => grid.validate(),
            Geometry::Tetrahedra(tets) => tets.validate(),
        }
    }
}

/// A named, transformable, toggleable piece of geometry.
#[derive(Clone, Debug)]
pub struct RenderableObject {
    pub name: String,
    pub visible: bool,
    pub transform: Transform,
    pub geometry: Geometry,
}

impl RenderableObject {
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            name: name.into(),
            visible: true,
            transform: Transform::default(),
            geometry,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn kind(&self) -> GeometryKind {
        self.geometry.kind()
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.transform.to_matrix()
    }

    pub fn world_bounds(&self) -> Aabb {
        self.model_matrix().transform_aabb(&self.geometry.bounds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_matrix_roundtrip() {
        let transform = Transform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        let recovered = Transform::from_matrix(transform.to_matrix());

        assert!((recovered.translation - transform.translation).length() < 0.001);
        assert!((recovered.scale - transform.scale).length() < 0.001);
    }

    #[test]
    fn test_world_bounds_follow_transform() {
        let mesh = PolygonMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]);
        let object = RenderableObject::new("tri", Geometry::Polygon(mesh))
            .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, -4.0)));

        let bounds = object.world_bounds();
        assert!((bounds.max().x - 1.0).abs() < 1e-3);
        assert!((bounds.centroid().z + 4.0).abs() < 1e-3);
        assert_eq!(object.kind(), GeometryKind::Polygon);
    }
}
