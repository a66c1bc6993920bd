//! Built-in demo scene and OBJ import.

use std::path::Path;

use anyhow::Result;
use stao_core::{
    Geometry, LineRadius, LineSet, LineTopology, ObjectHandle, PolygonMesh, RenderableObject, Scene,
    TetraMesh, Transform, TransferFunction, UniformGrid, VertexColors,
};
use stao_math::{UVec3, Vec3};
use stao_renderer::EngineParams;

/// An object to register together with the engine parameters to use.
pub struct DemoObject {
    pub handle: ObjectHandle,
    pub params: EngineParams,
}

/// UV sphere wound counter-clockwise seen from outside.
pub fn uv_sphere(radius: f32, rings: u32, segments: u32) -> PolygonMesh {
    let rings = rings.max(2);
    let segments = segments.max(3);
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    for i in 0..=rings {
        let theta = std::f32::consts::PI * i as f32 / rings as f32;
        for j in 0..=segments {
            let phi = std::f32::consts::TAU * j as f32 / segments as f32;
            let n = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            positions.push(n * radius);
            normals.push(n);
        }
    }

    let stride = segments + 1;
    let mut indices = Vec::new();
    for i in 0..rings {
        for j in 0..segments {
            let a = i * stride + j;
            let b = a + stride;
            let c = b + 1;
            let d = a + 1;
            indices.extend_from_slice(&[a, c, b, a, d, c]);
        }
    }
    PolygonMesh::new(positions, indices).with_normals(normals)
}

/// Square in the plane `y = height`, facing up.
pub fn ground_plane(half_size: f32, height: f32) -> PolygonMesh {
    let s = half_size;
    let positions = vec![
        Vec3::new(-s, height, -s),
        Vec3::new(-s, height, s),
        Vec3::new(s, height, s),
        Vec3::new(s, height, -s),
    ];
    PolygonMesh::new(positions, vec![0, 1, 2, 0, 2, 3]).with_normals(vec![Vec3::Y; 4])
}

/// Helix around the y axis with the arc parameter as scalar value and a
/// radius that swells towards the middle.
pub fn helix(turns: f32, points: u32, radius: f32, height: f32) -> LineSet {
    let points = points.max(2);
    let mut positions = Vec::with_capacity(points as usize);
    let mut values = Vec::with_capacity(points as usize);
    let mut radii = Vec::with_capacity(points as usize);
    for i in 0..points {
        let t = i as f32 / (points - 1) as f32;
        let angle = std::f32::consts::TAU * turns * t;
        positions.push(Vec3::new(radius * angle.cos(), height * (t - 0.5), radius * angle.sin()));
        values.push(t);
        radii.push(0.03 + 0.05 * (std::f32::consts::PI * t).sin());
    }
    LineSet::new(positions, LineTopology::Strip)
        .with_values(values)
        .with_radius(LineRadius::PerVertex(radii))
}

/// Gaussian blob sampled on an `n³` grid spanning [-1, 1]³.
pub fn blob_grid(n: u32) -> UniformGrid {
    let n = n.max(2);
    let spacing = 2.0 / (n - 1) as f32;
    UniformGrid::from_fn(UVec3::splat(n), Vec3::splat(-1.0), Vec3::splat(spacing), |p| {
        (-3.0 * p.length_squared()).exp()
    })
}

/// A small scene exercising every engine.
pub fn build_demo_scene() -> (Scene, Vec<DemoObject>) {
    let mut scene = Scene::new("demo");
    let mut objects = Vec::new();
    let mut add = |scene: &mut Scene, object: RenderableObject, params: EngineParams| {
        let handle = scene.insert(object);
        objects.push(DemoObject { handle, params });
    };

    let ground = ground_plane(4.0, -1.0).with_colors(VertexColors::Uniform(Vec3::splat(0.8)));
    add(
        &mut scene,
        RenderableObject::new("ground", Geometry::Polygon(ground)),
        EngineParams::default(),
    );

    let sphere = uv_sphere(0.8, 24, 32).with_colors(VertexColors::Uniform(Vec3::new(0.9, 0.55, 0.2)));
    add(
        &mut scene,
        RenderableObject::new("sphere", Geometry::Polygon(sphere))
            .with_transform(Transform::from_translation(Vec3::new(-1.5, -0.2, 0.0))),
        EngineParams::default(),
    );

    let glass = uv_sphere(0.6, 16, 24)
        .with_colors(VertexColors::Uniform(Vec3::new(0.3, 0.6, 0.9)))
        .with_opacity(0.4);
    add(
        &mut scene,
        RenderableObject::new("translucent sphere", Geometry::Polygon(glass))
            .with_transform(Transform::from_translation(Vec3::new(1.5, -0.4, 0.5))),
        EngineParams {
            edge_factor: 1.0,
            ..Default::default()
        },
    );

    add(
        &mut scene,
        RenderableObject::new("streamline", Geometry::Line(helix(3.0, 200, 0.6, 2.0)))
            .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, -1.5))),
        EngineParams {
            transfer_function: TransferFunction::rainbow(),
            ..Default::default()
        },
    );

    add(
        &mut scene,
        RenderableObject::new("blob", Geometry::UniformGrid(blob_grid(24))).with_transform(Transform {
            translation: Vec3::new(0.0, 0.0, 1.6),
            scale: Vec3::splat(0.6),
            ..Default::default()
        }),
        EngineParams {
            opacity_scale: 0.6,
            ..Default::default()
        },
    );

    let tets = TetraMesh::from_grid(&blob_grid(8));
    add(
        &mut scene,
        RenderableObject::new("tetrahedra", Geometry::Tetrahedra(tets)).with_transform(Transform {
            translation: Vec3::new(0.0, 0.2, 0.0),
            scale: Vec3::splat(0.5),
            ..Default::default()
        }),
        EngineParams {
            opacity_scale: 0.8,
            ..Default::default()
        },
    );

    log::info!("Built demo scene with {} objects", scene.len());
    (scene, objects)
}

/// Load the first model of an OBJ file as a polygon mesh.
pub fn load_obj(path: &Path) -> Result<RenderableObject> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        },
    )?;
    let Some(model) = models.first() else {
        anyhow::bail!("No models found in {}", path.display());
    };
    let mesh = &model.mesh;

    let positions: Vec<Vec3> = mesh.positions.chunks_exact(3).map(Vec3::from_slice).collect();
    let mut polygon = PolygonMesh::new(positions, mesh.indices.clone());
    if mesh.normals.len() == mesh.positions.len() && !mesh.normals.is_empty() {
        polygon = polygon.with_normals(mesh.normals.chunks_exact(3).map(Vec3::from_slice).collect());
    } else {
        log::info!("Computing vertex normals for {}", model.name);
        polygon.compute_normals();
    }
    if mesh.vertex_color.len() == mesh.positions.len() && !mesh.vertex_color.is_empty() {
        polygon = polygon.with_colors(VertexColors::PerVertex(
            mesh.vertex_color.chunks_exact(3).map(Vec3::from_slice).collect(),
        ));
    }
    polygon.validate()?;

    log::info!(
        "Loaded {} from {} ({} vertices, {} triangles)",
        model.name,
        path.display(),
        polygon.vertex_count(),
        polygon.triangle_count()
    );
    let name = if model.name.is_empty() {
        path.display().to_string()
    } else {
        model.name.clone()
    };
    Ok(RenderableObject::new(name, Geometry::Polygon(polygon)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward(mesh: &PolygonMesh, center: Vec3) {
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| mesh.positions[i as usize]);
            let n = (b - a).cross(c - a);
            if n.length_squared() < 1e-12 {
                // Collapsed triangles at the poles
                continue;
            }
            assert!(n.dot((a + b + c) / 3.0 - center) > 0.0);
        }
    }

    #[test]
    fn test_sphere_wound_outward() {
        let sphere = uv_sphere(1.0, 8, 12);
        assert!(sphere.validate().is_ok());
        assert_outward(&sphere, Vec3::ZERO);
        for (p, n) in sphere.positions.iter().zip(sphere.normals.as_ref().unwrap()) {
            assert!((p.length() - 1.0).abs() < 1e-5);
            assert!((n.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_ground_faces_up() {
        let ground = ground_plane(2.0, -1.0);
        assert_outward(&ground, Vec3::new(0.0, -2.0, 0.0));
    }

    #[test]
    fn test_helix_values_and_radius() {
        let lines = helix(2.0, 50, 1.0, 3.0);
        assert!(lines.validate().is_ok());
        let values = lines.values.as_ref().unwrap();
        assert_eq!(values.first(), Some(&0.0));
        assert_eq!(values.last(), Some(&1.0));
        assert!(lines.radius.max() <= 0.08 + 1e-6);
    }

    #[test]
    fn test_blob_peaks_at_center() {
        let grid = blob_grid(9);
        assert!(grid.validate().is_ok());
        assert!((grid.value(4, 4, 4) - 1.0).abs() < 1e-6);
        assert!(grid.value(0, 0, 0) < 0.01);
    }

    #[test]
    fn test_demo_scene_is_valid() {
        let (scene, objects) = build_demo_scene();
        assert_eq!(scene.len(), objects.len());
        for object in &objects {
            let renderable = scene.get(object.handle).unwrap();
            assert!(renderable.geometry.validate().is_ok(), "{}", renderable.name);
            assert!(object.params.validate().is_ok());
        }
        assert!(!scene.world_bounds().is_empty());
    }

    #[test]
    fn test_load_obj() {
        let path = std::env::temp_dir().join("stao_demo_test.obj");
        std::fs::write(
            &path,
            "o tri\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        )
        .unwrap();
        let object = load_obj(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let Geometry::Polygon(mesh) = &object.geometry else {
            panic!("expected a polygon mesh");
        };
        assert_eq!(object.name, "tri");
        assert_eq!(mesh.triangle_count(), 1);
        let normals = mesh.normals.as_ref().unwrap();
        assert!((normals[0] - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_load_missing_obj() {
        assert!(load_obj(Path::new("/nonexistent/model.obj")).is_err());
    }
}
