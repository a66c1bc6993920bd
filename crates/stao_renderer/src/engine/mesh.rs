use stao_core::{Geometry, GeometryKind, Light, ObjectHandle, RenderableObject};
use stao_math::{Camera, Interval};

use super::surface::SurfaceBuffers;
use super::{unsupported, EngineBase, EngineError, EngineResult, RenderContext, RendererEngine};

/// Draws triangle meshes with per-vertex or uniform color.
///
/// Translucent meshes are rendered by stochastic transparency: each
/// fragment survives with probability equal to its opacity. Meshes
/// without normals are drawn unlit.
#[derive(Debug, Default)]
pub struct PolygonEngine {
    base: EngineBase,
    surface: Option<SurfaceBuffers>,
    opacity: f32,
}

impl PolygonEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn triangle_count(&self) -> usize {
        self.surface.as_ref().map_or(0, SurfaceBuffers::triangle_count)
    }

    pub fn is_lit(&self) -> bool {
        self.surface.as_ref().is_some_and(SurfaceBuffers::is_lit)
    }
}

impl RendererEngine for PolygonEngine {
    fn name(&self) -> &'static str {
        "polygon"
    }

    fn kind(&self) -> GeometryKind {
        GeometryKind::Polygon
    }

    fn base(&self) -> &EngineBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EngineBase {
        &mut self.base
    }

    fn create(
        &mut self,
        handle: ObjectHandle,
        object: &RenderableObject,
        camera: &Camera,
        _light: &Light,
    ) -> EngineResult<()> {
        self.release();
        let Geometry::Polygon(mesh) = &object.geometry else {
            return Err(unsupported(self.name(), object));
        };
        mesh.validate()?;
        self.base.params().validate()?;

        let colors = (0..mesh.vertex_count()).map(|i| mesh.colors.get(i)).collect();
        self.surface = Some(SurfaceBuffers::new(
            mesh.positions.clone(),
            mesh.normals.clone(),
            colors,
            mesh.indices.clone(),
            self.base.params().random_texture_size,
        ));
        self.opacity = mesh.opacity;
        self.base.attach(handle, camera);
        log::debug!(
            "Polygon engine attached to '{}' ({} triangles, {})",
            object.name,
            mesh.triangle_count(),
            if mesh.normals.is_some() { "lit" } else { "unlit" }
        );
        Ok(())
    }

    fn update(&mut self, _object: &RenderableObject, camera: &Camera, _light: &Light) -> EngineResult<()> {
        self.base.require_attached()?;
        self.base.refresh(camera);
        let size = self.base.random_texture_size();
        if let Some(surface) = &mut self.surface {
            surface.reindex(size);
        }
        Ok(())
    }

    fn setup(&mut self, object: &RenderableObject, camera: &Camera, _light: &Light) -> EngineResult<()> {
        self.base.require_attached()?;
        self.base.compute_uniforms(object, camera, Interval::new(0.0, 1.0));
        Ok(())
    }

    fn draw(&mut self, ctx: &mut RenderContext<'_>) -> EngineResult<()> {
        self.base.require_attached()?;
        self.base.next_offset(ctx.rng);
        let opacity = self.opacity * self.base.params().opacity_scale;
        let surface = self.surface.as_ref().ok_or(EngineError::NotAttached)?;
        let texture = self.base.random_texture()?;
        surface.draw(ctx.gpu, self.base.uniforms(), texture, opacity)?;
        Ok(())
    }

    fn release(&mut self) {
        if self.attached().is_some() {
            log::debug!("Polygon engine released");
        }
        self.surface = None;
        self.base.detach();
    }
}

#[cfg(test)]
mod tests {
    use stao_core::{Geometry, LineSet, LineTopology, PolygonMesh};
    use stao_math::{Vec3, Vec4};

    use super::*;
    use crate::engine::test_support::*;
    use crate::engine::EngineParams;
    use crate::random::Xorshift128;

    const COLOR: Vec3 = Vec3::new(0.2, 0.4, 0.6);

    #[test]
    fn test_opaque_quad_covers_center() {
        let mut engine = PolygonEngine::new();
        let (gpu, target, covered) = draw_once(&mut engine, &quad(COLOR, true));
        assert!(covered > 0);

        let [color, position, normal] = texel(&gpu, target, SIZE / 2, SIZE / 2);
        assert!((color.truncate() - COLOR).length() < 1.0 / 255.0);
        // Quad at the origin, camera at z = 4
        assert!((position.z + 4.0).abs() < 1e-3);
        assert_eq!(position.w, 1.0);
        assert!((normal - Vec4::new(0.0, 0.0, 1.0, 1.0)).length() < 1e-4);
    }

    #[test]
    fn test_mesh_without_normals_is_unlit() {
        let mut engine = PolygonEngine::new();
        let (gpu, target, covered) = draw_once(&mut engine, &quad(COLOR, false));
        assert!(covered > 0);
        assert!(!engine.is_lit());
        let [_, _, normal] = texel(&gpu, target, SIZE / 2, SIZE / 2);
        assert_eq!(normal.w, 0.0);
    }

    #[test]
    fn test_transparent_mesh_draws_nothing() {
        let mut object = quad(COLOR, true);
        if let Geometry::Polygon(mesh) = &mut object.geometry {
            mesh.opacity = 0.0;
        }
        let mut engine = PolygonEngine::new();
        let (_, _, covered) = draw_once(&mut engine, &object);
        assert_eq!(covered, 0);
    }

    #[test]
    fn test_stochastic_coverage_tracks_opacity() {
        let mut object = quad(COLOR, true);
        if let Geometry::Polygon(mesh) = &mut object.geometry {
            mesh.opacity = 0.5;
        }
        let mut opaque = PolygonEngine::new();
        let (_, _, full) = draw_once(&mut opaque, &quad(COLOR, true));
        let mut engine = PolygonEngine::new();
        let (_, _, half) = draw_once(&mut engine, &object);

        let ratio = half as f32 / full as f32;
        assert!(ratio > 0.25 && ratio < 0.75, "ratio {}", ratio);
    }

    #[test]
    fn test_offsets_change_between_repetitions() {
        let object = quad(COLOR, true);
        let (scene, handle) = handle_for(object);
        let object = scene.get(handle).unwrap();
        let mut engine = PolygonEngine::new();
        engine.create(handle, object, &camera(), &light()).unwrap();
        engine.setup(object, &camera(), &light()).unwrap();

        let (mut gpu, _) = device();
        let mut rng = Xorshift128::new(3);
        let mut offsets = Vec::new();
        for _ in 0..4 {
            engine
                .draw(&mut RenderContext {
                    gpu: &mut gpu,
                    rng: &mut rng,
                })
                .unwrap();
            offsets.push(engine.base().uniforms().random_offset);
            engine.count_repetitions();
        }
        assert_eq!(offsets[0], [0, 0]);
        assert!(offsets[1..].iter().any(|o| *o != [0, 0]));
    }

    #[test]
    fn test_rejects_other_geometry() {
        let lines = LineSet::new(vec![Vec3::ZERO, Vec3::X], LineTopology::Strip);
        let object = RenderableObject::new("lines", Geometry::Line(lines));
        let (scene, handle) = handle_for(object);
        let mut engine = PolygonEngine::new();
        let result = engine.create(handle, scene.get(handle).unwrap(), &camera(), &light());
        assert!(matches!(result, Err(EngineError::Unsupported { .. })));
        assert!(engine.attached().is_none());
    }

    #[test]
    fn test_invalid_mesh_leaves_engine_unattached() {
        let mesh = PolygonMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 5]);
        let object = RenderableObject::new("broken", Geometry::Polygon(mesh));
        let (scene, handle) = handle_for(object);
        let mut engine = PolygonEngine::new();
        let result = engine.create(handle, scene.get(handle).unwrap(), &camera(), &light());
        assert!(matches!(result, Err(EngineError::InvalidGeometry(_))));
        assert!(engine.attached().is_none());
        assert_eq!(engine.triangle_count(), 0);
    }

    #[test]
    fn test_draw_requires_attachment() {
        let (mut gpu, _) = device();
        let mut rng = Xorshift128::new(1);
        let mut engine = PolygonEngine::new();
        let result = engine.draw(&mut RenderContext {
            gpu: &mut gpu,
            rng: &mut rng,
        });
        assert!(matches!(result, Err(EngineError::NotAttached)));
    }

    #[test]
    fn test_release_idempotent() {
        let mut engine = PolygonEngine::new();
        draw_once(&mut engine, &quad(COLOR, true));
        assert!(engine.attached().is_some());
        engine.release();
        engine.release();
        assert!(engine.attached().is_none());
        assert_eq!(engine.triangle_count(), 0);
    }

    #[test]
    fn test_update_applies_texture_size() {
        let object = quad(COLOR, true);
        let (scene, handle) = handle_for(object);
        let object = scene.get(handle).unwrap();
        let mut engine = PolygonEngine::new();
        engine.create(handle, object, &camera(), &light()).unwrap();
        engine
            .set_params(EngineParams {
                random_texture_size: 16,
                ..Default::default()
            })
            .unwrap();
        engine.update(object, &camera(), &light()).unwrap();
        assert_eq!(engine.base().random_texture_size(), 16);
    }
}
