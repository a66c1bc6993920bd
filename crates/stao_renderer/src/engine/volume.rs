//! Ray-cast rendering of structured scalar grids.
//!
//! The back faces of the grid box are rasterized; each fragment casts the
//! view ray from the eye to the fragment, clips it to the box and marches
//! it from a jittered start. Every step looks up the transfer function and
//! is accepted with probability equal to its opacity. The first accepted
//! step writes the G-buffer, so each repetition sees a different stochastic
//! "surface" inside the volume.

use stao_core::{Geometry, GeometryKind, Light, ObjectHandle, RenderableObject, UniformGrid};
use stao_math::{Aabb, Camera, Interval, Ray, Vec3, Vec4};

use super::{unsupported, EngineBase, EngineError, EngineResult, RenderContext, RendererEngine};
use crate::gpu::{ClipVertex, CullMode, DrawState, FragmentOutput};
use crate::random::random_index;

/// Upper bound on ray-marching steps per fragment.
const MAX_STEPS: u32 = 4096;

/// Box triangles wound counter-clockwise seen from outside. Corner `i` has
/// `x = i & 1`, `y = i & 2`, `z = i & 4`.
const BOX_INDICES: [u32; 36] = [
    0, 4, 6, 0, 6, 2, // -x
    1, 3, 7, 1, 7, 5, // +x
    0, 1, 5, 0, 5, 4, // -y
    2, 6, 7, 2, 7, 3, // +y
    0, 2, 3, 0, 3, 1, // -z
    4, 5, 7, 4, 7, 6, // +z
];

fn box_corners(bounds: &Aabb) -> Vec<Vec3> {
    let (min, max) = (bounds.min(), bounds.max());
    (0..8)
        .map(|i| {
            Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        })
        .collect()
}

/// Draws uniform grids by stochastic ray casting.
#[derive(Debug, Default)]
pub struct UniformGridEngine {
    base: EngineBase,
    grid: Option<UniformGrid>,
    bounds: Option<Aabb>,
    corners: Vec<Vec3>,
}

impl UniformGridEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RendererEngine for UniformGridEngine {
    fn name(&self) -> &'static str {
        "uniform grid"
    }

    fn kind(&self) -> GeometryKind {
        GeometryKind::UniformGrid
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
        let Geometry::UniformGrid(grid) = &object.geometry else {
            return Err(unsupported(self.name(), object));
        };
        grid.validate()?;
        self.base.params().validate()?;

        let bounds = grid.bounds();
        self.corners = box_corners(&bounds);
        self.bounds = Some(bounds);
        self.grid = Some(grid.clone());
        self.base.attach(handle, camera);
        self.base.refresh_table();
        log::debug!(
            "Uniform grid engine attached to '{}' ({}x{}x{})",
            object.name,
            grid.resolution.x,
            grid.resolution.y,
            grid.resolution.z
        );
        Ok(())
    }

    fn update(&mut self, _object: &RenderableObject, camera: &Camera, _light: &Light) -> EngineResult<()> {
        self.base.require_attached()?;
        self.base.refresh(camera);
        Ok(())
    }

    fn setup(&mut self, object: &RenderableObject, camera: &Camera, _light: &Light) -> EngineResult<()> {
        self.base.require_attached()?;
        self.base.refresh_table();
        let data = self.grid.as_ref().map_or(Interval::EMPTY, UniformGrid::value_range);
        let range = self.base.value_range(data);
        self.base.compute_uniforms(object, camera, range);
        Ok(())
    }

    fn draw(&mut self, ctx: &mut RenderContext<'_>) -> EngineResult<()> {
        self.base.require_attached()?;
        let offset = self.base.next_offset(ctx.rng);
        let (Some(grid), Some(bounds)) = (&self.grid, &self.bounds) else {
            return Err(EngineError::NotAttached);
        };
        let texture = self.base.random_texture()?;
        let table = self.base.table().ok_or(EngineError::NotAttached)?;
        let uniforms = self.base.uniforms();
        let size = texture.size();

        let model_view = uniforms.model_view;
        let projection = uniforms.projection;
        let normal_matrix = uniforms.normal_matrix;
        let value_range = uniforms.value_range;
        let eye = model_view.inverse().transform_point3(Vec3::ZERO);

        let step_size = self.base.params().step_size;
        let step = step_size * grid.spacing.min_element();

        let vertices: Vec<ClipVertex<Vec3>> = self
            .corners
            .iter()
            .map(|&p| ClipVertex::new(projection * model_view.transform_point3(p).extend(1.0), p))
            .collect();

        let state = DrawState::default().with_cull(CullMode::Front);
        ctx.gpu.draw_indexed(&state, &vertices, &BOX_INDICES, |fragment| {
            let pixel = (fragment.x, fragment.y);
            let ray = Ray::new(eye, fragment.varying - eye);
            let span = bounds.hit_range(&ray, Interval::new(0.0, 1.0 + 1e-4))?;

            let dt = step / ray.direction.length().max(1e-12);
            let mut t = span.min + texture.lookup([0, 0], pixel, offset) * dt;
            let mut k = 0;
            while t <= span.max && k < MAX_STEPS {
                let p = ray.at(t);
                let g = grid.to_grid(p);
                let sample = table.sample(value_range.normalize(grid.sample(g)));
                let alpha = 1.0 - (1.0 - sample.w.clamp(0.0, 1.0)).powf(step_size);

                k += 1;
                if texture.lookup(random_index(k, size), pixel, offset) < alpha {
                    let view = model_view.transform_point3(p);
                    let clip = projection * view.extend(1.0);
                    let gradient = normal_matrix * -grid.gradient(g);
                    let normal = if gradient.length_squared() > 1e-12 {
                        gradient.normalize().extend(1.0)
                    } else {
                        Vec4::ZERO
                    };
                    return Some(
                        FragmentOutput::new([sample.truncate().extend(1.0), view.extend(1.0), normal])
                            .with_depth(clip.z / clip.w),
                    );
                }
                t += dt;
            }
            None
        })?;
        Ok(())
    }

    fn release(&mut self) {
        if self.attached().is_some() {
            log::debug!("Uniform grid engine released");
        }
        self.grid = None;
        self.bounds = None;
        self.corners.clear();
        self.base.detach();
    }
}

#[cfg(test)]
mod tests {
    use stao_core::TransferFunction;
    use stao_math::UVec3;

    use super::*;
    use crate::engine::test_support::*;
    use crate::engine::EngineParams;
    use crate::random::Xorshift128;

    fn ball() -> RenderableObject {
        let grid = UniformGrid::from_fn(UVec3::splat(9), Vec3::splat(-1.0), Vec3::splat(0.25), |p| {
            1.0 - p.length().min(1.0)
        });
        RenderableObject::new("ball", Geometry::UniformGrid(grid))
    }

    fn engine_with(tf: TransferFunction) -> UniformGridEngine {
        let mut engine = UniformGridEngine::new();
        engine
            .set_params(EngineParams {
                transfer_function: tf,
                ..Default::default()
            })
            .unwrap();
        engine
    }

    #[test]
    fn test_box_winding_outward() {
        let bounds = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let corners = box_corners(&bounds);
        let center = bounds.centroid();
        for tri in BOX_INDICES.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| corners[i as usize]);
            let face = (b - a).cross(c - a);
            assert!(face.dot((a + b + c) / 3.0 - center) > 0.0);
        }
    }

    #[test]
    fn test_opaque_volume_hits_front_of_box() {
        let mut engine = engine_with(TransferFunction::constant(Vec3::ONE, 1.0));
        let (gpu, target, covered) = draw_once(&mut engine, &ball());
        assert!(covered > 0);

        // Fully opaque: the first step past the front face (z = 1) is accepted
        let [color, position, _] = texel(&gpu, target, SIZE / 2, SIZE / 2);
        assert_eq!(color, Vec4::ONE);
        assert!(position.z > -3.13 && position.z < -2.99, "z = {}", position.z);
    }

    #[test]
    fn test_transparent_volume_draws_nothing() {
        let mut engine = engine_with(TransferFunction::constant(Vec3::ONE, 0.0));
        let (_, _, covered) = draw_once(&mut engine, &ball());
        assert_eq!(covered, 0);
    }

    #[test]
    fn test_ball_shows_lit_core() {
        // Only the inner half of the value range is visible
        let mut tf = TransferFunction::constant(Vec3::new(1.0, 0.5, 0.0), 1.0);
        tf.opacity_points = vec![
            stao_core::OpacityPoint {
                position: 0.49,
                opacity: 0.0,
            },
            stao_core::OpacityPoint {
                position: 0.5,
                opacity: 1.0,
            },
        ];
        let mut engine = engine_with(tf);
        let (gpu, target, covered) = draw_once(&mut engine, &ball());
        assert!(covered > 0);

        let [_, position, normal] = texel(&gpu, target, SIZE / 2, SIZE / 2);
        assert_eq!(position.w, 1.0);
        // Sphere of radius ~0.5 around the origin, seen from z = 4
        assert!(position.z > -4.0 && position.z < -3.3, "z = {}", position.z);
        assert_eq!(normal.w, 1.0);
        assert!(normal.z > 0.5);
        // Corners of the screen miss the box entirely
        assert_eq!(texel(&gpu, target, 0, 0)[1].w, 0.0);
    }

    #[test]
    fn test_camera_inside_volume_still_draws() {
        let (scene, handle) = handle_for(ball());
        let object = scene.get(handle).unwrap();
        let camera = Camera::new(Vec3::new(0.0, 0.0, 0.5), Vec3::new(0.0, 0.0, -1.0), SIZE, SIZE);
        let mut engine = engine_with(TransferFunction::constant(Vec3::ONE, 1.0));
        engine.create(handle, object, &camera, &light()).unwrap();
        engine.setup(object, &camera, &light()).unwrap();

        let (mut gpu, target) = device();
        engine
            .draw(&mut RenderContext {
                gpu: &mut gpu,
                rng: &mut Xorshift128::new(1),
            })
            .unwrap();
        // Every view ray leaves the box somewhere
        assert!(covered_pixels(&gpu, target).len() > (SIZE * SIZE * 9 / 10) as usize);
    }

    #[test]
    fn test_release_idempotent() {
        let mut engine = engine_with(TransferFunction::constant(Vec3::ONE, 1.0));
        draw_once(&mut engine, &ball());
        engine.release();
        engine.release();
        assert!(engine.attached().is_none());
        assert!(engine.grid.is_none());
    }
}
