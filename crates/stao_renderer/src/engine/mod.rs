//! Renderer engines: one per geometry kind.
//!
//! An engine is attached to at most one scene object at a time. It copies
//! what it needs out of the object in `create`, derives per-frame uniforms in
//! `setup` and draws one stochastic sample into whatever target is bound in
//! `draw`. Every fragment it keeps writes the G-buffer layout:
//! color, view-space position (w = 1) and view-space normal (w = 0 when
//! unlit).

mod mesh;
mod surface;
mod tetra;
mod tube;
mod volume;

pub use mesh::PolygonEngine;
pub use tetra::{PreintegrationTable, TetrahedraEngine};
pub use tube::{build_tube, TubeEngine, TubeMesh};
pub use volume::UniformGridEngine;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use stao_core::{
    CoreError, GeometryKind, Light, ObjectHandle, RenderableObject, TransferFunction,
    TransferTable, DEFAULT_TABLE_SIZE,
};
use stao_math::{Camera, Interval, Mat4Ext};
use thiserror::Error;

use crate::gpu::{GpuError, GraphicsContext};
use crate::random::{Xorshift128, DEFAULT_RANDOM_TEXTURE_SIZE, RandomTexture};
use crate::shading::GeometryUniforms;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{engine} engine cannot draw a {kind}")]
    Unsupported {
        engine: &'static str,
        kind: GeometryKind,
    },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(#[from] CoreError),

    #[error("Invalid engine parameter {name}: {reason}")]
    InvalidParams {
        name: &'static str,
        reason: String,
    },

    #[error("Engine is not attached to an object")]
    NotAttached,

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Device and random source handed to `draw`.
pub struct RenderContext<'a> {
    pub gpu: &'a mut GraphicsContext,
    pub rng: &'a mut Xorshift128,
}

/// User-tunable appearance of an engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// Multiplies every opacity the engine produces.
    pub opacity_scale: f32,
    /// Silhouette enhancement exponent for translucent surfaces, 0 disables.
    pub edge_factor: f32,
    pub transfer_function: TransferFunction,
    /// Overrides the data range mapped onto the transfer function.
    pub value_range: Option<[f32; 2]>,
    /// Segments around each tube.
    pub tube_sides: u32,
    /// Ray-marching step in voxels.
    pub step_size: f32,
    pub random_texture_size: u32,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            opacity_scale: 1.0,
            edge_factor: 0.0,
            transfer_function: TransferFunction::default(),
            value_range: None,
            tube_sides: 8,
            step_size: 0.5,
            random_texture_size: DEFAULT_RANDOM_TEXTURE_SIZE,
        }
    }
}

impl EngineParams {
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |name, reason: &str| {
            Err(EngineError::InvalidParams {
                name,
                reason: reason.to_string(),
            })
        };
        if !self.opacity_scale.is_finite() || self.opacity_scale < 0.0 {
            return invalid("opacity_scale", "must be finite and non-negative");
        }
        if !self.edge_factor.is_finite() || self.edge_factor < 0.0 {
            return invalid("edge_factor", "must be finite and non-negative");
        }
        if self.tube_sides < 3 {
            return invalid("tube_sides", "must be at least 3");
        }
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return invalid("step_size", "must be positive");
        }
        if self.random_texture_size == 0 || self.random_texture_size > u16::MAX as u32 {
            return invalid("random_texture_size", "must be in 1..=65535");
        }
        if let Some([lo, hi]) = self.value_range {
            if !(lo < hi) {
                return invalid("value_range", "min must be below max");
            }
        }
        Ok(())
    }
}

/// Lifecycle contract between the compositor and a geometry engine.
///
/// `create` moves an engine from unattached to attached and leaves it
/// unattached on failure. `release` is idempotent.
pub trait RendererEngine {
    fn name(&self) -> &'static str;

    /// Geometry kind this engine draws.
    fn kind(&self) -> GeometryKind;

    fn base(&self) -> &EngineBase;

    fn base_mut(&mut self) -> &mut EngineBase;

    /// Attach to `object`, building geometry buffers and lookup tables.
    fn create(
        &mut self,
        handle: ObjectHandle,
        object: &RenderableObject,
        camera: &Camera,
        light: &Light,
    ) -> EngineResult<()>;

    /// Rebuild framebuffer- and parameter-dependent state, keeping geometry.
    fn update(&mut self, object: &RenderableObject, camera: &Camera, light: &Light) -> EngineResult<()>;

    /// Per-frame uniforms; called once per frame before any `draw`.
    fn setup(&mut self, object: &RenderableObject, camera: &Camera, light: &Light) -> EngineResult<()>;

    /// Draw one stochastic sample into the bound target.
    fn draw(&mut self, ctx: &mut RenderContext<'_>) -> EngineResult<()>;

    /// Drop geometry buffers and detach.
    fn release(&mut self);

    fn attached(&self) -> Option<ObjectHandle> {
        self.base().handle
    }

    fn repetition_count(&self) -> u32 {
        self.base().repetitions
    }

    fn reset_repetitions(&mut self) {
        self.base_mut().repetitions = 0;
    }

    fn count_repetitions(&mut self) {
        self.base_mut().repetitions += 1;
    }

    fn params(&self) -> &EngineParams {
        &self.base().params
    }

    /// Replace the parameters; takes effect at the next `update`.
    fn set_params(&mut self, params: EngineParams) -> EngineResult<()> {
        params.validate()?;
        let base = self.base_mut();
        if base.params != params {
            base.params = params;
            base.params_revision += 1;
            base.table_dirty = true;
        }
        Ok(())
    }

    /// Bumped whenever the parameters change.
    fn params_revision(&self) -> u64 {
        self.base().params_revision
    }
}

/// State every engine carries regardless of geometry kind.
#[derive(Debug)]
pub struct EngineBase {
    handle: Option<ObjectHandle>,
    repetitions: u32,
    params: EngineParams,
    params_revision: u64,
    table: Option<TransferTable>,
    table_dirty: bool,
    random_texture: Option<RandomTexture>,
    pub(crate) viewport: (u32, u32),
    pub(crate) uniforms: GeometryUniforms,
}

impl Default for EngineBase {
    fn default() -> Self {
        Self::new(EngineParams::default())
    }
}

impl EngineBase {
    pub fn new(params: EngineParams) -> Self {
        Self {
            handle: None,
            repetitions: 0,
            params,
            params_revision: 0,
            table: None,
            table_dirty: true,
            random_texture: None,
            viewport: (1, 1),
            uniforms: GeometryUniforms::default(),
        }
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn uniforms(&self) -> &GeometryUniforms {
        &self.uniforms
    }

    /// Mark the engine attached and generate its random texture, seeded
    /// from the object handle.
    pub(crate) fn attach(&mut self, handle: ObjectHandle, camera: &Camera) {
        self.random_texture = Some(seeded_texture(handle, self.params.random_texture_size));
        self.handle = Some(handle);
        self.repetitions = 0;
        self.table_dirty = true;
        self.viewport = camera.framebuffer_size();
    }

    /// Apply a changed texture size and the current framebuffer size.
    pub(crate) fn refresh(&mut self, camera: &Camera) {
        self.viewport = camera.framebuffer_size();
        if let Some(handle) = self.handle {
            if self.random_texture_size() != self.params.random_texture_size {
                self.random_texture = Some(seeded_texture(handle, self.params.random_texture_size));
            }
        }
    }

    pub(crate) fn detach(&mut self) {
        self.handle = None;
        self.random_texture = None;
        self.table = None;
        self.table_dirty = true;
        self.repetitions = 0;
    }

    pub(crate) fn random_texture(&self) -> EngineResult<&RandomTexture> {
        self.random_texture.as_ref().ok_or(EngineError::NotAttached)
    }

    pub(crate) fn random_texture_size(&self) -> u32 {
        self.random_texture
            .as_ref()
            .map_or(self.params.random_texture_size, RandomTexture::size)
    }

    /// Bake the transfer function if it changed. Returns true when rebuilt.
    pub(crate) fn refresh_table(&mut self) -> bool {
        if !self.table_dirty && self.table.is_some() {
            return false;
        }
        let tf = &self.params.transfer_function;
        self.table = Some(tf.bake_scaled(DEFAULT_TABLE_SIZE, self.params.opacity_scale));
        self.table_dirty = false;
        log::debug!("Rebuilt transfer-function table");
        true
    }

    pub(crate) fn table(&self) -> Option<&TransferTable> {
        self.table.as_ref()
    }

    /// Data range mapped onto the transfer function.
    pub(crate) fn value_range(&self, data: Interval) -> Interval {
        match self.params.value_range {
            Some([lo, hi]) => Interval::new(lo, hi),
            None if data.is_empty() => Interval::new(0.0, 1.0),
            None => data,
        }
    }

    /// Matrices for the current camera and object transform.
    pub(crate) fn compute_uniforms(&mut self, object: &RenderableObject, camera: &Camera, value_range: Interval) {
        let model_view = camera.view_matrix() * object.model_matrix();
        self.uniforms = GeometryUniforms {
            model_view,
            projection: camera.projection_matrix(),
            normal_matrix: model_view.normal_matrix(),
            random_offset: self.uniforms.random_offset,
            edge_factor: self.params.edge_factor,
            value_range,
        };
    }

    /// Draw a fresh random-texture offset for this draw call.
    pub(crate) fn next_offset(&mut self, rng: &mut Xorshift128) -> [u32; 2] {
        let offset = crate::random::draw_offset(rng, self.repetitions, self.random_texture_size());
        self.uniforms.random_offset = offset;
        offset
    }

    pub(crate) fn require_attached(&self) -> EngineResult<ObjectHandle> {
        self.handle.ok_or(EngineError::NotAttached)
    }
}

fn seeded_texture(handle: ObjectHandle, size: u32) -> RandomTexture {
    let seed = (((handle.index as u64) << 32) | handle.generation as u64) ^ 0x5DEE_CE66_D1CE_4E5B;
    RandomTexture::generate(size, &mut StdRng::seed_from_u64(seed))
}

/// Build the engine that draws `kind`.
pub fn create_engine(kind: GeometryKind) -> Box<dyn RendererEngine> {
    match kind {
        GeometryKind::Polygon => Box::new(PolygonEngine::new()),
        GeometryKind::Line => Box::new(TubeEngine::new()),
        GeometryKind::UniformGrid => Box::new(UniformGridEngine::new()),
        GeometryKind::Tetrahedra => Box::new(TetrahedraEngine::new()),
    }
}

pub(crate) fn unsupported(engine: &'static str, object: &RenderableObject) -> EngineError {
    EngineError::Unsupported {
        engine,
        kind: object.kind(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use stao_core::{Geometry, PolygonMesh, Scene, VertexColors};
    use stao_math::{Vec3, Vec4};

    use super::*;
    use crate::gbuffer::{COLOR_ATTACHMENT, NORMAL_ATTACHMENT, POSITION_ATTACHMENT};
    use crate::gpu::{FramebufferId, TextureFormat};

    pub const SIZE: u32 = 32;

    pub fn camera() -> Camera {
        Camera::new(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO, SIZE, SIZE)
    }

    pub fn light() -> Light {
        Light::new(Vec3::new(0.0, 0.0, 4.0))
    }

    /// A device with a G-buffer shaped target bound.
    pub fn device() -> (GraphicsContext, FramebufferId) {
        let mut gpu = GraphicsContext::new(SIZE, SIZE).unwrap();
        let target = gpu
            .create_framebuffer(
                SIZE,
                SIZE,
                &[TextureFormat::Rgba8, TextureFormat::Rgba32F, TextureFormat::Rgba32F],
                true,
            )
            .unwrap();
        gpu.bind(target).unwrap();
        (gpu, target)
    }

    pub fn quad(color: Vec3, with_normals: bool) -> RenderableObject {
        let positions = vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ];
        let mut mesh = PolygonMesh::new(positions, vec![0, 1, 2, 0, 2, 3])
            .with_colors(VertexColors::Uniform(color));
        if with_normals {
            mesh.compute_normals();
        }
        RenderableObject::new("quad", Geometry::Polygon(mesh))
    }

    pub fn handle_for(object: RenderableObject) -> (Scene, ObjectHandle) {
        let mut scene = Scene::new("test");
        let handle = scene.insert(object);
        (scene, handle)
    }

    /// Run the full lifecycle once and return the number of covered pixels.
    pub fn draw_once(engine: &mut dyn RendererEngine, object: &RenderableObject) -> (GraphicsContext, FramebufferId, usize) {
        let (scene, handle) = handle_for(object.clone());
        let object = scene.get(handle).unwrap();
        let (mut gpu, target) = device();
        let mut rng = Xorshift128::new(7);
        engine.create(handle, object, &camera(), &light()).unwrap();
        engine.setup(object, &camera(), &light()).unwrap();
        engine
            .draw(&mut RenderContext {
                gpu: &mut gpu,
                rng: &mut rng,
            })
            .unwrap();
        let covered = covered_pixels(&gpu, target).len();
        (gpu, target, covered)
    }

    pub fn covered_pixels(gpu: &GraphicsContext, target: FramebufferId) -> Vec<(u32, u32)> {
        let fb = gpu.framebuffer(target).unwrap();
        let mut covered = Vec::new();
        for y in 0..SIZE {
            for x in 0..SIZE {
                if fb.read(POSITION_ATTACHMENT, x, y).w == 1.0 {
                    covered.push((x, y));
                }
            }
        }
        covered
    }

    pub fn texel(gpu: &GraphicsContext, target: FramebufferId, x: u32, y: u32) -> [Vec4; 3] {
        let fb = gpu.framebuffer(target).unwrap();
        [
            fb.read(COLOR_ATTACHMENT, x, y),
            fb.read(POSITION_ATTACHMENT, x, y),
            fb.read(NORMAL_ATTACHMENT, x, y),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        assert!(EngineParams::default().validate().is_ok());
    }

    #[test]
    fn test_params_validation() {
        let bad = [
            EngineParams {
                tube_sides: 2,
                ..Default::default()
            },
            EngineParams {
                step_size: 0.0,
                ..Default::default()
            },
            EngineParams {
                opacity_scale: -1.0,
                ..Default::default()
            },
            EngineParams {
                value_range: Some([1.0, 1.0]),
                ..Default::default()
            },
            EngineParams {
                random_texture_size: 0,
                ..Default::default()
            },
        ];
        for params in bad {
            assert!(matches!(params.validate(), Err(EngineError::InvalidParams { .. })));
        }
    }

    #[test]
    fn test_params_serde_defaults() {
        let params: EngineParams = serde_json::from_str(r#"{"tube_sides": 12}"#).unwrap();
        assert_eq!(params.tube_sides, 12);
        assert_eq!(params.step_size, 0.5);
    }

    #[test]
    fn test_create_engine_matches_kind() {
        for kind in [
            GeometryKind::Polygon,
            GeometryKind::Line,
            GeometryKind::UniformGrid,
            GeometryKind::Tetrahedra,
        ] {
            let engine = create_engine(kind);
            assert_eq!(engine.kind(), kind);
            assert!(engine.attached().is_none());
        }
    }

    #[test]
    fn test_set_params_bumps_revision() {
        let mut engine = create_engine(GeometryKind::Polygon);
        assert_eq!(engine.params_revision(), 0);
        engine
            .set_params(EngineParams {
                opacity_scale: 0.5,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(engine.params_revision(), 1);
        // Same parameters again: no change
        let same = engine.params().clone();
        engine.set_params(same).unwrap();
        assert_eq!(engine.params_revision(), 1);
        assert!(engine
            .set_params(EngineParams {
                tube_sides: 1,
                ..Default::default()
            })
            .is_err());
        assert_eq!(engine.params_revision(), 1);
    }

    #[test]
    fn test_table_applies_opacity_scale() {
        let mut base = EngineBase::default();
        base.params.opacity_scale = 2.0;
        assert!(base.refresh_table());
        let table = base.table().unwrap();
        assert!((table.sample(0.25).w - 0.5).abs() < 1e-2);
        assert!((table.sample(0.5).w - 1.0).abs() < 1e-6);
        assert!(!base.refresh_table());
    }

    #[test]
    fn test_repetition_counter() {
        let mut engine = create_engine(GeometryKind::Line);
        engine.count_repetitions();
        engine.count_repetitions();
        assert_eq!(engine.repetition_count(), 2);
        engine.reset_repetitions();
        assert_eq!(engine.repetition_count(), 0);
    }

    #[test]
    fn test_value_range_override() {
        let mut base = EngineBase::default();
        assert_eq!(base.value_range(Interval::new(2.0, 4.0)), Interval::new(2.0, 4.0));
        assert_eq!(base.value_range(Interval::EMPTY), Interval::new(0.0, 1.0));
        base.params.value_range = Some([-1.0, 1.0]);
        assert_eq!(base.value_range(Interval::new(2.0, 4.0)), Interval::new(-1.0, 1.0));
    }
}
