//! Stochastic rendering compositor.
//!
//! The compositor owns one ensemble buffer, one ambient-occlusion G-buffer
//! and the registered (object, engine) pairs. Each frame it runs a number of
//! repetitions; every repetition renders all engines into the G-buffer,
//! resolves occlusion into the ensemble sample target and folds that sample
//! into the running average. The average is then drawn into whatever target
//! was bound when `draw` was called.
//!
//! The number of repetitions drops to the coarse level while the camera or
//! light moves (LOD). When nothing changes between frames and refinement is
//! enabled, the average keeps accumulating across frames.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use stao_core::{Light, ObjectHandle, Scene};
use stao_math::{Camera, Mat4, Vec4};
use thiserror::Error;

use crate::engine::{EngineError, RenderContext, RendererEngine};
use crate::ensemble::EnsembleBuffer;
use crate::gbuffer::{AoGBuffer, FrameUniforms, ProgramConfig};
use crate::gpu::{GpuError, GraphicsContext};
use crate::kernel::{KernelError, SamplingKernel};
use crate::random::Xorshift128;
use crate::shading::{ShadingModel, ShadingParams, ViewLight};

#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Invalid compositor setting {name}: {reason}")]
    InvalidSetting {
        name: &'static str,
        reason: String,
    },

    #[error("Unknown registration {0:?}")]
    UnknownRegistration(RegistrationId),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

pub type CompositorResult<T> = Result<T, CompositorError>;

/// Quality and appearance settings of the compositor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorSettings {
    /// Repetitions per frame at full quality.
    pub repetition_level: u32,
    /// Repetitions per frame while the view is moving.
    pub coarse_level: u32,
    pub lod: bool,
    pub refinement: bool,
    pub kernel_radius: f32,
    pub kernel_size: u32,
    pub noise_size: u32,
    pub occlusion_bias: f32,
    pub shading_model: ShadingModel,
    pub shading: ShadingParams,
    pub two_sided_lighting: bool,
    pub background: Vec4,
    pub draw_occlusion_factor: bool,
    /// Seed of the per-draw offset generator and the kernel generator.
    pub seed: u32,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            repetition_level: 16,
            coarse_level: 1,
            lod: true,
            refinement: true,
            kernel_radius: 0.5,
            kernel_size: 32,
            noise_size: 4,
            occlusion_bias: 0.025,
            shading_model: ShadingModel::default(),
            shading: ShadingParams::default(),
            two_sided_lighting: true,
            background: Vec4::new(0.1, 0.1, 0.12, 1.0),
            draw_occlusion_factor: false,
            seed: 1,
        }
    }
}

fn invalid<T>(name: &'static str, reason: &str) -> CompositorResult<T> {
    let error = CompositorError::InvalidSetting {
        name,
        reason: reason.to_string(),
    };
    log::error!("{}", error);
    Err(error)
}

fn check_level(name: &'static str, level: u32) -> CompositorResult<()> {
    if level == 0 {
        return invalid(name, "must be at least 1");
    }
    Ok(())
}

fn check_radius(radius: f32) -> CompositorResult<()> {
    if !radius.is_finite() || radius <= 0.0 {
        return invalid("kernel_radius", "must be finite and positive");
    }
    Ok(())
}

fn check_bias(bias: f32) -> CompositorResult<()> {
    if !bias.is_finite() || bias < 0.0 {
        return invalid("occlusion_bias", "must be finite and non-negative");
    }
    Ok(())
}

fn check_shading(params: &ShadingParams) -> CompositorResult<()> {
    let values = [params.ka, params.kd, params.ks, params.s];
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return invalid("shading", "coefficients must be finite and non-negative");
    }
    Ok(())
}

impl CompositorSettings {
    pub fn validate(&self) -> CompositorResult<()> {
        check_level("repetition_level", self.repetition_level)?;
        check_level("coarse_level", self.coarse_level)?;
        check_level("kernel_size", self.kernel_size)?;
        check_level("noise_size", self.noise_size)?;
        check_radius(self.kernel_radius)?;
        check_bias(self.occlusion_bias)?;
        check_shading(&self.shading)
    }

    fn program_config(&self) -> ProgramConfig {
        ProgramConfig {
            shading_model: self.shading_model,
            two_sided_lighting: self.two_sided_lighting,
            kernel_size: self.kernel_size as usize,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositorState {
    /// No framebuffer size seen yet; buffers are created on the next draw.
    WindowUninitialized,
    Ready,
}

/// Identity of one (object, engine) registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistrationId(u32);

/// What happened during one `draw`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub repetitions: u32,
    pub cleared: bool,
    pub moved: bool,
    /// Samples in the running average after this frame.
    pub samples: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositorStats {
    pub frames: u64,
    pub ensemble_clears: u64,
    pub gbuffer_creations: u64,
    pub engine_creations: u64,
    pub engine_releases: u64,
    pub engine_failures: u64,
}

struct Registration {
    id: RegistrationId,
    handle: ObjectHandle,
    engine: Box<dyn RendererEngine>,
    failed: bool,
    revision: Option<u64>,
    visible: bool,
    params_revision: u64,
}

/// Camera and light state compared between frames.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Pose {
    view: Mat4,
    projection: Mat4,
    light: Light,
}

impl Pose {
    fn capture(camera: &Camera, light: &Light) -> Self {
        Self {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            light: *light,
        }
    }
}

pub struct Compositor {
    settings: CompositorSettings,
    state: CompositorState,
    framebuffer_size: (u32, u32),
    kernel: Option<SamplingKernel>,
    kernel_dirty: bool,
    program_dirty: bool,
    ensemble: Option<EnsembleBuffer>,
    gbuffer: Option<AoGBuffer>,
    registrations: Vec<Registration>,
    next_id: u32,
    rng: Xorshift128,
    last_pose: Option<Pose>,
    invalidated: bool,
    stats: CompositorStats,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(CompositorSettings::default())
    }
}

impl Compositor {
    /// Create an uninitialized compositor. Invalid settings fall back to
    /// the defaults.
    pub fn new(settings: CompositorSettings) -> Self {
        let settings = match settings.validate() {
            Ok(()) => settings,
            Err(e) => {
                log::warn!("Using default compositor settings: {}", e);
                CompositorSettings::default()
            }
        };
        Self {
            rng: Xorshift128::new(settings.seed),
            settings,
            state: CompositorState::WindowUninitialized,
            framebuffer_size: (0, 0),
            kernel: None,
            kernel_dirty: true,
            program_dirty: true,
            ensemble: None,
            gbuffer: None,
            registrations: Vec::new(),
            next_id: 0,
            last_pose: None,
            invalidated: true,
            stats: CompositorStats::default(),
        }
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    pub fn state(&self) -> CompositorState {
        self.state
    }

    pub fn stats(&self) -> CompositorStats {
        self.stats
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        self.framebuffer_size
    }

    pub fn kernel(&self) -> Option<&SamplingKernel> {
        self.kernel.as_ref()
    }

    pub fn ensemble(&self) -> Option<&EnsembleBuffer> {
        self.ensemble.as_ref()
    }

    pub fn gbuffer(&self) -> Option<&AoGBuffer> {
        self.gbuffer.as_ref()
    }

    /// Samples in the running average.
    pub fn sample_count(&self) -> u32 {
        self.ensemble.as_ref().map_or(0, EnsembleBuffer::count)
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    /// Drop the accumulated average at the next frame.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    // Registrations

    /// Register an engine to draw `handle`. It is created at the next frame.
    pub fn register(&mut self, handle: ObjectHandle, engine: Box<dyn RendererEngine>) -> RegistrationId {
        let id = RegistrationId(self.next_id);
        self.next_id += 1;
        log::info!("Registered {} engine for object {:?}", engine.name(), handle);
        self.registrations.push(Registration {
            id,
            handle,
            engine,
            failed: false,
            revision: None,
            visible: true,
            params_revision: 0,
        });
        self.invalidated = true;
        id
    }

    /// Remove a registration, releasing its engine.
    pub fn unregister(&mut self, id: RegistrationId) -> CompositorResult<Box<dyn RendererEngine>> {
        let index = self
            .registrations
            .iter()
            .position(|r| r.id == id)
            .ok_or(CompositorError::UnknownRegistration(id))?;
        let mut registration = self.registrations.remove(index);
        if registration.engine.attached().is_some() {
            self.stats.engine_releases += 1;
        }
        registration.engine.release();
        self.invalidated = true;
        log::info!("Unregistered {} engine", registration.engine.name());
        Ok(registration.engine)
    }

    /// Point a registration at another object. The engine is re-created at
    /// the next frame and a previous failure is forgotten.
    pub fn set_object(&mut self, id: RegistrationId, handle: ObjectHandle) -> CompositorResult<()> {
        let registration = self.registration_mut(id)?;
        if registration.handle != handle || registration.failed {
            registration.handle = handle;
            registration.failed = false;
            registration.revision = None;
        }
        Ok(())
    }

    pub fn engine(&self, id: RegistrationId) -> CompositorResult<&dyn RendererEngine> {
        self.registrations
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.engine.as_ref())
            .ok_or(CompositorError::UnknownRegistration(id))
    }

    /// Mutable engine access, e.g. for `set_params`. Parameter changes are
    /// picked up at the next frame.
    pub fn engine_mut(&mut self, id: RegistrationId) -> CompositorResult<&mut dyn RendererEngine> {
        Ok(self.registration_mut(id)?.engine.as_mut())
    }

    /// Whether the last `create` for this registration failed.
    pub fn is_failed(&self, id: RegistrationId) -> CompositorResult<bool> {
        self.registrations
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.failed)
            .ok_or(CompositorError::UnknownRegistration(id))
    }

    fn registration_mut(&mut self, id: RegistrationId) -> CompositorResult<&mut Registration> {
        self.registrations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(CompositorError::UnknownRegistration(id))
    }

    // Control calls

    pub fn set_repetition_level(&mut self, level: u32) -> CompositorResult<()> {
        check_level("repetition_level", level)?;
        self.settings.repetition_level = level;
        Ok(())
    }

    pub fn set_coarse_level(&mut self, level: u32) -> CompositorResult<()> {
        check_level("coarse_level", level)?;
        self.settings.coarse_level = level;
        Ok(())
    }

    pub fn enable_lod_control(&mut self) {
        self.settings.lod = true;
    }

    pub fn disable_lod_control(&mut self) {
        self.settings.lod = false;
    }

    pub fn enable_refinement(&mut self) {
        self.settings.refinement = true;
    }

    pub fn disable_refinement(&mut self) {
        self.settings.refinement = false;
    }

    pub fn set_kernel_radius(&mut self, radius: f32) -> CompositorResult<()> {
        check_radius(radius)?;
        if self.settings.kernel_radius != radius {
            self.settings.kernel_radius = radius;
            self.kernel_dirty = true;
        }
        Ok(())
    }

    pub fn set_kernel_size(&mut self, size: u32) -> CompositorResult<()> {
        check_level("kernel_size", size)?;
        if self.settings.kernel_size != size {
            self.settings.kernel_size = size;
            self.kernel_dirty = true;
            self.program_dirty = true;
        }
        Ok(())
    }

    pub fn set_drawing_occlusion_factor_enabled(&mut self, enabled: bool) {
        if self.settings.draw_occlusion_factor != enabled {
            self.settings.draw_occlusion_factor = enabled;
            self.invalidated = true;
        }
    }

    pub fn set_shading_model(&mut self, model: ShadingModel) {
        if self.settings.shading_model != model {
            self.settings.shading_model = model;
            self.program_dirty = true;
        }
    }

    pub fn set_shading_params(&mut self, params: ShadingParams) -> CompositorResult<()> {
        check_shading(&params)?;
        if self.settings.shading != params {
            self.settings.shading = params;
            self.invalidated = true;
        }
        Ok(())
    }

    pub fn set_two_sided_lighting(&mut self, enabled: bool) {
        if self.settings.two_sided_lighting != enabled {
            self.settings.two_sided_lighting = enabled;
            self.program_dirty = true;
        }
    }

    pub fn set_occlusion_bias(&mut self, bias: f32) -> CompositorResult<()> {
        check_bias(bias)?;
        if self.settings.occlusion_bias != bias {
            self.settings.occlusion_bias = bias;
            self.invalidated = true;
        }
        Ok(())
    }

    /// Reseed the sampling kernel and the per-draw random stream.
    pub fn set_seed(&mut self, seed: u32) {
        if self.settings.seed != seed {
            self.settings.seed = seed;
            self.rng = Xorshift128::new(seed);
            self.kernel_dirty = true;
        }
    }

    pub fn set_background_color(&mut self, color: Vec4) {
        if self.settings.background != color {
            self.settings.background = color;
            self.invalidated = true;
        }
    }

    /// Apply a whole settings block through the individual control calls.
    pub fn apply_settings(&mut self, settings: &CompositorSettings) -> CompositorResult<()> {
        settings.validate()?;
        self.set_repetition_level(settings.repetition_level)?;
        self.set_coarse_level(settings.coarse_level)?;
        self.settings.lod = settings.lod;
        self.settings.refinement = settings.refinement;
        self.set_kernel_radius(settings.kernel_radius)?;
        self.set_kernel_size(settings.kernel_size)?;
        if self.settings.noise_size != settings.noise_size {
            self.settings.noise_size = settings.noise_size;
            self.kernel_dirty = true;
        }
        self.set_occlusion_bias(settings.occlusion_bias)?;
        self.set_shading_model(settings.shading_model);
        self.set_shading_params(settings.shading)?;
        self.set_two_sided_lighting(settings.two_sided_lighting);
        self.set_background_color(settings.background);
        self.set_drawing_occlusion_factor_enabled(settings.draw_occlusion_factor);
        self.set_seed(settings.seed);
        Ok(())
    }

    // Frame

    /// Render one frame of the registered objects into the bound target.
    pub fn draw(
        &mut self,
        gpu: &mut GraphicsContext,
        scene: &Scene,
        camera: &Camera,
        light: &Light,
    ) -> CompositorResult<FrameReport> {
        let size = camera.framebuffer_size();
        match self.state {
            CompositorState::WindowUninitialized => self.initialize(gpu, size)?,
            CompositorState::Ready if size != self.framebuffer_size => {
                self.resize(gpu, scene, camera, light, size)?
            }
            CompositorState::Ready => {
                if self.kernel_dirty || self.program_dirty {
                    self.rebuild_occlusion(gpu)?;
                }
            }
        }

        self.sync_registrations(scene, camera, light);

        let pose = Pose::capture(camera, light);
        let moved = self.last_pose.is_some_and(|last| last != pose);
        self.last_pose = Some(pose);
        let repetitions = if moved && self.settings.lod {
            self.settings.coarse_level
        } else {
            self.settings.repetition_level
        };

        let cleared = moved || self.invalidated || !self.settings.refinement;
        if cleared {
            self.clear_accumulation(gpu)?;
        }

        self.setup_engines(scene, camera, light);
        self.run_repetitions(gpu, camera, light, repetitions)?;

        self.stats.frames += 1;
        let report = FrameReport {
            repetitions,
            cleared,
            moved,
            samples: self.sample_count(),
        };
        log::debug!(
            "Frame {}: {} repetitions, {} samples{}",
            self.stats.frames,
            report.repetitions,
            report.samples,
            if cleared { " (cleared)" } else { "" }
        );
        Ok(report)
    }

    fn initialize(&mut self, gpu: &mut GraphicsContext, size: (u32, u32)) -> CompositorResult<()> {
        self.framebuffer_size = size;
        self.regenerate_kernel()?;
        self.ensemble = Some(EnsembleBuffer::create(gpu, size.0, size.1)?);
        self.create_gbuffer(gpu)?;
        self.state = CompositorState::Ready;
        self.invalidated = true;
        log::info!("Compositor ready at {}x{}", size.0, size.1);
        Ok(())
    }

    fn resize(
        &mut self,
        gpu: &mut GraphicsContext,
        scene: &Scene,
        camera: &Camera,
        light: &Light,
        size: (u32, u32),
    ) -> CompositorResult<()> {
        log::info!(
            "Framebuffer resized {}x{} -> {}x{}",
            self.framebuffer_size.0,
            self.framebuffer_size.1,
            size.0,
            size.1
        );
        self.framebuffer_size = size;
        if self.kernel_dirty {
            self.regenerate_kernel()?;
        }
        if let Some(mut ensemble) = self.ensemble.take() {
            ensemble.release(gpu);
        }
        self.ensemble = Some(EnsembleBuffer::create(gpu, size.0, size.1)?);
        self.create_gbuffer(gpu)?;

        for registration in &mut self.registrations {
            if registration.engine.attached() != Some(registration.handle) {
                continue;
            }
            let Some(object) = scene.get(registration.handle) else {
                continue;
            };
            if let Err(e) = registration.engine.update(object, camera, light) {
                registration.fail("update", &e, &mut self.stats);
            }
        }
        self.invalidated = true;
        Ok(())
    }

    fn rebuild_occlusion(&mut self, gpu: &mut GraphicsContext) -> CompositorResult<()> {
        if self.kernel_dirty {
            self.regenerate_kernel()?;
        }
        if self.program_dirty {
            self.create_gbuffer(gpu)?;
        }
        self.invalidated = true;
        Ok(())
    }

    fn regenerate_kernel(&mut self) -> CompositorResult<()> {
        let kernel = SamplingKernel::generate(
            self.settings.kernel_radius,
            self.settings.kernel_size,
            self.settings.noise_size,
            &mut StdRng::seed_from_u64(self.settings.seed as u64),
        )?;
        self.kernel = Some(kernel);
        self.kernel_dirty = false;
        Ok(())
    }

    /// Release the G-buffer if any and create it for the current size and
    /// program configuration.
    fn create_gbuffer(&mut self, gpu: &mut GraphicsContext) -> CompositorResult<()> {
        if let Some(mut gbuffer) = self.gbuffer.take() {
            gbuffer.release(gpu);
        }
        let (width, height) = self.framebuffer_size;
        self.gbuffer = Some(AoGBuffer::create(gpu, width, height, self.settings.program_config())?);
        self.program_dirty = false;
        self.stats.gbuffer_creations += 1;
        Ok(())
    }

    /// Attach engines to their current objects and detect object changes.
    fn sync_registrations(&mut self, scene: &Scene, camera: &Camera, light: &Light) {
        for registration in &mut self.registrations {
            let Some(object) = scene.get(registration.handle) else {
                if registration.engine.attached().is_some() {
                    log::warn!(
                        "Object {:?} left the scene, releasing its {} engine",
                        registration.handle,
                        registration.engine.name()
                    );
                    registration.engine.release();
                    self.stats.engine_releases += 1;
                    self.invalidated = true;
                }
                continue;
            };

            if registration.engine.attached() != Some(registration.handle) {
                if registration.failed {
                    continue;
                }
                if registration.engine.attached().is_some() {
                    self.stats.engine_releases += 1;
                }
                registration.engine.release();
                self.invalidated = true;
                match registration.engine.create(registration.handle, object, camera, light) {
                    Ok(()) => {
                        self.stats.engine_creations += 1;
                        registration.revision = scene.revision(registration.handle);
                        registration.visible = object.visible;
                        registration.params_revision = registration.engine.params_revision();
                        log::info!("Created {} engine for '{}'", registration.engine.name(), object.name);
                    }
                    Err(e) => {
                        log::error!(
                            "Failed to create {} engine for '{}': {}",
                            registration.engine.name(),
                            object.name,
                            e
                        );
                        registration.failed = true;
                        self.stats.engine_failures += 1;
                    }
                }
                continue;
            }

            let revision = scene.revision(registration.handle);
            if revision != registration.revision || object.visible != registration.visible {
                registration.revision = revision;
                registration.visible = object.visible;
                self.invalidated = true;
            }

            let params_revision = registration.engine.params_revision();
            if params_revision != registration.params_revision {
                registration.params_revision = params_revision;
                self.invalidated = true;
                if let Err(e) = registration.engine.update(object, camera, light) {
                    registration.fail("update", &e, &mut self.stats);
                }
            }
        }
    }

    fn clear_accumulation(&mut self, gpu: &mut GraphicsContext) -> CompositorResult<()> {
        let ensemble = self.ensemble.as_mut().ok_or(GpuError::Released("ensemble buffer"))?;
        ensemble.clear(gpu)?;
        for registration in &mut self.registrations {
            registration.engine.reset_repetitions();
        }
        self.invalidated = false;
        self.stats.ensemble_clears += 1;
        Ok(())
    }

    fn setup_engines(&mut self, scene: &Scene, camera: &Camera, light: &Light) {
        for registration in &mut self.registrations {
            if !registration.drawable() {
                continue;
            }
            let Some(object) = scene.get(registration.handle) else {
                continue;
            };
            if let Err(e) = registration.engine.setup(object, camera, light) {
                registration.fail("set up", &e, &mut self.stats);
                self.invalidated = true;
            }
        }
    }

    fn run_repetitions(
        &mut self,
        gpu: &mut GraphicsContext,
        camera: &Camera,
        light: &Light,
        repetitions: u32,
    ) -> CompositorResult<()> {
        let Self {
            settings,
            kernel,
            ensemble,
            gbuffer,
            registrations,
            rng,
            stats,
            invalidated,
            ..
        } = self;
        let kernel = kernel.as_ref().ok_or(GpuError::Released("sampling kernel"))?;
        let ensemble = ensemble.as_mut().ok_or(GpuError::Released("ensemble buffer"))?;
        let gbuffer = gbuffer.as_mut().ok_or(GpuError::Released("G-buffer"))?;

        let view = camera.view_matrix();
        let frame = FrameUniforms {
            projection: camera.projection_matrix(),
            light: ViewLight {
                position: view.transform_point3(light.position),
                color: light.color,
            },
            shading: settings.shading,
            background: settings.background,
            bias: settings.occlusion_bias,
            draw_occlusion_factor: settings.draw_occlusion_factor,
        };

        for _ in 0..repetitions {
            ensemble.bind(gpu)?;
            gbuffer.bind(gpu)?;
            gbuffer.clear(gpu)?;
            let mut ctx = RenderContext {
                gpu: &mut *gpu,
                rng: &mut *rng,
            };
            for registration in registrations.iter_mut().filter(|r| r.drawable()) {
                if let Err(e) = registration.engine.draw(&mut ctx) {
                    registration.fail("draw", &e, stats);
                    *invalidated = true;
                    continue;
                }
                registration.engine.count_repetitions();
            }
            gbuffer.unbind(gpu)?;
            gbuffer.draw(gpu, kernel, &frame)?;
            ensemble.unbind(gpu)?;
            ensemble.add(gpu)?;
        }

        ensemble.draw(gpu)?;
        Ok(())
    }

    /// Release every engine and buffer; the next `draw` starts over.
    pub fn release(&mut self, gpu: &mut GraphicsContext) {
        for registration in &mut self.registrations {
            if registration.engine.attached().is_some() {
                self.stats.engine_releases += 1;
            }
            registration.engine.release();
            registration.revision = None;
        }
        if let Some(mut ensemble) = self.ensemble.take() {
            ensemble.release(gpu);
        }
        if let Some(mut gbuffer) = self.gbuffer.take() {
            gbuffer.release(gpu);
        }
        self.kernel = None;
        self.kernel_dirty = true;
        self.program_dirty = true;
        self.last_pose = None;
        self.invalidated = true;
        if self.state == CompositorState::Ready {
            log::info!("Compositor released");
        }
        self.state = CompositorState::WindowUninitialized;
    }
}

impl Registration {
    fn drawable(&self) -> bool {
        !self.failed && self.visible && self.engine.attached() == Some(self.handle)
    }

    /// Release the engine and skip it until the object is reassigned.
    fn fail(&mut self, stage: &str, err: &EngineError, stats: &mut CompositorStats) {
        log::error!("Failed to {} {} engine: {}", stage, self.engine.name(), err);
        if self.engine.attached().is_some() {
            stats.engine_releases += 1;
        }
        self.engine.release();
        self.failed = true;
        stats.engine_failures += 1;
    }
}
