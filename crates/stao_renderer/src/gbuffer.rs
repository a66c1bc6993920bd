//! Ambient-occlusion G-buffer.
//!
//! Geometry engines draw into four targets:
//!
//! | attachment | format  | contents                                   |
//! |------------|---------|--------------------------------------------|
//! | 0          | RGBA8   | surface color                              |
//! | 1          | RGBA32F | view-space position, w = 1 where covered    |
//! | 2          | RGBA32F | view-space normal, w = 0 for unlit surfaces |
//! | depth      | f32     | window depth                               |
//!
//! `draw` then runs the occlusion-combination program over the whole
//! screen, writing the shaded and occluded color into the bound target.

use stao_math::{smoothstep, Mat4, Mat4Ext, UVec2, Vec2, Vec3, Vec4};

use crate::gpu::{
    DrawState, FragmentOutput, Framebuffer, FramebufferId, GpuError, GpuResult, GraphicsContext,
    ScreenFragment, TextureFormat,
};
use crate::kernel::SamplingKernel;
use crate::shading::{shade, OcclusionUniforms, ShadingModel, ShadingParams, ViewLight};

pub const COLOR_ATTACHMENT: usize = 0;
pub const POSITION_ATTACHMENT: usize = 1;
pub const NORMAL_ATTACHMENT: usize = 2;

const FORMATS: [TextureFormat; 3] = [
    TextureFormat::Rgba8,
    TextureFormat::Rgba32F,
    TextureFormat::Rgba32F,
];

/// Build-time configuration of the occlusion program.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgramConfig {
    pub shading_model: ShadingModel,
    pub two_sided_lighting: bool,
    pub kernel_size: usize,
}

/// The occlusion-combination program, specialized at build time.
#[derive(Clone, Debug)]
pub struct OcclusionProgram {
    config: ProgramConfig,
    defines: Vec<(String, String)>,
}

impl OcclusionProgram {
    pub fn build(config: ProgramConfig) -> GpuResult<Self> {
        if config.kernel_size == 0 {
            return Err(GpuError::ProgramBuild(
                "KERNEL_SIZE must be at least 1".to_string(),
            ));
        }
        let defines = vec![
            (
                "SHADING_MODEL".to_string(),
                config.shading_model.define().to_string(),
            ),
            (
                "TWO_SIDED_LIGHTING".to_string(),
                (config.two_sided_lighting as u8).to_string(),
            ),
            ("KERNEL_SIZE".to_string(), config.kernel_size.to_string()),
        ];
        log::debug!("Built occlusion program with defines {:?}", defines);
        Ok(Self { config, defines })
    }

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    pub fn defines(&self) -> &[(String, String)] {
        &self.defines
    }

    /// Shade one pixel from the G-buffer contents.
    pub fn run(&self, fragment: &ScreenFragment, gbuffer: &Framebuffer, u: &OcclusionUniforms<'_>) -> Vec4 {
        let (x, y) = (fragment.x, fragment.y);
        let position = gbuffer.read(POSITION_ATTACHMENT, x, y);
        if position.w == 0.0 {
            return u.background;
        }

        let color = gbuffer.read(COLOR_ATTACHMENT, x, y);
        let normal = gbuffer.read(NORMAL_ATTACHMENT, x, y);
        if normal.w == 0.0 {
            // Unlit: stored color, no occlusion
            return if u.draw_occlusion_factor {
                Vec4::ONE
            } else {
                color.truncate().extend(1.0)
            };
        }

        let p = position.truncate();
        let n = normal.truncate().normalize_or_zero();
        let occlusion = self.occlusion(fragment.uv, p, n, gbuffer, u);

        if u.draw_occlusion_factor {
            return Vec3::splat(occlusion).extend(1.0);
        }

        let lit = shade(
            self.config.shading_model,
            &u.shading,
            self.config.two_sided_lighting,
            color.truncate(),
            p,
            n,
            &u.light,
        );
        (lit * occlusion).extend(1.0)
    }

    fn occlusion(
        &self,
        uv: Vec2,
        p: Vec3,
        n: Vec3,
        gbuffer: &Framebuffer,
        u: &OcclusionUniforms<'_>,
    ) -> f32 {
        let noise = noise_at(uv, u);
        let mut tangent = noise - n * noise.dot(n);
        if tangent.length_squared() < 1e-8 {
            tangent = n.any_orthonormal_vector();
        }
        let tangent = tangent.normalize();
        let bitangent = n.cross(tangent);

        let viewport = u.viewport.as_vec2();
        let mut occluded = 0.0;
        for s in u.sampling_points.iter().take(self.config.kernel_size) {
            // Fold into the hemisphere around the normal
            let offset = tangent * s.x + bitangent * s.y + n * s.z.abs();
            let sample = p + offset;

            let Some(ndc) = u.projection.project_point(sample) else {
                continue;
            };
            let screen = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5) * viewport;
            if screen.x < 0.0 || screen.y < 0.0 || screen.x >= viewport.x || screen.y >= viewport.y {
                continue;
            }

            let stored = gbuffer.read(POSITION_ATTACHMENT, screen.x as u32, screen.y as u32);
            if stored.w == 0.0 {
                continue;
            }
            let range_check = smoothstep(0.0, 1.0, u.radius / (p.z - stored.z).abs().max(1e-6));
            if stored.z >= sample.z + u.bias {
                occluded += range_check;
            }
        }

        1.0 - occluded / self.config.kernel_size as f32
    }
}

/// Rotation vector for a pixel: the noise table tiled `noise_scale` times.
fn noise_at(uv: Vec2, u: &OcclusionUniforms<'_>) -> Vec3 {
    if u.noise.is_empty() || u.noise_size == 0 {
        return Vec3::X;
    }
    let tiled = (uv * u.noise_scale).fract() * u.noise_size as f32;
    let nx = (tiled.x as u32).min(u.noise_size - 1);
    let ny = (tiled.y as u32).min(u.noise_size - 1);
    u.noise[(ny * u.noise_size + nx) as usize % u.noise.len()]
}

/// Per-frame inputs of the combination pass that do not come from the kernel.
#[derive(Clone, Copy, Debug)]
pub struct FrameUniforms {
    pub projection: Mat4,
    pub light: ViewLight,
    pub shading: ShadingParams,
    pub background: Vec4,
    pub bias: f32,
    pub draw_occlusion_factor: bool,
}

/// G-buffer framebuffer plus the occlusion-combination program.
pub struct AoGBuffer {
    framebuffer: Option<FramebufferId>,
    program: OcclusionProgram,
    width: u32,
    height: u32,
    previous: Option<FramebufferId>,
}

impl AoGBuffer {
    /// Build the program, then allocate the targets.
    pub fn create(gpu: &mut GraphicsContext, width: u32, height: u32, config: ProgramConfig) -> GpuResult<Self> {
        let program = OcclusionProgram::build(config)?;
        let framebuffer = gpu.create_framebuffer(width, height, &FORMATS, true)?;
        log::debug!("Created AO G-buffer {}x{}", width, height);
        Ok(Self {
            framebuffer: Some(framebuffer),
            program,
            width,
            height,
            previous: None,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn config(&self) -> &ProgramConfig {
        self.program.config()
    }

    pub fn program(&self) -> &OcclusionProgram {
        &self.program
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.framebuffer
    }

    pub fn is_released(&self) -> bool {
        self.framebuffer.is_none()
    }

    fn id(&self) -> GpuResult<FramebufferId> {
        self.framebuffer.ok_or(GpuError::Released("G-buffer"))
    }

    /// Bind the G-buffer, remembering the current binding.
    pub fn bind(&mut self, gpu: &mut GraphicsContext) -> GpuResult<()> {
        let previous = gpu.bind(self.id()?)?;
        self.previous = Some(previous);
        Ok(())
    }

    /// Restore the binding that was active at `bind`.
    pub fn unbind(&mut self, gpu: &mut GraphicsContext) -> GpuResult<()> {
        if let Some(previous) = self.previous.take() {
            gpu.bind(previous)?;
        }
        Ok(())
    }

    /// Reset every target: no coverage, far depth.
    pub fn clear(&self, gpu: &mut GraphicsContext) -> GpuResult<()> {
        gpu.framebuffer_mut(self.id()?)?.clear(Vec4::ZERO, 1.0);
        Ok(())
    }

    /// Run the combination pass into the bound target.
    ///
    /// The stored depth is forwarded so the target receives the sample depth.
    pub fn draw(&self, gpu: &mut GraphicsContext, kernel: &SamplingKernel, frame: &FrameUniforms) -> GpuResult<()> {
        let id = self.id()?;
        let kernel_size = self.program.config().kernel_size;
        if kernel.len() != kernel_size {
            return Err(GpuError::UniformMismatch {
                name: "sampling_points",
                expected: kernel_size,
                found: kernel.len(),
            });
        }

        let noise_size = kernel.noise_size().max(1);
        let uniforms = OcclusionUniforms {
            sampling_points: kernel.samples(),
            kernel_size,
            noise: kernel.noise(),
            noise_size,
            noise_scale: Vec2::new(
                self.width as f32 / noise_size as f32,
                self.height as f32 / noise_size as f32,
            ),
            radius: kernel.radius(),
            bias: frame.bias,
            projection: frame.projection,
            light: frame.light,
            shading: frame.shading,
            background: frame.background,
            draw_occlusion_factor: frame.draw_occlusion_factor,
            viewport: UVec2::new(self.width, self.height),
        };

        let state = DrawState::fullscreen().with_depth_write(true);
        let program = &self.program;
        gpu.draw_fullscreen(&state, &[id], |fragment, inputs| {
            let gbuffer = inputs[0];
            let color = program.run(fragment, gbuffer, &uniforms);
            Some(FragmentOutput::color(color).with_depth(gbuffer.read_depth(fragment.x, fragment.y)))
        })
    }

    /// Free the targets. Safe to call more than once.
    pub fn release(&mut self, gpu: &mut GraphicsContext) {
        if let Some(id) = self.framebuffer.take() {
            if let Err(e) = gpu.release_framebuffer(id) {
                log::warn!("Failed to release G-buffer: {}", e);
            }
            self.previous = None;
        }
    }
}
