//! Software graphics device.
//!
//! `GraphicsContext` owns every framebuffer, addressed by `FramebufferId`.
//! One framebuffer is bound at a time; draws and clears go to it. The
//! surface (`FramebufferId::SURFACE`) is the presentable window image and
//! always exists.
//!
//! Two kinds of draws are supported:
//!
//! - `draw_indexed`: clip-space triangles through a fragment closure
//! - `draw_fullscreen`: one fragment per target pixel, reading other
//!   framebuffers as inputs, run in parallel over rows

pub mod framebuffer;
pub mod raster;
pub mod texture;

use std::collections::HashMap;

use rayon::prelude::*;
use stao_math::{Vec2, Vec4};
use thiserror::Error;

pub use framebuffer::{Framebuffer, RowTarget, MAX_COLOR_ATTACHMENTS};
pub use raster::{
    BlendMode, ClipVertex, CullMode, DrawState, FragmentInput, FragmentOutput, Interpolate,
    RasterStats,
};
pub use texture::{DepthTexture, Texture, TextureFormat};

/// Errors reported by the graphics device.
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Unknown framebuffer {0:?}")]
    UnknownFramebuffer(FramebufferId),

    #[error("The surface framebuffer cannot be released")]
    SurfaceProtected,

    #[error("Framebuffer {0:?} is both the bound target and an input")]
    FeedbackLoop(FramebufferId),

    #[error("Size mismatch: expected {expected:?}, found {found:?}")]
    SizeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("Too many color attachments: {0}")]
    TooManyAttachments(usize),

    #[error("Missing color attachment {0}")]
    MissingAttachment(usize),

    #[error("{0} used after release")]
    Released(&'static str),

    #[error("Framebuffer size must be non-zero")]
    ZeroSize,

    #[error("Index {index} out of range ({count} vertices)")]
    IndexOutOfRange { index: u32, count: usize },

    #[error("Program build failed: {0}")]
    ProgramBuild(String),

    #[error("Uniform {name} has {found} entries, program expects {expected}")]
    UniformMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type GpuResult<T> = Result<T, GpuError>;

/// Handle to a framebuffer owned by a `GraphicsContext`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(u32);

impl FramebufferId {
    pub const SURFACE: FramebufferId = FramebufferId(0);
}

/// Per-pixel input of a full-screen pass.
#[derive(Clone, Copy, Debug)]
pub struct ScreenFragment {
    pub x: u32,
    pub y: u32,
    /// Normalized coordinate of the pixel center, origin top-left.
    pub uv: Vec2,
}

/// The graphics device: framebuffer storage, binding state and draw calls.
pub struct GraphicsContext {
    framebuffers: HashMap<FramebufferId, Framebuffer>,
    next_id: u32,
    bound: FramebufferId,
    draw_calls: u64,
}

impl GraphicsContext {
    /// Create a device with an 8-bit surface of the given size.
    pub fn new(width: u32, height: u32) -> GpuResult<Self> {
        let surface = Framebuffer::new(width, height, &[TextureFormat::Rgba8], true)?;
        let mut framebuffers = HashMap::new();
        framebuffers.insert(FramebufferId::SURFACE, surface);
        log::debug!("Created graphics context with {}x{} surface", width, height);
        Ok(Self {
            framebuffers,
            next_id: 1,
            bound: FramebufferId::SURFACE,
            draw_calls: 0,
        })
    }

    pub fn surface(&self) -> GpuResult<&Framebuffer> {
        self.framebuffer(FramebufferId::SURFACE)
    }

    /// Recreate the surface at a new size. Its contents are lost.
    pub fn resize_surface(&mut self, width: u32, height: u32) -> GpuResult<()> {
        let surface = Framebuffer::new(width, height, &[TextureFormat::Rgba8], true)?;
        self.framebuffers.insert(FramebufferId::SURFACE, surface);
        Ok(())
    }

    pub fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        formats: &[TextureFormat],
        depth: bool,
    ) -> GpuResult<FramebufferId> {
        let framebuffer = Framebuffer::new(width, height, formats, depth)?;
        let id = FramebufferId(self.next_id);
        self.next_id += 1;
        self.framebuffers.insert(id, framebuffer);
        Ok(id)
    }

    /// Free a framebuffer. If it was bound, the surface becomes bound.
    pub fn release_framebuffer(&mut self, id: FramebufferId) -> GpuResult<()> {
        if id == FramebufferId::SURFACE {
            return Err(GpuError::SurfaceProtected);
        }
        self.framebuffers
            .remove(&id)
            .ok_or(GpuError::UnknownFramebuffer(id))?;
        if self.bound == id {
            self.bound = FramebufferId::SURFACE;
        }
        Ok(())
    }

    pub fn framebuffer(&self, id: FramebufferId) -> GpuResult<&Framebuffer> {
        self.framebuffers
            .get(&id)
            .ok_or(GpuError::UnknownFramebuffer(id))
    }

    pub fn framebuffer_mut(&mut self, id: FramebufferId) -> GpuResult<&mut Framebuffer> {
        self.framebuffers
            .get_mut(&id)
            .ok_or(GpuError::UnknownFramebuffer(id))
    }

    pub fn contains(&self, id: FramebufferId) -> bool {
        self.framebuffers.contains_key(&id)
    }

    /// Number of live framebuffers, the surface included.
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    pub fn bound(&self) -> FramebufferId {
        self.bound
    }

    /// Bind a framebuffer and return the previously bound one.
    pub fn bind(&mut self, id: FramebufferId) -> GpuResult<FramebufferId> {
        if !self.framebuffers.contains_key(&id) {
            return Err(GpuError::UnknownFramebuffer(id));
        }
        Ok(std::mem::replace(&mut self.bound, id))
    }

    /// Clear the bound framebuffer.
    pub fn clear(&mut self, color: Vec4, depth: f32) -> GpuResult<()> {
        let bound = self.bound;
        self.framebuffer_mut(bound)?.clear(color, depth);
        Ok(())
    }

    /// Rasterize an indexed triangle list into the bound framebuffer.
    pub fn draw_indexed<V, F>(
        &mut self,
        state: &DrawState,
        vertices: &[ClipVertex<V>],
        indices: &[u32],
        shader: F,
    ) -> GpuResult<RasterStats>
    where
        V: Interpolate,
        F: FnMut(&FragmentInput<V>) -> Option<FragmentOutput>,
    {
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(GpuError::IndexOutOfRange {
                index,
                count: vertices.len(),
            });
        }
        let bound = self.bound;
        let target = self
            .framebuffers
            .get_mut(&bound)
            .ok_or(GpuError::UnknownFramebuffer(bound))?;
        self.draw_calls += 1;
        Ok(raster::rasterize(target, state, vertices, indices, shader))
    }

    /// Run a full-screen pass over the bound framebuffer.
    ///
    /// Every input must match the target size and must not be the target.
    /// The shader returns `None` to leave a pixel untouched.
    pub fn draw_fullscreen<F>(
        &mut self,
        state: &DrawState,
        inputs: &[FramebufferId],
        shader: F,
    ) -> GpuResult<()>
    where
        F: Fn(&ScreenFragment, &[&Framebuffer]) -> Option<FragmentOutput> + Sync,
    {
        let bound = self.bound;
        if inputs.contains(&bound) {
            return Err(GpuError::FeedbackLoop(bound));
        }
        let expected = self.framebuffer(bound)?.size();
        for &id in inputs {
            let found = self.framebuffer(id)?.size();
            if found != expected {
                return Err(GpuError::SizeMismatch { expected, found });
            }
        }

        let mut target = self
            .framebuffers
            .remove(&bound)
            .ok_or(GpuError::UnknownFramebuffer(bound))?;
        {
            let sources: Vec<&Framebuffer> = inputs
                .iter()
                .filter_map(|id| self.framebuffers.get(id))
                .collect();
            let (width, height) = target.size();
            let inv = Vec2::new(1.0 / width as f32, 1.0 / height as f32);

            target.rows_mut().into_par_iter().for_each(|mut row| {
                let y = row.y;
                for x in 0..width {
                    let fragment = ScreenFragment {
                        x,
                        y,
                        uv: Vec2::new(x as f32 + 0.5, y as f32 + 0.5) * inv,
                    };
                    let Some(output) = shader(&fragment, &sources) else {
                        continue;
                    };
                    let xi = x as usize;
                    if let Some(depth) = output.depth {
                        if state.depth_test && row.depth(xi).is_some_and(|d| depth >= d) {
                            continue;
                        }
                        if state.depth_write {
                            row.set_depth(xi, depth);
                        }
                    }
                    for (index, value) in output.colors.iter().enumerate().take(row.attachment_count()) {
                        let dst = row.read(index, xi);
                        row.write(index, xi, state.blend.apply(*value, dst));
                    }
                }
            });
        }
        self.framebuffers.insert(bound, target);
        self.draw_calls += 1;
        Ok(())
    }
}
