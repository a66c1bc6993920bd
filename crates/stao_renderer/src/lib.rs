//! Stochastic ambient-occlusion compositor.
//!
//! Renders scene objects through per-geometry engines into an
//! ambient-occlusion G-buffer, many times per frame with different random
//! offsets, and averages the occluded results into one image. The number of
//! repetitions adapts to camera motion, and static views keep refining.
//!
//! Drawing happens on a software graphics device (`gpu`), so every stage
//! runs headless and can be inspected pixel by pixel.

pub mod compositor;
pub mod engine;
pub mod ensemble;
pub mod gbuffer;
pub mod gpu;
pub mod kernel;
pub mod random;
pub mod shading;

pub use compositor::{
    Compositor, CompositorError, CompositorResult, CompositorSettings, CompositorState,
    CompositorStats, FrameReport, RegistrationId,
};
pub use engine::{
    create_engine, EngineError, EngineParams, PolygonEngine, RenderContext, RendererEngine,
    TetrahedraEngine, TubeEngine, UniformGridEngine,
};
pub use ensemble::EnsembleBuffer;
pub use gbuffer::{AoGBuffer, FrameUniforms, ProgramConfig};
pub use gpu::{FramebufferId, GpuError, GraphicsContext};
pub use kernel::{generate_kernel, generate_noise, KernelError, SamplingKernel};
pub use random::{RandomTexture, Xorshift128};
pub use shading::{ShadingModel, ShadingParams};
