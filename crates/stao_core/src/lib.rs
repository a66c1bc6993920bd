//! STAO Core - renderable objects and scene storage for the stochastic
//! ambient-occlusion renderer.
//!
//! This crate provides:
//!
//! - **Geometry payloads**: `PolygonMesh`, `LineSet`, `UniformGrid`, `TetraMesh`
//! - **Scene storage**: `Scene`, a generation-counted arena addressed by `ObjectHandle`
//! - **Transfer functions**: scalar-to-RGBA maps used by the volume and line engines
//!
//! Everything here is renderer-agnostic; the renderer only reads it.
//!
//! # Example
//!
//! ```ignore
//! use stao_core::{Geometry, PolygonMesh, RenderableObject, Scene};
//!
//! let mut scene = Scene::new("demo");
//! let handle = scene.insert(RenderableObject::new("tri", Geometry::Polygon(mesh)));
//! ```

pub mod error;
pub mod light;
pub mod line;
pub mod mesh;
pub mod object;
pub mod scene;
pub mod transfer_function;
pub mod volume;

// Re-export commonly used types
pub use error::{CoreError, CoreResult};
pub use light::Light;
pub use line::{LineRadius, LineSet, LineTopology};
pub use mesh::{PolygonMesh, VertexColors};
pub use object::{Geometry, GeometryKind, RenderableObject, Transform};
pub use scene::{ObjectHandle, Scene};
pub use transfer_function::{
    ColorPoint, OpacityPoint, TransferFunction, TransferTable, DEFAULT_TABLE_SIZE,
};
pub use volume::{TetraMesh, UniformGrid};
