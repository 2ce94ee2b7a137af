//! Rendering engine core
//!
//! Material/shader/pipeline lifecycle plus the per-frame batch renderers and
//! the Renderer3D/Renderer2D facades that orchestrate them.

pub mod camera;
pub mod config;
pub mod device;
pub mod error;
pub mod material;
pub mod mesh;
pub mod model;
pub mod renderer_2d;
pub mod renderer_3d;
pub mod renderers;
pub mod shader;
pub mod vulkan;

pub use camera::Camera;
pub use config::RendererSettings;
pub use device::{DeviceContext, RenderTarget};
pub use error::{RenderError, RenderResult};
pub use material::{Material, MaterialHandle, MaterialRegistry};
pub use mesh::Mesh;
pub use model::{Model, ModelHandle, ModelRegistry};
pub use renderer_2d::Renderer2D;
pub use renderer_3d::Renderer3D;
pub use shader::{ShaderSpec, ShaderStage};
