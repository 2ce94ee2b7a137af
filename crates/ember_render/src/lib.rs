//! # Ember Render
//!
//! A batched Vulkan rendering engine core written in Rust.
//!
//! ## Features
//!
//! - **Declarative Shaders**: Describe uniforms and vertex layouts with a
//!   builder, and let [`render::Material`] derive descriptor layouts, a
//!   packed uniform buffer, and the graphics pipeline from them
//! - **Batched Submission**: Per-frame batch renderers for models, 2D/3D
//!   quads, billboards, point lights, and debug lines that minimize
//!   pipeline and descriptor-set rebinds
//! - **Frames In Flight**: Every mutable per-frame resource is replicated
//!   per frame index so command recording never races the GPU
//! - **Explicit Errors**: Resource-creation and capacity failures surface as
//!   [`render::RenderError`] values rather than process aborts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ember_render::prelude::*;
//! use std::path::Path;
//!
//! # fn run(ctx: &DeviceContext, target: &RenderTarget,
//! #        cmd: ash::vk::CommandBuffer) -> RenderResult<()> {
//! let materials = MaterialRegistry::new();
//! let models = ModelRegistry::new();
//! let mut renderer = Renderer3D::new();
//! renderer.initialise(ctx, target, Path::new("shaders"))?;
//!
//! let camera = Camera::perspective(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
//!
//! // Per frame:
//! renderer.debug.draw_line(
//!     Vec3::new(0.0, 0.0, 0.0),
//!     Vec3::new(0.0, 1.0, 0.0),
//!     Vec4::new(1.0, 0.0, 0.0, 1.0),
//! )?;
//! renderer.render(ctx, cmd, 0, &materials, &models, &camera)?;
//! renderer.flush();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::foundation::{
        bounded::BoundedVec,
        hash::{uniform_id, UniformId},
        math::{Mat3, Mat4, Vec2, Vec3, Vec4},
    };
    pub use crate::render::{
        camera::Camera,
        config::RendererSettings,
        device::{DeviceContext, RenderTarget},
        material::{Material, MaterialHandle, MaterialRegistry},
        mesh::Mesh,
        model::{Model, ModelHandle, ModelRegistry},
        renderer_2d::Renderer2D,
        renderer_3d::Renderer3D,
        shader::{ShaderSpec, ShaderStage},
        RenderError, RenderResult,
    };
}
