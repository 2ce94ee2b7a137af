//! 2D scene facade
//!
//! Thin orchestration over the layer-batched quad renderer: fills the 2D
//! global uniform from an orthographic camera once per frame, then renders
//! and flushes.

use crate::render::camera::Camera;
use crate::render::device::{DeviceContext, RenderTarget};
use crate::render::renderer_3d::GLOBAL_DATA_NAME;
use crate::render::renderers::QuadRenderer2D;
use crate::render::RenderResult;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::path::Path;

/// Per-frame camera data shared by the 2D renderers.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlobalData2D {
    /// Column-major projection matrix
    pub projection: [[f32; 4]; 4],
    /// Column-major view matrix
    pub view: [[f32; 4]; 4],
}

/// Facade orchestrating the 2D batch renderers.
pub struct Renderer2D {
    /// Layer/texture-batched quads
    pub quads: QuadRenderer2D,
}

impl Renderer2D {
    /// Create the facade.
    pub fn new() -> Self {
        Self {
            quads: QuadRenderer2D::new(),
        }
    }

    /// Initialise the owned quad renderer with the shared global uniform
    /// contract.
    pub fn initialise(
        &mut self,
        ctx: &DeviceContext,
        target: &RenderTarget,
        shader_dir: &Path,
    ) -> RenderResult<()> {
        let global_size = std::mem::size_of::<GlobalData2D>() as u64;
        self.quads
            .initialise(ctx, target, shader_dir, GLOBAL_DATA_NAME, global_size)
    }

    /// Fill the global uniform once, then render the quad batches.
    pub fn render(
        &mut self,
        ctx: &DeviceContext,
        cmd: vk::CommandBuffer,
        frame_index: usize,
        camera: &Camera,
    ) -> RenderResult<()> {
        let global = GlobalData2D {
            projection: camera.projection().into(),
            view: camera.view().into(),
        };
        self.quads
            .render(ctx, cmd, frame_index, bytemuck::bytes_of(&global))
    }

    /// Clear every accumulator for the next frame.
    pub fn flush(&mut self) {
        self.quads.flush();
    }

    /// Rebuild every owned material's pipeline after swapchain invalidation.
    pub fn recreate_materials(
        &mut self,
        ctx: &DeviceContext,
        target: &RenderTarget,
    ) -> RenderResult<()> {
        self.quads.recreate_materials(ctx, target)
    }

    /// Release all owned GPU state.
    pub fn destroy(&mut self) {
        self.quads.destroy();
    }
}

impl Default for Renderer2D {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec2, Vec4};

    #[test]
    fn global_data_layout_is_two_matrices() {
        assert_eq!(std::mem::size_of::<GlobalData2D>(), 128);
    }

    #[test]
    fn flush_resets_the_quad_batches() {
        let mut renderer = Renderer2D::new();
        renderer
            .quads
            .draw_quad(
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 1.0),
                0.0,
                0,
                0,
                Vec4::new(1.0, 1.0, 1.0, 1.0),
            )
            .unwrap();
        renderer.flush();
        assert!(renderer.quads.plan().is_empty());
    }
}
