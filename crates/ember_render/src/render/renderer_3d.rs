//! 3D scene facade
//!
//! Owns one instance of each 3D batch renderer plus the shared global
//! uniform. Per frame the facade fills the global struct from the camera and
//! the primary light once, then renders in a fixed order: models, lights,
//! debug lines, billboards, quads. The order is a correctness requirement
//! for blended primitives, not a preference.

use crate::render::camera::Camera;
use crate::render::device::{DeviceContext, RenderTarget};
use crate::render::material::MaterialRegistry;
use crate::render::model::ModelRegistry;
use crate::render::renderers::{
    BillboardRenderer, DebugRenderer3D, LightRenderer, ModelRenderer, PointLightData,
    QuadRenderer3D,
};
use crate::render::RenderResult;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::path::Path;

/// Shared uniform name every 3D material binds.
pub const GLOBAL_DATA_NAME: &str = "globalData";

/// Storage property name model materials bind for per-object transforms.
pub const OBJECT_DATA_NAME: &str = "objectData";

/// Per-frame camera and light data, written once and shared by every 3D
/// renderer under [`GLOBAL_DATA_NAME`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlobalData3D {
    /// Column-major projection matrix
    pub projection: [[f32; 4]; 4],
    /// Column-major view matrix
    pub view: [[f32; 4]; 4],
    /// Camera world position in xyz
    pub camera_position: [f32; 4],
    /// Primary point light
    pub light: PointLightData,
}

/// Facade orchestrating the 3D batch renderers.
pub struct Renderer3D {
    /// Registry-backed model instancing
    pub models: ModelRenderer,
    /// Point lights and emitter billboards
    pub lights: LightRenderer,
    /// Immediate-mode debug lines
    pub debug: DebugRenderer3D,
    /// Camera-facing billboards
    pub billboards: BillboardRenderer,
    /// World-space quads
    pub quads: QuadRenderer3D,
}

impl Renderer3D {
    /// Create the facade; accumulation works immediately, GPU state comes
    /// with [`Renderer3D::initialise`].
    pub fn new() -> Self {
        Self {
            models: ModelRenderer::new(),
            lights: LightRenderer::new(),
            debug: DebugRenderer3D::new(),
            billboards: BillboardRenderer::new(),
            quads: QuadRenderer3D::new(),
        }
    }

    /// Initialise every owned renderer with the shared global uniform
    /// contract.
    pub fn initialise(
        &mut self,
        ctx: &DeviceContext,
        target: &RenderTarget,
        shader_dir: &Path,
    ) -> RenderResult<()> {
        let global_size = std::mem::size_of::<GlobalData3D>() as u64;
        log::debug!(
            "Renderer3D initialise: global uniform {global_size} bytes, {} frames in flight",
            target.frames_in_flight
        );

        self.models.initialise(GLOBAL_DATA_NAME, OBJECT_DATA_NAME);
        self.lights
            .initialise(ctx, target, shader_dir, GLOBAL_DATA_NAME, global_size)?;
        self.debug
            .initialise(ctx, target, shader_dir, GLOBAL_DATA_NAME, global_size)?;
        self.billboards
            .initialise(ctx, target, shader_dir, GLOBAL_DATA_NAME, global_size)?;
        self.quads
            .initialise(ctx, target, shader_dir, GLOBAL_DATA_NAME, global_size)?;
        Ok(())
    }

    /// Fill the global uniform once, then render every owned renderer in
    /// the fixed order models → lights → debug → billboards → quads.
    pub fn render(
        &mut self,
        ctx: &DeviceContext,
        cmd: vk::CommandBuffer,
        frame_index: usize,
        materials: &MaterialRegistry,
        model_registry: &ModelRegistry,
        camera: &Camera,
    ) -> RenderResult<()> {
        let global = GlobalData3D {
            projection: camera.projection().into(),
            view: camera.view().into(),
            camera_position: [
                camera.position.x,
                camera.position.y,
                camera.position.z,
                1.0,
            ],
            light: self.lights.primary_light(),
        };
        let global_bytes = bytemuck::bytes_of(&global);

        self.models.render(
            ctx,
            cmd,
            frame_index,
            materials,
            model_registry,
            global_bytes,
        )?;
        self.lights.render(ctx, cmd, frame_index, global_bytes)?;
        self.debug.render(ctx, cmd, frame_index, global_bytes)?;
        self.billboards.render(ctx, cmd, frame_index, global_bytes)?;
        self.quads.render(ctx, cmd, frame_index, global_bytes)?;
        Ok(())
    }

    /// Clear every accumulator for the next frame, in render order.
    pub fn flush(&mut self) {
        self.models.flush();
        self.lights.flush();
        self.debug.flush();
        self.billboards.flush();
        self.quads.flush();
    }

    /// Rebuild every owned material's pipeline after swapchain invalidation.
    ///
    /// Registry materials belong to the application and are recreated via
    /// [`MaterialRegistry::recreate_pipelines`].
    pub fn recreate_materials(
        &mut self,
        ctx: &DeviceContext,
        target: &RenderTarget,
    ) -> RenderResult<()> {
        self.lights.recreate_materials(ctx, target)?;
        self.debug.recreate_materials(ctx, target)?;
        self.billboards.recreate_materials(ctx, target)?;
        self.quads.recreate_materials(ctx, target)?;
        Ok(())
    }

    /// Release all owned GPU state, in render order.
    pub fn destroy(&mut self) {
        self.lights.destroy();
        self.debug.destroy();
        self.billboards.destroy();
        self.quads.destroy();
    }
}

impl Default for Renderer3D {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec2, Vec3, Vec4};

    #[test]
    fn global_data_layout_is_tightly_packed() {
        // 2 mat4 + camera position + one point light, no implicit padding.
        assert_eq!(std::mem::size_of::<GlobalData3D>(), 64 + 64 + 16 + 32);
    }

    #[test]
    fn flush_resets_every_owned_renderer() {
        let mut renderer = Renderer3D::new();
        renderer
            .lights
            .add_point_light(Vec3::zeros(), Vec4::new(1.0, 1.0, 1.0, 1.0))
            .unwrap();
        renderer
            .debug
            .draw_line(Vec3::zeros(), Vec3::x(), Vec4::new(1.0, 0.0, 0.0, 1.0))
            .unwrap();
        renderer
            .billboards
            .draw_billboard(Vec3::zeros(), Vec2::new(1.0, 1.0), Vec4::new(1.0, 1.0, 1.0, 1.0))
            .unwrap();

        renderer.flush();
        assert_eq!(renderer.lights.light_count(), 0);
        assert_eq!(renderer.debug.line_count(), 0);
        assert_eq!(renderer.billboards.billboard_count(), 0);
        assert!(renderer.quads.plan().is_empty());
        assert!(renderer.models.plan().is_empty());
    }
}
