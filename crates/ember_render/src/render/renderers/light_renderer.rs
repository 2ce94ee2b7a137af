//! Point light accumulation and emitter visualization
//!
//! Lights accumulate per frame like every other batch. The first light feeds
//! the shared global uniform (the scene's primary light); every light is
//! also drawn as a small camera-facing billboard so emitters are visible in
//! the scene.

use crate::foundation::bounded::BoundedVec;
use crate::foundation::hash::{uniform_id, UniformId};
use crate::foundation::math::{Vec3, Vec4};
use crate::render::device::{DeviceContext, RenderTarget};
use crate::render::material::Material;
use crate::render::mesh::Mesh;
use crate::render::renderers::billboard_renderer::BillboardInstance;
use crate::render::renderers::{frame_slot, FlushGate, RenderStep, MAX_POINT_LIGHTS};
use crate::render::shader::{AttributeFormat, ShaderSpec};
use crate::render::vulkan::{Buffer, PipelineConfig};
use crate::render::{RenderError, RenderResult};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::path::Path;

/// Point light parameters as they appear inside the global uniform.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLightData {
    /// World position in xyz, w unused
    pub position: [f32; 4],
    /// Light color in rgb, intensity in a
    pub color: [f32; 4],
}

/// Billboard size used to visualize light emitters.
const LIGHT_BILLBOARD_SIZE: f32 = 0.25;

const INSTANCE_STRIDE: u32 = std::mem::size_of::<BillboardInstance>() as u32;
const QUAD_VERTEX_STRIDE: u32 = 16;
const QUAD_INDEX_COUNT: u32 = 6;

const QUAD_VERTICES: [f32; 16] = [
    -0.5, -0.5, 0.0, 0.0, //
    0.5, -0.5, 1.0, 0.0, //
    0.5, 0.5, 1.0, 1.0, //
    -0.5, 0.5, 0.0, 1.0, //
];
const QUAD_INDICES: [u32; 6] = [0, 1, 3, 1, 2, 3];

struct LightGpu {
    material: Material,
    mesh: Mesh,
    instance_buffers: Vec<Buffer>,
}

/// Per-frame point light collector with emitter billboards.
pub struct LightRenderer {
    lights: BoundedVec<PointLightData, MAX_POINT_LIGHTS>,
    global_id: UniformId,
    gate: FlushGate,
    gpu: Option<LightGpu>,
}

impl LightRenderer {
    /// Create an empty renderer.
    pub fn new() -> Self {
        Self {
            lights: BoundedVec::new(),
            global_id: uniform_id("globalData"),
            gate: FlushGate::default(),
            gpu: None,
        }
    }

    /// Build the owned material, unit quad mesh, and per-frame instance
    /// buffers.
    pub fn initialise(
        &mut self,
        ctx: &DeviceContext,
        target: &RenderTarget,
        shader_dir: &Path,
        global_name: &str,
        global_size: u64,
    ) -> RenderResult<()> {
        self.global_id = uniform_id(global_name);

        let vertex = ShaderSpec::vertex(
            shader_dir.join("light.vert.spv").to_string_lossy().into_owned(),
        )
        .with_alignment(ctx.min_uniform_alignment())
        .with_uniform(0, global_name, global_size, 1)
        .with_vertex_type(QUAD_VERTEX_STRIDE)
        .with_vertex_attribute(0, AttributeFormat::Vec2)
        .with_vertex_attribute(8, AttributeFormat::Vec2)
        .with_instance_type(INSTANCE_STRIDE)
        .with_vertex_attribute(0, AttributeFormat::Vec4)
        .with_vertex_attribute(16, AttributeFormat::Vec4)
        .with_vertex_attribute(32, AttributeFormat::Vec4)
        .build()?;

        let fragment = ShaderSpec::fragment(
            shader_dir.join("light.frag.spv").to_string_lossy().into_owned(),
        )
        .build()?;

        let mut material = Material::with_shaders(vertex, fragment);
        material.set_pipeline_config(PipelineConfig {
            blend_enabled: true,
            ..PipelineConfig::default()
        });
        material.build(ctx, target)?;

        let mesh = Mesh::with_static_data(
            ctx,
            QUAD_VERTEX_STRIDE,
            bytemuck::cast_slice(&QUAD_VERTICES),
            &QUAD_INDICES,
        )?;

        let buffer_size = MAX_POINT_LIGHTS as u64 * u64::from(INSTANCE_STRIDE);
        let mut instance_buffers = Vec::with_capacity(target.frames_in_flight);
        for _ in 0..target.frames_in_flight {
            instance_buffers.push(Buffer::host_visible(
                ctx,
                buffer_size,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?);
        }

        self.gpu = Some(LightGpu {
            material,
            mesh,
            instance_buffers,
        });
        Ok(())
    }

    /// Queue one point light for this frame.
    pub fn add_point_light(&mut self, position: Vec3, color: Vec4) -> RenderResult<()> {
        self.lights
            .push(PointLightData {
                position: [position.x, position.y, position.z, 0.0],
                color: color.into(),
            })
            .map_err(|e| RenderError::capacity("point lights", e))
    }

    /// Lights accumulated this frame.
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// The scene's primary light: the first one added this frame, or an
    /// all-zero light when none were.
    pub fn primary_light(&self) -> PointLightData {
        self.lights.get(0).copied().unwrap_or(PointLightData {
            position: [0.0; 4],
            color: [0.0; 4],
        })
    }

    /// The exact command sequence `render` will submit.
    pub fn plan(&self) -> Vec<RenderStep> {
        if self.lights.is_empty() {
            return Vec::new();
        }
        vec![
            RenderStep::WriteGlobalData,
            RenderStep::BindOwnedMaterial,
            RenderStep::UploadVertexData {
                offset: 0,
                count: self.lights.len() as u32,
            },
            RenderStep::DrawIndexed {
                index_count: QUAD_INDEX_COUNT,
                instance_count: self.lights.len() as u32,
                first_instance: 0,
            },
        ]
    }

    /// Record this frame's emitter billboards.
    pub fn render(
        &mut self,
        ctx: &DeviceContext,
        cmd: vk::CommandBuffer,
        frame_index: usize,
        global_data: &[u8],
    ) -> RenderResult<()> {
        self.gate.begin_render()?;
        if self.lights.is_empty() {
            return Ok(());
        }
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotBuilt)?;
        log::trace!("LightRenderer: {} lights", self.lights.len());

        let instances: Vec<BillboardInstance> = self
            .lights
            .iter()
            .map(|light| BillboardInstance {
                position: light.position,
                size: [LIGHT_BILLBOARD_SIZE, LIGHT_BILLBOARD_SIZE, 0.0, 0.0],
                color: light.color,
            })
            .collect();

        gpu.material.set_uniform_data(self.global_id, global_data)?;
        gpu.material.bind(ctx, cmd)?;

        let instance_buffer = frame_slot(&gpu.instance_buffers, frame_index)?;
        instance_buffer.write_region(0, bytemuck::cast_slice(&instances))?;
        gpu.mesh.bind(ctx, cmd, frame_index);
        unsafe {
            ctx.device()
                .cmd_bind_vertex_buffers(cmd, 1, &[instance_buffer.handle()], &[0]);
            ctx.device()
                .cmd_draw_indexed(cmd, QUAD_INDEX_COUNT, instances.len() as u32, 0, 0, 0);
        }
        Ok(())
    }

    /// Clear the accumulator for the next frame.
    pub fn flush(&mut self) {
        self.lights.clear();
        self.gate.flush();
    }

    /// Rebuild the owned material's pipeline after swapchain invalidation.
    pub fn recreate_materials(
        &mut self,
        ctx: &DeviceContext,
        target: &RenderTarget,
    ) -> RenderResult<()> {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.material.recreate_pipeline(ctx, target)?;
        }
        Ok(())
    }

    /// Release all GPU state. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.gpu = None;
    }
}

impl Default for LightRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_light_is_primary() {
        let mut renderer = LightRenderer::new();
        renderer
            .add_point_light(Vec3::new(1.0, 2.0, 3.0), Vec4::new(1.0, 0.5, 0.0, 2.0))
            .unwrap();
        renderer
            .add_point_light(Vec3::zeros(), Vec4::new(0.0, 0.0, 1.0, 1.0))
            .unwrap();

        let primary = renderer.primary_light();
        assert_eq!(primary.position, [1.0, 2.0, 3.0, 0.0]);
        assert_eq!(primary.color, [1.0, 0.5, 0.0, 2.0]);
    }

    #[test]
    fn no_lights_yields_zero_primary_and_empty_plan() {
        let renderer = LightRenderer::new();
        assert_eq!(renderer.primary_light().color, [0.0; 4]);
        assert!(renderer.plan().is_empty());
    }

    #[test]
    fn overflow_fails_closed() {
        let mut renderer = LightRenderer::new();
        for _ in 0..MAX_POINT_LIGHTS {
            renderer
                .add_point_light(Vec3::zeros(), Vec4::new(1.0, 1.0, 1.0, 1.0))
                .unwrap();
        }
        assert!(renderer
            .add_point_light(Vec3::zeros(), Vec4::new(1.0, 1.0, 1.0, 1.0))
            .is_err());
        assert_eq!(renderer.light_count(), MAX_POINT_LIGHTS);
    }

    #[test]
    fn lights_draw_as_one_instanced_batch() {
        let mut renderer = LightRenderer::new();
        for _ in 0..3 {
            renderer
                .add_point_light(Vec3::zeros(), Vec4::new(1.0, 1.0, 1.0, 1.0))
                .unwrap();
        }
        assert_eq!(
            renderer.plan().last(),
            Some(&RenderStep::DrawIndexed {
                index_count: 6,
                instance_count: 3,
                first_instance: 0
            })
        );
    }
}
