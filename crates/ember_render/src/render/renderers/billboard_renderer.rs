//! Camera-facing billboard batching
//!
//! Billboards are unit quads expanded in the vertex shader along the camera
//! right/up vectors taken from the global uniform; the CPU side only supplies
//! world position, size, and tint per instance. One batch, one instanced
//! draw per frame.

use crate::foundation::bounded::BoundedVec;
use crate::foundation::hash::{uniform_id, UniformId};
use crate::foundation::math::{Vec2, Vec3, Vec4};
use crate::render::device::{DeviceContext, RenderTarget};
use crate::render::material::Material;
use crate::render::mesh::Mesh;
use crate::render::renderers::{frame_slot, FlushGate, RenderStep, MAX_BILLBOARDS};
use crate::render::shader::{AttributeFormat, ShaderSpec};
use crate::render::vulkan::{Buffer, PipelineConfig};
use crate::render::{RenderError, RenderResult};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::path::Path;

/// Per-billboard instance data.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BillboardInstance {
    /// World position in xyz, w unused
    pub position: [f32; 4],
    /// Quad size in xy, zw unused
    pub size: [f32; 4],
    /// RGBA tint
    pub color: [f32; 4],
}

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

struct BillboardGpu {
    material: Material,
    mesh: Mesh,
    instance_buffers: Vec<Buffer>,
}

/// Single-batch instanced billboard renderer.
pub struct BillboardRenderer {
    billboards: BoundedVec<BillboardInstance, MAX_BILLBOARDS>,
    global_id: UniformId,
    gate: FlushGate,
    gpu: Option<BillboardGpu>,
}

impl BillboardRenderer {
    /// Create an empty renderer.
    pub fn new() -> Self {
        Self {
            billboards: BoundedVec::new(),
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
            shader_dir.join("billboard.vert.spv").to_string_lossy().into_owned(),
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
            shader_dir.join("billboard.frag.spv").to_string_lossy().into_owned(),
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

        let buffer_size = MAX_BILLBOARDS as u64 * u64::from(INSTANCE_STRIDE);
        let mut instance_buffers = Vec::with_capacity(target.frames_in_flight);
        for _ in 0..target.frames_in_flight {
            instance_buffers.push(Buffer::host_visible(
                ctx,
                buffer_size,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?);
        }
        log::debug!(
            "BillboardRenderer initialised: {} byte instance buffer x{}",
            buffer_size,
            target.frames_in_flight
        );

        self.gpu = Some(BillboardGpu {
            material,
            mesh,
            instance_buffers,
        });
        Ok(())
    }

    /// Queue one billboard for this frame.
    pub fn draw_billboard(&mut self, position: Vec3, size: Vec2, color: Vec4) -> RenderResult<()> {
        self.billboards
            .push(BillboardInstance {
                position: [position.x, position.y, position.z, 0.0],
                size: [size.x, size.y, 0.0, 0.0],
                color: color.into(),
            })
            .map_err(|e| RenderError::capacity("billboards", e))
    }

    /// Billboards accumulated this frame.
    pub fn billboard_count(&self) -> usize {
        self.billboards.len()
    }

    /// The exact command sequence `render` will submit.
    pub fn plan(&self) -> Vec<RenderStep> {
        if self.billboards.is_empty() {
            return Vec::new();
        }
        vec![
            RenderStep::WriteGlobalData,
            RenderStep::BindOwnedMaterial,
            RenderStep::UploadVertexData {
                offset: 0,
                count: self.billboards.len() as u32,
            },
            RenderStep::DrawIndexed {
                index_count: QUAD_INDEX_COUNT,
                instance_count: self.billboards.len() as u32,
                first_instance: 0,
            },
        ]
    }

    /// Record this frame's billboard draw.
    pub fn render(
        &mut self,
        ctx: &DeviceContext,
        cmd: vk::CommandBuffer,
        frame_index: usize,
        global_data: &[u8],
    ) -> RenderResult<()> {
        self.gate.begin_render()?;
        if self.billboards.is_empty() {
            return Ok(());
        }
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotBuilt)?;
        log::trace!("BillboardRenderer: {} billboards", self.billboards.len());

        gpu.material.set_uniform_data(self.global_id, global_data)?;
        gpu.material.bind(ctx, cmd)?;

        let instance_buffer = frame_slot(&gpu.instance_buffers, frame_index)?;
        instance_buffer.write_region(0, bytemuck::cast_slice(self.billboards.as_slice()))?;
        gpu.mesh.bind(ctx, cmd, frame_index);
        unsafe {
            ctx.device()
                .cmd_bind_vertex_buffers(cmd, 1, &[instance_buffer.handle()], &[0]);
            ctx.device().cmd_draw_indexed(
                cmd,
                QUAD_INDEX_COUNT,
                self.billboards.len() as u32,
                0,
                0,
                0,
            );
        }
        Ok(())
    }

    /// Clear the accumulator for the next frame.
    pub fn flush(&mut self) {
        self.billboards.clear();
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

impl Default for BillboardRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn billboard(renderer: &mut BillboardRenderer) -> RenderResult<()> {
        renderer.draw_billboard(
            Vec3::new(1.0, 2.0, 3.0),
            Vec2::new(0.5, 0.5),
            Vec4::new(1.0, 1.0, 1.0, 1.0),
        )
    }

    #[test]
    fn all_billboards_collapse_to_one_draw() {
        let mut renderer = BillboardRenderer::new();
        for _ in 0..7 {
            billboard(&mut renderer).unwrap();
        }
        let plan = renderer.plan();
        assert_eq!(
            plan.last(),
            Some(&RenderStep::DrawIndexed {
                index_count: 6,
                instance_count: 7,
                first_instance: 0
            })
        );
    }

    #[test]
    fn overflow_fails_closed() {
        let mut renderer = BillboardRenderer::new();
        for _ in 0..MAX_BILLBOARDS {
            billboard(&mut renderer).unwrap();
        }
        assert!(billboard(&mut renderer).is_err());
        assert_eq!(renderer.billboard_count(), MAX_BILLBOARDS);
    }

    #[test]
    fn flush_empties_the_plan() {
        let mut renderer = BillboardRenderer::new();
        billboard(&mut renderer).unwrap();
        renderer.flush();
        assert!(renderer.plan().is_empty());
    }
}
