//! World-space quad batching
//!
//! The 3D counterpart of the 2D quad renderer: one batch per texture slot,
//! no layer ordering (depth testing resolves visibility), full Euler
//! transforms per instance.

use crate::foundation::bounded::BoundedVec;
use crate::foundation::hash::{uniform_id, UniformId};
use crate::foundation::math::{compose_transform, Vec2, Vec3, Vec4};
use crate::render::device::{DeviceContext, RenderTarget};
use crate::render::material::Material;
use crate::render::mesh::Mesh;
use crate::render::renderers::quad_renderer_2d::QuadInstance;
use crate::render::renderers::{
    frame_slot, FlushGate, RenderStep, MAX_QUADS_PER_BATCH, MAX_TEXTURE_SLOTS,
};
use crate::render::shader::{AttributeFormat, ShaderSpec, StageFlags};
use crate::render::vulkan::{Buffer, PipelineConfig};
use crate::render::{RenderError, RenderResult};
use ash::vk;
use std::path::Path;

const INSTANCE_STRIDE: u32 = std::mem::size_of::<QuadInstance>() as u32;
const QUAD_VERTEX_STRIDE: u32 = 16;
const QUAD_INDEX_COUNT: u32 = 6;

const QUAD_VERTICES: [f32; 16] = [
    -0.5, -0.5, 0.0, 0.0, //
    0.5, -0.5, 1.0, 0.0, //
    0.5, 0.5, 1.0, 1.0, //
    -0.5, 0.5, 0.0, 1.0, //
];
const QUAD_INDICES: [u32; 6] = [0, 1, 3, 1, 2, 3];

struct QuadGpu {
    material: Material,
    mesh: Mesh,
    instance_buffers: Vec<Buffer>,
}

/// Texture-batched instanced quad renderer in world space.
pub struct QuadRenderer3D {
    batches: Vec<BoundedVec<QuadInstance, MAX_QUADS_PER_BATCH>>,
    global_id: UniformId,
    gate: FlushGate,
    gpu: Option<QuadGpu>,
}

impl QuadRenderer3D {
    /// Create an empty renderer.
    pub fn new() -> Self {
        Self {
            batches: (0..MAX_TEXTURE_SLOTS).map(|_| BoundedVec::new()).collect(),
            global_id: uniform_id("globalData"),
            gate: FlushGate::default(),
            gpu: None,
        }
    }

    fn batch_offset(texture: usize) -> u64 {
        (texture * MAX_QUADS_PER_BATCH) as u64 * u64::from(INSTANCE_STRIDE)
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
            shader_dir.join("quad_3d.vert.spv").to_string_lossy().into_owned(),
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
        .with_vertex_attribute(48, AttributeFormat::Vec4)
        .with_vertex_attribute(64, AttributeFormat::Vec4)
        .build()?;

        let fragment = ShaderSpec::fragment(
            shader_dir.join("quad_3d.frag.spv").to_string_lossy().into_owned(),
        )
        .build()?;

        let mut material = Material::with_shaders(vertex, fragment);
        material.set_push_constant(StageFlags::FRAGMENT, std::mem::size_of::<u32>() as u32);
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

        let buffer_size =
            (MAX_TEXTURE_SLOTS * MAX_QUADS_PER_BATCH) as u64 * u64::from(INSTANCE_STRIDE);
        let mut instance_buffers = Vec::with_capacity(target.frames_in_flight);
        for _ in 0..target.frames_in_flight {
            instance_buffers.push(Buffer::host_visible(
                ctx,
                buffer_size,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?);
        }
        log::debug!(
            "QuadRenderer3D initialised: {} texture batches, {} byte instance buffer x{}",
            MAX_TEXTURE_SLOTS,
            buffer_size,
            target.frames_in_flight
        );

        self.gpu = Some(QuadGpu {
            material,
            mesh,
            instance_buffers,
        });
        Ok(())
    }

    /// Queue one world-space quad for this frame.
    pub fn draw_quad(
        &mut self,
        position: Vec3,
        rotation: Vec3,
        scale: Vec2,
        texture: usize,
        color: Vec4,
    ) -> RenderResult<()> {
        if texture >= MAX_TEXTURE_SLOTS {
            return Err(RenderError::CapacityExceeded {
                what: "texture slots",
                max: MAX_TEXTURE_SLOTS,
            });
        }
        let instance = QuadInstance {
            transform: compose_transform(position, rotation, Vec3::new(scale.x, scale.y, 1.0))
                .into(),
            color: color.into(),
        };
        self.batches[texture]
            .push(instance)
            .map_err(|e| RenderError::capacity("quads per batch", e))
    }

    /// Total quads accumulated this frame.
    pub fn quad_count(&self) -> usize {
        self.batches.iter().map(BoundedVec::len).sum()
    }

    /// The exact command sequence `render` will submit.
    pub fn plan(&self) -> Vec<RenderStep> {
        if self.quad_count() == 0 {
            return Vec::new();
        }
        let mut steps = vec![RenderStep::WriteGlobalData];
        for (texture, batch) in self.batches.iter().enumerate() {
            if batch.is_empty() {
                continue;
            }
            steps.push(RenderStep::PushTextureIndex(texture as u32));
            steps.push(RenderStep::BindOwnedMaterial);
            steps.push(RenderStep::UploadVertexData {
                offset: Self::batch_offset(texture),
                count: batch.len() as u32,
            });
            steps.push(RenderStep::DrawIndexed {
                index_count: QUAD_INDEX_COUNT,
                instance_count: batch.len() as u32,
                first_instance: 0,
            });
        }
        steps
    }

    /// Record this frame's quad draws.
    pub fn render(
        &mut self,
        ctx: &DeviceContext,
        cmd: vk::CommandBuffer,
        frame_index: usize,
        global_data: &[u8],
    ) -> RenderResult<()> {
        self.gate.begin_render()?;
        if self.quad_count() == 0 {
            return Ok(());
        }
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotBuilt)?;
        log::trace!("QuadRenderer3D: {} quads", self.quad_count());

        gpu.material.set_uniform_data(self.global_id, global_data)?;
        let instance_buffer = frame_slot(&gpu.instance_buffers, frame_index)?;
        let layout = gpu.material.pipeline_layout()?;

        for (texture, batch) in self.batches.iter().enumerate() {
            if batch.is_empty() {
                continue;
            }
            let offset = Self::batch_offset(texture);
            unsafe {
                ctx.device().cmd_push_constants(
                    cmd,
                    layout,
                    vk::ShaderStageFlags::FRAGMENT,
                    0,
                    &(texture as u32).to_ne_bytes(),
                );
            }
            gpu.material.bind(ctx, cmd)?;
            instance_buffer.write_region(offset, bytemuck::cast_slice(batch.as_slice()))?;
            gpu.mesh.bind(ctx, cmd, frame_index);
            unsafe {
                ctx.device().cmd_bind_vertex_buffers(
                    cmd,
                    1,
                    &[instance_buffer.handle()],
                    &[offset],
                );
                ctx.device()
                    .cmd_draw_indexed(cmd, QUAD_INDEX_COUNT, batch.len() as u32, 0, 0, 0);
            }
        }
        Ok(())
    }

    /// Clear every batch for the next frame.
    pub fn flush(&mut self) {
        for batch in &mut self.batches {
            batch.clear();
        }
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

impl Default for QuadRenderer3D {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(renderer: &mut QuadRenderer3D, texture: usize) -> RenderResult<()> {
        renderer.draw_quad(
            Vec3::zeros(),
            Vec3::zeros(),
            Vec2::new(1.0, 1.0),
            texture,
            Vec4::new(1.0, 1.0, 1.0, 1.0),
        )
    }

    #[test]
    fn one_draw_per_nonempty_texture_batch() {
        let mut renderer = QuadRenderer3D::new();
        quad(&mut renderer, 0).unwrap();
        quad(&mut renderer, 0).unwrap();
        quad(&mut renderer, 5).unwrap();

        let draws: Vec<_> = renderer
            .plan()
            .iter()
            .filter_map(|s| match s {
                RenderStep::DrawIndexed { instance_count, .. } => Some(*instance_count),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![2, 1]);
    }

    #[test]
    fn empty_renderer_plans_nothing() {
        assert!(QuadRenderer3D::new().plan().is_empty());
    }

    #[test]
    fn batch_overflow_fails_closed() {
        let mut renderer = QuadRenderer3D::new();
        for _ in 0..MAX_QUADS_PER_BATCH {
            quad(&mut renderer, 1).unwrap();
        }
        assert!(quad(&mut renderer, 1).is_err());
        assert_eq!(renderer.quad_count(), MAX_QUADS_PER_BATCH);
    }
}
