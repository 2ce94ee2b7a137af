//! 2D quad batching
//!
//! Quads accumulate into one batch per (layer, texture) pair. Layers are
//! drawn back to front (`MAX_LAYERS - 1` down to 0); within a layer, each
//! non-empty texture batch becomes a single instanced draw with the texture
//! index supplied as a push constant. Instance data lives in one per-frame
//! buffer with a fixed sub-range per batch.

use crate::foundation::bounded::BoundedVec;
use crate::foundation::hash::{uniform_id, UniformId};
use crate::foundation::math::{compose_transform_2d, Vec2, Vec4};
use crate::render::device::{DeviceContext, RenderTarget};
use crate::render::material::Material;
use crate::render::mesh::Mesh;
use crate::render::renderers::{
    frame_slot, FlushGate, RenderStep, MAX_LAYERS, MAX_QUADS_PER_BATCH, MAX_TEXTURE_SLOTS,
};
use crate::render::shader::{AttributeFormat, ShaderSpec, StageFlags};
use crate::render::vulkan::{Buffer, PipelineConfig};
use crate::render::{RenderError, RenderResult};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::path::Path;

/// Per-quad instance data consumed by the quad vertex shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct QuadInstance {
    /// Column-major world transform
    pub transform: [[f32; 4]; 4],
    /// RGBA tint
    pub color: [f32; 4],
}

const INSTANCE_STRIDE: u32 = std::mem::size_of::<QuadInstance>() as u32;
const QUAD_VERTEX_STRIDE: u32 = 16;
const QUAD_INDEX_COUNT: u32 = 6;

// Unit quad centered on the origin: interleaved position + uv.
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

/// Layer/texture-batched instanced quad renderer.
pub struct QuadRenderer2D {
    batches: Vec<BoundedVec<QuadInstance, MAX_QUADS_PER_BATCH>>,
    global_id: UniformId,
    gate: FlushGate,
    gpu: Option<QuadGpu>,
}

impl QuadRenderer2D {
    /// Create an empty renderer; accumulation and planning need no GPU.
    pub fn new() -> Self {
        Self {
            batches: (0..MAX_LAYERS * MAX_TEXTURE_SLOTS)
                .map(|_| BoundedVec::new())
                .collect(),
            global_id: uniform_id("globalData"),
            gate: FlushGate::default(),
            gpu: None,
        }
    }

    fn batch_index(layer: usize, texture: usize) -> usize {
        layer * MAX_TEXTURE_SLOTS + texture
    }

    fn batch_offset(layer: usize, texture: usize) -> u64 {
        (Self::batch_index(layer, texture) * MAX_QUADS_PER_BATCH) as u64
            * u64::from(INSTANCE_STRIDE)
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
            shader_dir.join("quad_2d.vert.spv").to_string_lossy().into_owned(),
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
            shader_dir.join("quad_2d.frag.spv").to_string_lossy().into_owned(),
        )
        .build()?;

        let mut material = Material::with_shaders(vertex, fragment);
        material.set_push_constant(StageFlags::FRAGMENT, std::mem::size_of::<u32>() as u32);
        material.set_pipeline_config(PipelineConfig {
            blend_enabled: true,
            depth_test: false,
            ..PipelineConfig::default()
        });
        material.build(ctx, target)?;

        let mesh = Mesh::with_static_data(
            ctx,
            QUAD_VERTEX_STRIDE,
            bytemuck::cast_slice(&QUAD_VERTICES),
            &QUAD_INDICES,
        )?;

        let buffer_size = (MAX_LAYERS * MAX_TEXTURE_SLOTS * MAX_QUADS_PER_BATCH) as u64
            * u64::from(INSTANCE_STRIDE);
        let mut instance_buffers = Vec::with_capacity(target.frames_in_flight);
        for _ in 0..target.frames_in_flight {
            instance_buffers.push(Buffer::host_visible(
                ctx,
                buffer_size,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?);
        }
        log::debug!(
            "QuadRenderer2D initialised: {} batches, {} byte instance buffer x{}",
            self.batches.len(),
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

    /// Queue one quad for this frame.
    pub fn draw_quad(
        &mut self,
        position: Vec2,
        scale: Vec2,
        rotation: f32,
        layer: usize,
        texture: usize,
        color: Vec4,
    ) -> RenderResult<()> {
        if layer >= MAX_LAYERS {
            return Err(RenderError::CapacityExceeded {
                what: "quad layers",
                max: MAX_LAYERS,
            });
        }
        if texture >= MAX_TEXTURE_SLOTS {
            return Err(RenderError::CapacityExceeded {
                what: "texture slots",
                max: MAX_TEXTURE_SLOTS,
            });
        }

        let instance = QuadInstance {
            transform: compose_transform_2d(position, rotation, scale).into(),
            color: color.into(),
        };
        self.batches[Self::batch_index(layer, texture)]
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
        for layer in (0..MAX_LAYERS).rev() {
            for texture in 0..MAX_TEXTURE_SLOTS {
                let batch = &self.batches[Self::batch_index(layer, texture)];
                if batch.is_empty() {
                    continue;
                }
                steps.push(RenderStep::PushTextureIndex(texture as u32));
                steps.push(RenderStep::BindOwnedMaterial);
                steps.push(RenderStep::UploadVertexData {
                    offset: Self::batch_offset(layer, texture),
                    count: batch.len() as u32,
                });
                steps.push(RenderStep::DrawIndexed {
                    index_count: QUAD_INDEX_COUNT,
                    instance_count: batch.len() as u32,
                    first_instance: 0,
                });
            }
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
        log::trace!("QuadRenderer2D: {} quads", self.quad_count());

        gpu.material.set_uniform_data(self.global_id, global_data)?;
        let instance_buffer = frame_slot(&gpu.instance_buffers, frame_index)?;
        let layout = gpu.material.pipeline_layout()?;

        for layer in (0..MAX_LAYERS).rev() {
            for texture in 0..MAX_TEXTURE_SLOTS {
                let batch = &self.batches[Self::batch_index(layer, texture)];
                if batch.is_empty() {
                    continue;
                }
                let offset = Self::batch_offset(layer, texture);
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
                    ctx.device().cmd_draw_indexed(
                        cmd,
                        QUAD_INDEX_COUNT,
                        batch.len() as u32,
                        0,
                        0,
                        0,
                    );
                }
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

impl Default for QuadRenderer2D {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(renderer: &mut QuadRenderer2D, layer: usize, texture: usize) -> RenderResult<()> {
        renderer.draw_quad(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            0.0,
            layer,
            texture,
            Vec4::new(1.0, 1.0, 1.0, 1.0),
        )
    }

    #[test]
    fn same_texture_quads_collapse_to_one_draw() {
        // Three quads, one texture, one layer: one instanced draw of three.
        let mut renderer = QuadRenderer2D::new();
        for _ in 0..3 {
            quad(&mut renderer, 0, 0).unwrap();
        }
        let plan = renderer.plan();
        let draws: Vec<_> = plan
            .iter()
            .filter(|s| matches!(s, RenderStep::DrawIndexed { .. }))
            .collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(
            *draws[0],
            RenderStep::DrawIndexed {
                index_count: 6,
                instance_count: 3,
                first_instance: 0
            }
        );
    }

    #[test]
    fn higher_layers_draw_before_lower() {
        // Back-to-front: the layer 2 batch must be emitted before layer 0.
        let mut renderer = QuadRenderer2D::new();
        quad(&mut renderer, 0, 0).unwrap();
        quad(&mut renderer, 2, 0).unwrap();

        let uploads: Vec<u64> = renderer
            .plan()
            .iter()
            .filter_map(|s| match s {
                RenderStep::UploadVertexData { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0], QuadRenderer2D::batch_offset(2, 0));
        assert_eq!(uploads[1], QuadRenderer2D::batch_offset(0, 0));
    }

    #[test]
    fn each_batch_gets_its_texture_push_constant() {
        let mut renderer = QuadRenderer2D::new();
        quad(&mut renderer, 0, 3).unwrap();
        quad(&mut renderer, 0, 1).unwrap();

        let pushes: Vec<u32> = renderer
            .plan()
            .iter()
            .filter_map(|s| match s {
                RenderStep::PushTextureIndex(t) => Some(*t),
                _ => None,
            })
            .collect();
        // Within one layer, texture slots are visited in ascending order.
        assert_eq!(pushes, vec![1, 3]);
    }

    #[test]
    fn batch_overflow_fails_closed() {
        let mut renderer = QuadRenderer2D::new();
        for _ in 0..MAX_QUADS_PER_BATCH {
            quad(&mut renderer, 0, 0).unwrap();
        }
        assert!(matches!(
            quad(&mut renderer, 0, 0),
            Err(RenderError::CapacityExceeded {
                what: "quads per batch",
                ..
            })
        ));
        assert_eq!(renderer.quad_count(), MAX_QUADS_PER_BATCH);
    }

    #[test]
    fn out_of_range_layer_and_texture_are_rejected() {
        let mut renderer = QuadRenderer2D::new();
        assert!(quad(&mut renderer, MAX_LAYERS, 0).is_err());
        assert!(quad(&mut renderer, 0, MAX_TEXTURE_SLOTS).is_err());
        assert_eq!(renderer.quad_count(), 0);
    }

    #[test]
    fn flush_empties_the_plan() {
        let mut renderer = QuadRenderer2D::new();
        quad(&mut renderer, 1, 0).unwrap();
        assert!(!renderer.plan().is_empty());
        renderer.flush();
        assert!(renderer.plan().is_empty());
        // A second flush with nothing accumulated is a no-op.
        renderer.flush();
        assert_eq!(renderer.quad_count(), 0);
    }
}
