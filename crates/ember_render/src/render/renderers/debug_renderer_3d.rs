//! Debug line rendering
//!
//! Immediate-mode world-space lines drawn as one non-indexed line-list draw
//! per frame. Helpers build rectangles out of lines; everything accumulates
//! into a per-frame vertex buffer.

use crate::foundation::bounded::BoundedVec;
use crate::foundation::hash::{uniform_id, UniformId};
use crate::foundation::math::{Vec2, Vec3, Vec4};
use crate::render::device::{DeviceContext, RenderTarget};
use crate::render::material::Material;
use crate::render::renderers::{frame_slot, FlushGate, RenderStep, MAX_DEBUG_LINES};
use crate::render::shader::{AttributeFormat, ShaderSpec};
use crate::render::vulkan::{Buffer, PipelineConfig};
use crate::render::{RenderError, RenderResult};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::path::Path;

/// One line-list vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LineVertex {
    position: [f32; 4],
    color: [f32; 4],
}

const VERTEX_STRIDE: u32 = std::mem::size_of::<LineVertex>() as u32;

struct DebugGpu {
    material: Material,
    vertex_buffers: Vec<Buffer>,
}

/// Line-list debug renderer.
pub struct DebugRenderer3D {
    lines: BoundedVec<[LineVertex; 2], MAX_DEBUG_LINES>,
    global_id: UniformId,
    gate: FlushGate,
    gpu: Option<DebugGpu>,
}

impl DebugRenderer3D {
    /// Create an empty renderer.
    pub fn new() -> Self {
        Self {
            lines: BoundedVec::new(),
            global_id: uniform_id("globalData"),
            gate: FlushGate::default(),
            gpu: None,
        }
    }

    /// Build the owned line-list material and per-frame vertex buffers.
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
            shader_dir.join("debug_line.vert.spv").to_string_lossy().into_owned(),
        )
        .with_alignment(ctx.min_uniform_alignment())
        .with_uniform(0, global_name, global_size, 1)
        .with_vertex_type(VERTEX_STRIDE)
        .with_vertex_attribute(0, AttributeFormat::Vec4)
        .with_vertex_attribute(16, AttributeFormat::Vec4)
        .build()?;

        let fragment = ShaderSpec::fragment(
            shader_dir.join("debug_line.frag.spv").to_string_lossy().into_owned(),
        )
        .build()?;

        let mut material = Material::with_shaders(vertex, fragment);
        material.set_pipeline_config(PipelineConfig {
            topology: vk::PrimitiveTopology::LINE_LIST,
            ..PipelineConfig::default()
        });
        material.build(ctx, target)?;

        let buffer_size = (MAX_DEBUG_LINES * 2) as u64 * u64::from(VERTEX_STRIDE);
        let mut vertex_buffers = Vec::with_capacity(target.frames_in_flight);
        for _ in 0..target.frames_in_flight {
            vertex_buffers.push(Buffer::host_visible(
                ctx,
                buffer_size,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?);
        }
        log::debug!(
            "DebugRenderer3D initialised: {} byte line buffer x{}",
            buffer_size,
            target.frames_in_flight
        );

        self.gpu = Some(DebugGpu {
            material,
            vertex_buffers,
        });
        Ok(())
    }

    /// Queue one world-space line segment.
    pub fn draw_line(&mut self, from: Vec3, to: Vec3, color: Vec4) -> RenderResult<()> {
        let rgba: [f32; 4] = color.into();
        self.lines
            .push([
                LineVertex {
                    position: [from.x, from.y, from.z, 1.0],
                    color: rgba,
                },
                LineVertex {
                    position: [to.x, to.y, to.z, 1.0],
                    color: rgba,
                },
            ])
            .map_err(|e| RenderError::capacity("debug lines", e))
    }

    /// Queue an axis-aligned rectangle in the XY plane as four lines.
    pub fn draw_rect(&mut self, center: Vec3, half_extents: Vec2, color: Vec4) -> RenderResult<()> {
        let (hx, hy) = (half_extents.x, half_extents.y);
        let corners = [
            Vec3::new(center.x - hx, center.y - hy, center.z),
            Vec3::new(center.x + hx, center.y - hy, center.z),
            Vec3::new(center.x + hx, center.y + hy, center.z),
            Vec3::new(center.x - hx, center.y + hy, center.z),
        ];
        for i in 0..4 {
            self.draw_line(corners[i], corners[(i + 1) % 4], color)?;
        }
        Ok(())
    }

    /// Lines accumulated this frame.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// The exact command sequence `render` will submit.
    pub fn plan(&self) -> Vec<RenderStep> {
        if self.lines.is_empty() {
            return Vec::new();
        }
        vec![
            RenderStep::WriteGlobalData,
            RenderStep::BindOwnedMaterial,
            RenderStep::UploadVertexData {
                offset: 0,
                count: self.lines.len() as u32,
            },
            RenderStep::Draw {
                vertex_count: (self.lines.len() * 2) as u32,
            },
        ]
    }

    /// Record this frame's line draw.
    pub fn render(
        &mut self,
        ctx: &DeviceContext,
        cmd: vk::CommandBuffer,
        frame_index: usize,
        global_data: &[u8],
    ) -> RenderResult<()> {
        self.gate.begin_render()?;
        if self.lines.is_empty() {
            return Ok(());
        }
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotBuilt)?;
        log::trace!("DebugRenderer3D: {} lines", self.lines.len());

        gpu.material.set_uniform_data(self.global_id, global_data)?;
        gpu.material.bind(ctx, cmd)?;

        let vertex_buffer = frame_slot(&gpu.vertex_buffers, frame_index)?;
        vertex_buffer.write_region(0, bytemuck::cast_slice(self.lines.as_slice()))?;
        unsafe {
            ctx.device()
                .cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer.handle()], &[0]);
            ctx.device()
                .cmd_draw(cmd, (self.lines.len() * 2) as u32, 1, 0, 0);
        }
        Ok(())
    }

    /// Clear the accumulator for the next frame.
    pub fn flush(&mut self) {
        self.lines.clear();
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

impl Default for DebugRenderer3D {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_draw_as_one_line_list() {
        let mut renderer = DebugRenderer3D::new();
        for _ in 0..5 {
            renderer
                .draw_line(Vec3::zeros(), Vec3::x(), Vec4::new(1.0, 0.0, 0.0, 1.0))
                .unwrap();
        }
        assert_eq!(
            renderer.plan().last(),
            Some(&RenderStep::Draw { vertex_count: 10 })
        );
    }

    #[test]
    fn rect_is_four_lines() {
        let mut renderer = DebugRenderer3D::new();
        renderer
            .draw_rect(
                Vec3::zeros(),
                Vec2::new(1.0, 0.5),
                Vec4::new(0.0, 1.0, 0.0, 1.0),
            )
            .unwrap();
        assert_eq!(renderer.line_count(), 4);
    }

    #[test]
    fn overflow_fails_closed() {
        let mut renderer = DebugRenderer3D::new();
        for _ in 0..MAX_DEBUG_LINES {
            renderer
                .draw_line(Vec3::zeros(), Vec3::x(), Vec4::new(1.0, 1.0, 1.0, 1.0))
                .unwrap();
        }
        assert!(renderer
            .draw_line(Vec3::zeros(), Vec3::x(), Vec4::new(1.0, 1.0, 1.0, 1.0))
            .is_err());
        assert_eq!(renderer.line_count(), MAX_DEBUG_LINES);
    }

    #[test]
    fn flush_empties_the_plan() {
        let mut renderer = DebugRenderer3D::new();
        renderer
            .draw_line(Vec3::zeros(), Vec3::x(), Vec4::new(1.0, 1.0, 1.0, 1.0))
            .unwrap();
        renderer.flush();
        assert!(renderer.plan().is_empty());
        renderer.flush();
        assert_eq!(renderer.line_count(), 0);
    }
}
