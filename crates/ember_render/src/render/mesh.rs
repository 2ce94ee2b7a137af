//! Meshes: per-frame vertex/index buffer pairs
//!
//! A mesh owns one vertex/index buffer pair per frame in flight so the CPU
//! never rewrites geometry the GPU may still be reading. Capacities are
//! fixed at creation and guarded on every update.

use crate::render::device::DeviceContext;
use crate::render::vulkan::Buffer;
use crate::render::{RenderError, RenderResult};
use ash::vk;

/// Hard upper bound on vertices per mesh.
pub const MAX_VERTICES: u32 = 10_000;

/// Hard upper bound on indices per mesh.
pub const MAX_INDICES: u32 = 100_000;

/// Check requested capacities against the fixed maxima.
pub fn validate_capacity(max_vertices: u32, max_indices: u32) -> RenderResult<()> {
    if max_vertices > MAX_VERTICES {
        return Err(RenderError::CapacityExceeded {
            what: "mesh vertices",
            max: MAX_VERTICES as usize,
        });
    }
    if max_indices > MAX_INDICES {
        return Err(RenderError::CapacityExceeded {
            what: "mesh indices",
            max: MAX_INDICES as usize,
        });
    }
    Ok(())
}

// Vertex counts are derived by dividing byte lengths by the stride.
fn validate_stride(vertex_stride: u32) -> RenderResult<()> {
    if vertex_stride == 0 {
        return Err(RenderError::InitializationFailed(
            "mesh vertex stride must be non-zero".to_string(),
        ));
    }
    Ok(())
}

struct FrameGeometry {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    vertex_count: u32,
    index_count: u32,
}

/// Vertex/index buffer pair replicated per frame in flight.
pub struct Mesh {
    vertex_stride: u32,
    max_vertices: u32,
    max_indices: u32,
    frames: Vec<FrameGeometry>,
}

impl Mesh {
    /// Allocate an updatable mesh with one buffer pair per frame.
    pub fn new(
        ctx: &DeviceContext,
        frames_in_flight: usize,
        vertex_stride: u32,
        max_vertices: u32,
        max_indices: u32,
    ) -> RenderResult<Self> {
        validate_stride(vertex_stride)?;
        validate_capacity(max_vertices, max_indices)?;
        let frames_in_flight = frames_in_flight.max(1);

        let vertex_size = vk::DeviceSize::from(vertex_stride) * vk::DeviceSize::from(max_vertices);
        let index_size = vk::DeviceSize::from(max_indices) * std::mem::size_of::<u32>() as u64;

        let mut frames = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            frames.push(FrameGeometry {
                vertex_buffer: Buffer::host_visible(
                    ctx,
                    vertex_size,
                    vk::BufferUsageFlags::VERTEX_BUFFER,
                )?,
                index_buffer: Buffer::host_visible(
                    ctx,
                    index_size,
                    vk::BufferUsageFlags::INDEX_BUFFER,
                )?,
                vertex_count: 0,
                index_count: 0,
            });
        }

        Ok(Self {
            vertex_stride,
            max_vertices,
            max_indices,
            frames,
        })
    }

    /// Allocate a static mesh: one buffer pair shared by every frame index,
    /// filled once at creation.
    pub fn with_static_data(
        ctx: &DeviceContext,
        vertex_stride: u32,
        vertex_bytes: &[u8],
        indices: &[u32],
    ) -> RenderResult<Self> {
        validate_stride(vertex_stride)?;
        let vertex_count = (vertex_bytes.len() / vertex_stride as usize) as u32;
        let mut mesh = Self::new(ctx, 1, vertex_stride, vertex_count, indices.len() as u32)?;
        mesh.set_data(0, vertex_bytes, indices)?;
        Ok(mesh)
    }

    /// Upload this frame's geometry.
    pub fn set_data(
        &mut self,
        frame_index: usize,
        vertex_bytes: &[u8],
        indices: &[u32],
    ) -> RenderResult<()> {
        let vertex_count = (vertex_bytes.len() / self.vertex_stride as usize) as u32;
        if vertex_count > self.max_vertices {
            return Err(RenderError::CapacityExceeded {
                what: "mesh vertices",
                max: self.max_vertices as usize,
            });
        }
        if indices.len() as u32 > self.max_indices {
            return Err(RenderError::CapacityExceeded {
                what: "mesh indices",
                max: self.max_indices as usize,
            });
        }

        let frame = self
            .frames
            .get_mut(frame_index)
            .ok_or(RenderError::NotBuilt)?;
        frame.vertex_buffer.write_region(0, vertex_bytes)?;
        frame.index_buffer.write_data(indices)?;
        frame.vertex_count = vertex_count;
        frame.index_count = indices.len() as u32;
        Ok(())
    }

    fn frame(&self, frame_index: usize) -> &FrameGeometry {
        // Static meshes carry one buffer pair for all frame indices.
        &self.frames[frame_index.min(self.frames.len() - 1)]
    }

    /// Bind this frame's vertex and index buffers.
    pub fn bind(&self, ctx: &DeviceContext, cmd: vk::CommandBuffer, frame_index: usize) {
        let frame = self.frame(frame_index);
        unsafe {
            ctx.device()
                .cmd_bind_vertex_buffers(cmd, 0, &[frame.vertex_buffer.handle()], &[0]);
            if frame.index_count > 0 {
                ctx.device().cmd_bind_index_buffer(
                    cmd,
                    frame.index_buffer.handle(),
                    0,
                    vk::IndexType::UINT32,
                );
            }
        }
    }

    /// Vertex buffer handle for this frame.
    pub fn vertex_buffer(&self, frame_index: usize) -> vk::Buffer {
        self.frame(frame_index).vertex_buffer.handle()
    }

    /// Index buffer handle for this frame.
    pub fn index_buffer(&self, frame_index: usize) -> vk::Buffer {
        self.frame(frame_index).index_buffer.handle()
    }

    /// Current vertex count for this frame.
    pub fn vertex_count(&self, frame_index: usize) -> u32 {
        self.frame(frame_index).vertex_count
    }

    /// Current index count for this frame.
    pub fn index_count(&self, frame_index: usize) -> u32 {
        self.frame(frame_index).index_count
    }

    /// Byte stride between vertices.
    pub fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_within_maxima_is_accepted() {
        assert!(validate_capacity(MAX_VERTICES, MAX_INDICES).is_ok());
        assert!(validate_capacity(4, 6).is_ok());
    }

    #[test]
    fn zero_vertex_stride_is_rejected() {
        assert!(matches!(
            validate_stride(0),
            Err(RenderError::InitializationFailed(_))
        ));
        assert!(validate_stride(16).is_ok());
    }

    #[test]
    fn vertex_capacity_over_maximum_fails_closed() {
        let err = validate_capacity(MAX_VERTICES + 1, 0).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CapacityExceeded {
                what: "mesh vertices",
                ..
            }
        ));
    }

    #[test]
    fn index_capacity_over_maximum_fails_closed() {
        let err = validate_capacity(0, MAX_INDICES + 1).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CapacityExceeded {
                what: "mesh indices",
                ..
            }
        ));
    }
}
