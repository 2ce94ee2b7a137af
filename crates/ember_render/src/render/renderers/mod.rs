//! Per-frame batch renderers
//!
//! Each renderer accumulates draw requests into fixed-capacity batches, then
//! emits a minimal bind/draw command sequence. Accumulation and plan
//! generation are pure; GPU state is created once by `initialise` and only
//! touched inside `render`.
//!
//! The lifecycle per frame is accumulate (`draw_*`) → `render` → `flush`.
//! Rendering twice without an intervening flush is rejected.

pub mod billboard_renderer;
pub mod debug_renderer_3d;
pub mod light_renderer;
pub mod model_renderer;
pub mod quad_renderer_2d;
pub mod quad_renderer_3d;

pub use billboard_renderer::BillboardRenderer;
pub use debug_renderer_3d::DebugRenderer3D;
pub use light_renderer::{LightRenderer, PointLightData};
pub use model_renderer::ModelRenderer;
pub use quad_renderer_2d::QuadRenderer2D;
pub use quad_renderer_3d::QuadRenderer3D;

use crate::render::material::MaterialHandle;
use crate::render::model::ModelHandle;
use crate::render::{RenderError, RenderResult};

/// Maximum per-object transforms the model renderer accumulates per frame.
pub const MAX_OBJECT_TRANSFORMS: usize = 1000;

/// Maximum quads per (layer, texture) batch.
pub const MAX_QUADS_PER_BATCH: usize = 1000;

/// Maximum billboards per frame.
pub const MAX_BILLBOARDS: usize = 1000;

/// Maximum point lights per frame.
pub const MAX_POINT_LIGHTS: usize = 16;

/// Maximum debug lines per frame.
pub const MAX_DEBUG_LINES: usize = 2000;

/// Number of 2D layers, drawn back to front.
pub const MAX_LAYERS: usize = 8;

/// Number of texture slots addressable by push-constant index.
pub const MAX_TEXTURE_SLOTS: usize = 16;

/// One command a renderer will record, in submission order.
///
/// `plan()` on each renderer produces the exact step sequence its `render`
/// submits; unit tests assert on plans without a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStep {
    /// Write the shared global uniform for this frame.
    WriteGlobalData,
    /// Record the push-constant texture index for the next batch.
    PushTextureIndex(u32),
    /// Bind the renderer's own material.
    BindOwnedMaterial,
    /// Bind a registry material.
    BindMaterial(MaterialHandle),
    /// Bind a model's vertex/index buffers.
    BindModel(ModelHandle),
    /// Upload accumulated data into the per-frame buffer sub-range.
    UploadVertexData {
        /// Byte offset of the batch's sub-range
        offset: u64,
        /// Logical elements uploaded
        count: u32,
    },
    /// One indexed draw.
    DrawIndexed {
        /// Indices per instance
        index_count: u32,
        /// Accumulated batch size
        instance_count: u32,
        /// First instance index
        first_instance: u32,
    },
    /// One indexed draw of the currently bound model's mesh.
    DrawModel {
        /// Accumulated run length
        instance_count: u32,
        /// First instance index into the object-data array
        first_instance: u32,
    },
    /// One non-indexed draw.
    Draw {
        /// Vertices to draw
        vertex_count: u32,
    },
}

/// Select the per-frame slot for `frame_index`, rejecting indices beyond
/// the frames-in-flight count the resource was created with.
pub(crate) fn frame_slot<T>(slots: &[T], frame_index: usize) -> RenderResult<&T> {
    slots.get(frame_index).ok_or(RenderError::InvalidFrameIndex {
        index: frame_index,
        frames: slots.len(),
    })
}

/// Runtime guard for the accumulate → render → flush cycle.
///
/// The ordering is caller-driven; this gate turns a second `render` without
/// an intervening `flush` into an explicit error instead of stale output.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlushGate {
    rendered: bool,
}

impl FlushGate {
    /// Mark the start of a render; fails if the last one was never flushed.
    pub fn begin_render(&mut self) -> RenderResult<()> {
        if self.rendered {
            return Err(RenderError::FlushRequired);
        }
        self.rendered = true;
        Ok(())
    }

    /// Re-arm the gate for the next frame.
    pub fn flush(&mut self) {
        self.rendered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_render_without_flush_is_rejected() {
        let mut gate = FlushGate::default();
        assert!(gate.begin_render().is_ok());
        assert!(matches!(
            gate.begin_render(),
            Err(RenderError::FlushRequired)
        ));
    }

    #[test]
    fn flush_rearms_the_gate() {
        let mut gate = FlushGate::default();
        gate.begin_render().unwrap();
        gate.flush();
        assert!(gate.begin_render().is_ok());
    }

    #[test]
    fn out_of_range_frame_index_is_an_explicit_error() {
        let slots = vec![10u32, 20];
        assert_eq!(frame_slot(&slots, 1).copied().unwrap(), 20);
        assert!(matches!(
            frame_slot(&slots, 2),
            Err(RenderError::InvalidFrameIndex { index: 2, frames: 2 })
        ));
    }

    #[test]
    fn double_flush_is_harmless() {
        let mut gate = FlushGate::default();
        gate.flush();
        gate.flush();
        assert!(gate.begin_render().is_ok());
    }
}
