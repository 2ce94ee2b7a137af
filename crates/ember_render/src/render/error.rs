//! Rendering error types
//!
//! Every failure class the engine can hit is an explicit variant; nothing in
//! non-test code panics. The default caller policy is still fail-fast:
//! propagate to the top and abort, but the choice belongs to the caller.

use crate::foundation::bounded::CapacityError;
use crate::foundation::hash::UniformId;
use ash::vk;

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur across the rendering engine
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A Vulkan call returned a non-success code
    #[error("Vulkan API error: {0}")]
    Api(vk::Result),

    /// No device memory type satisfies the requested properties
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Resource setup failed outside of a Vulkan status code
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A shader declared more uniforms than the fixed maximum
    #[error("Shader uniform limit exceeded: {count} > {max}")]
    TooManyUniforms {
        /// Number of uniforms declared
        count: usize,
        /// Fixed per-shader maximum
        max: usize,
    },

    /// Two uniforms in one shader reuse a binding index
    #[error("Duplicate binding index {binding} in shader")]
    DuplicateBinding {
        /// The reused binding index
        binding: u32,
    },

    /// A vertex attribute was declared before any vertex binding
    #[error("Vertex attribute declared before a vertex type was started")]
    MissingVertexBinding,

    /// A material was built without the mandatory vertex shader
    #[error("Material requires a vertex shader")]
    MissingVertexShader,

    /// No material property matches the requested uniform id
    #[error("No uniform property matches id {0}")]
    UniformNotFound(UniformId),

    /// A fixed-capacity batch accumulator overflowed
    #[error("Batch capacity exceeded for {what}: max {max}")]
    CapacityExceeded {
        /// Which accumulator overflowed
        what: &'static str,
        /// Its fixed capacity
        max: usize,
    },

    /// A GPU operation was requested before resources were built
    #[error("GPU resources have not been built yet")]
    NotBuilt,

    /// A frame index beyond the frames-in-flight count was used
    #[error("Frame index {index} out of range ({frames} frames in flight)")]
    InvalidFrameIndex {
        /// The requested frame index
        index: usize,
        /// Frames in flight the resource was created with
        frames: usize,
    },

    /// `render` was called twice without an intervening `flush`
    #[error("render called again before flush")]
    FlushRequired,
}

impl RenderError {
    /// Wrap a [`CapacityError`] with the name of the overflowed accumulator.
    pub fn capacity(what: &'static str, err: CapacityError) -> Self {
        Self::CapacityExceeded {
            what,
            max: err.capacity,
        }
    }
}
