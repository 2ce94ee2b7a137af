//! Low-level Vulkan resource primitives
//!
//! RAII wrappers around buffers, images, descriptors, and pipelines. No
//! policy lives here; the material and renderer layers decide what to
//! allocate and when.

pub mod buffer;
pub mod descriptor;
pub mod image;
pub mod pipeline;

pub use buffer::Buffer;
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter};
pub use image::{Image, ImageView};
pub use pipeline::{GraphicsPipeline, PipelineConfig, PipelineLayout, ShaderModule};
