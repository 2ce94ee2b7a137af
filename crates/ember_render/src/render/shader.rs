//! Declarative shader descriptors
//!
//! A [`ShaderSpec`] records everything a material needs to know about one
//! shader stage — uniform bindings, vertex layout, SPIR-V path — without
//! touching the GPU. Materials later derive descriptor layouts, buffer
//! offsets, and the pipeline vertex-input state from one or two specs.

use crate::foundation::hash::{uniform_id, UniformId};
use crate::render::device::pad_uniform_buffer_size;
use crate::render::{RenderError, RenderResult};
use ash::vk;
use bitflags::bitflags;

/// Maximum number of uniform declarations per shader stage.
pub const MAX_UNIFORMS: usize = 5;

bitflags! {
    /// Shader stages a uniform is visible to.
    ///
    /// A uniform declared by both the vertex and fragment spec of one
    /// material merges into a single property carrying both flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StageFlags: u32 {
        /// Vertex stage
        const VERTEX = 1;
        /// Fragment stage
        const FRAGMENT = 2;
    }
}

impl StageFlags {
    /// Convert to the Vulkan stage flag bits.
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        let mut flags = vk::ShaderStageFlags::empty();
        if self.contains(Self::VERTEX) {
            flags |= vk::ShaderStageFlags::VERTEX;
        }
        if self.contains(Self::FRAGMENT) {
            flags |= vk::ShaderStageFlags::FRAGMENT;
        }
        flags
    }
}

/// Pipeline stage a shader runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

impl ShaderStage {
    /// The stage as a flag set.
    pub fn flags(self) -> StageFlags {
        match self {
            Self::Vertex => StageFlags::VERTEX,
            Self::Fragment => StageFlags::FRAGMENT,
        }
    }

    /// The Vulkan stage bit.
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        self.flags().to_vk()
    }
}

/// Kind of buffer-backed resource behind a uniform declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    /// Plain uniform buffer
    Uniform,
    /// Uniform buffer addressed with dynamic offsets
    DynamicUniform,
    /// Storage buffer
    Storage,
    /// Storage buffer addressed with dynamic offsets
    DynamicStorage,
}

impl UniformKind {
    /// The Vulkan descriptor type for this kind.
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::Uniform => vk::DescriptorType::UNIFORM_BUFFER,
            Self::DynamicUniform => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            Self::Storage => vk::DescriptorType::STORAGE_BUFFER,
            Self::DynamicStorage => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        }
    }

    /// Whether binding this kind consumes a dynamic offset.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Self::DynamicUniform | Self::DynamicStorage)
    }
}

/// Format of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeFormat {
    /// One 32-bit float
    Float,
    /// Two 32-bit floats
    Vec2,
    /// Three 32-bit floats
    Vec3,
    /// Four 32-bit floats
    Vec4,
    /// One unsigned 32-bit integer
    UInt,
}

impl AttributeFormat {
    /// The Vulkan format for this attribute.
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::Float => vk::Format::R32_SFLOAT,
            Self::Vec2 => vk::Format::R32G32_SFLOAT,
            Self::Vec3 => vk::Format::R32G32B32_SFLOAT,
            Self::Vec4 => vk::Format::R32G32B32A32_SFLOAT,
            Self::UInt => vk::Format::R32_UINT,
        }
    }
}

/// One vertex attribute within a binding.
#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    /// Byte offset within the vertex
    pub offset: u32,
    /// Attribute format
    pub format: AttributeFormat,
}

/// One vertex buffer binding: a stride plus its attributes.
#[derive(Debug, Clone)]
pub struct VertexBinding {
    /// Byte stride between consecutive vertices
    pub stride: u32,
    /// Per-vertex input rate when false, per-instance when true
    pub per_instance: bool,
    /// Attributes read from this binding
    pub attributes: Vec<VertexAttribute>,
}

/// One uniform declaration. The size is already alignment-padded.
#[derive(Debug, Clone, Copy)]
pub struct Uniform {
    /// Hash of the shader-side name
    pub id: UniformId,
    /// Binding index
    pub binding: u32,
    /// Padded byte size of one element
    pub size: u64,
    /// Number of array elements
    pub array_size: u32,
    /// Number of dynamic-offset slices (1 for non-dynamic kinds)
    pub dynamic_count: u32,
    /// Resource kind
    pub kind: UniformKind,
}

impl Uniform {
    /// Total bytes this uniform occupies in the material buffer.
    pub fn total_size(&self) -> u64 {
        self.size * u64::from(self.array_size) * u64::from(self.dynamic_count)
    }
}

/// Immutable description of one shader stage's resource requirements.
#[derive(Debug, Clone)]
pub struct ShaderSpec {
    path: String,
    stage: ShaderStage,
    uniforms: Vec<Uniform>,
    vertex_bindings: Vec<VertexBinding>,
}

impl ShaderSpec {
    /// Start building a vertex-stage spec for the SPIR-V file at `path`.
    pub fn vertex(path: impl Into<String>) -> ShaderSpecBuilder {
        ShaderSpecBuilder::new(ShaderStage::Vertex, path.into())
    }

    /// Start building a fragment-stage spec for the SPIR-V file at `path`.
    pub fn fragment(path: impl Into<String>) -> ShaderSpecBuilder {
        ShaderSpecBuilder::new(ShaderStage::Fragment, path.into())
    }

    /// SPIR-V file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Pipeline stage.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Declared uniforms, in declaration order.
    pub fn uniforms(&self) -> &[Uniform] {
        &self.uniforms
    }

    /// Declared vertex bindings, in declaration order.
    pub fn vertex_bindings(&self) -> &[VertexBinding] {
        &self.vertex_bindings
    }

    /// Sum of all uniform storage this stage requires.
    pub fn total_uniform_size(&self) -> u64 {
        self.uniforms.iter().map(Uniform::total_size).sum()
    }
}

/// Builder accumulating a [`ShaderSpec`] declaratively.
///
/// Uniform sizes are padded to `alignment` at the moment they are recorded,
/// so later aggregation never re-derives alignment. Validation failures are
/// reported by `build()`.
pub struct ShaderSpecBuilder {
    path: String,
    stage: ShaderStage,
    alignment: u64,
    uniforms: Vec<Uniform>,
    vertex_bindings: Vec<VertexBinding>,
    orphan_attribute: bool,
}

impl ShaderSpecBuilder {
    fn new(stage: ShaderStage, path: String) -> Self {
        Self {
            path,
            stage,
            alignment: 0,
            uniforms: Vec::new(),
            vertex_bindings: Vec::new(),
            orphan_attribute: false,
        }
    }

    /// Set the device uniform-buffer offset alignment used for padding.
    ///
    /// Must be called before the first `with_uniform`-family call; 0 (the
    /// default) records sizes unpadded.
    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    fn push_uniform(
        mut self,
        binding: u32,
        name: &str,
        size: u64,
        array_size: u32,
        dynamic_count: u32,
        kind: UniformKind,
    ) -> Self {
        self.uniforms.push(Uniform {
            id: uniform_id(name),
            binding,
            size: pad_uniform_buffer_size(size, self.alignment),
            array_size,
            dynamic_count,
            kind,
        });
        self
    }

    /// Declare a uniform buffer binding.
    pub fn with_uniform(self, binding: u32, name: &str, size: u64, array_size: u32) -> Self {
        self.push_uniform(binding, name, size, array_size, 1, UniformKind::Uniform)
    }

    /// Declare a dynamic-offset uniform buffer binding.
    pub fn with_dynamic_uniform(
        self,
        binding: u32,
        name: &str,
        size: u64,
        array_size: u32,
        dynamic_count: u32,
    ) -> Self {
        self.push_uniform(
            binding,
            name,
            size,
            array_size,
            dynamic_count,
            UniformKind::DynamicUniform,
        )
    }

    /// Declare a storage buffer binding.
    pub fn with_storage(self, binding: u32, name: &str, size: u64, array_size: u32) -> Self {
        self.push_uniform(binding, name, size, array_size, 1, UniformKind::Storage)
    }

    /// Declare a dynamic-offset storage buffer binding.
    pub fn with_dynamic_storage(
        self,
        binding: u32,
        name: &str,
        size: u64,
        array_size: u32,
        dynamic_count: u32,
    ) -> Self {
        self.push_uniform(
            binding,
            name,
            size,
            array_size,
            dynamic_count,
            UniformKind::DynamicStorage,
        )
    }

    /// Start a new per-vertex input binding with the given stride.
    pub fn with_vertex_type(mut self, stride: u32) -> Self {
        self.vertex_bindings.push(VertexBinding {
            stride,
            per_instance: false,
            attributes: Vec::new(),
        });
        self
    }

    /// Start a new per-instance input binding with the given stride.
    pub fn with_instance_type(mut self, stride: u32) -> Self {
        self.vertex_bindings.push(VertexBinding {
            stride,
            per_instance: true,
            attributes: Vec::new(),
        });
        self
    }

    /// Append an attribute to the most recently started vertex binding.
    pub fn with_vertex_attribute(mut self, offset: u32, format: AttributeFormat) -> Self {
        match self.vertex_bindings.last_mut() {
            Some(binding) => binding.attributes.push(VertexAttribute { offset, format }),
            None => self.orphan_attribute = true,
        }
        self
    }

    /// Validate and freeze the spec.
    pub fn build(self) -> RenderResult<ShaderSpec> {
        if self.orphan_attribute {
            return Err(RenderError::MissingVertexBinding);
        }
        if self.uniforms.len() > MAX_UNIFORMS {
            return Err(RenderError::TooManyUniforms {
                count: self.uniforms.len(),
                max: MAX_UNIFORMS,
            });
        }
        for (i, uniform) in self.uniforms.iter().enumerate() {
            if self.uniforms[..i].iter().any(|u| u.binding == uniform.binding) {
                return Err(RenderError::DuplicateBinding {
                    binding: uniform.binding,
                });
            }
        }
        Ok(ShaderSpec {
            path: self.path,
            stage: self.stage,
            uniforms: self.uniforms,
            vertex_bindings: self.vertex_bindings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_are_padded_at_record_time() {
        let spec = ShaderSpec::vertex("shaders/test.vert.spv")
            .with_alignment(256)
            .with_uniform(0, "globalData", 64, 1)
            .build()
            .unwrap();
        assert_eq!(spec.uniforms()[0].size, 256);
        assert_eq!(spec.total_uniform_size(), 256);
    }

    #[test]
    fn zero_alignment_records_raw_sizes() {
        let spec = ShaderSpec::fragment("shaders/test.frag.spv")
            .with_uniform(0, "tint", 48, 2)
            .build()
            .unwrap();
        assert_eq!(spec.uniforms()[0].size, 48);
        assert_eq!(spec.total_uniform_size(), 96);
    }

    #[test]
    fn dynamic_count_multiplies_storage() {
        let spec = ShaderSpec::vertex("shaders/test.vert.spv")
            .with_alignment(64)
            .with_dynamic_uniform(0, "objectData", 60, 1, 10)
            .build()
            .unwrap();
        assert_eq!(spec.uniforms()[0].size, 64);
        assert_eq!(spec.total_uniform_size(), 640);
    }

    #[test]
    fn more_than_max_uniforms_is_rejected() {
        let mut builder = ShaderSpec::vertex("shaders/test.vert.spv");
        for binding in 0..=MAX_UNIFORMS as u32 {
            builder = builder.with_uniform(binding, "u", 16, 1);
        }
        match builder.build() {
            Err(RenderError::TooManyUniforms { count, max }) => {
                assert_eq!(count, MAX_UNIFORMS + 1);
                assert_eq!(max, MAX_UNIFORMS);
            }
            other => panic!("expected TooManyUniforms, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let result = ShaderSpec::vertex("shaders/test.vert.spv")
            .with_uniform(0, "a", 16, 1)
            .with_uniform(0, "b", 16, 1)
            .build();
        assert!(matches!(
            result,
            Err(RenderError::DuplicateBinding { binding: 0 })
        ));
    }

    #[test]
    fn attribute_without_vertex_type_is_rejected() {
        let result = ShaderSpec::vertex("shaders/test.vert.spv")
            .with_vertex_attribute(0, AttributeFormat::Vec3)
            .build();
        assert!(matches!(result, Err(RenderError::MissingVertexBinding)));
    }

    #[test]
    fn vertex_attributes_attach_to_last_binding() {
        let spec = ShaderSpec::vertex("shaders/test.vert.spv")
            .with_vertex_type(32)
            .with_vertex_attribute(0, AttributeFormat::Vec3)
            .with_vertex_attribute(12, AttributeFormat::Vec4)
            .with_instance_type(64)
            .with_vertex_attribute(0, AttributeFormat::Vec4)
            .build()
            .unwrap();
        assert_eq!(spec.vertex_bindings().len(), 2);
        assert_eq!(spec.vertex_bindings()[0].attributes.len(), 2);
        assert!(!spec.vertex_bindings()[0].per_instance);
        assert_eq!(spec.vertex_bindings()[1].attributes.len(), 1);
        assert!(spec.vertex_bindings()[1].per_instance);
    }

    #[test]
    fn stage_flags_merge_to_vk() {
        let merged = StageFlags::VERTEX | StageFlags::FRAGMENT;
        assert_eq!(
            merged.to_vk(),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }
}
