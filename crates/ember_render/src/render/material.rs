//! Materials: shader specs turned into GPU binding state
//!
//! A [`Material`] consumes one or two [`ShaderSpec`]s and derives from them a
//! packed uniform buffer (one alignment-padded sub-range per property), one
//! descriptor set layout + set per property, a pipeline layout, and the
//! graphics pipeline. Property derivation is pure; GPU state lives behind an
//! `Option` and is created by [`Material::build`].

use crate::foundation::hash::UniformId;
use crate::render::device::{DeviceContext, RenderTarget};
use crate::render::shader::{ShaderSpec, ShaderStage, StageFlags, UniformKind, VertexBinding};
use crate::render::vulkan::{
    Buffer, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter,
    GraphicsPipeline, PipelineConfig, PipelineLayout, ShaderModule,
};
use crate::render::{RenderError, RenderResult};
use ash::vk;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable handle into a [`MaterialRegistry`].
    ///
    /// Models and batch renderers hold these instead of references; the
    /// registry owns every material and nothing else may destroy one.
    pub struct MaterialHandle;
}

/// One merged uniform/storage binding record inside a material.
///
/// A uniform declared by both shader stages merges into a single property
/// whose `stages` carries both flags; its storage is counted once.
#[derive(Debug, Clone, Copy)]
pub struct Property {
    /// Hash of the shader-side name
    pub id: UniformId,
    /// Binding index within this property's descriptor set
    pub binding: u32,
    /// Byte offset into the material's packed buffer
    pub offset: u64,
    /// Padded byte size of one element
    pub size: u64,
    /// Array element count
    pub array_size: u32,
    /// Dynamic-offset slice count (1 for non-dynamic kinds)
    pub dynamic_count: u32,
    /// Resource kind
    pub kind: UniformKind,
    /// Stages this property is visible to
    pub stages: StageFlags,
}

impl Property {
    /// Total bytes this property occupies in the packed buffer.
    pub fn total_size(&self) -> u64 {
        self.size * u64::from(self.array_size) * u64::from(self.dynamic_count)
    }

    /// Bytes one descriptor binding covers (one dynamic slice).
    pub fn descriptor_range(&self) -> u64 {
        self.size * u64::from(self.array_size)
    }
}

/// Derive the merged property list and total buffer size for a set of
/// shader specs, in declaration order.
///
/// Offsets are strictly increasing and never overlap:
/// `offset[i+1] == offset[i] + size[i] * array_size[i] * dynamic_count[i]`.
pub fn derive_properties(shaders: &[&ShaderSpec]) -> (Vec<Property>, u64) {
    let mut properties: Vec<Property> = Vec::new();
    let mut cursor = 0u64;

    for shader in shaders {
        let stage = shader.stage().flags();
        for uniform in shader.uniforms() {
            if let Some(existing) = properties.iter_mut().find(|p| p.id == uniform.id) {
                // Same uniform visible from another stage: merge flags,
                // storage is already accounted for.
                existing.stages |= stage;
                continue;
            }
            properties.push(Property {
                id: uniform.id,
                binding: uniform.binding,
                offset: cursor,
                size: uniform.size,
                array_size: uniform.array_size,
                dynamic_count: uniform.dynamic_count,
                kind: uniform.kind,
                stages: stage,
            });
            cursor += uniform.total_size();
        }
    }

    (properties, cursor)
}

/// GPU-side state of a built material.
struct MaterialGpu {
    buffer: Option<Buffer>,
    _pool: Option<DescriptorPool>,
    set_layouts: Vec<DescriptorSetLayout>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    dynamic_offsets: Vec<u32>,
    pipeline_layout: PipelineLayout,
    pipeline: GraphicsPipeline,
}

/// A bound pipeline + descriptor-set + uniform-buffer bundle.
pub struct Material {
    vertex_shader: Option<ShaderSpec>,
    fragment_shader: Option<ShaderSpec>,
    shader_count: usize,
    properties: Vec<Property>,
    buffer_size: u64,
    config: PipelineConfig,
    push_constant: Option<(StageFlags, u32)>,
    gpu: Option<MaterialGpu>,
}

impl Material {
    /// Create an empty material; shaders may be attached afterwards.
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            shader_count: 0,
            properties: Vec::new(),
            buffer_size: 0,
            config: PipelineConfig::default(),
            push_constant: None,
            gpu: None,
        }
    }

    /// Create a material from a vertex shader spec.
    pub fn with_vertex(vertex: ShaderSpec) -> Self {
        let mut material = Self::new();
        material.set_vertex_shader(vertex);
        material
    }

    /// Create a material from vertex and fragment shader specs.
    pub fn with_shaders(vertex: ShaderSpec, fragment: ShaderSpec) -> Self {
        let mut material = Self::new();
        material.set_vertex_shader(vertex);
        material.set_fragment_shader(fragment);
        material
    }

    /// Attach or replace the vertex-stage spec.
    ///
    /// The shader count grows only the first time the slot is filled;
    /// re-assignment never double-counts uniform storage.
    pub fn set_vertex_shader(&mut self, shader: ShaderSpec) {
        debug_assert_eq!(shader.stage(), ShaderStage::Vertex);
        if self.vertex_shader.is_none() {
            self.shader_count += 1;
        }
        self.vertex_shader = Some(shader);
        self.refresh_layout();
    }

    /// Attach or replace the fragment-stage spec.
    pub fn set_fragment_shader(&mut self, shader: ShaderSpec) {
        debug_assert_eq!(shader.stage(), ShaderStage::Fragment);
        if self.fragment_shader.is_none() {
            self.shader_count += 1;
        }
        self.fragment_shader = Some(shader);
        self.refresh_layout();
    }

    /// Override the fixed-function pipeline configuration.
    ///
    /// Vertex bindings are always taken from the attached shader specs.
    pub fn set_pipeline_config(&mut self, config: PipelineConfig) {
        self.config = config;
        self.refresh_layout();
    }

    /// Declare a push-constant range (used for per-draw texture indices).
    pub fn set_push_constant(&mut self, stages: StageFlags, size: u32) {
        self.push_constant = Some((stages, size));
    }

    fn attached_shaders(&self) -> Vec<&ShaderSpec> {
        let mut shaders = Vec::with_capacity(2);
        if let Some(vertex) = &self.vertex_shader {
            shaders.push(vertex);
        }
        if let Some(fragment) = &self.fragment_shader {
            shaders.push(fragment);
        }
        shaders
    }

    fn refresh_layout(&mut self) {
        let shaders = self.attached_shaders();
        let (properties, buffer_size) = derive_properties(&shaders);
        let vertex_bindings = shaders
            .iter()
            .flat_map(|s| s.vertex_bindings().iter().cloned())
            .collect::<Vec<VertexBinding>>();
        self.properties = properties;
        self.buffer_size = buffer_size;
        self.config.vertex_bindings = vertex_bindings;
    }

    /// Number of attached shader stages.
    pub fn shader_count(&self) -> usize {
        self.shader_count
    }

    /// Derived properties in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Total packed buffer size.
    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    /// Find a property by uniform id.
    pub fn property(&self, id: UniformId) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// Whether GPU resources exist.
    pub fn is_built(&self) -> bool {
        self.gpu.is_some()
    }

    /// Allocate the packed buffer, descriptor state, and pipeline.
    pub fn build(&mut self, ctx: &DeviceContext, target: &RenderTarget) -> RenderResult<()> {
        let vertex_spec = self
            .vertex_shader
            .as_ref()
            .ok_or(RenderError::MissingVertexShader)?;

        log::debug!(
            "Building material: {} properties, {} byte buffer, {} shader stage(s)",
            self.properties.len(),
            self.buffer_size,
            self.shader_count
        );

        let device = ctx.device().clone();

        // One packed host-visible buffer shared by every property.
        let buffer = if self.buffer_size > 0 {
            Some(Buffer::host_visible(
                ctx,
                self.buffer_size,
                vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
            )?)
        } else {
            None
        };

        // One layout + set per property, bound to the property's sub-range.
        let mut set_layouts = Vec::with_capacity(self.properties.len());
        for property in &self.properties {
            let layout = DescriptorSetLayoutBuilder::new()
                .add_binding(
                    property.binding,
                    property.kind.descriptor_type(),
                    1,
                    property.stages.to_vk(),
                )
                .build(&device)?;
            set_layouts.push(layout);
        }

        let (pool, descriptor_sets) = if set_layouts.is_empty() {
            (None, Vec::new())
        } else {
            let pool = DescriptorPool::new(device.clone(), set_layouts.len() as u32)?;
            let handles: Vec<vk::DescriptorSetLayout> =
                set_layouts.iter().map(DescriptorSetLayout::handle).collect();
            let sets = pool.allocate_descriptor_sets(&handles)?;

            let buffer_handle = buffer
                .as_ref()
                .map(Buffer::handle)
                .unwrap_or(vk::Buffer::null());
            let mut writer = DescriptorSetWriter::new();
            for (property, &set) in self.properties.iter().zip(sets.iter()) {
                writer = writer.write_buffer(
                    set,
                    property.binding,
                    property.kind.descriptor_type(),
                    buffer_handle,
                    property.offset,
                    property.descriptor_range(),
                );
            }
            writer.update(&device);
            (Some(pool), sets)
        };

        // Dynamic bindings consume one offset each at bind time; the engine
        // addresses slices through instance indices, so offsets stay zero.
        let dynamic_offsets = self
            .properties
            .iter()
            .filter(|p| p.kind.is_dynamic())
            .map(|_| 0u32)
            .collect();

        let layout_handles: Vec<vk::DescriptorSetLayout> =
            set_layouts.iter().map(DescriptorSetLayout::handle).collect();
        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &layout_handles,
            self.push_constant.map(|(stages, size)| (stages.to_vk(), size)),
        )?;

        let vertex_module = ShaderModule::from_file(device.clone(), vertex_spec.path())?;
        let fragment_module = match &self.fragment_shader {
            Some(spec) => Some(ShaderModule::from_file(device.clone(), spec.path())?),
            None => None,
        };

        let pipeline = GraphicsPipeline::new(
            device,
            &self.config,
            pipeline_layout.handle(),
            target.render_pass,
            target.extent,
            &vertex_module,
            fragment_module.as_ref(),
        )?;

        self.gpu = Some(MaterialGpu {
            buffer,
            _pool: pool,
            set_layouts,
            descriptor_sets,
            dynamic_offsets,
            pipeline_layout,
            pipeline,
        });
        Ok(())
    }

    /// Copy `bytes` into the property identified by `id`.
    ///
    /// Returns [`RenderError::UniformNotFound`] when no property matches and
    /// [`RenderError::CapacityExceeded`] when the payload is larger than the
    /// property's sub-range; a write never spills into the neighbouring
    /// property.
    pub fn set_uniform_data(&self, id: UniformId, bytes: &[u8]) -> RenderResult<()> {
        let property = self.property(id).ok_or(RenderError::UniformNotFound(id))?;
        if bytes.len() as u64 > property.total_size() {
            return Err(RenderError::CapacityExceeded {
                what: "uniform property bytes",
                max: property.total_size() as usize,
            });
        }
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotBuilt)?;
        let buffer = gpu.buffer.as_ref().ok_or(RenderError::NotBuilt)?;
        buffer.write_region(property.offset, bytes)
    }

    /// Bind the pipeline, then every descriptor set in one batched call.
    pub fn bind(&self, ctx: &DeviceContext, cmd: vk::CommandBuffer) -> RenderResult<()> {
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotBuilt)?;
        unsafe {
            ctx.device()
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, gpu.pipeline.handle());
            if !gpu.descriptor_sets.is_empty() {
                ctx.device().cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    gpu.pipeline_layout.handle(),
                    0,
                    &gpu.descriptor_sets,
                    &gpu.dynamic_offsets,
                );
            }
        }
        Ok(())
    }

    /// Pipeline layout handle, for push-constant recording.
    pub fn pipeline_layout(&self) -> RenderResult<vk::PipelineLayout> {
        self.gpu
            .as_ref()
            .map(|gpu| gpu.pipeline_layout.handle())
            .ok_or(RenderError::NotBuilt)
    }

    /// Destroy and rebuild only the pipeline object.
    ///
    /// Used after swapchain invalidation; buffer and descriptor state are
    /// preserved untouched.
    pub fn recreate_pipeline(&mut self, ctx: &DeviceContext, target: &RenderTarget) -> RenderResult<()> {
        let vertex_spec = self
            .vertex_shader
            .as_ref()
            .ok_or(RenderError::MissingVertexShader)?;
        let gpu = self.gpu.as_mut().ok_or(RenderError::NotBuilt)?;

        let device = ctx.device().clone();
        let vertex_module = ShaderModule::from_file(device.clone(), vertex_spec.path())?;
        let fragment_module = match &self.fragment_shader {
            Some(spec) => Some(ShaderModule::from_file(device.clone(), spec.path())?),
            None => None,
        };

        gpu.pipeline = GraphicsPipeline::new(
            device,
            &self.config,
            gpu.pipeline_layout.handle(),
            target.render_pass,
            target.extent,
            &vertex_module,
            fragment_module.as_ref(),
        )?;
        Ok(())
    }

    /// Release all GPU resources. Safe to call more than once.
    pub fn destroy(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            log::debug!(
                "Destroying material ({} descriptor sets)",
                gpu.set_layouts.len()
            );
            drop(gpu);
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Material {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Owning registry for materials.
///
/// The registry is the single owner; everything else refers to materials by
/// [`MaterialHandle`].
pub struct MaterialRegistry {
    materials: SlotMap<MaterialHandle, Material>,
}

impl MaterialRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            materials: SlotMap::with_key(),
        }
    }

    /// Take ownership of a material, returning its handle.
    pub fn add(&mut self, material: Material) -> MaterialHandle {
        self.materials.insert(material)
    }

    /// Look up a material.
    pub fn get(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle)
    }

    /// Look up a material mutably.
    pub fn get_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle)
    }

    /// Remove and destroy one material.
    pub fn remove(&mut self, handle: MaterialHandle) {
        if let Some(mut material) = self.materials.remove(handle) {
            material.destroy();
        }
    }

    /// Rebuild every built material's pipeline after swapchain invalidation.
    pub fn recreate_pipelines(
        &mut self,
        ctx: &DeviceContext,
        target: &RenderTarget,
    ) -> RenderResult<()> {
        for (_, material) in self.materials.iter_mut() {
            if material.is_built() {
                material.recreate_pipeline(ctx, target)?;
            }
        }
        Ok(())
    }

    /// Destroy every material's GPU state.
    pub fn destroy_all(&mut self) {
        for (_, material) in self.materials.iter_mut() {
            material.destroy();
        }
        self.materials.clear();
    }

    /// Number of registered materials.
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::hash::uniform_id;

    fn vertex_spec(alignment: u64) -> ShaderSpec {
        ShaderSpec::vertex("shaders/test.vert.spv")
            .with_alignment(alignment)
            .with_uniform(0, "globalData", 64, 1)
            .build()
            .unwrap()
    }

    #[test]
    fn offsets_are_monotonic_and_packed() {
        // P1: offset[i+1] == offset[i] + padded*array*dynamic, total == sum.
        let vertex = ShaderSpec::vertex("v.spv")
            .with_alignment(64)
            .with_uniform(0, "a", 16, 1)
            .with_dynamic_uniform(1, "b", 100, 2, 3)
            .with_storage(2, "c", 20, 4)
            .build()
            .unwrap();
        let (properties, total) = derive_properties(&[&vertex]);

        assert_eq!(properties.len(), 3);
        assert_eq!(properties[0].offset, 0);
        assert_eq!(properties[0].total_size(), 64);
        assert_eq!(properties[1].offset, 64);
        // 100 pads to 128, times array 2 times dynamic 3.
        assert_eq!(properties[1].total_size(), 128 * 2 * 3);
        assert_eq!(properties[2].offset, 64 + 768);
        assert_eq!(properties[2].total_size(), 64 * 4);
        assert_eq!(total, 64 + 768 + 256);

        for pair in properties.windows(2) {
            assert!(pair[1].offset > pair[0].offset);
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].total_size());
        }
    }

    #[test]
    fn shared_uniform_merges_stages_once() {
        // P3: same name in both stages yields one property, storage counted once.
        let vertex = ShaderSpec::vertex("v.spv")
            .with_alignment(256)
            .with_uniform(0, "globalData", 64, 1)
            .build()
            .unwrap();
        let fragment = ShaderSpec::fragment("f.spv")
            .with_alignment(256)
            .with_uniform(0, "globalData", 64, 1)
            .build()
            .unwrap();
        let (properties, total) = derive_properties(&[&vertex, &fragment]);

        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].stages, StageFlags::VERTEX | StageFlags::FRAGMENT);
        assert_eq!(total, 256);
    }

    #[test]
    fn two_stage_layout_matches_padded_offsets() {
        // Scenario A: 64-byte vertex uniform + 16-byte fragment uniform,
        // alignment 256 => offsets 0 and 256, total 512.
        let vertex = ShaderSpec::vertex("v.spv")
            .with_alignment(256)
            .with_uniform(0, "cameraData", 64, 1)
            .build()
            .unwrap();
        let fragment = ShaderSpec::fragment("f.spv")
            .with_alignment(256)
            .with_uniform(1, "tint", 16, 1)
            .build()
            .unwrap();

        let material = Material::with_shaders(vertex, fragment);
        let properties = material.properties();
        assert_eq!(properties.len(), 2);
        assert_eq!(properties[0].offset, 0);
        assert_eq!(properties[0].size, 256);
        assert_eq!(properties[1].offset, 256);
        assert_eq!(properties[1].size, 256);
        assert_eq!(material.buffer_size(), 512);
    }

    #[test]
    fn reattaching_a_shader_does_not_double_count() {
        let mut material = Material::new();
        material.set_vertex_shader(vertex_spec(256));
        assert_eq!(material.shader_count(), 1);
        assert_eq!(material.buffer_size(), 256);

        material.set_vertex_shader(vertex_spec(256));
        assert_eq!(material.shader_count(), 1);
        assert_eq!(material.buffer_size(), 256);
    }

    #[test]
    fn unknown_uniform_id_is_an_explicit_error() {
        // Scenario E: the lookup failure is observable, not a silent no-op.
        let material = Material::with_vertex(vertex_spec(256));
        let missing = uniform_id("doesNotExist");
        match material.set_uniform_data(missing, &[0u8; 4]) {
            Err(RenderError::UniformNotFound(id)) => assert_eq!(id, missing),
            other => panic!("expected UniformNotFound, got {other:?}"),
        }
    }

    #[test]
    fn oversized_uniform_write_is_rejected() {
        // A payload larger than the property's sub-range must never reach
        // the buffer, where it would corrupt the adjacent property.
        let material = Material::with_vertex(vertex_spec(256));
        let result = material.set_uniform_data(uniform_id("globalData"), &[0u8; 257]);
        assert!(matches!(
            result,
            Err(RenderError::CapacityExceeded {
                what: "uniform property bytes",
                max: 256,
            })
        ));
    }

    #[test]
    fn known_uniform_on_unbuilt_material_reports_not_built() {
        let material = Material::with_vertex(vertex_spec(256));
        let result = material.set_uniform_data(uniform_id("globalData"), &[0u8; 64]);
        assert!(matches!(result, Err(RenderError::NotBuilt)));
    }

    #[test]
    fn vertex_bindings_flow_into_pipeline_config() {
        use crate::render::shader::AttributeFormat;
        let vertex = ShaderSpec::vertex("v.spv")
            .with_vertex_type(24)
            .with_vertex_attribute(0, AttributeFormat::Vec3)
            .with_vertex_attribute(12, AttributeFormat::Vec3)
            .build()
            .unwrap();
        let material = Material::with_vertex(vertex);
        assert_eq!(material.config.vertex_bindings.len(), 1);
        assert_eq!(material.config.vertex_bindings[0].stride, 24);
    }
}
