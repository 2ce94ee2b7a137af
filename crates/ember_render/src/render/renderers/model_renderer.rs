//! Batched model rendering with state-change minimization
//!
//! Draw requests carry a model handle, a material handle, and a world
//! transform. Consecutive requests sharing the same material or model reuse
//! the existing bind: a contiguous run of identical (material, model) pairs
//! collapses into one instanced draw whose `first_instance` indexes the
//! per-object transform array uploaded to the material's storage property.

use crate::foundation::bounded::BoundedVec;
use crate::foundation::hash::{uniform_id, UniformId};
use crate::foundation::math::{compose_transform, normal_matrix, Vec3};
use crate::render::device::DeviceContext;
use crate::render::material::{Material, MaterialHandle, MaterialRegistry};
use crate::render::model::{ModelHandle, ModelRegistry};
use crate::render::renderers::{FlushGate, RenderStep, MAX_OBJECT_TRANSFORMS};
use crate::render::{RenderError, RenderResult};
use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Per-object data indexed by `gl_InstanceIndex` in model shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectData {
    /// Column-major world transform
    pub model: [[f32; 4]; 4],
    /// Normal matrix, padded to a mat4 for std430 layout
    pub normal: [[f32; 4]; 4],
}

#[derive(Clone, Copy)]
struct ModelEntry {
    model: ModelHandle,
    material: MaterialHandle,
    object: ObjectData,
}

/// Accumulates model draw requests and replays them with minimal binds.
pub struct ModelRenderer {
    entries: BoundedVec<ModelEntry, MAX_OBJECT_TRANSFORMS>,
    global_id: UniformId,
    object_id: UniformId,
    gate: FlushGate,
}

impl ModelRenderer {
    /// Create an empty renderer.
    ///
    /// Models and materials are owned by the registries; this renderer holds
    /// no GPU state of its own, so there is nothing to initialise beyond the
    /// shared uniform names.
    pub fn new() -> Self {
        Self {
            entries: BoundedVec::new(),
            global_id: uniform_id("globalData"),
            object_id: uniform_id("objectData"),
            gate: FlushGate::default(),
        }
    }

    /// Record the shared uniform names materials are expected to declare.
    pub fn initialise(&mut self, global_name: &str, object_name: &str) {
        self.global_id = uniform_id(global_name);
        self.object_id = uniform_id(object_name);
    }

    /// Queue one model instance for this frame.
    pub fn draw_model(
        &mut self,
        model: ModelHandle,
        material: MaterialHandle,
        position: Vec3,
        rotation: Vec3,
        scale: Vec3,
    ) -> RenderResult<()> {
        let entry = ModelEntry {
            model,
            material,
            object: ObjectData {
                model: compose_transform(position, rotation, scale).into(),
                normal: normal_matrix(rotation, scale).to_homogeneous().into(),
            },
        };
        self.entries
            .push(entry)
            .map_err(|e| RenderError::capacity("object transforms", e))
    }

    /// Number of instances accumulated this frame.
    pub fn instance_count(&self) -> usize {
        self.entries.len()
    }

    /// The exact command sequence `render` will submit.
    ///
    /// Material and model binds appear only where the upcoming entry differs
    /// from the previous one; identical consecutive pairs collapse into a
    /// single instanced draw.
    pub fn plan(&self) -> Vec<RenderStep> {
        let mut steps = Vec::new();
        let mut current: Option<(MaterialHandle, ModelHandle)> = None;
        let mut run_start = 0usize;

        for (i, entry) in self.entries.iter().enumerate() {
            let pair = (entry.material, entry.model);
            if current == Some(pair) {
                continue;
            }
            if let Some((material, model)) = current {
                steps.push(RenderStep::DrawModel {
                    instance_count: (i - run_start) as u32,
                    first_instance: run_start as u32,
                });
                if material != entry.material {
                    steps.push(RenderStep::BindMaterial(entry.material));
                }
                if model != entry.model {
                    steps.push(RenderStep::BindModel(entry.model));
                }
            } else {
                steps.push(RenderStep::BindMaterial(entry.material));
                steps.push(RenderStep::BindModel(entry.model));
            }
            current = Some(pair);
            run_start = i;
        }
        if current.is_some() {
            steps.push(RenderStep::DrawModel {
                instance_count: (self.entries.len() - run_start) as u32,
                first_instance: run_start as u32,
            });
        }
        steps
    }

    // Materials that do not declare a shared uniform simply skip it; any
    // other failure propagates.
    fn write_shared(material: &Material, id: UniformId, bytes: &[u8]) -> RenderResult<()> {
        match material.set_uniform_data(id, bytes) {
            Err(RenderError::UniformNotFound(id)) => {
                log::trace!("material does not declare shared uniform {id}");
                Ok(())
            }
            other => other,
        }
    }

    /// Record this frame's model draws.
    pub fn render(
        &mut self,
        ctx: &DeviceContext,
        cmd: vk::CommandBuffer,
        frame_index: usize,
        materials: &MaterialRegistry,
        models: &ModelRegistry,
        global_data: &[u8],
    ) -> RenderResult<()> {
        self.gate.begin_render()?;
        if self.entries.is_empty() {
            return Ok(());
        }
        log::trace!("ModelRenderer: {} instances", self.entries.len());

        let objects: Vec<ObjectData> = self.entries.iter().map(|e| e.object).collect();
        let object_bytes: &[u8] = bytemuck::cast_slice(&objects);

        let mut index_count = 0u32;
        for step in self.plan() {
            match step {
                RenderStep::BindMaterial(handle) => {
                    let material = materials.get(handle).ok_or(RenderError::NotBuilt)?;
                    Self::write_shared(material, self.global_id, global_data)?;
                    Self::write_shared(material, self.object_id, object_bytes)?;
                    material.bind(ctx, cmd)?;
                }
                RenderStep::BindModel(handle) => {
                    let model = models.get(handle).ok_or(RenderError::NotBuilt)?;
                    model.mesh().bind(ctx, cmd, frame_index);
                    index_count = model.mesh().index_count(frame_index);
                }
                RenderStep::DrawModel {
                    instance_count,
                    first_instance,
                } => unsafe {
                    ctx.device().cmd_draw_indexed(
                        cmd,
                        index_count,
                        instance_count,
                        0,
                        0,
                        first_instance,
                    );
                },
                _ => {}
            }
        }
        Ok(())
    }

    /// Clear the accumulator for the next frame.
    pub fn flush(&mut self) {
        self.entries.clear();
        self.gate.flush();
    }
}

impl Default for ModelRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::shader::ShaderSpec;
    use slotmap::SlotMap;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn handles<K: slotmap::Key>(n: usize) -> Vec<K> {
        let mut map: SlotMap<K, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn draw(r: &mut ModelRenderer, model: ModelHandle, material: MaterialHandle) {
        r.draw_model(model, material, Vec3::zeros(), Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0))
            .unwrap();
    }

    #[test]
    fn contiguous_material_run_binds_once() {
        // Four entries, two materials: material binds appear only at the
        // run boundaries, and same-model runs collapse to one draw.
        let materials: Vec<MaterialHandle> = handles(2);
        let models: Vec<ModelHandle> = handles(2);
        let mut renderer = ModelRenderer::new();
        draw(&mut renderer, models[0], materials[0]);
        draw(&mut renderer, models[0], materials[0]);
        draw(&mut renderer, models[1], materials[0]);
        draw(&mut renderer, models[1], materials[1]);

        assert_eq!(
            renderer.plan(),
            vec![
                RenderStep::BindMaterial(materials[0]),
                RenderStep::BindModel(models[0]),
                RenderStep::DrawModel {
                    instance_count: 2,
                    first_instance: 0
                },
                RenderStep::BindModel(models[1]),
                RenderStep::DrawModel {
                    instance_count: 1,
                    first_instance: 2
                },
                RenderStep::BindMaterial(materials[1]),
                RenderStep::DrawModel {
                    instance_count: 1,
                    first_instance: 3
                },
            ]
        );
    }

    #[test]
    fn single_run_is_one_bind_one_draw() {
        let materials: Vec<MaterialHandle> = handles(1);
        let models: Vec<ModelHandle> = handles(1);
        let mut renderer = ModelRenderer::new();
        for _ in 0..5 {
            draw(&mut renderer, models[0], materials[0]);
        }

        let plan = renderer.plan();
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan[2],
            RenderStep::DrawModel {
                instance_count: 5,
                first_instance: 0
            }
        );
    }

    #[test]
    fn accumulator_overflow_fails_closed() {
        let materials: Vec<MaterialHandle> = handles(1);
        let models: Vec<ModelHandle> = handles(1);
        let mut renderer = ModelRenderer::new();
        for _ in 0..MAX_OBJECT_TRANSFORMS {
            draw(&mut renderer, models[0], materials[0]);
        }
        let result = renderer.draw_model(
            models[0],
            materials[0],
            Vec3::zeros(),
            Vec3::zeros(),
            Vec3::new(1.0, 1.0, 1.0),
        );
        assert!(matches!(
            result,
            Err(RenderError::CapacityExceeded {
                what: "object transforms",
                ..
            })
        ));
        assert_eq!(renderer.instance_count(), MAX_OBJECT_TRANSFORMS);
    }

    #[test]
    fn undeclared_shared_uniform_is_tolerated() {
        init_logging();
        let material = Material::new();
        let bytes = [0u8; 64];
        assert!(ModelRenderer::write_shared(&material, uniform_id("globalData"), &bytes).is_ok());
    }

    #[test]
    fn shared_upload_larger_than_the_declared_array_propagates() {
        // A material declaring a smaller object array than the frame's
        // accumulation must surface the overflow, not absorb it.
        init_logging();
        let vertex = ShaderSpec::vertex("v.spv")
            .with_storage(0, "objectData", std::mem::size_of::<ObjectData>() as u64, 4)
            .build()
            .unwrap();
        let material = Material::with_vertex(vertex);
        let objects = [ObjectData::zeroed(); 5];
        let result = ModelRenderer::write_shared(
            &material,
            uniform_id("objectData"),
            bytemuck::cast_slice(&objects),
        );
        assert!(matches!(
            result,
            Err(RenderError::CapacityExceeded {
                what: "uniform property bytes",
                ..
            })
        ));
    }

    #[test]
    fn flush_empties_the_plan() {
        let materials: Vec<MaterialHandle> = handles(1);
        let models: Vec<ModelHandle> = handles(1);
        let mut renderer = ModelRenderer::new();
        draw(&mut renderer, models[0], materials[0]);
        renderer.flush();
        assert!(renderer.plan().is_empty());
        renderer.flush();
        assert_eq!(renderer.instance_count(), 0);
    }
}
