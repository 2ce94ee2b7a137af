//! Models: mesh plus material pairing
//!
//! A model couples geometry with the material that draws it. Registries hand
//! out stable slotmap handles so callers never hold raw references across
//! frames.

use crate::render::material::MaterialHandle;
use crate::render::mesh::Mesh;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable handle to a model in a [`ModelRegistry`].
    pub struct ModelHandle;
}

/// Geometry paired with the material used to draw it.
pub struct Model {
    mesh: Mesh,
    material: MaterialHandle,
}

impl Model {
    /// Pair a mesh with a material.
    pub fn new(mesh: Mesh, material: MaterialHandle) -> Self {
        Self { mesh, material }
    }

    /// Geometry of this model.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Mutable geometry access for per-frame updates.
    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    /// Material this model is drawn with.
    pub fn material(&self) -> MaterialHandle {
        self.material
    }

    /// Repoint this model at another material.
    pub fn set_material(&mut self, material: MaterialHandle) {
        self.material = material;
    }
}

/// Owning store of models keyed by [`ModelHandle`].
#[derive(Default)]
pub struct ModelRegistry {
    models: SlotMap<ModelHandle, Model>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a model, returning its handle.
    pub fn add(&mut self, model: Model) -> ModelHandle {
        self.models.insert(model)
    }

    /// Look up a model.
    pub fn get(&self, handle: ModelHandle) -> Option<&Model> {
        self.models.get(handle)
    }

    /// Look up a model mutably.
    pub fn get_mut(&mut self, handle: ModelHandle) -> Option<&mut Model> {
        self.models.get_mut(handle)
    }

    /// Remove a model, dropping its GPU buffers.
    pub fn remove(&mut self, handle: ModelHandle) -> Option<Model> {
        self.models.remove(handle)
    }

    /// Number of live models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
