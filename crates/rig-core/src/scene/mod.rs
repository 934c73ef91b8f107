//! Scene document
//!
//! The importer builds a [`Document`] holding one armature, the mesh objects
//! bound to its bones, and the material library. Exporters read it back.

mod armature;
mod material;
mod names;
mod object;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use armature::{ARMATURE_NAME, Armature, Bone};
pub use material::{BaseColor, Image, ImageId, Material, MaterialId, MaterialLibrary};
pub use names::{MAX_NAME_LEN, split_numeric_suffix, truncate_name, unique_name};
pub use object::{SceneObject, Transform};

#[derive(Debug, Clone, thiserror::Error)]
pub enum SceneError {
    #[error("Bone not found: {0}")]
    MissingBone(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    /// Lengths of the source description are divided by this value
    pub unit_scale: f32,
    pub armature: Armature,
    objects: Vec<SceneObject>,
    pub materials: MaterialLibrary,
}

impl Document {
    /// Empty document
    pub fn new(name: impl Into<String>, unit_scale: f32) -> Self {
        Self {
            name: name.into(),
            unit_scale,
            armature: Armature::default(),
            objects: Vec::new(),
            materials: MaterialLibrary::default(),
        }
    }

    /// Add an object, suffixing its name if taken; returns the stored name
    pub fn add_object(&mut self, mut object: SceneObject) -> String {
        object.name = unique_name(&object.name, |n| self.object(n).is_some());
        let name = object.name.clone();
        self.objects.push(object);
        name
    }

    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.name == name)
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut SceneObject> {
        self.objects.iter_mut()
    }

    /// Objects parented to a bone
    pub fn objects_of_bone<'a>(&'a self, bone: &'a str) -> impl Iterator<Item = &'a SceneObject> {
        self.objects
            .iter()
            .filter(move |o| o.parent_bone.as_deref() == Some(bone))
    }

    /// Save as RON
    pub fn save_ron(&self, path: &Path) -> Result<(), SceneError> {
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| SceneError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| SceneError::Io(e.to_string()))?;
        tracing::info!("Saved scene to {:?}", path);
        Ok(())
    }

    pub fn load_ron(path: &Path) -> Result<Self, SceneError> {
        let content = std::fs::read_to_string(path).map_err(|e| SceneError::Io(e.to_string()))?;
        let mut document: Document =
            ron::from_str(&content).map_err(|e| SceneError::Deserialize(e.to_string()))?;
        document.armature.reindex();
        Ok(document)
    }
}
