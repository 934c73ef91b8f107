//! Armature and bones

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::SceneError;
use super::names::unique_name;

/// Object name of the armature holding every bone
pub const ARMATURE_NAME: &str = "root";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    pub head: Vec3,
    pub tail: Vec3,
    pub parent: Option<String>,
}

impl Bone {
    pub fn length(&self) -> f32 {
        self.head.distance(self.tail)
    }

    /// Unit vector from head to tail
    pub fn direction(&self) -> Vec3 {
        (self.tail - self.head).normalize_or_zero()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Armature {
    pub name: String,
    bones: Vec<Bone>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Default for Armature {
    fn default() -> Self {
        Self {
            name: ARMATURE_NAME.to_string(),
            bones: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl Armature {
    /// Add a bone; its parent, if any, must already exist.
    /// Returns the name the bone was stored under.
    pub fn add_bone(
        &mut self,
        name: &str,
        head: Vec3,
        tail: Vec3,
        parent: Option<&str>,
    ) -> Result<String, SceneError> {
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(SceneError::MissingBone(parent.to_string()));
            }
        }

        let name = unique_name(name, |n| self.contains(n));
        self.index.insert(name.clone(), self.bones.len());
        self.bones.push(Bone {
            name: name.clone(),
            head,
            tail,
            parent: parent.map(str::to_string),
        });
        Ok(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.lookup(name).map(|i| &self.bones[i])
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Position of a bone in [`Armature::bones`]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.lookup(name)
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        // the index is skipped by serde; fall back to a scan after loading
        match self.index.get(name) {
            Some(&i) => Some(i),
            None if self.index.len() != self.bones.len() => {
                self.bones.iter().position(|b| b.name == name)
            }
            None => None,
        }
    }

    /// Rebuild the name index, needed after deserializing
    pub fn reindex(&mut self) {
        self.index = self
            .bones
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.clone(), i))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_bones() {
        let mut armature = Armature::default();
        assert_eq!(armature.name, "root");
        let root = armature
            .add_bone("root.bone", Vec3::ZERO, Vec3::Y * 0.1, None)
            .unwrap();
        armature
            .add_bone("j.revolute.bone", Vec3::X, Vec3::X + Vec3::Z * 0.1, Some(&root))
            .unwrap();

        assert_eq!(armature.len(), 2);
        let bone = armature.bone("j.revolute.bone").unwrap();
        assert_eq!(bone.parent.as_deref(), Some("root.bone"));
        assert!((bone.length() - 0.1).abs() < 1e-6);
        assert_eq!(bone.direction(), Vec3::Z);
    }

    #[test]
    fn test_missing_parent() {
        let mut armature = Armature::default();
        assert!(matches!(
            armature.add_bone("a", Vec3::ZERO, Vec3::Z, Some("ghost")),
            Err(SceneError::MissingBone(_))
        ));
    }

    #[test]
    fn test_lookup_after_deserialize() {
        let mut armature = Armature::default();
        armature.add_bone("a", Vec3::ZERO, Vec3::Z, None).unwrap();
        let text = ron::to_string(&armature).unwrap();
        let mut loaded: Armature = ron::from_str(&text).unwrap();
        assert!(loaded.contains("a"));
        loaded.reindex();
        assert_eq!(loaded.position("a"), Some(0));
    }
}
