//! Materials and images

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::names::unique_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(pub Uuid);

/// Where a material's base color comes from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BaseColor {
    Flat([f32; 4]),
    Image(ImageId),
}

impl BaseColor {
    /// Host default for materials created without a color
    pub const DEFAULT: BaseColor = BaseColor::Flat([0.8, 0.8, 0.8, 1.0]);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    pub base_color: BaseColor,
    pub alpha: f32,
}

impl Material {
    /// Flat RGBA color; image-backed materials have none
    pub fn flat_color(&self) -> Option<[f32; 4]> {
        match self.base_color {
            BaseColor::Flat(rgba) => Some(rgba),
            BaseColor::Image(_) => None,
        }
    }

    pub fn image(&self) -> Option<ImageId> {
        match self.base_color {
            BaseColor::Image(id) => Some(id),
            BaseColor::Flat(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    /// File name of the image
    pub name: String,
    pub path: PathBuf,
}

/// Materials and images of a document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialLibrary {
    materials: Vec<Material>,
    images: Vec<Image>,
}

impl MaterialLibrary {
    /// Create a material, suffixing the name if it is taken
    pub fn add(&mut self, name: &str, base_color: BaseColor) -> MaterialId {
        let name = unique_name(name, |n| self.by_name(n).is_some());
        let alpha = match base_color {
            BaseColor::Flat(rgba) => rgba[3],
            BaseColor::Image(_) => 1.0,
        };
        let id = MaterialId(Uuid::new_v4());
        self.materials.push(Material {
            id,
            name,
            base_color,
            alpha,
        });
        id
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.iter_mut().find(|m| m.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name(name).is_some()
    }

    /// Materials in creation order
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> impl Iterator<Item = &mut Material> {
        self.materials.iter_mut()
    }

    pub fn remove(&mut self, id: MaterialId) -> Option<Material> {
        let index = self.materials.iter().position(|m| m.id == id)?;
        Some(self.materials.remove(index))
    }

    /// Rename a material; the new name gets a suffix if another material
    /// already uses it. Returns the name actually assigned.
    pub fn rename(&mut self, id: MaterialId, name: &str) -> Option<String> {
        let name = unique_name(name, |n| {
            self.materials.iter().any(|m| m.name == n && m.id != id)
        });
        let material = self.get_mut(id)?;
        material.name = name.clone();
        Some(name)
    }

    /// Image for a file, reusing an existing entry for the same path
    pub fn load_image(&mut self, path: &Path) -> ImageId {
        if let Some(image) = self.images.iter().find(|i| i.path == path) {
            return image.id;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let name = unique_name(&file_name, |n| self.images.iter().any(|i| i.name == n));
        let id = ImageId(Uuid::new_v4());
        self.images.push(Image {
            id,
            name,
            path: path.to_path_buf(),
        });
        id
    }

    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.iter().find(|i| i.id == id)
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Point images stored under `from` at the same files under `to`.
    /// Returns how many paths changed.
    pub fn relocate_images(&mut self, from: &Path, to: &Path) -> usize {
        let mut moved = 0;
        for image in &mut self.images {
            if let Ok(rest) = image.path.strip_prefix(from) {
                image.path = to.join(rest);
                moved += 1;
            }
        }
        moved
    }
}
