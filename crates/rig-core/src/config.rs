//! Import options, loadable from and savable to RON files

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Invalid option {option}: {reason}")]
    Invalid {
        option: &'static str,
        reason: String,
    },
}

/// How relocated COLLADA textures are named
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureNaming {
    /// `T_<stem>_<hash><ext>`, the hash derived from the source directory so
    /// equally named textures from different packages do not collide
    #[default]
    Hashed,
    /// `T_<stem><ext>`
    Literal,
}

/// Options controlling a URDF import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub merge_duplicate_materials: bool,
    /// Also treat `name` and `name.001` as candidates for merging
    pub check_material_names: bool,
    /// Rename every material to `M_<robot name>`
    pub rename_materials: bool,
    /// Merge coincident vertices of imported meshes
    pub apply_weld: bool,
    pub texture_naming: TextureNaming,
    /// Lengths in the description are divided by this value
    pub scale_unit: f32,
    /// Parent directory of the session's temporary directory
    pub temp_root: Option<PathBuf>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            merge_duplicate_materials: true,
            check_material_names: true,
            rename_materials: false,
            apply_weld: false,
            texture_naming: TextureNaming::Hashed,
            scale_unit: 1.0,
            temp_root: None,
        }
    }
}

impl ImportOptions {
    /// Load options from a RON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let options: Self =
            ron::from_str(&content).map_err(|e| ConfigError::Deserialize(e.to_string()))?;
        options.validate()?;
        tracing::info!("Loaded import options from {:?}", path);
        Ok(options)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        tracing::info!("Saved import options to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scale_unit.is_finite() && self.scale_unit > 0.0) {
            return Err(ConfigError::Invalid {
                option: "scale_unit",
                reason: format!("must be a positive number, got {}", self.scale_unit),
            });
        }
        Ok(())
    }
}
