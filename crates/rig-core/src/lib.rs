//! URDF robot import core
//!
//! This crate turns a URDF robot description into a rigged scene:
//! - description: URDF parsing and validation into a link/joint tree
//! - resolve: `package://` and `file://` mesh reference resolution
//! - collada: COLLADA up-axis rewrite and texture relocation
//! - mesh: STL, OBJ and COLLADA loading, primitive generation
//! - builder: one bone per joint, one joined object per link
//! - dedup: material merging and renaming
//! - export: binary FBX with a sibling `texture/` directory

pub mod builder;
pub mod collada;
pub mod config;
pub mod dedup;
pub mod description;
pub mod export;
pub mod import;
pub mod mesh;
pub mod resolve;
pub mod scene;
pub mod session;
pub mod types;
mod xml;

pub use builder::{BONE_LENGTH, BuildReport, ROOT_BONE, RobotBuilder, SkippedVisual, bone_name};
pub use config::{ConfigError, ImportOptions, TextureNaming};
pub use dedup::{MergeReport, merge_duplicate_materials, names_equivalent};
pub use description::{DescriptionError, RobotModel};
pub use export::{
    ExportError, ExportReport, export_fbx, export_fbx_with_textures, save_scene_with_textures,
};
pub use import::{Import, ImportError, import_urdf, import_urdf_with_report};
pub use resolve::{PackageResolver, ResolveError};
pub use scene::Document;
pub use session::Session;
pub use types::*;
