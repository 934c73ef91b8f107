//! URDF import pipeline

use std::path::{Path, PathBuf};

use crate::builder::{BuildReport, RobotBuilder};
use crate::collada::ColladaError;
use crate::config::{ConfigError, ImportOptions};
use crate::dedup::{
    MergeReport, create_robot_materials, fix_alpha, merge_duplicate_materials, rename_materials,
};
use crate::description::{DescriptionError, RobotModel};
use crate::mesh::MeshError;
use crate::resolve::PackageResolver;
use crate::scene::{Document, SceneError};
use crate::session::Session;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Description(#[from] DescriptionError),

    #[error(transparent)]
    Collada(#[from] ColladaError),

    #[error("Failed to load mesh {} of link {link}: {source}", path.display())]
    Mesh {
        link: String,
        path: PathBuf,
        #[source]
        source: MeshError,
    },

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Link {0} is reached twice while walking the joint tree")]
    Revisited(String),

    #[error("Links not visited while building: {}", .0.join(", "))]
    Unvisited(Vec<String>),
}

/// An imported document with what each stage did
#[derive(Debug, Clone)]
pub struct Import {
    pub document: Document,
    pub build: BuildReport,
    pub merge: Option<MergeReport>,
}

/// Import a URDF file into a new document.
///
/// Temporary geometry written along the way is removed whether or not the
/// import succeeds; relocated textures stay in the session for export.
pub fn import_urdf(
    path: &Path,
    options: &ImportOptions,
    session: &mut Session,
) -> Result<Document, ImportError> {
    import_urdf_with_report(path, options, session).map(|import| import.document)
}

/// [`import_urdf`], also returning the build and merge reports
pub fn import_urdf_with_report(
    path: &Path,
    options: &ImportOptions,
    session: &mut Session,
) -> Result<Import, ImportError> {
    let result = run(path, options, session);
    session.discard_temp_geometry();
    result
}

fn run(path: &Path, options: &ImportOptions, session: &mut Session) -> Result<Import, ImportError> {
    options.validate()?;

    tracing::info!("Importing {:?}", path);
    let mut model = RobotModel::from_file(path)?;
    tracing::info!(
        "Parsed robot {}: {} links, {} joints, root {}",
        model.name,
        model.links.len(),
        model.joints.len(),
        model.root()
    );

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut resolver = PackageResolver::from_env(base_dir);
    let resolved = model.resolve_mesh_paths(&mut resolver)?;
    tracing::info!("Resolved {} mesh references", resolved);

    let mut document = Document::new(model.name.clone(), options.scale_unit);
    let created = create_robot_materials(&mut document, &model);
    tracing::debug!("Created {} robot materials", created);

    let build = RobotBuilder::new(&model, options, session).build(&mut document)?;
    tracing::info!(
        "Built {} bones and {} objects ({} visuals skipped)",
        build.bones.len(),
        build.objects.len(),
        build.skipped.len()
    );
    fix_alpha(&mut document);

    let merge = options
        .merge_duplicate_materials
        .then(|| merge_duplicate_materials(&mut document, options.check_material_names));

    if options.rename_materials {
        rename_materials(&mut document, &model.name);
        tracing::info!("Renamed materials to M_{}", model.name);
    }

    Ok(Import {
        document,
        build,
        merge,
    })
}
