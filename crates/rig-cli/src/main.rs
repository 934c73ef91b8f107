//! urdf-rig - import a URDF robot as a rigged scene and export it as FBX

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rig_core::{
    Document, ImportOptions, Session, TextureNaming, export_fbx_with_textures,
    import_urdf_with_report, save_scene_with_textures,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "urdf-rig", version, about = "Rig URDF robots and export them as FBX")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the rigged scene and print a summary
    Import {
        urdf: PathBuf,
        /// Save the scene as RON, with its textures in a sibling texture/ directory
        #[arg(long)]
        scene: Option<PathBuf>,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Build the rigged scene and write it as FBX with a texture/ directory
    Export {
        urdf: PathBuf,
        out: PathBuf,
        #[command(flatten)]
        options: OptionArgs,
    },
}

/// Import options; flags override the config file
#[derive(Args, Debug)]
struct OptionArgs {
    /// RON file with import options
    #[arg(long)]
    config: Option<PathBuf>,
    /// Keep duplicate materials
    #[arg(long)]
    no_merge: bool,
    /// Merge materials by content only, ignoring their names
    #[arg(long)]
    no_check_names: bool,
    /// Rename every material to M_<robot>
    #[arg(long)]
    rename_materials: bool,
    /// Merge vertices closer than 0.001
    #[arg(long)]
    weld: bool,
    /// Name relocated textures T_<stem> without the directory hash
    #[arg(long)]
    literal_texture_names: bool,
    /// Lengths are divided by this value
    #[arg(long)]
    scale_unit: Option<f32>,
    /// Directory for temporary files
    #[arg(long)]
    temp_dir: Option<PathBuf>,
}

impl OptionArgs {
    fn resolve(&self) -> Result<ImportOptions> {
        let mut options = match &self.config {
            Some(path) => ImportOptions::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ImportOptions::default(),
        };

        if self.no_merge {
            options.merge_duplicate_materials = false;
        }
        if self.no_check_names {
            options.check_material_names = false;
        }
        if self.rename_materials {
            options.rename_materials = true;
        }
        if self.weld {
            options.apply_weld = true;
        }
        if self.literal_texture_names {
            options.texture_naming = TextureNaming::Literal;
        }
        if let Some(scale) = self.scale_unit {
            options.scale_unit = scale;
        }
        if let Some(dir) = &self.temp_dir {
            options.temp_root = Some(dir.clone());
        }
        options.validate()?;
        Ok(options)
    }
}

fn session_for(options: &ImportOptions) -> Session {
    match &options.temp_root {
        Some(root) => Session::with_root(root),
        None => Session::new(),
    }
}

fn import(urdf: &Path, options: &ImportOptions, session: &mut Session) -> Result<Document> {
    let import = import_urdf_with_report(urdf, options, session)
        .with_context(|| format!("importing {}", urdf.display()))?;

    if !import.build.skipped.is_empty() {
        info!("{} visuals skipped", import.build.skipped.len());
    }
    if let Some(merge) = &import.merge {
        info!("Merged {} duplicate materials", merge.merged.len());
    }

    let doc = import.document;
    info!(
        "{}: {} bones, {} objects, {} materials",
        doc.name,
        doc.armature.len(),
        doc.objects().len(),
        doc.materials.materials().len()
    );
    Ok(doc)
}

fn main() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "urdf_rig=info,rig_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Import {
            urdf,
            scene,
            options,
        } => {
            let options = options.resolve()?;
            let mut session = session_for(&options);
            let doc = import(&urdf, &options, &mut session)?;
            if let Some(path) = scene {
                let report = save_scene_with_textures(&doc, &session, &path)?;
                info!(
                    "Wrote {} ({} textures)",
                    report.path.display(),
                    report.textures
                );
            }
            session.close()?;
        }
        Command::Export { urdf, out, options } => {
            let options = options.resolve()?;
            let mut session = session_for(&options);
            let doc = import(&urdf, &options, &mut session)?;
            let report = export_fbx_with_textures(&doc, &session, &out)?;
            info!(
                "Wrote {} ({} textures)",
                report.path.display(),
                report.textures
            );
            session.close()?;
        }
    }
    Ok(())
}
