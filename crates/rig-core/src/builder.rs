//! Skeleton and visual construction
//!
//! The root link gets `root.bone`; every joint gets one bone named
//! `{joint}.{type}.bone`, parented to the bone of its parent link's incoming
//! joint. Each link's visuals are joined into one object named after the link
//! and bound to the link's bone.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use glam::{Mat4, Vec3};

use crate::collada;
use crate::config::ImportOptions;
use crate::description::{JointDesc, LinkDesc, MaterialRef, RobotModel, VisualDesc};
use crate::import::ImportError;
use crate::mesh::{
    ImportedMesh, MeshData, MeshError, MeshFormat, SourceMaterial, WELD_DISTANCE, generate_box,
    generate_cylinder, generate_uv_sphere, load_mesh,
};
use crate::scene::{BaseColor, Document, MaterialId, SceneObject, Transform, truncate_name};
use crate::session::Session;
use crate::types::{Frame, Geometry};

/// Name of the bone created for the root link
pub const ROOT_BONE: &str = "root.bone";

/// Bone length before unit scaling
pub const BONE_LENGTH: f32 = 0.1;

/// Material shared by primitives that declare none
pub const DEFAULT_MATERIAL: &str = "Material";

/// Bone name for a joint: `{joint}.{type}.bone`
pub fn bone_name(joint: &JointDesc) -> String {
    format!("{}.{}.bone", joint.name, joint.joint_type.tag())
}

/// A visual that was not turned into geometry
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedVisual {
    pub link: String,
    pub reason: String,
}

/// What a build produced
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub bones: Vec<String>,
    pub objects: Vec<String>,
    pub skipped: Vec<SkippedVisual>,
}

pub struct RobotBuilder<'a> {
    model: &'a RobotModel,
    options: &'a ImportOptions,
    session: &'a mut Session,
    /// World frame of each built link
    frames: HashMap<String, Frame>,
    /// Bone each link's geometry is bound to
    link_bones: HashMap<String, String>,
    report: BuildReport,
}

impl<'a> RobotBuilder<'a> {
    pub fn new(model: &'a RobotModel, options: &'a ImportOptions, session: &'a mut Session) -> Self {
        Self {
            model,
            options,
            session,
            frames: HashMap::new(),
            link_bones: HashMap::new(),
            report: BuildReport::default(),
        }
    }

    fn unit(&self) -> f32 {
        self.options.scale_unit
    }

    /// Build the root bone, then every joint breadth-first from the root
    pub fn build(mut self, doc: &mut Document) -> Result<BuildReport, ImportError> {
        self.build_root(doc)?;
        self.build_chain(doc)?;
        Ok(self.report)
    }

    fn build_root(&mut self, doc: &mut Document) -> Result<(), ImportError> {
        let link = self.model.root_link();
        let frame = Frame::IDENTITY.compose(link.origin.as_ref(), self.unit());
        self.frames.insert(link.name.clone(), frame);

        let tail = frame.to_world(Vec3::new(0.0, BONE_LENGTH / self.unit(), 0.0));
        let bone = doc.armature.add_bone(ROOT_BONE, frame.position, tail, None)?;
        tracing::debug!("Root link {} -> {}", link.name, bone);

        self.report.bones.push(bone.clone());
        self.link_bones.insert(link.name.clone(), bone.clone());
        self.add_link_visuals(doc, link, &frame, &bone)
    }

    fn build_chain(&mut self, doc: &mut Document) -> Result<(), ImportError> {
        let model = self.model;
        let root = model.root().to_string();
        let mut visited: HashSet<String> = HashSet::from([root.clone()]);
        let mut queue = VecDeque::from([root]);

        while let Some(link_name) = queue.pop_front() {
            let parent_frame = self.frames[&link_name];
            let parent_bone = self.link_bones[&link_name].clone();

            for (joint_name, child_name) in model.children(&link_name) {
                if !visited.insert(child_name.clone()) {
                    return Err(ImportError::Revisited(child_name.clone()));
                }
                let (Some(joint), Some(child)) = (model.joint(joint_name), model.link(child_name))
                else {
                    return Err(ImportError::Revisited(child_name.clone()));
                };

                let joint_frame = parent_frame.compose(joint.origin.as_ref(), self.unit());
                let child_frame = joint_frame.compose(child.origin.as_ref(), self.unit());
                self.frames.insert(child.name.clone(), child_frame);

                let direction = joint
                    .axis
                    .filter(|axis| axis.length_squared() > 0.0)
                    .map(Vec3::normalize)
                    .unwrap_or(Vec3::Z);
                let head = joint_frame.position;
                let tail = joint_frame.to_world(direction * (BONE_LENGTH / self.unit()));

                let bone = doc
                    .armature
                    .add_bone(&bone_name(joint), head, tail, Some(&parent_bone))?;
                tracing::debug!("{} -> {} (parent {})", joint.name, bone, parent_bone);

                self.report.bones.push(bone.clone());
                self.link_bones.insert(child.name.clone(), bone.clone());
                self.add_link_visuals(doc, child, &child_frame, &bone)?;

                queue.push_back(child.name.clone());
            }
        }

        let unvisited: Vec<String> = model
            .links
            .iter()
            .filter(|l| !visited.contains(&l.name))
            .map(|l| l.name.clone())
            .collect();
        if !unvisited.is_empty() {
            return Err(ImportError::Unvisited(unvisited));
        }
        Ok(())
    }

    /// Load a link's visuals, join them into one object named after the link
    /// and bind it to `bone`
    fn add_link_visuals(
        &mut self,
        doc: &mut Document,
        link: &LinkDesc,
        link_frame: &Frame,
        bone: &str,
    ) -> Result<(), ImportError> {
        let mut objects = Vec::new();
        for visual in &link.visuals {
            if let Some(object) = self.load_visual(doc, link, visual, link_frame)? {
                objects.push(object);
            }
        }

        let mut objects = objects.into_iter();
        let Some(mut object) = objects.next() else {
            return Ok(());
        };
        for other in objects {
            object.join(other);
        }

        object.name = link.name.clone();
        object.parent_bone = Some(bone.to_string());
        let name = doc.add_object(object);
        self.report.objects.push(name);
        Ok(())
    }

    fn skip(&mut self, link: &LinkDesc, reason: String) {
        tracing::warn!("Link {}: {}, building it without this visual", link.name, reason);
        self.report.skipped.push(SkippedVisual {
            link: link.name.clone(),
            reason,
        });
    }

    fn load_visual(
        &mut self,
        doc: &mut Document,
        link: &LinkDesc,
        visual: &VisualDesc,
        link_frame: &Frame,
    ) -> Result<Option<SceneObject>, ImportError> {
        let unit_scale = Mat4::from_scale(Vec3::splat(1.0 / self.unit()));
        let scale = Vec3::from(visual.geometry.scale());
        if scale.cmpeq(Vec3::ZERO).any() || !scale.is_finite() {
            let reason = format!(
                "{} scale {:?} collapses the geometry",
                visual.geometry.kind(),
                scale.to_array()
            );
            self.skip(link, reason);
            return Ok(None);
        }

        let (name, mut mesh, slots) = match &visual.geometry {
            Geometry::Mesh { filename, .. } => {
                let path = Path::new(filename);
                let format = MeshFormat::from_path(path);
                if !format.is_supported() {
                    let ext = path
                        .extension()
                        .map(|e| e.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    self.skip(link, format!("file extension .{} of {} is not supported", ext, filename));
                    return Ok(None);
                }

                let basename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let name = truncate_name(&format!("{}.{}", link.name, basename));

                let imported = self.import_mesh(link, path, format)?;
                let mut mesh = imported.mesh;
                mesh.transform(unit_scale);
                mesh.ensure_uvs();
                if self.options.apply_weld {
                    mesh.weld(WELD_DISTANCE);
                }

                let mut slots = Vec::with_capacity(imported.materials.len() + 1);
                for source in &imported.materials {
                    slots.push(Some(self.source_material(doc, source)?));
                }
                if let Some(material) = &visual.material {
                    slots.push(Some(visual_material(doc, material)));
                }
                (name, mesh, slots)
            }
            Geometry::Cylinder { radius, length } => {
                primitive(doc, link, generate_cylinder(*radius, *length), visual)
            }
            Geometry::Cube { size } => primitive(doc, link, generate_box(*size), visual),
            Geometry::Sphere { radius } => primitive(doc, link, generate_uv_sphere(*radius), visual),
            Geometry::Empty => (
                truncate_name(&format!("{}.{}", link.name, visual.geometry.kind())),
                MeshData::default(),
                Vec::new(),
            ),
            Geometry::Unsupported { .. } => {
                self.skip(
                    link,
                    format!("geometry type {} is not supported", visual.geometry.kind()),
                );
                return Ok(None);
            }
        };

        if !matches!(visual.geometry, Geometry::Mesh { .. }) {
            mesh.transform(unit_scale);
        }

        let visual_frame = link_frame.compose(visual.origin.as_ref(), self.unit());
        let mut object = SceneObject::new(name, mesh);
        object.transform = Transform {
            scale,
            ..Transform::from_frame(&visual_frame)
        };
        if object.has_negative_scale() {
            object.mesh.flip_normals();
        }
        object.set_origin(link_frame.position);
        object.apply_scale();
        object.material_slots = slots;

        Ok(Some(object))
    }

    fn import_mesh(
        &mut self,
        link: &LinkDesc,
        path: &Path,
        format: MeshFormat,
    ) -> Result<ImportedMesh, ImportError> {
        let mesh_error = |source: MeshError| ImportError::Mesh {
            link: link.name.clone(),
            path: path.to_path_buf(),
            source,
        };

        if format != MeshFormat::Dae {
            return load_mesh(path).map_err(mesh_error);
        }

        let pre = collada::preprocess(path, self.session, self.options.texture_naming)?;
        let loaded = load_mesh(&pre.path);
        self.session.discard_temp_geometry();

        let mut imported = loaded.map_err(mesh_error)?;
        for material in &mut imported.materials {
            material.texture = pre.texture_for(&material.name).map(Path::to_path_buf);
            if let Some(color) = pre.material_colors.get(&material.name) {
                material.color = Some(*color);
            }
        }
        Ok(imported)
    }

    /// Material for a slot found in a mesh file. File materials are always
    /// created anew; duplicates are left to material merging.
    fn source_material(
        &mut self,
        doc: &mut Document,
        source: &SourceMaterial,
    ) -> Result<MaterialId, ImportError> {
        if source.name.is_empty() {
            return Ok(default_material(doc));
        }

        let base_color = match &source.texture {
            Some(texture) => {
                // textures relocated by the COLLADA preprocessor are already in the session
                let in_session = self
                    .session
                    .existing_texture_dir()
                    .is_some_and(|dir| texture.starts_with(dir));
                let path = if in_session {
                    texture.clone()
                } else {
                    collada::copy_texture(texture, self.session, self.options.texture_naming)?
                };
                BaseColor::Image(doc.materials.load_image(&path))
            }
            None => BaseColor::Flat(source.color.unwrap_or([0.8, 0.8, 0.8, 1.0])),
        };
        Ok(doc.materials.add(&source.name, base_color))
    }
}

/// Material named by a URDF visual: reuse it if it exists, otherwise create it
/// from the inline color
fn visual_material(doc: &mut Document, material: &MaterialRef) -> MaterialId {
    if material.name.is_empty() {
        return match material.color {
            Some(rgba) => doc.materials.add(DEFAULT_MATERIAL, BaseColor::Flat(rgba)),
            None => default_material(doc),
        };
    }
    if let Some(existing) = doc.materials.by_name(&material.name) {
        return existing.id;
    }
    let base_color = material
        .color
        .map(BaseColor::Flat)
        .unwrap_or(BaseColor::DEFAULT);
    doc.materials.add(&material.name, base_color)
}

fn primitive(
    doc: &mut Document,
    link: &LinkDesc,
    mesh: MeshData,
    visual: &VisualDesc,
) -> (String, MeshData, Vec<Option<MaterialId>>) {
    let material = match &visual.material {
        Some(material) => visual_material(doc, material),
        None => default_material(doc),
    };
    (
        truncate_name(&format!("{}.{}", link.name, visual.geometry.kind())),
        mesh,
        vec![Some(material)],
    )
}

fn default_material(doc: &mut Document) -> MaterialId {
    match doc.materials.by_name(DEFAULT_MATERIAL) {
        Some(material) => material.id,
        None => doc.materials.add(DEFAULT_MATERIAL, BaseColor::DEFAULT),
    }
}
