//! Document to FBX node tree

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

use super::fbx::{FbxNode, Property, object_name, p70};
use crate::builder::DEFAULT_MATERIAL;
use crate::scene::{BaseColor, Bone, Document, ImageId, MaterialId, SceneObject};
use crate::session::TEXTURE_DIR;
use crate::types::quat_to_rpy;

const CREATOR: &str = concat!("urdf-rig ", env!("CARGO_PKG_VERSION"));

/// Relative path an exported texture is referenced by
pub fn texture_reference(file_name: &str) -> String {
    format!("{}/{}", TEXTURE_DIR, file_name)
}

/// Bone rest matrix: origin at the head, Y along the bone
pub fn bone_matrix(bone: &Bone) -> Mat4 {
    let direction = (bone.tail - bone.head).try_normalize().unwrap_or(Vec3::Y);
    Mat4::from_rotation_translation(Quat::from_rotation_arc(Vec3::Y, direction), bone.head)
}

fn vec3_prop(v: Vec3) -> Vec<Property> {
    vec![
        Property::F64(f64::from(v.x)),
        Property::F64(f64::from(v.y)),
        Property::F64(f64::from(v.z)),
    ]
}

/// Lcl Translation / Rotation / Scaling of a local matrix
fn local_transform(local: Mat4) -> Vec<FbxNode> {
    let (scale, rotation, translation) = local.to_scale_rotation_translation();
    let rpy = quat_to_rpy(rotation);
    let degrees = Vec3::new(rpy[0].to_degrees(), rpy[1].to_degrees(), rpy[2].to_degrees());
    vec![
        p70("Lcl Translation", "Lcl Translation", "", "A", vec3_prop(translation)),
        p70("Lcl Rotation", "Lcl Rotation", "", "A", vec3_prop(degrees)),
        p70("Lcl Scaling", "Lcl Scaling", "", "A", vec3_prop(scale)),
    ]
}

fn connect(kind: &str, child: i64, parent: i64) -> FbxNode {
    FbxNode::value("C", kind).prop(child).prop(parent)
}

/// Assembles the top-level FBX sections for a document
pub struct SceneWriter<'a> {
    doc: &'a Document,
    next_id: i64,
    objects: Vec<FbxNode>,
    connections: Vec<FbxNode>,
    counts: HashMap<&'static str, i32>,
    bone_models: HashMap<String, (i64, Mat4)>,
    materials: HashMap<MaterialId, i64>,
    default_material: Option<i64>,
    textures: HashMap<ImageId, i64>,
}

impl<'a> SceneWriter<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            // 0 is the scene root
            next_id: 1000,
            objects: Vec::new(),
            connections: Vec::new(),
            counts: HashMap::new(),
            bone_models: HashMap::new(),
            materials: HashMap::new(),
            default_material: None,
            textures: HashMap::new(),
        }
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push_object(&mut self, node: FbxNode) {
        *self.counts.entry(node.name).or_default() += 1;
        self.objects.push(node);
    }

    /// Build every top-level section
    pub fn build(mut self) -> Vec<FbxNode> {
        self.write_armature();
        let doc = self.doc;
        for object in doc.objects() {
            self.write_object(object);
        }

        vec![
            header_extension(),
            self.global_settings(),
            documents(),
            FbxNode::new("References"),
            self.definitions(),
            FbxNode::new("Objects").children(self.objects),
            FbxNode::new("Connections").children(self.connections),
        ]
    }

    fn global_settings(&self) -> FbxNode {
        let unit = f64::from(self.doc.unit_scale) * 100.0;
        let int = |name: &str, value: i32| p70(name, "int", "Integer", "", vec![value.into()]);
        let double = |name: &str, value: f64| p70(name, "double", "Number", "", vec![value.into()]);

        FbxNode::new("GlobalSettings")
            .child(FbxNode::value("Version", 1000i32))
            .child(FbxNode::new("Properties70").children([
                int("UpAxis", 2),
                int("UpAxisSign", 1),
                int("FrontAxis", 1),
                int("FrontAxisSign", -1),
                int("CoordAxis", 0),
                int("CoordAxisSign", 1),
                int("OriginalUpAxis", 2),
                int("OriginalUpAxisSign", 1),
                double("UnitScaleFactor", unit),
                double("OriginalUnitScaleFactor", unit),
            ]))
    }

    fn definitions(&self) -> FbxNode {
        let mut types: Vec<(&str, i32)> = self.counts.iter().map(|(k, v)| (*k, *v)).collect();
        types.sort();
        let total: i32 = types.iter().map(|(_, c)| c).sum::<i32>() + 1;

        FbxNode::new("Definitions")
            .child(FbxNode::value("Version", 100i32))
            .child(FbxNode::value("Count", total))
            .child(object_type("GlobalSettings", 1))
            .children(types.into_iter().map(|(name, count)| object_type(name, count)))
    }

    fn write_armature(&mut self) {
        let doc = self.doc;
        let armature = &doc.armature;

        let model_id = self.allocate_id();
        let attribute_id = self.allocate_id();
        self.push_object(model(model_id, &armature.name, "Null", Mat4::IDENTITY));
        self.push_object(
            FbxNode::value("NodeAttribute", attribute_id)
                .prop(object_name(&armature.name, "NodeAttribute"))
                .prop("Null")
                .child(FbxNode::value("TypeFlags", "Null")),
        );
        self.connections.push(connect("OO", model_id, 0));
        self.connections.push(connect("OO", attribute_id, model_id));

        // bones are stored parents first
        for bone in armature.bones() {
            let world = bone_matrix(bone);
            let (parent_id, parent_world) = bone
                .parent
                .as_ref()
                .and_then(|p| self.bone_models.get(p).copied())
                .unwrap_or((model_id, Mat4::IDENTITY));

            let bone_id = self.allocate_id();
            let attribute_id = self.allocate_id();
            self.push_object(model(
                bone_id,
                &bone.name,
                "LimbNode",
                parent_world.inverse() * world,
            ));
            self.push_object(
                FbxNode::value("NodeAttribute", attribute_id)
                    .prop(object_name(&bone.name, "NodeAttribute"))
                    .prop("LimbNode")
                    .child(FbxNode::new("Properties70").child(p70(
                        "Size",
                        "double",
                        "Number",
                        "",
                        vec![f64::from(bone.length()).into()],
                    )))
                    .child(FbxNode::value("TypeFlags", "Skeleton")),
            );
            self.connections.push(connect("OO", bone_id, parent_id));
            self.connections.push(connect("OO", attribute_id, bone_id));
            self.bone_models.insert(bone.name.clone(), (bone_id, world));
        }
    }

    fn write_object(&mut self, object: &SceneObject) {
        let (parent_id, parent_world) = object
            .parent_bone
            .as_ref()
            .and_then(|b| self.bone_models.get(b).copied())
            .unwrap_or((0, Mat4::IDENTITY));

        // distinct materials in slot order; faces index into this list.
        // Empty slots and unknown materials share the default material.
        let doc = self.doc;
        let mut used: Vec<Option<MaterialId>> = Vec::new();
        let mut slot_map = Vec::with_capacity(object.material_slots.len());
        for slot in &object.material_slots {
            let slot = slot.filter(|id| doc.materials.get(*id).is_some());
            let index = match used.iter().position(|u| *u == slot) {
                Some(index) => index,
                None => {
                    used.push(slot);
                    used.len() - 1
                }
            };
            slot_map.push(index as i32);
        }

        let model_id = self.allocate_id();
        let geometry_id = self.allocate_id();
        let local = parent_world.inverse() * object.transform.to_matrix();
        self.push_object(model(model_id, &object.name, "Mesh", local));
        self.push_object(geometry(geometry_id, object, &slot_map, !used.is_empty()));
        self.connections.push(connect("OO", model_id, parent_id));
        self.connections.push(connect("OO", geometry_id, model_id));

        for slot in used {
            let material_id = match slot.and_then(|id| self.material(id)) {
                Some(material_id) => material_id,
                None => self.default_material(),
            };
            self.connections.push(connect("OO", material_id, model_id));
        }
    }

    /// Flat grey material for faces without one, written once
    fn default_material(&mut self) -> i64 {
        if let Some(node_id) = self.default_material {
            return node_id;
        }
        let node_id = self.allocate_id();
        let [r, g, b, a] = match BaseColor::DEFAULT {
            BaseColor::Flat(rgba) => rgba,
            BaseColor::Image(_) => [0.8, 0.8, 0.8, 1.0],
        };
        self.push_object(material_node(node_id, DEFAULT_MATERIAL, Vec3::new(r, g, b), a));
        self.default_material = Some(node_id);
        node_id
    }

    /// Material node for a document material, written once
    fn material(&mut self, id: MaterialId) -> Option<i64> {
        if let Some(node_id) = self.materials.get(&id) {
            return Some(*node_id);
        }
        let doc = self.doc;
        let material = doc.materials.get(id)?;

        let node_id = self.allocate_id();
        let diffuse = match material.base_color {
            BaseColor::Flat(rgba) => Vec3::new(rgba[0], rgba[1], rgba[2]),
            BaseColor::Image(_) => Vec3::splat(0.8),
        };
        self.push_object(material_node(node_id, &material.name, diffuse, material.alpha));
        self.materials.insert(id, node_id);

        if let BaseColor::Image(image) = material.base_color {
            if let Some(texture_id) = self.texture(image) {
                self.connections.push(
                    FbxNode::value("C", "OP")
                        .prop(texture_id)
                        .prop(node_id)
                        .prop("DiffuseColor"),
                );
            }
        }
        Some(node_id)
    }

    /// Texture and video nodes for an image, written once
    fn texture(&mut self, id: ImageId) -> Option<i64> {
        if let Some(node_id) = self.textures.get(&id) {
            return Some(*node_id);
        }
        let doc = self.doc;
        let image = doc.materials.image(id)?;
        let file_name = image
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| image.name.clone());
        let reference = texture_reference(&file_name);

        let texture_id = self.allocate_id();
        let video_id = self.allocate_id();
        self.push_object(
            FbxNode::value("Video", video_id)
                .prop(object_name(&image.name, "Video"))
                .prop("Clip")
                .child(FbxNode::value("Type", "Clip"))
                .child(FbxNode::new("Properties70").child(p70(
                    "Path",
                    "KString",
                    "XRefUrl",
                    "",
                    vec![reference.clone().into()],
                )))
                .child(FbxNode::value("UseMipMap", 0i32))
                .child(FbxNode::value("Filename", reference.clone()))
                .child(FbxNode::value("RelativeFilename", reference.clone())),
        );
        self.push_object(
            FbxNode::value("Texture", texture_id)
                .prop(object_name(&image.name, "Texture"))
                .prop("")
                .child(FbxNode::value("Type", "TextureVideoClip"))
                .child(FbxNode::value("Version", 202i32))
                .child(FbxNode::value("TextureName", object_name(&image.name, "Texture")))
                .child(FbxNode::value("Media", object_name(&image.name, "Video")))
                .child(FbxNode::value("FileName", reference.clone()))
                .child(FbxNode::value("RelativeFilename", reference)),
        );
        self.connections.push(connect("OO", video_id, texture_id));
        self.textures.insert(id, texture_id);
        Some(texture_id)
    }
}

fn header_extension() -> FbxNode {
    FbxNode::new("FBXHeaderExtension")
        .child(FbxNode::value("FBXHeaderVersion", 1003i32))
        .child(FbxNode::value("FBXVersion", super::fbx::FBX_VERSION as i32))
        .child(FbxNode::value("Creator", CREATOR))
}

fn documents() -> FbxNode {
    FbxNode::new("Documents")
        .child(FbxNode::value("Count", 1i32))
        .child(
            FbxNode::value("Document", 1i64)
                .prop("")
                .prop("Scene")
                .child(FbxNode::value("RootNode", 0i64)),
        )
}

fn object_type(name: &str, count: i32) -> FbxNode {
    FbxNode::value("ObjectType", name).child(FbxNode::value("Count", count))
}

fn material_node(id: i64, name: &str, diffuse: Vec3, alpha: f32) -> FbxNode {
    FbxNode::value("Material", id)
        .prop(object_name(name, "Material"))
        .prop("")
        .child(FbxNode::value("Version", 102i32))
        .child(FbxNode::value("ShadingModel", "Phong"))
        .child(FbxNode::value("MultiLayer", 0i32))
        .child(FbxNode::new("Properties70").children([
            p70("DiffuseColor", "Color", "", "A", vec3_prop(diffuse)),
            p70("DiffuseFactor", "Number", "", "A", vec![1.0f64.into()]),
            p70("Opacity", "double", "Number", "", vec![f64::from(alpha).into()]),
        ]))
}

fn model(id: i64, name: &str, kind: &str, local: Mat4) -> FbxNode {
    FbxNode::value("Model", id)
        .prop(object_name(name, "Model"))
        .prop(kind)
        .child(FbxNode::value("Version", 232i32))
        .child(FbxNode::new("Properties70").children(local_transform(local)))
        .child(FbxNode::value("Shading", true))
        .child(FbxNode::value("Culling", "CullingOff"))
}

fn layer_element(kind: &'static str) -> FbxNode {
    FbxNode::value(kind, 0i32).child(FbxNode::value("Version", 101i32))
}

fn layer_ref(kind: &str) -> FbxNode {
    FbxNode::new("LayerElement")
        .child(FbxNode::value("Type", kind))
        .child(FbxNode::value("TypedIndex", 0i32))
}

/// Geometry node with flat per-face normals
fn geometry(id: i64, object: &SceneObject, slot_map: &[i32], has_materials: bool) -> FbxNode {
    let mesh = &object.mesh;

    let vertices: Vec<f64> = mesh
        .vertices
        .iter()
        .flat_map(|v| v.iter().map(|c| f64::from(*c)))
        .collect();

    // last index of each polygon is stored as its bitwise NOT
    let polygon_indices: Vec<i32> = mesh
        .indices
        .chunks_exact(3)
        .flat_map(|t| [t[0] as i32, t[1] as i32, !(t[2] as i32)])
        .collect();

    let normals: Vec<f64> = mesh
        .normals
        .iter()
        .flat_map(|n| std::iter::repeat_n(*n, 3))
        .flat_map(|n| n.map(f64::from))
        .collect();

    let mut node = FbxNode::value("Geometry", id)
        .prop(object_name(&object.mesh_name, "Geometry"))
        .prop("Mesh")
        .child(FbxNode::value("GeometryVersion", 124i32))
        .child(FbxNode::value("Vertices", vertices))
        .child(FbxNode::value("PolygonVertexIndex", polygon_indices))
        .child(
            layer_element("LayerElementNormal")
                .child(FbxNode::value("Name", ""))
                .child(FbxNode::value("MappingInformationType", "ByPolygonVertex"))
                .child(FbxNode::value("ReferenceInformationType", "Direct"))
                .child(FbxNode::value("Normals", normals)),
        );
    let mut layer = FbxNode::new("Layer")
        .child(FbxNode::value("Version", 100i32))
        .child(layer_ref("LayerElementNormal"));

    if mesh.has_uvs() {
        let uvs: Vec<f64> = mesh
            .uvs
            .iter()
            .flat_map(|uv| uv.map(f64::from))
            .collect();
        let uv_index: Vec<i32> = mesh.indices.iter().map(|i| *i as i32).collect();
        node = node.child(
            layer_element("LayerElementUV")
                .child(FbxNode::value("Name", "UVMap"))
                .child(FbxNode::value("MappingInformationType", "ByPolygonVertex"))
                .child(FbxNode::value("ReferenceInformationType", "IndexToDirect"))
                .child(FbxNode::value("UV", uvs))
                .child(FbxNode::value("UVIndex", uv_index)),
        );
        layer = layer.child(layer_ref("LayerElementUV"));
    }

    if has_materials {
        let materials: Vec<i32> = mesh
            .face_materials
            .iter()
            .map(|slot| slot_map.get(*slot as usize).copied().unwrap_or(0))
            .collect();
        node = node.child(
            layer_element("LayerElementMaterial")
                .child(FbxNode::value("Name", ""))
                .child(FbxNode::value("MappingInformationType", "ByPolygon"))
                .child(FbxNode::value("ReferenceInformationType", "IndexToDirect"))
                .child(FbxNode::value("Materials", materials)),
        );
        layer = layer.child(layer_ref("LayerElementMaterial"));
    }

    node.child(layer)
}
