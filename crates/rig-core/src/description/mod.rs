//! Robot description model
//!
//! A URDF document is cleaned down to its structural elements, parsed with
//! `urdf-rs`, and turned into a [`RobotModel`]: links, joints, materials, the
//! root link, and the child/parent maps the chain builder walks.

mod cleanup;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use glam::Vec3;

pub use cleanup::{CleanedUrdf, cleanup_urdf};

use crate::resolve::{PackageResolver, ResolveError};
use crate::types::{Geometry, JointType, Pose};

/// Errors that can occur while reading a robot description
#[derive(Debug, Clone, thiserror::Error)]
pub enum DescriptionError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Failed to parse URDF: {0}")]
    Urdf(String),

    #[error("Invalid {attribute}=\"{value}\" on {element}")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },

    #[error("Empty URDF: no links defined")]
    EmptyRobot,

    #[error("Duplicate link name: {0}")]
    DuplicateLink(String),

    #[error("Duplicate joint name: {0}")]
    DuplicateJoint(String),

    #[error("Joint {joint} references unknown link {link}")]
    LinkNotFound { joint: String, link: String },

    #[error("Link {link} has more than one parent joint ({first}, {second})")]
    MultipleParents {
        link: String,
        first: String,
        second: String,
    },

    #[error("No root link: the joint graph is cyclic")]
    NoRoot,

    #[error("Multiple root links: {}", .0.join(", "))]
    MultipleRoots(Vec<String>),

    #[error("Links not reachable from root {root}: {}", .links.join(", "))]
    Unreachable { root: String, links: Vec<String> },

    #[error("Link {link}: {source}")]
    MeshPath {
        link: String,
        #[source]
        source: ResolveError,
    },
}

/// Material reference on a visual
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRef {
    pub name: String,
    /// Inline color, if the visual declares one
    pub color: Option<[f32; 4]>,
}

/// Robot-level `<material>` definition
#[derive(Debug, Clone, PartialEq)]
pub struct RobotMaterial {
    pub name: String,
    pub color: Option<[f32; 4]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualDesc {
    pub origin: Option<Pose>,
    pub geometry: Geometry,
    pub material: Option<MaterialRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkDesc {
    pub name: String,
    /// Offset declared directly on the link
    pub origin: Option<Pose>,
    pub visuals: Vec<VisualDesc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointDesc {
    pub name: String,
    pub joint_type: JointType,
    pub parent: String,
    pub child: String,
    pub origin: Option<Pose>,
    /// Declared rotation axis; `None` when the joint has no `<axis>`
    pub axis: Option<Vec3>,
}

/// Parsed and validated robot description
#[derive(Debug, Clone)]
pub struct RobotModel {
    pub name: String,
    pub links: Vec<LinkDesc>,
    pub joints: Vec<JointDesc>,
    pub materials: Vec<RobotMaterial>,
    root: String,
    link_index: HashMap<String, usize>,
    joint_index: HashMap<String, usize>,
    /// link -> [(joint, child link)] in document order
    child_map: HashMap<String, Vec<(String, String)>>,
    /// link -> (joint, parent link)
    parent_map: HashMap<String, (String, String)>,
}

impl RobotModel {
    /// Read and parse a URDF file
    pub fn from_file(path: &Path) -> Result<Self, DescriptionError> {
        let xml = std::fs::read_to_string(path).map_err(|e| DescriptionError::Io(e.to_string()))?;
        Self::parse(&xml)
    }

    /// Parse a URDF document
    pub fn parse(xml: &str) -> Result<Self, DescriptionError> {
        let cleaned = cleanup_urdf(xml)?;
        let robot = urdf_rs::read_from_string(&cleaned.xml)
            .map_err(|e| DescriptionError::Urdf(e.to_string()))?;
        Self::from_urdf(robot, &cleaned)
    }

    fn from_urdf(robot: urdf_rs::Robot, cleaned: &CleanedUrdf) -> Result<Self, DescriptionError> {
        if robot.links.is_empty() {
            return Err(DescriptionError::EmptyRobot);
        }

        let materials = robot
            .materials
            .iter()
            .map(|m| RobotMaterial {
                name: m.name.clone(),
                color: m.color.as_ref().map(|c| convert_rgba(&c.rgba)),
            })
            .collect();

        let mut links = Vec::with_capacity(robot.links.len());
        let mut link_index = HashMap::new();
        for urdf_link in &robot.links {
            if link_index.contains_key(&urdf_link.name) {
                return Err(DescriptionError::DuplicateLink(urdf_link.name.clone()));
            }
            link_index.insert(urdf_link.name.clone(), links.len());
            links.push(LinkDesc {
                name: urdf_link.name.clone(),
                origin: cleaned.link_origins.get(&urdf_link.name).copied(),
                visuals: urdf_link.visual.iter().map(convert_visual).collect(),
            });
        }

        let mut joints = Vec::with_capacity(robot.joints.len());
        let mut joint_index = HashMap::new();
        let mut child_map: HashMap<String, Vec<(String, String)>> = HashMap::new();
        let mut parent_map: HashMap<String, (String, String)> = HashMap::new();

        for urdf_joint in &robot.joints {
            if joint_index.contains_key(&urdf_joint.name) {
                return Err(DescriptionError::DuplicateJoint(urdf_joint.name.clone()));
            }
            for link in [&urdf_joint.parent.link, &urdf_joint.child.link] {
                if !link_index.contains_key(link) {
                    return Err(DescriptionError::LinkNotFound {
                        joint: urdf_joint.name.clone(),
                        link: link.clone(),
                    });
                }
            }

            let child = urdf_joint.child.link.clone();
            let parent = urdf_joint.parent.link.clone();
            if let Some((first, _)) = parent_map.get(&child) {
                return Err(DescriptionError::MultipleParents {
                    link: child,
                    first: first.clone(),
                    second: urdf_joint.name.clone(),
                });
            }

            let origin = Pose::from(&urdf_joint.origin);
            let axis = cleaned
                .joints_with_axis
                .contains(&urdf_joint.name)
                .then(|| {
                    let xyz = &urdf_joint.axis.xyz.0;
                    Vec3::new(xyz[0] as f32, xyz[1] as f32, xyz[2] as f32)
                });

            child_map
                .entry(parent.clone())
                .or_default()
                .push((urdf_joint.name.clone(), child.clone()));
            parent_map.insert(child.clone(), (urdf_joint.name.clone(), parent.clone()));

            joint_index.insert(urdf_joint.name.clone(), joints.len());
            joints.push(JointDesc {
                name: urdf_joint.name.clone(),
                joint_type: JointType::from(&urdf_joint.joint_type),
                parent,
                child,
                origin: (!origin.is_identity()).then_some(origin),
                axis,
            });
        }

        let roots: Vec<String> = links
            .iter()
            .filter(|l| !parent_map.contains_key(&l.name))
            .map(|l| l.name.clone())
            .collect();

        let root = match roots.as_slice() {
            [] => return Err(DescriptionError::NoRoot),
            [root] => root.clone(),
            _ => return Err(DescriptionError::MultipleRoots(roots)),
        };

        let model = Self {
            name: robot.name,
            links,
            joints,
            materials,
            root,
            link_index,
            joint_index,
            child_map,
            parent_map,
        };
        model.check_reachability()?;
        Ok(model)
    }

    /// Every link must be reachable from the root. With a single root and one
    /// parent per link this only fails for cycles detached from the root.
    fn check_reachability(&self) -> Result<(), DescriptionError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::from([self.root.as_str()]);
        while let Some(link) = queue.pop_front() {
            if !seen.insert(link) {
                continue;
            }
            for (_, child) in self.children(link) {
                queue.push_back(child);
            }
        }

        let unreachable: Vec<String> = self
            .links
            .iter()
            .filter(|l| !seen.contains(l.name.as_str()))
            .map(|l| l.name.clone())
            .collect();

        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(DescriptionError::Unreachable {
                root: self.root.clone(),
                links: unreachable,
            })
        }
    }

    /// Name of the root link
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn root_link(&self) -> &LinkDesc {
        &self.links[self.link_index[&self.root]]
    }

    pub fn link(&self, name: &str) -> Option<&LinkDesc> {
        self.link_index.get(name).map(|&i| &self.links[i])
    }

    pub fn joint(&self, name: &str) -> Option<&JointDesc> {
        self.joint_index.get(name).map(|&i| &self.joints[i])
    }

    /// Outgoing `(joint, child link)` pairs of a link, in document order
    pub fn children(&self, link: &str) -> &[(String, String)] {
        self.child_map.get(link).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Incoming `(joint, parent link)` of a link; `None` for the root
    pub fn parent(&self, link: &str) -> Option<&(String, String)> {
        self.parent_map.get(link)
    }

    /// Rewrite every mesh reference to an absolute, existing path.
    ///
    /// Fails at the first link whose reference cannot be resolved. Returns the
    /// number of mesh references rewritten.
    pub fn resolve_mesh_paths(
        &mut self,
        resolver: &mut PackageResolver,
    ) -> Result<usize, DescriptionError> {
        let mut count = 0;
        for link in &mut self.links {
            for visual in &mut link.visuals {
                if let Geometry::Mesh { filename, .. } = &mut visual.geometry {
                    let path = resolver
                        .resolve_uri(filename)
                        .map_err(|source| DescriptionError::MeshPath {
                            link: link.name.clone(),
                            source,
                        })?;
                    tracing::debug!("{}: {} -> {}", link.name, filename, path.display());
                    *filename = path.to_string_lossy().into_owned();
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

fn convert_rgba(rgba: &urdf_rs::Vec4) -> [f32; 4] {
    [
        rgba.0[0] as f32,
        rgba.0[1] as f32,
        rgba.0[2] as f32,
        rgba.0[3] as f32,
    ]
}

fn convert_visual(visual: &urdf_rs::Visual) -> VisualDesc {
    let origin = Pose::from(&visual.origin);
    let material = visual
        .material
        .as_ref()
        .filter(|m| !m.name.is_empty() || m.color.is_some())
        .map(|m| MaterialRef {
            name: m.name.clone(),
            color: m.color.as_ref().map(|c| convert_rgba(&c.rgba)),
        });

    VisualDesc {
        origin: (!origin.is_identity()).then_some(origin),
        geometry: Geometry::from(&visual.geometry),
        material,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn urdf(body: &str) -> String {
        format!(r#"<?xml version="1.0"?><robot name="test_bot">{}</robot>"#, body)
    }

    const CHAIN: &str = r#"
        <material name="red"><color rgba="1 0 0 1"/></material>
        <link name="base"><visual><geometry><cylinder radius="0.1" length="0.2"/></geometry>
            <material name="red"/></visual></link>
        <link name="upper"/>
        <link name="lower"/>
        <link name="side"/>
        <joint name="shoulder" type="revolute">
            <parent link="base"/><child link="upper"/>
            <origin xyz="0 0 0.5"/><axis xyz="0 1 0"/>
            <limit lower="-1" upper="1" effort="1" velocity="1"/>
        </joint>
        <joint name="elbow" type="continuous">
            <parent link="upper"/><child link="lower"/><origin xyz="0 0 0.4"/>
        </joint>
        <joint name="mount" type="fixed"><parent link="base"/><child link="side"/></joint>
    "#;

    #[test]
    fn test_parse_chain_maps() {
        let model = RobotModel::parse(&urdf(CHAIN)).unwrap();
        assert_eq!(model.name, "test_bot");
        assert_eq!(model.root(), "base");
        assert_eq!(model.links.len(), 4);
        assert_eq!(
            model.children("base"),
            &[
                ("shoulder".to_string(), "upper".to_string()),
                ("mount".to_string(), "side".to_string())
            ]
        );
        assert_eq!(
            model.parent("lower"),
            Some(&("elbow".to_string(), "upper".to_string()))
        );
        assert!(model.parent("base").is_none());
        assert!(model.children("lower").is_empty());
    }

    #[test]
    fn test_axis_only_when_declared() {
        let model = RobotModel::parse(&urdf(CHAIN)).unwrap();
        assert_eq!(model.joint("shoulder").unwrap().axis, Some(Vec3::Y));
        assert_eq!(model.joint("elbow").unwrap().axis, None);
        assert_eq!(model.joint("mount").unwrap().origin, None);
        assert_eq!(
            model.joint("shoulder").unwrap().origin,
            Some(Pose::from_position([0.0, 0.0, 0.5]))
        );
    }

    #[test]
    fn test_visual_geometry_and_material() {
        let model = RobotModel::parse(&urdf(CHAIN)).unwrap();
        let base = model.root_link();
        assert_eq!(base.visuals.len(), 1);
        assert!(matches!(base.visuals[0].geometry, Geometry::Cylinder { .. }));
        assert_eq!(base.visuals[0].material.as_ref().unwrap().name, "red");
        assert_eq!(model.materials[0].color, Some([1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_empty_robot() {
        assert!(matches!(
            RobotModel::parse(&urdf("")),
            Err(DescriptionError::EmptyRobot)
        ));
    }

    #[test]
    fn test_unknown_link_in_joint() {
        let body = r#"<link name="a"/><joint name="j" type="fixed"><parent link="a"/><child link="ghost"/></joint>"#;
        assert!(matches!(
            RobotModel::parse(&urdf(body)),
            Err(DescriptionError::LinkNotFound { .. })
        ));
    }

    #[test]
    fn test_disconnected_link_is_rejected() {
        let body = r#"<link name="a"/><link name="b"/><link name="island"/>
            <joint name="j" type="fixed"><parent link="a"/><child link="b"/></joint>"#;
        match RobotModel::parse(&urdf(body)) {
            Err(DescriptionError::MultipleRoots(roots)) => {
                assert_eq!(roots, vec!["a".to_string(), "island".to_string()])
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_detached_cycle_is_unreachable() {
        let body = r#"<link name="root"/><link name="c1"/><link name="c2"/>
            <joint name="j1" type="fixed"><parent link="c1"/><child link="c2"/></joint>
            <joint name="j2" type="fixed"><parent link="c2"/><child link="c1"/></joint>"#;
        assert!(matches!(
            RobotModel::parse(&urdf(body)),
            Err(DescriptionError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_duplicate_joint_rejected() {
        let body = r#"<link name="a"/><link name="b"/><link name="c"/>
            <joint name="j" type="fixed"><parent link="a"/><child link="b"/></joint>
            <joint name="j" type="fixed"><parent link="b"/><child link="c"/></joint>"#;
        match RobotModel::parse(&urdf(body)) {
            Err(DescriptionError::DuplicateJoint(name)) => assert_eq!(name, "j"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_two_parents_rejected() {
        let body = r#"<link name="a"/><link name="b"/><link name="c"/>
            <joint name="j1" type="fixed"><parent link="a"/><child link="c"/></joint>
            <joint name="j2" type="fixed"><parent link="b"/><child link="c"/></joint>"#;
        assert!(matches!(
            RobotModel::parse(&urdf(body)),
            Err(DescriptionError::MultipleParents { .. })
        ));
    }

    #[test]
    fn test_malformed_document_fails_whole_parse() {
        assert!(RobotModel::parse("<robot name=\"x\"><link name=\"a\">").is_err());
    }

    #[test]
    fn test_resolve_mesh_paths_names_offending_link() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("ok.stl"), b"solid a\nendsolid a\n").unwrap();
        let body = r#"
            <link name="a"><visual><geometry><mesh filename="file://ok.stl"/></geometry></visual></link>
            <link name="b"><visual><geometry><mesh filename="ftp://host/b.stl"/></geometry></visual></link>
            <joint name="j" type="fixed"><parent link="a"/><child link="b"/></joint>"#;
        let mut model = RobotModel::parse(&urdf(body)).unwrap();
        let mut resolver = PackageResolver::new(temp.path());

        match model.resolve_mesh_paths(&mut resolver) {
            Err(DescriptionError::MeshPath { link, source }) => {
                assert_eq!(link, "b");
                assert!(matches!(source, ResolveError::UnsupportedScheme { .. }));
            }
            other => panic!("unexpected: {:?}", other),
        }
        // the link before the offending one was already rewritten
        assert_eq!(
            model.link("a").unwrap().visuals[0].geometry.mesh_path(),
            Some(temp.path().join("ok.stl"))
        );
    }
}
