//! COLLADA geometry loading
//!
//! Reads `library_geometries` (triangles, polylist and polygons with
//! positions and the first texture coordinate set), places each
//! `instance_geometry` of the visual scene with its node transforms, and maps
//! material symbols to material names through `instance_material` and
//! `library_materials`. The `up_axis` is not applied; files are expected to
//! have gone through the COLLADA preprocessor, which forces `Z_UP`.

use std::collections::HashMap;
use std::path::Path;

use glam::{Mat4, Quat, Vec3};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{ImportedMesh, MeshData, MeshError, SourceMaterial};
use crate::xml::{attr, local_name, parse_floats, text};

#[derive(Debug, Default)]
struct DaeSource {
    values: Vec<f32>,
    stride: usize,
}

impl DaeSource {
    fn element(&self, index: usize, width: usize) -> Option<&[f32]> {
        let start = index * self.stride.max(1);
        self.values.get(start..start + width)
    }
}

#[derive(Debug, Clone)]
struct DaeInput {
    semantic: String,
    source: String,
    offset: usize,
    set: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrimitiveKind {
    Triangles,
    Polylist,
    Polygons,
}

#[derive(Debug)]
struct DaePrimitive {
    kind: PrimitiveKind,
    material: Option<String>,
    inputs: Vec<DaeInput>,
    vcount: Vec<usize>,
    p: Vec<usize>,
}

impl DaePrimitive {
    fn stride(&self) -> usize {
        self.inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1)
    }
}

#[derive(Debug, Default)]
struct DaeGeometry {
    sources: HashMap<String, DaeSource>,
    /// `<vertices>` id -> its inputs
    vertices: HashMap<String, Vec<DaeInput>>,
    primitives: Vec<DaePrimitive>,
}

#[derive(Debug)]
struct GeometryInstance {
    geometry: String,
    transform: Mat4,
    /// material symbol -> material id
    materials: HashMap<String, String>,
}

#[derive(Debug)]
struct DaeDocument {
    meter: f32,
    geometry_order: Vec<String>,
    geometries: HashMap<String, DaeGeometry>,
    /// material id -> material name
    material_names: HashMap<String, String>,
    instances: Vec<GeometryInstance>,
}

impl Default for DaeDocument {
    fn default() -> Self {
        Self {
            meter: 1.0,
            geometry_order: Vec::new(),
            geometries: HashMap::new(),
            material_names: HashMap::new(),
            instances: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Parser {
    doc: DaeDocument,
    stack: Vec<String>,
    geometry: Option<(String, DaeGeometry)>,
    source: Option<String>,
    vertices: Option<String>,
    primitive: Option<DaePrimitive>,
    /// World transform of each open `<node>`
    nodes: Vec<Mat4>,
    instance: Option<GeometryInstance>,
}

/// Load the geometry of a COLLADA file
pub fn load_dae(path: impl AsRef<Path>) -> Result<ImportedMesh, MeshError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| MeshError::Io(e.to_string()))?;
    let doc = parse_document(&content)?;
    let imported = build_mesh(&doc)?;

    tracing::debug!(
        "Loaded DAE {:?}: {} geometries, {} triangles, {} materials",
        path,
        doc.geometries.len(),
        imported.mesh.triangle_count(),
        imported.materials.len()
    );
    Ok(imported)
}

fn parse_document(content: &str) -> Result<DaeDocument, MeshError> {
    let mut reader = Reader::from_str(content);
    let mut parser = Parser::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            MeshError::Parse(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;
        match event {
            Event::Start(e) => {
                let name = local_name(&e);
                parser.enter(&name, &e);
                parser.stack.push(name);
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                parser.enter(&name, &e);
                parser.leave(&name);
            }
            Event::End(_) => {
                if let Some(name) = parser.stack.pop() {
                    parser.leave(&name);
                }
            }
            Event::Text(t) => parser.on_text(&text(&t))?,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(parser.doc)
}

fn parse_input(e: &BytesStart) -> Option<DaeInput> {
    Some(DaeInput {
        semantic: attr(e, "semantic")?,
        source: attr(e, "source")?.trim_start_matches('#').to_string(),
        offset: attr(e, "offset").and_then(|s| s.parse().ok()).unwrap_or(0),
        set: attr(e, "set").and_then(|s| s.parse().ok()).unwrap_or(0),
    })
}

fn parse_indices(s: &str) -> Result<Vec<usize>, MeshError> {
    s.split_whitespace()
        .map(|v| v.parse::<usize>().map_err(|e| MeshError::Parse(format!("{}: {}", v, e))))
        .collect()
}

fn floats(s: &str) -> Result<Vec<f32>, MeshError> {
    parse_floats(s).map_err(|e| MeshError::Parse(e.to_string()))
}

impl Parser {
    fn parent(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    fn enter(&mut self, name: &str, e: &BytesStart) {
        match name {
            "unit" if self.parent() == Some("asset") => {
                if let Some(meter) = attr(e, "meter").and_then(|m| m.parse::<f32>().ok()) {
                    self.doc.meter = meter;
                }
            }
            "geometry" => {
                if let Some(id) = attr(e, "id") {
                    self.geometry = Some((id, DaeGeometry::default()));
                }
            }
            "source" if self.parent() == Some("mesh") => {
                if let (Some((_, geometry)), Some(id)) = (&mut self.geometry, attr(e, "id")) {
                    geometry.sources.insert(
                        id.clone(),
                        DaeSource {
                            values: Vec::new(),
                            stride: 1,
                        },
                    );
                    self.source = Some(id);
                }
            }
            "accessor" => {
                let stride = attr(e, "stride").and_then(|s| s.parse().ok()).unwrap_or(1);
                if let Some(source) = self.current_source() {
                    source.stride = stride;
                }
            }
            "vertices" => self.vertices = attr(e, "id"),
            "input" => self.add_input(e),
            "triangles" | "polylist" | "polygons" if self.parent() == Some("mesh") => {
                let kind = match name {
                    "triangles" => PrimitiveKind::Triangles,
                    "polylist" => PrimitiveKind::Polylist,
                    _ => PrimitiveKind::Polygons,
                };
                self.primitive = Some(DaePrimitive {
                    kind,
                    material: attr(e, "material"),
                    inputs: Vec::new(),
                    vcount: Vec::new(),
                    p: Vec::new(),
                });
            }
            "material" if self.parent() == Some("library_materials") => {
                if let Some(id) = attr(e, "id") {
                    let name = attr(e, "name").unwrap_or_else(|| id.clone());
                    self.doc.material_names.insert(id, name);
                }
            }
            "node" => {
                let parent = self.nodes.last().copied().unwrap_or(Mat4::IDENTITY);
                self.nodes.push(parent);
            }
            "instance_geometry" => {
                if let Some(url) = attr(e, "url") {
                    self.instance = Some(GeometryInstance {
                        geometry: url.trim_start_matches('#').to_string(),
                        transform: self.nodes.last().copied().unwrap_or(Mat4::IDENTITY),
                        materials: HashMap::new(),
                    });
                }
            }
            "instance_material" => {
                if let (Some(instance), Some(symbol), Some(target)) =
                    (&mut self.instance, attr(e, "symbol"), attr(e, "target"))
                {
                    instance
                        .materials
                        .insert(symbol, target.trim_start_matches('#').to_string());
                }
            }
            _ => {}
        }
    }

    fn leave(&mut self, name: &str) {
        match name {
            "geometry" => {
                if let Some((id, geometry)) = self.geometry.take() {
                    self.doc.geometry_order.push(id.clone());
                    self.doc.geometries.insert(id, geometry);
                }
            }
            "source" => self.source = None,
            "vertices" => self.vertices = None,
            "triangles" | "polylist" | "polygons" => {
                if let (Some((_, geometry)), Some(primitive)) =
                    (&mut self.geometry, self.primitive.take())
                {
                    geometry.primitives.push(primitive);
                }
            }
            "node" => {
                self.nodes.pop();
            }
            "instance_geometry" => {
                if let Some(instance) = self.instance.take() {
                    self.doc.instances.push(instance);
                }
            }
            _ => {}
        }
    }

    fn current_source(&mut self) -> Option<&mut DaeSource> {
        let id = self.source.as_ref()?;
        self.geometry.as_mut()?.1.sources.get_mut(id)
    }

    fn add_input(&mut self, e: &BytesStart) {
        let Some(input) = parse_input(e) else {
            return;
        };
        if let Some(primitive) = &mut self.primitive {
            primitive.inputs.push(input);
        } else if let (Some(id), Some((_, geometry))) = (&self.vertices, &mut self.geometry) {
            geometry.vertices.entry(id.clone()).or_default().push(input);
        }
    }

    fn on_text(&mut self, value: &str) -> Result<(), MeshError> {
        let Some(element) = self.stack.last().map(String::as_str) else {
            return Ok(());
        };
        let in_node = self.stack.len() >= 2 && self.stack[self.stack.len() - 2] == "node";

        match element {
            "float_array" => {
                let values = floats(value)?;
                if let Some(source) = self.current_source() {
                    source.values = values;
                }
            }
            "vcount" => {
                let vcount = parse_indices(value)?;
                if let Some(primitive) = &mut self.primitive {
                    primitive.vcount = vcount;
                }
            }
            "p" => {
                let indices = parse_indices(value)?;
                if let Some(primitive) = &mut self.primitive {
                    if primitive.kind == PrimitiveKind::Polygons {
                        let stride = primitive.stride();
                        primitive.vcount.push(indices.len() / stride);
                    }
                    primitive.p.extend(indices);
                }
            }
            "matrix" | "translate" | "rotate" | "scale" if in_node => {
                let local = node_transform(element, &floats(value)?)?;
                if let Some(top) = self.nodes.last_mut() {
                    *top *= local;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn node_transform(kind: &str, v: &[f32]) -> Result<Mat4, MeshError> {
    let bad = || MeshError::Parse(format!("<{}> has {} values", kind, v.len()));
    Ok(match (kind, v.len()) {
        // row-major in the file
        ("matrix", 16) => {
            let mut cols = [0.0; 16];
            cols.copy_from_slice(v);
            Mat4::from_cols_array(&cols).transpose()
        }
        ("translate", 3) => Mat4::from_translation(Vec3::new(v[0], v[1], v[2])),
        ("scale", 3) => Mat4::from_scale(Vec3::new(v[0], v[1], v[2])),
        ("rotate", 4) => {
            let axis = Vec3::new(v[0], v[1], v[2]);
            if axis.length_squared() > 0.0 {
                Mat4::from_quat(Quat::from_axis_angle(axis.normalize(), v[3].to_radians()))
            } else {
                Mat4::IDENTITY
            }
        }
        _ => return Err(bad()),
    })
}

fn build_mesh(doc: &DaeDocument) -> Result<ImportedMesh, MeshError> {
    let identity_instances;
    let instances: &[GeometryInstance] = if doc.instances.is_empty() {
        identity_instances = doc
            .geometry_order
            .iter()
            .map(|id| GeometryInstance {
                geometry: id.clone(),
                transform: Mat4::IDENTITY,
                materials: HashMap::new(),
            })
            .collect::<Vec<_>>();
        &identity_instances
    } else {
        &doc.instances
    };

    let unit = Mat4::from_scale(Vec3::splat(doc.meter));
    let mut imported = ImportedMesh::default();
    let mut slots: HashMap<String, u32> = HashMap::new();
    let mut any_uvs = false;

    for instance in instances {
        let Some(geometry) = doc.geometries.get(&instance.geometry) else {
            tracing::warn!("instance of unknown geometry {}", instance.geometry);
            continue;
        };

        let mut piece = MeshData::default();
        for primitive in &geometry.primitives {
            let material = resolve_material(doc, instance, primitive.material.as_deref());
            let slot = *slots.entry(material.clone()).or_insert_with(|| {
                imported.materials.push(SourceMaterial::named(material));
                (imported.materials.len() - 1) as u32
            });
            any_uvs |= append_primitive(&mut piece, geometry, primitive, slot)?;
        }

        piece.transform(unit * instance.transform);
        imported.mesh.append(&piece, 0);
    }

    if !any_uvs {
        imported.mesh.uvs.clear();
    }
    Ok(imported)
}

/// Material name a primitive's symbol refers to; empty when it has none
fn resolve_material(doc: &DaeDocument, instance: &GeometryInstance, symbol: Option<&str>) -> String {
    let Some(symbol) = symbol else {
        return String::new();
    };
    let id = instance
        .materials
        .get(symbol)
        .map(String::as_str)
        .unwrap_or(symbol);
    doc.material_names
        .get(id)
        .cloned()
        .unwrap_or_else(|| id.to_string())
}

/// Append one primitive to `mesh`; returns whether it carried texture coordinates
fn append_primitive(
    mesh: &mut MeshData,
    geometry: &DaeGeometry,
    primitive: &DaePrimitive,
    slot: u32,
) -> Result<bool, MeshError> {
    let stride = primitive.stride();
    let vertex_input = primitive
        .inputs
        .iter()
        .find(|i| i.semantic == "VERTEX")
        .ok_or_else(|| MeshError::Parse("primitive without VERTEX input".to_string()))?;

    let position_id = geometry
        .vertices
        .get(&vertex_input.source)
        .and_then(|inputs| inputs.iter().find(|i| i.semantic == "POSITION"))
        .map(|i| i.source.as_str())
        .unwrap_or(vertex_input.source.as_str());
    let positions = geometry
        .sources
        .get(position_id)
        .ok_or_else(|| MeshError::Parse(format!("missing position source {}", position_id)))?;

    let texcoord = primitive
        .inputs
        .iter()
        .filter(|i| i.semantic == "TEXCOORD")
        .min_by_key(|i| i.set);
    let uv_source = texcoord.and_then(|t| geometry.sources.get(&t.source).map(|s| (t.offset, s)));

    let counts: Vec<usize> = match primitive.kind {
        PrimitiveKind::Triangles => vec![3; primitive.p.len() / (3 * stride)],
        PrimitiveKind::Polylist | PrimitiveKind::Polygons => primitive.vcount.clone(),
    };

    let index_at = |corner: usize, offset: usize| {
        primitive
            .p
            .get(corner * stride + offset)
            .copied()
            .ok_or_else(|| MeshError::Parse("index list shorter than declared".to_string()))
    };

    let mut map: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    let mut corner = 0usize;
    for count in counts {
        let mut polygon = Vec::with_capacity(count);
        for _ in 0..count {
            let pi = index_at(corner, vertex_input.offset)?;
            let ti = match uv_source {
                Some((offset, _)) => Some(index_at(corner, offset)?),
                None => None,
            };
            corner += 1;

            let index = match map.get(&(pi, ti)) {
                Some(&index) => index,
                None => {
                    let p = positions.element(pi, 3).ok_or_else(|| {
                        MeshError::Parse(format!("position index {} out of range", pi))
                    })?;
                    let uv = match (uv_source, ti) {
                        (Some((_, source)), Some(ti)) => {
                            let t = source.element(ti, 2).ok_or_else(|| {
                                MeshError::Parse(format!("texcoord index {} out of range", ti))
                            })?;
                            [t[0], t[1]]
                        }
                        _ => [0.0, 0.0],
                    };
                    mesh.vertices.push([p[0], p[1], p[2]]);
                    mesh.uvs.push(uv);
                    let index = (mesh.vertices.len() - 1) as u32;
                    map.insert((pi, ti), index);
                    index
                }
            };
            polygon.push(index);
        }

        for k in 1..polygon.len().saturating_sub(1) {
            mesh.indices
                .extend_from_slice(&[polygon[0], polygon[k], polygon[k + 1]]);
            mesh.normals.push([0.0, 0.0, 1.0]);
            mesh.face_materials.push(slot);
        }
    }

    Ok(uv_source.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    const QUAD: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><unit name="centimeter" meter="0.01"/><up_axis>Z_UP</up_axis></asset>
  <library_materials>
    <material id="steel-material" name="Steel"><instance_effect url="#steel-effect"/></material>
  </library_materials>
  <library_geometries>
    <geometry id="plate-mesh" name="plate">
      <mesh>
        <source id="plate-positions">
          <float_array id="plate-positions-array" count="12">0 0 0 100 0 0 100 100 0 0 100 0</float_array>
          <technique_common><accessor source="#plate-positions-array" count="4" stride="3"/></technique_common>
        </source>
        <source id="plate-uv">
          <float_array id="plate-uv-array" count="8">0 0 1 0 1 1 0 1</float_array>
          <technique_common><accessor source="#plate-uv-array" count="4" stride="2"/></technique_common>
        </source>
        <vertices id="plate-vertices"><input semantic="POSITION" source="#plate-positions"/></vertices>
        <polylist material="steel-symbol" count="1">
          <input semantic="VERTEX" source="#plate-vertices" offset="0"/>
          <input semantic="TEXCOORD" source="#plate-uv" offset="1" set="0"/>
          <vcount>4</vcount>
          <p>0 0 1 1 2 2 3 3</p>
        </polylist>
      </mesh>
    </geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="Scene">
      <node id="plate">
        <translate>0 0 50</translate>
        <instance_geometry url="#plate-mesh">
          <bind_material><technique_common>
            <instance_material symbol="steel-symbol" target="#steel-material"/>
          </technique_common></bind_material>
        </instance_geometry>
      </node>
    </visual_scene>
  </library_visual_scenes>
</COLLADA>"##;

    #[test]
    fn test_load_polylist_with_node_transform_and_unit() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("plate.dae");
        std::fs::write(&path, QUAD).unwrap();

        let imported = load_dae(&path).unwrap();
        let mesh = &imported.mesh;
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertices.len(), 4);
        assert!(mesh.has_uvs());
        assert_eq!(imported.materials, vec![SourceMaterial::named("Steel")]);
        assert_eq!(mesh.face_materials, vec![0, 0]);

        let (min, max) = mesh.bounds().unwrap();
        assert_relative_eq!(max[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(min[2], 0.5, epsilon = 1e-6);
        assert_relative_eq!(mesh.normals[0][2], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_geometry_without_scene_and_material() {
        let doc = r##"<COLLADA><library_geometries><geometry id="g"><mesh>
            <source id="pos"><float_array count="9">0 0 0 1 0 0 0 1 0</float_array>
              <technique_common><accessor stride="3"/></technique_common></source>
            <vertices id="v"><input semantic="POSITION" source="#pos"/></vertices>
            <triangles count="1"><input semantic="VERTEX" source="#v" offset="0"/><p>0 1 2</p></triangles>
            </mesh></geometry></library_geometries></COLLADA>"##;
        let parsed = parse_document(doc).unwrap();
        let imported = build_mesh(&parsed).unwrap();
        assert_eq!(imported.mesh.triangle_count(), 1);
        assert!(!imported.mesh.has_uvs());
        assert_eq!(imported.materials, vec![SourceMaterial::named("")]);
    }

    #[test]
    fn test_out_of_range_index_fails() {
        let doc = r##"<COLLADA><library_geometries><geometry id="g"><mesh>
            <source id="pos"><float_array count="3">0 0 0</float_array>
              <technique_common><accessor stride="3"/></technique_common></source>
            <vertices id="v"><input semantic="POSITION" source="#pos"/></vertices>
            <triangles count="1"><input semantic="VERTEX" source="#v" offset="0"/><p>0 1 2</p></triangles>
            </mesh></geometry></library_geometries></COLLADA>"##;
        let parsed = parse_document(doc).unwrap();
        assert!(matches!(build_mesh(&parsed), Err(MeshError::Parse(_))));
    }
}
