//! COLLADA preprocessing
//!
//! Before a `.dae` file is loaded its `up_axis` is forced to `Z_UP` (and
//! written when missing, since COLLADA then means `Y_UP`), every
//! image is copied into the session texture directory, and the
//! material -> effect -> sampler -> surface -> image chain is resolved so the
//! builder knows which texture backs which material.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::config::TextureNaming;
use crate::session::{Session, TEXTURE_DIR};
use crate::xml::{attr, local_name, parse_floats, text};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ColladaError {
    #[error("IO error on {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },

    #[error("Malformed COLLADA document {}: {reason}", path.display())]
    Xml { path: PathBuf, reason: String },

    #[error("Failed to copy texture {}: {reason}", path.display())]
    Texture { path: PathBuf, reason: String },
}

/// material name -> { sampler sid -> relocated image path }
pub type MaterialTextures = BTreeMap<String, BTreeMap<String, Option<PathBuf>>>;

/// Result of preprocessing one COLLADA file
#[derive(Debug, Clone, Default)]
pub struct Preprocessed {
    /// File to load: the rewritten temporary document, or the source itself
    pub path: PathBuf,
    pub rewritten: bool,
    pub material_textures: MaterialTextures,
    /// Flat diffuse color per material name, for untextured materials
    pub material_colors: HashMap<String, [f32; 4]>,
}

impl Preprocessed {
    /// First resolved texture of a material, in sampler order
    pub fn texture_for(&self, material: &str) -> Option<&Path> {
        self.material_textures
            .get(material)?
            .values()
            .find_map(|p| p.as_deref())
    }
}

/// Stable hash of a directory path, reduced to three decimal digits
pub fn directory_hash(dir: &Path) -> u32 {
    // FNV-1a
    let mut hash: u32 = 0x811c_9dc5;
    for byte in dir.to_string_lossy().bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash % 1000
}

/// Name a relocated texture gets in the session texture directory
pub fn relocated_texture_name(source: &Path, naming: TextureNaming) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    match naming {
        TextureNaming::Hashed => {
            let dir = source.parent().unwrap_or(Path::new(""));
            format!("T_{}_{}{}", stem, directory_hash(dir), ext)
        }
        TextureNaming::Literal => format!("T_{}{}", stem, ext),
    }
}

/// Copy a texture into the session texture directory under its relocated name
pub fn copy_texture(
    source: &Path,
    session: &mut Session,
    naming: TextureNaming,
) -> Result<PathBuf, ColladaError> {
    let texture_dir = session.texture_dir().map_err(|e| ColladaError::Io {
        path: PathBuf::from(TEXTURE_DIR),
        reason: e.to_string(),
    })?;
    let dest = texture_dir.join(relocated_texture_name(source, naming));
    std::fs::copy(source, &dest).map_err(|e| ColladaError::Texture {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })?;
    tracing::debug!("Copied texture {:?} to {:?}", source, dest);
    Ok(dest)
}

/// Links of the material graph, keyed the way COLLADA references them
#[derive(Debug, Default)]
struct MaterialGraph {
    /// (material name, effect id) in document order
    material_effect: Vec<(String, String)>,
    /// effect id -> sampler sids
    effect_samplers: HashMap<String, Vec<String>>,
    /// (effect id, sampler sid) -> surface sid
    sampler_surface: HashMap<(String, String), String>,
    /// (effect id, surface sid) -> image id
    surface_image: HashMap<(String, String), String>,
    /// image id or name -> relocated path
    image_paths: HashMap<String, PathBuf>,
    effect_colors: HashMap<String, [f32; 4]>,
}

impl MaterialGraph {
    fn join(&self) -> (MaterialTextures, HashMap<String, [f32; 4]>) {
        let mut textures = MaterialTextures::new();
        let mut colors = HashMap::new();

        for (material, effect) in &self.material_effect {
            let samplers = self
                .effect_samplers
                .get(effect)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let entry = textures.entry(material.clone()).or_default();
            for sid in samplers {
                let key = (effect.clone(), sid.clone());
                let image = self
                    .sampler_surface
                    .get(&key)
                    .and_then(|surface| self.surface_image.get(&(effect.clone(), surface.clone())))
                    .and_then(|image| self.image_paths.get(image))
                    .cloned();
                entry.insert(sid.clone(), image);
            }

            if let Some(color) = self.effect_colors.get(effect) {
                colors.insert(material.clone(), *color);
            }
        }

        (textures, colors)
    }
}

/// Element currently being read, for attributes needed by later text nodes
#[derive(Debug, Default)]
struct Scope {
    material: Option<String>,
    effect: Option<String>,
    param: Option<String>,
    image: Vec<String>,
}

struct Preprocessor<'a> {
    source: &'a Path,
    source_dir: PathBuf,
    session: &'a mut Session,
    naming: TextureNaming,
    graph: MaterialGraph,
    scope: Scope,
    /// The top-level `<asset>` has been reached, or the root had none
    asset_seen: bool,
    up_axis_seen: bool,
    changed: bool,
}

/// Rewrite and analyse a COLLADA file.
///
/// The rewritten document is written to the session's temporary geometry path
/// only when something changed; otherwise the returned path is the source.
pub fn preprocess(
    path: &Path,
    session: &mut Session,
    naming: TextureNaming,
) -> Result<Preprocessed, ColladaError> {
    let content = std::fs::read_to_string(path).map_err(|e| ColladaError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut pre = Preprocessor {
        source: path,
        source_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        session,
        naming,
        graph: MaterialGraph::default(),
        scope: Scope::default(),
        asset_seen: false,
        up_axis_seen: false,
        changed: false,
    };
    let output = pre.rewrite(&content)?;
    let (material_textures, material_colors) = pre.graph.join();

    let (out_path, rewritten) = if pre.changed {
        let tmp = pre.session.temp_geometry_path().map_err(|e| ColladaError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(&tmp, output).map_err(|e| ColladaError::Io {
            path: tmp.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!("Rewrote {:?} to {:?}", path, tmp);
        (tmp, true)
    } else {
        (path.to_path_buf(), false)
    };

    Ok(Preprocessed {
        path: out_path,
        rewritten,
        material_textures,
        material_colors,
    })
}

impl Preprocessor<'_> {
    fn rewrite(&mut self, content: &str) -> Result<Vec<u8>, ColladaError> {
        let mut reader = Reader::from_str(content);
        let mut writer = Writer::new(Vec::with_capacity(content.len()));
        let mut stack: Vec<String> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| self.xml_error(format!("at byte {}: {}", reader.buffer_position(), e)))?;

            match event {
                Event::Start(e) => {
                    let name = local_name(&e);
                    self.check_asset(&mut writer, &stack, &name)?;
                    self.enter(&stack, &name, &e);
                    stack.push(name);
                    self.write(&mut writer, Event::Start(e))?;
                }
                Event::Empty(e) => {
                    let name = local_name(&e);
                    self.check_asset(&mut writer, &stack, &name)?;
                    if name == "asset" && stack.len() == 1 {
                        // <asset/>: open it so the up axis can go inside
                        let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        self.write(&mut writer, Event::Start(e))?;
                        self.write_up_axis(&mut writer)?;
                        self.write(&mut writer, Event::End(BytesEnd::new(tag)))?;
                        continue;
                    }
                    self.enter(&stack, &name, &e);
                    self.leave(&name);
                    self.write(&mut writer, Event::Empty(e))?;
                }
                Event::End(e) => {
                    if let Some(name) = stack.pop() {
                        if name == "asset" && stack.len() == 1 && !self.up_axis_seen {
                            self.write_up_axis(&mut writer)?;
                        }
                        self.leave(&name);
                    }
                    self.write(&mut writer, Event::End(e))?;
                }
                Event::Text(t) => {
                    let value = text(&t);
                    match self.on_text(&stack, &value)? {
                        Some(replacement) => {
                            self.write(&mut writer, Event::Text(BytesText::new(&replacement)))?
                        }
                        None => self.write(&mut writer, Event::Text(t))?,
                    }
                }
                Event::Eof => break,
                other => self.write(&mut writer, other)?,
            }
        }

        Ok(writer.into_inner())
    }

    /// COLLADA defaults to Y_UP without an `<up_axis>`; make sure the root
    /// starts with an `<asset>` so one can be written
    fn check_asset(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        stack: &[String],
        name: &str,
    ) -> Result<(), ColladaError> {
        if self.asset_seen || stack.len() != 1 {
            return Ok(());
        }
        self.asset_seen = true;
        if name != "asset" {
            self.write(writer, Event::Start(BytesStart::new("asset")))?;
            self.write_up_axis(writer)?;
            self.write(writer, Event::End(BytesEnd::new("asset")))?;
        }
        Ok(())
    }

    fn write_up_axis(&mut self, writer: &mut Writer<Vec<u8>>) -> Result<(), ColladaError> {
        tracing::debug!("{:?}: no up axis, writing Z_UP", self.source);
        self.up_axis_seen = true;
        self.changed = true;
        self.write(writer, Event::Start(BytesStart::new("up_axis")))?;
        self.write(writer, Event::Text(BytesText::new("Z_UP")))?;
        self.write(writer, Event::End(BytesEnd::new("up_axis")))
    }

    fn enter(&mut self, stack: &[String], name: &str, e: &BytesStart) {
        let inside = |parent: &str| stack.last().is_some_and(|s| s == parent);
        match name {
            "material" if inside("library_materials") => {
                self.scope.material = attr(e, "name").or_else(|| attr(e, "id"));
            }
            "instance_effect" => {
                if let (Some(material), Some(url)) = (&self.scope.material, attr(e, "url")) {
                    let effect = url.trim_start_matches('#').to_string();
                    self.graph.material_effect.push((material.clone(), effect));
                }
            }
            "effect" if inside("library_effects") => {
                self.scope.effect = attr(e, "id");
            }
            "newparam" => {
                self.scope.param = attr(e, "sid");
            }
            "image" if inside("library_images") => {
                self.scope.image = [attr(e, "id"), attr(e, "name")].into_iter().flatten().collect();
            }
            _ => {}
        }
    }

    fn leave(&mut self, name: &str) {
        match name {
            "material" => self.scope.material = None,
            "effect" => self.scope.effect = None,
            "newparam" => self.scope.param = None,
            "image" => self.scope.image.clear(),
            _ => {}
        }
    }

    /// Handle a text node; returns replacement text when it must be rewritten
    fn on_text(&mut self, stack: &[String], value: &str) -> Result<Option<String>, ColladaError> {
        let ends_with = |tail: &[&str]| {
            stack.len() >= tail.len()
                && stack[stack.len() - tail.len()..]
                    .iter()
                    .zip(tail)
                    .all(|(a, b)| a == b)
        };
        let value = value.trim();

        if ends_with(&["asset", "up_axis"]) {
            self.up_axis_seen = true;
            if value != "Z_UP" {
                tracing::debug!("{:?}: up axis {} -> Z_UP", self.source, value);
                self.changed = true;
                return Ok(Some("Z_UP".to_string()));
            }
            return Ok(None);
        }

        if (ends_with(&["image", "init_from"]) || ends_with(&["image", "init_from", "ref"]))
            && !self.scope.image.is_empty()
            && !value.is_empty()
        {
            let relocated = self.relocate_texture(value)?;
            self.changed = true;
            return Ok(Some(relocated));
        }

        let (Some(effect), param) = (self.scope.effect.clone(), self.scope.param.clone()) else {
            return Ok(None);
        };

        if let Some(sid) = param {
            if ends_with(&["surface", "init_from"]) {
                self.graph
                    .surface_image
                    .insert((effect, sid), value.to_string());
            } else if ends_with(&["sampler2D", "source"]) {
                self.graph
                    .effect_samplers
                    .entry(effect.clone())
                    .or_default()
                    .push(sid.clone());
                self.graph
                    .sampler_surface
                    .insert((effect, sid), value.to_string());
            }
        } else if ends_with(&["diffuse", "color"]) {
            if let Ok(values) = parse_floats(value) {
                let color = match values.as_slice() {
                    [r, g, b, a] => Some([*r, *g, *b, *a]),
                    [r, g, b] => Some([*r, *g, *b, 1.0]),
                    _ => None,
                };
                if let Some(color) = color {
                    self.graph.effect_colors.insert(effect, color);
                }
            }
        }

        Ok(None)
    }

    /// Copy a referenced image into the session and return its new reference
    fn relocate_texture(&mut self, reference: &str) -> Result<String, ColladaError> {
        let relative = reference.strip_prefix("file://").unwrap_or(reference);
        let relative = Path::new(relative);
        let source = if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.source_dir.join(relative)
        };

        let dest = copy_texture(&source, self.session, self.naming)?;

        for key in &self.scope.image {
            self.graph.image_paths.insert(key.clone(), dest.clone());
        }

        let file = dest
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("{}/{}", TEXTURE_DIR, file))
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), ColladaError> {
        writer
            .write_event(event)
            .map_err(|e| self.xml_error(e.to_string()))
    }

    fn xml_error(&self, reason: String) -> ColladaError {
        ColladaError::Xml {
            path: self.source.to_path_buf(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const TEXTURED: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><up_axis>Y_UP</up_axis></asset>
  <library_images>
    <image id="wood-img" name="wood-img"><init_from>textures/wood.png</init_from></image>
  </library_images>
  <library_effects>
    <effect id="wood-effect">
      <profile_COMMON>
        <newparam sid="wood-surface"><surface type="2D"><init_from>wood-img</init_from></surface></newparam>
        <newparam sid="wood-sampler"><sampler2D><source>wood-surface</source></sampler2D></newparam>
        <technique sid="common"><lambert><diffuse><texture texture="wood-sampler" texcoord="UVMap"/></diffuse></lambert></technique>
      </profile_COMMON>
    </effect>
    <effect id="paint-effect">
      <profile_COMMON>
        <technique sid="common"><phong><diffuse><color sid="diffuse">0.8 0.1 0.1 1</color></diffuse></phong></technique>
      </profile_COMMON>
    </effect>
  </library_effects>
  <library_materials>
    <material id="wood-material" name="Wood"><instance_effect url="#wood-effect"/></material>
    <material id="paint-material" name="Paint"><instance_effect url="#paint-effect"/></material>
  </library_materials>
</COLLADA>"##;

    fn fixture(dir: &Path, content: &str) -> PathBuf {
        fs::create_dir_all(dir.join("textures")).unwrap();
        fs::write(dir.join("textures/wood.png"), b"png").unwrap();
        let path = dir.join("part.dae");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_rewrites_up_axis_and_relocates_images() {
        let temp = tempdir().unwrap();
        let path = fixture(temp.path(), TEXTURED);
        let mut session = Session::new();

        let result = preprocess(&path, &mut session, TextureNaming::Literal).unwrap();
        assert!(result.rewritten);
        assert_ne!(result.path, path);

        let rewritten = fs::read_to_string(&result.path).unwrap();
        assert!(rewritten.contains("<up_axis>Z_UP</up_axis>"));
        assert!(rewritten.contains("<init_from>texture/T_wood.png</init_from>"));
        // the source is untouched
        assert!(fs::read_to_string(&path).unwrap().contains("Y_UP"));

        let texture = session.existing_texture_dir().unwrap().join("T_wood.png");
        assert_eq!(fs::read(&texture).unwrap(), b"png");
    }

    #[test]
    fn test_material_graph() {
        let temp = tempdir().unwrap();
        let path = fixture(temp.path(), TEXTURED);
        let mut session = Session::new();

        let result = preprocess(&path, &mut session, TextureNaming::Hashed).unwrap();
        let wood = &result.material_textures["Wood"];
        let image = wood["wood-sampler"].as_ref().unwrap();
        let expected = relocated_texture_name(&temp.path().join("textures/wood.png"), TextureNaming::Hashed);
        assert_eq!(image.file_name().unwrap().to_string_lossy(), expected);
        assert_eq!(result.texture_for("Wood"), Some(image.as_path()));

        assert!(result.material_textures["Paint"].is_empty());
        assert_eq!(result.material_colors["Paint"], [0.8, 0.1, 0.1, 1.0]);
        assert!(result.texture_for("Paint").is_none());
    }

    #[test]
    fn test_unchanged_document_is_not_rewritten() {
        let temp = tempdir().unwrap();
        let content = r#"<COLLADA><asset><up_axis>Z_UP</up_axis></asset></COLLADA>"#;
        let path = temp.path().join("plain.dae");
        fs::write(&path, content).unwrap();
        let mut session = Session::new();

        let result = preprocess(&path, &mut session, TextureNaming::Hashed).unwrap();
        assert!(!result.rewritten);
        assert_eq!(result.path, path);
        assert!(session.existing_texture_dir().is_none());
    }

    #[test]
    fn test_missing_up_axis_is_added() {
        let temp = tempdir().unwrap();
        let mut session = Session::new();
        let cases = [
            (
                "unit_only.dae",
                r#"<COLLADA><asset><unit meter="1"/></asset><library_geometries/></COLLADA>"#,
            ),
            ("empty_asset.dae", r#"<COLLADA><asset/><library_geometries/></COLLADA>"#),
            ("no_asset.dae", r#"<COLLADA><library_geometries/></COLLADA>"#),
        ];

        for (file, content) in cases {
            let path = temp.path().join(file);
            fs::write(&path, content).unwrap();
            let result = preprocess(&path, &mut session, TextureNaming::Hashed).unwrap();
            assert!(result.rewritten, "{file}");

            let rewritten = fs::read_to_string(&result.path).unwrap();
            assert_eq!(rewritten.matches("<up_axis>Z_UP</up_axis>").count(), 1, "{file}");
            let asset = rewritten.find("<asset>").unwrap();
            let up_axis = rewritten.find("<up_axis>").unwrap();
            let geometries = rewritten.find("<library_geometries/>").unwrap();
            assert!(asset < up_axis && up_axis < geometries, "{file}: {rewritten}");
        }
    }

    #[test]
    fn test_missing_texture_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("part.dae");
        fs::write(&path, TEXTURED).unwrap();
        let mut session = Session::new();

        assert!(matches!(
            preprocess(&path, &mut session, TextureNaming::Hashed),
            Err(ColladaError::Texture { .. })
        ));
    }

    #[test]
    fn test_hashed_names_depend_on_directory() {
        let a = relocated_texture_name(Path::new("/pkg_a/meshes/base.png"), TextureNaming::Hashed);
        let b = relocated_texture_name(Path::new("/pkg_b/meshes/base.png"), TextureNaming::Hashed);
        assert!(a.starts_with("T_base_") && a.ends_with(".png"));
        assert_eq!(
            a,
            relocated_texture_name(Path::new("/pkg_a/meshes/base.png"), TextureNaming::Hashed)
        );
        assert!(directory_hash(Path::new("/pkg_b/meshes")) < 1000);
        // not guaranteed distinct in general, but these two differ
        assert_ne!(a, b);
    }
}
