//! Material post-processing: robot materials, duplicate merging, renaming

use crate::description::RobotModel;
use crate::scene::{BaseColor, Document, Material, MaterialId};

/// Name segments are compared up to this many characters
pub const NAME_COMPARE_LEN: usize = 59;

/// Materials merged by [`merge_duplicate_materials`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// (removed duplicate, representative it was merged into)
    pub merged: Vec<(String, String)>,
    /// Walks over the document, including the final one that changed nothing
    pub passes: usize,
}

/// Create a flat material for each robot-level material that has a color.
/// Names already present in the document are kept as they are.
pub fn create_robot_materials(doc: &mut Document, model: &RobotModel) -> usize {
    let mut created = 0;
    for material in &model.materials {
        let Some(rgba) = material.color else {
            continue;
        };
        if doc.materials.contains(&material.name) {
            tracing::warn!("Material {} already exists", material.name);
            continue;
        }
        doc.materials.add(&material.name, BaseColor::Flat(rgba));
        created += 1;
    }
    created
}

/// Force every material fully opaque
pub fn fix_alpha(doc: &mut Document) {
    for material in doc.materials.materials_mut() {
        material.alpha = 1.0;
    }
}

/// Rename every material used by an object to `M_<robot>`; later ones get a
/// numeric suffix
pub fn rename_materials(doc: &mut Document, robot_name: &str) {
    let name = format!("M_{}", robot_name);
    for id in slot_materials(doc) {
        doc.materials.rename(id, &name);
    }
}

fn is_numeric(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
}

fn prefix(segment: &str) -> &str {
    match segment.char_indices().nth(NAME_COMPARE_LEN) {
        Some((end, _)) => &segment[..end],
        None => segment,
    }
}

/// Whether two material names refer to the same material up to a numeric
/// suffix: `red.001` matches `red.002` and `red`.
pub fn names_equivalent(a: &str, b: &str) -> bool {
    let mut a: Vec<&str> = a.split('.').collect();
    let mut b: Vec<&str> = b.split('.').collect();

    let both_suffixed = a.len() == b.len()
        && a.len() > 1
        && a.last().is_some_and(|s| is_numeric(s))
        && b.last().is_some_and(|s| is_numeric(s));
    if both_suffixed {
        a.pop();
        b.pop();
    }

    a.iter().zip(&b).all(|(x, y)| prefix(x) == prefix(y))
}

/// Flat colors must match channel for channel; images by identity
fn same_content(a: &Material, b: &Material) -> bool {
    match (a.base_color, b.base_color) {
        (BaseColor::Flat(x), BaseColor::Flat(y)) => x == y,
        (BaseColor::Image(x), BaseColor::Image(y)) => x == y,
        _ => false,
    }
}

/// Material slots of every object, in object then slot order
fn slot_materials(doc: &Document) -> Vec<MaterialId> {
    doc.objects()
        .iter()
        .flat_map(|o| o.material_slots.iter().flatten().copied())
        .collect()
}

/// Existing material named like `name` without its trailing numeric segments.
/// The shortest such name wins.
fn bare_named(doc: &Document, name: &str) -> Option<MaterialId> {
    let mut segments: Vec<&str> = name.split('.').collect();
    let mut found = None;
    while segments.len() > 1 && segments.last().is_some_and(|s| is_numeric(s)) {
        segments.pop();
        if let Some(material) = doc.materials.by_name(&segments.join(".")) {
            found = Some(material.id);
        }
    }
    found
}

fn redirect(doc: &mut Document, from: MaterialId, to: MaterialId) {
    for object in doc.objects_mut() {
        for slot in &mut object.material_slots {
            if *slot == Some(from) {
                *slot = Some(to);
            }
        }
    }
}

fn merge_pass(doc: &mut Document, check_names: bool) -> Vec<(String, String)> {
    let mut uniques: Vec<MaterialId> = Vec::new();
    let mut merged = Vec::new();

    for id in slot_materials(doc) {
        if uniques.contains(&id) {
            continue;
        }
        // already merged through an earlier slot
        let Some(material) = doc.materials.get(id).cloned() else {
            continue;
        };

        let representative = uniques
            .iter()
            .filter_map(|u| doc.materials.get(*u))
            .find(|u| {
                (!check_names || names_equivalent(&material.name, &u.name))
                    && same_content(&material, u)
            })
            .map(|u| u.id)
            .or_else(|| {
                bare_named(doc, &material.name).filter(|bare| {
                    doc.materials
                        .get(*bare)
                        .is_some_and(|b| same_content(&material, b))
                })
            });

        match representative {
            Some(target) => {
                redirect(doc, id, target);
                doc.materials.remove(id);
                let target_name = doc
                    .materials
                    .get(target)
                    .map(|m| m.name.clone())
                    .unwrap_or_default();
                tracing::debug!("Merged material {} into {}", material.name, target_name);
                merged.push((material.name, target_name));
                if !uniques.contains(&target) {
                    uniques.push(target);
                }
            }
            None => uniques.push(id),
        }
    }
    merged
}

/// Merge materials that are duplicates of one another.
///
/// Slot materials are walked in object order; each one is compared against
/// the representatives found so far, first by name (when `check_names` is
/// set) and then by content. A duplicate is replaced in every slot of the
/// document and removed. Walks repeat until nothing changes, so running this
/// twice is the same as running it once.
pub fn merge_duplicate_materials(doc: &mut Document, check_names: bool) -> MergeReport {
    let mut report = MergeReport::default();
    loop {
        report.passes += 1;
        let merged = merge_pass(doc, check_names);
        if merged.is_empty() {
            break;
        }
        report.merged.extend(merged);
    }
    tracing::info!(
        "Merged {} duplicate materials ({} remaining)",
        report.merged.len(),
        doc.materials.materials().len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::generate_box;
    use crate::scene::SceneObject;
    use std::path::Path;

    const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

    fn object_with(doc: &mut Document, name: &str, slots: &[MaterialId]) {
        let mut object = SceneObject::new(name, generate_box([1.0; 3]));
        for id in slots {
            object.push_material(Some(*id));
        }
        doc.add_object(object);
    }

    fn slot_names(doc: &Document) -> Vec<String> {
        slot_materials(doc)
            .into_iter()
            .map(|id| doc.materials.get(id).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn test_names_equivalent() {
        assert!(names_equivalent("red.001", "red.002"));
        assert!(names_equivalent("red.001", "red"));
        assert!(names_equivalent("red", "red"));
        assert!(!names_equivalent("red", "blue"));
        assert!(!names_equivalent("red.a", "red.b"));

        let long_a = format!("{}A", "x".repeat(NAME_COMPARE_LEN));
        let long_b = format!("{}B", "x".repeat(NAME_COMPARE_LEN));
        assert!(names_equivalent(&long_a, &long_b));
    }

    #[test]
    fn test_equal_rgba_is_merged() {
        let mut doc = Document::new("bot", 1.0);
        let a = doc.materials.add("red", BaseColor::Flat(RED));
        let b = doc.materials.add("red", BaseColor::Flat(RED));
        object_with(&mut doc, "a", &[a]);
        object_with(&mut doc, "b", &[b]);

        let report = merge_duplicate_materials(&mut doc, true);
        assert_eq!(report.merged, vec![("red.001".to_string(), "red".to_string())]);
        assert_eq!(doc.materials.materials().len(), 1);
        assert_eq!(slot_names(&doc), vec!["red", "red"]);
    }

    #[test]
    fn test_different_rgba_is_kept() {
        let mut doc = Document::new("bot", 1.0);
        let a = doc.materials.add("red", BaseColor::Flat(RED));
        let b = doc.materials.add("red", BaseColor::Flat([1.0, 0.0, 0.0, 0.999]));
        object_with(&mut doc, "a", &[a, b]);

        let report = merge_duplicate_materials(&mut doc, true);
        assert!(report.merged.is_empty());
        assert_eq!(doc.materials.materials().len(), 2);
    }

    #[test]
    fn test_name_check_blocks_merge() {
        let mut doc = Document::new("bot", 1.0);
        let a = doc.materials.add("paint", BaseColor::Flat(RED));
        let b = doc.materials.add("rust", BaseColor::Flat(RED));
        object_with(&mut doc, "a", &[a, b]);

        assert!(merge_duplicate_materials(&mut doc, true).merged.is_empty());
        assert_eq!(merge_duplicate_materials(&mut doc, false).merged.len(), 1);
        assert_eq!(slot_names(&doc), vec!["paint", "paint"]);
    }

    #[test]
    fn test_images_compare_by_identity() {
        let mut doc = Document::new("bot", 1.0);
        let wood = doc.materials.load_image(Path::new("/tmp/t/T_wood.png"));
        let stone = doc.materials.load_image(Path::new("/tmp/t/T_stone.png"));
        let a = doc.materials.add("mat", BaseColor::Image(wood));
        let b = doc.materials.add("mat", BaseColor::Image(wood));
        let c = doc.materials.add("mat", BaseColor::Image(stone));
        let d = doc.materials.add("mat", BaseColor::Flat(RED));
        object_with(&mut doc, "a", &[a, b, c, d]);

        let report = merge_duplicate_materials(&mut doc, true);
        assert_eq!(report.merged.len(), 1);
        assert_eq!(doc.materials.materials().len(), 3);
    }

    #[test]
    fn test_bare_named_material_absorbs_suffixed() {
        let mut doc = Document::new("bot", 1.0);
        // "grey" exists but is not used by any object yet
        doc.materials.add("grey", BaseColor::Flat([0.5, 0.5, 0.5, 1.0]));
        let suffixed = doc.materials.add("grey", BaseColor::Flat([0.5, 0.5, 0.5, 1.0]));
        object_with(&mut doc, "a", &[suffixed]);

        let report = merge_duplicate_materials(&mut doc, true);
        assert_eq!(report.merged, vec![("grey.001".to_string(), "grey".to_string())]);
        assert_eq!(slot_names(&doc), vec!["grey"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut doc = Document::new("bot", 1.0);
        let ids: Vec<MaterialId> = (0..4)
            .map(|i| {
                let color = if i % 2 == 0 { RED } else { [0.0, 1.0, 0.0, 1.0] };
                doc.materials.add("mat", BaseColor::Flat(color))
            })
            .collect();
        object_with(&mut doc, "a", &ids[..2]);
        object_with(&mut doc, "b", &ids[2..]);

        merge_duplicate_materials(&mut doc, true);
        let first: Vec<String> = slot_names(&doc);
        let count = doc.materials.materials().len();

        let second = merge_duplicate_materials(&mut doc, true);
        assert!(second.merged.is_empty());
        assert_eq!(second.passes, 1);
        assert_eq!(slot_names(&doc), first);
        assert_eq!(doc.materials.materials().len(), count);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_rename_and_alpha() {
        let mut doc = Document::new("bot", 1.0);
        let a = doc.materials.add("red", BaseColor::Flat([1.0, 0.0, 0.0, 0.3]));
        let b = doc.materials.add("blue", BaseColor::Flat([0.0, 0.0, 1.0, 1.0]));
        object_with(&mut doc, "a", &[a, b]);

        fix_alpha(&mut doc);
        assert!(doc.materials.materials().iter().all(|m| m.alpha == 1.0));

        rename_materials(&mut doc, "bot");
        assert_eq!(slot_names(&doc), vec!["M_bot", "M_bot.001"]);
    }

    #[test]
    fn test_robot_materials_skip_existing() {
        let model = RobotModel::parse(
            r#"<robot name="bot">
                <material name="red"><color rgba="1 0 0 1"/></material>
                <material name="tex"><texture filename="t.png"/></material>
                <link name="base"/>
              </robot>"#,
        )
        .unwrap();
        let mut doc = Document::new("bot", 1.0);
        assert_eq!(create_robot_materials(&mut doc, &model), 1);
        assert_eq!(create_robot_materials(&mut doc, &model), 0);
        assert_eq!(doc.materials.materials().len(), 1);
    }
}
