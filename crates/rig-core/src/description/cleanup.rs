//! Structural cleanup of URDF documents
//!
//! Only `link`, `joint` and `material` elements survive; everything else at
//! the top level (gazebo extensions, transmissions, ros2_control blocks, ...)
//! is dropped before schema parsing.

use std::collections::{HashMap, HashSet};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::DescriptionError;
use crate::types::Pose;
use crate::xml::{attr, parse_vec3};

const STRUCTURAL_ELEMENTS: [&[u8]; 3] = [b"link", b"joint", b"material"];

/// URDF reduced to its structural elements, plus details the schema parser drops
#[derive(Debug, Clone, Default)]
pub struct CleanedUrdf {
    pub xml: String,
    /// `<origin>` elements found directly under a `<link>`
    pub link_origins: HashMap<String, Pose>,
    /// Joints that declare an `<axis>` element
    pub joints_with_axis: HashSet<String>,
}

/// Strip a URDF document down to links, joints and materials
pub fn cleanup_urdf(xml: &str) -> Result<CleanedUrdf, DescriptionError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut cleaned = CleanedUrdf::default();

    let mut depth = 0usize;
    let mut saw_root = false;
    // (element kind, name attribute) of the top-level element being copied
    let mut current: Option<(Vec<u8>, String)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| xml_error(reader.buffer_position(), e))?;

        match event {
            Event::Start(e) => {
                depth += 1;
                match depth {
                    1 => {
                        saw_root = true;
                        write(&mut writer, Event::Start(root_element(&e)))?;
                    }
                    2 => {
                        let kind = e.local_name().as_ref().to_vec();
                        if STRUCTURAL_ELEMENTS.contains(&kind.as_slice()) {
                            current = Some((kind, attr(&e, "name").unwrap_or_default()));
                            write(&mut writer, Event::Start(e))?;
                        } else {
                            reader
                                .read_to_end(e.name())
                                .map_err(|err| xml_error(reader.buffer_position(), err))?;
                            depth -= 1;
                        }
                    }
                    _ => {
                        if depth == 3 {
                            record_detail(&mut cleaned, current.as_ref(), &e)?;
                        }
                        write(&mut writer, Event::Start(e))?;
                    }
                }
            }
            Event::Empty(e) => match depth {
                0 => {
                    saw_root = true;
                    write(&mut writer, Event::Empty(root_element(&e)))?;
                }
                1 => {
                    if STRUCTURAL_ELEMENTS.contains(&e.local_name().as_ref()) {
                        write(&mut writer, Event::Empty(e))?;
                    }
                }
                _ => {
                    if depth == 2 {
                        record_detail(&mut cleaned, current.as_ref(), &e)?;
                    }
                    write(&mut writer, Event::Empty(e))?;
                }
            },
            Event::End(e) => {
                if depth == 2 {
                    current = None;
                }
                write(&mut writer, Event::End(e))?;
                depth = depth.saturating_sub(1);
            }
            Event::Text(t) if depth >= 2 => write(&mut writer, Event::Text(t))?,
            Event::CData(t) if depth >= 2 => write(&mut writer, Event::CData(t))?,
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(DescriptionError::Xml("document has no root element".to_string()));
    }

    cleaned.xml = String::from_utf8(writer.into_inner())
        .map_err(|e| DescriptionError::Xml(e.to_string()))?;
    Ok(cleaned)
}

/// New root element carrying only the `name` attribute
fn root_element(e: &BytesStart) -> BytesStart<'static> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let root = BytesStart::new(tag);
    match attr(e, "name") {
        Some(name) => root.with_attributes([("name", name.as_str())]),
        None => root,
    }
}

fn record_detail(
    cleaned: &mut CleanedUrdf,
    current: Option<&(Vec<u8>, String)>,
    e: &BytesStart,
) -> Result<(), DescriptionError> {
    let Some((kind, name)) = current else {
        return Ok(());
    };

    match (kind.as_slice(), e.local_name().as_ref()) {
        (b"link", b"origin") => {
            let pose = parse_origin(e, name)?;
            cleaned.link_origins.insert(name.clone(), pose);
        }
        (b"joint", b"axis") => {
            cleaned.joints_with_axis.insert(name.clone());
        }
        _ => {}
    }
    Ok(())
}

fn parse_origin(e: &BytesStart, owner: &str) -> Result<Pose, DescriptionError> {
    let mut pose = Pose::default();
    for (key, slot) in [("xyz", &mut pose.xyz), ("rpy", &mut pose.rpy)] {
        if let Some(value) = attr(e, key) {
            *slot = parse_vec3(&value).ok_or_else(|| DescriptionError::InvalidAttribute {
                element: owner.to_string(),
                attribute: key.to_string(),
                value: value.clone(),
            })?;
        }
    }
    Ok(pose)
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), DescriptionError> {
    writer
        .write_event(event)
        .map_err(|e| DescriptionError::Xml(e.to_string()))
}

fn xml_error(position: impl std::fmt::Display, error: impl std::fmt::Display) -> DescriptionError {
    DescriptionError::Xml(format!("at byte {}: {}", position, error))
}
