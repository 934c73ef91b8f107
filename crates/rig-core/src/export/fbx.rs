//! Binary FBX 7.5 encoding
//!
//! Nodes are assembled as a tree and streamed out with their 64-bit headers
//! back-patched once the node's extent is known.

use std::io::{self, Seek, SeekFrom, Write};

/// FBX file magic: "Kaydara FBX Binary  \0"
pub const FBX_MAGIC: &[u8; 21] = b"Kaydara FBX Binary  \0";

/// FBX version 7.5 (7500), which uses 64-bit node headers
pub const FBX_VERSION: u32 = 7500;

/// Size of a null record with 64-bit headers
const NULL_RECORD_SIZE: usize = 25;

/// Three u64 fields: end offset, property count, property list length
const NODE_HEADER_SIZE: usize = 24;

const FOOTER_ID: [u8; 16] = [
    0xfa, 0xbc, 0xab, 0x09, 0xd0, 0xc8, 0xd4, 0x66, 0xb1, 0x76, 0xfb, 0x83, 0x1c, 0xf7, 0x26, 0x7e,
];

const FOOTER_MAGIC: [u8; 16] = [
    0xf8, 0x5a, 0x8c, 0x6a, 0xde, 0xf5, 0xd9, 0x7e, 0xec, 0xe9, 0x0c, 0xe3, 0x75, 0x8f, 0x29, 0x0b,
];

/// Separator between an object's name and its class in name properties
pub fn object_name(name: &str, class: &str) -> String {
    format!("{}\x00\x01{}", name, class)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
    F64Array(Vec<f64>),
    I32Array(Vec<i32>),
}

impl Property {
    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Property::Bool(v) => {
                writer.write_all(b"C")?;
                writer.write_all(&[u8::from(*v)])
            }
            Property::I16(v) => {
                writer.write_all(b"Y")?;
                writer.write_all(&v.to_le_bytes())
            }
            Property::I32(v) => {
                writer.write_all(b"I")?;
                writer.write_all(&v.to_le_bytes())
            }
            Property::I64(v) => {
                writer.write_all(b"L")?;
                writer.write_all(&v.to_le_bytes())
            }
            Property::F64(v) => {
                writer.write_all(b"D")?;
                writer.write_all(&v.to_le_bytes())
            }
            Property::String(v) => {
                writer.write_all(b"S")?;
                writer.write_all(&(v.len() as u32).to_le_bytes())?;
                writer.write_all(v.as_bytes())
            }
            Property::F64Array(values) => {
                write_array(writer, b'd', values, |v| v.to_le_bytes())
            }
            Property::I32Array(values) => {
                write_array(writer, b'i', values, |v| v.to_le_bytes())
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Property::I64(v) => Some(*v),
            Property::I32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Property::F64(v) => Some(*v),
            _ => None,
        }
    }
}

/// Arrays are always written uncompressed
fn write_array<W: Write, T, const N: usize>(
    writer: &mut W,
    type_code: u8,
    values: &[T],
    to_bytes: impl Fn(&T) -> [u8; N],
) -> io::Result<()> {
    writer.write_all(&[type_code])?;
    writer.write_all(&(values.len() as u32).to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?; // encoding
    writer.write_all(&((values.len() * N) as u32).to_le_bytes())?;
    for value in values {
        writer.write_all(&to_bytes(value))?;
    }
    Ok(())
}

impl From<bool> for Property {
    fn from(v: bool) -> Self {
        Property::Bool(v)
    }
}

impl From<i16> for Property {
    fn from(v: i16) -> Self {
        Property::I16(v)
    }
}

impl From<i32> for Property {
    fn from(v: i32) -> Self {
        Property::I32(v)
    }
}

impl From<i64> for Property {
    fn from(v: i64) -> Self {
        Property::I64(v)
    }
}

impl From<f64> for Property {
    fn from(v: f64) -> Self {
        Property::F64(v)
    }
}

impl From<&str> for Property {
    fn from(v: &str) -> Self {
        Property::String(v.to_string())
    }
}

impl From<String> for Property {
    fn from(v: String) -> Self {
        Property::String(v)
    }
}

impl From<Vec<f64>> for Property {
    fn from(v: Vec<f64>) -> Self {
        Property::F64Array(v)
    }
}

impl From<Vec<i32>> for Property {
    fn from(v: Vec<i32>) -> Self {
        Property::I32Array(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FbxNode {
    pub name: &'static str,
    pub properties: Vec<Property>,
    pub children: Vec<FbxNode>,
}

impl FbxNode {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Node with a single property
    pub fn value(name: &'static str, value: impl Into<Property>) -> Self {
        Self::new(name).prop(value)
    }

    pub fn prop(mut self, value: impl Into<Property>) -> Self {
        self.properties.push(value.into());
        self
    }

    pub fn child(mut self, node: FbxNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = FbxNode>) -> Self {
        self.children.extend(nodes);
        self
    }

    /// First child with the given name
    pub fn find(&self, name: &str) -> Option<&FbxNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FbxNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn write<W: Write + Seek>(&self, writer: &mut W) -> io::Result<()> {
        let start_pos = writer.stream_position()?;
        writer.write_all(&[0u8; NODE_HEADER_SIZE])?;
        writer.write_all(&[self.name.len() as u8])?;
        writer.write_all(self.name.as_bytes())?;

        let properties_start = writer.stream_position()?;
        for property in &self.properties {
            property.write(writer)?;
        }
        let property_list_len = writer.stream_position()? - properties_start;

        // leaf nodes with properties carry no null record
        if !self.children.is_empty() || self.properties.is_empty() {
            for child in &self.children {
                child.write(writer)?;
            }
            write_null_record(writer)?;
        }

        let end_pos = writer.stream_position()?;
        writer.seek(SeekFrom::Start(start_pos))?;
        writer.write_all(&end_pos.to_le_bytes())?;
        writer.write_all(&(self.properties.len() as u64).to_le_bytes())?;
        writer.write_all(&property_list_len.to_le_bytes())?;
        writer.seek(SeekFrom::Start(end_pos))?;
        Ok(())
    }
}

/// `P` entry of a `Properties70` block
pub fn p70(name: &str, type1: &str, type2: &str, flags: &str, values: Vec<Property>) -> FbxNode {
    let mut node = FbxNode::new("P")
        .prop(name)
        .prop(type1)
        .prop(type2)
        .prop(flags);
    node.properties.extend(values);
    node
}

fn write_null_record<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&[0u8; NULL_RECORD_SIZE])
}

fn write_footer<W: Write + Seek>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&FOOTER_ID)?;
    writer.write_all(&[0u8; 4])?;

    let pos = writer.stream_position()?;
    let padding = match pos % 16 {
        0 => 16,
        rem => 16 - rem,
    };
    writer.write_all(&vec![0u8; padding as usize])?;

    writer.write_all(&FBX_VERSION.to_le_bytes())?;
    writer.write_all(&[0u8; 120])?;
    writer.write_all(&FOOTER_MAGIC)
}

/// Write a complete FBX file made of the given top-level nodes
pub fn write_document<W: Write + Seek>(writer: &mut W, nodes: &[FbxNode]) -> io::Result<()> {
    writer.write_all(FBX_MAGIC)?;
    writer.write_all(&[0x1A, 0x00])?;
    writer.write_all(&FBX_VERSION.to_le_bytes())?;

    for node in nodes {
        node.write(writer)?;
    }
    write_null_record(writer)?;
    write_footer(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(nodes: &[FbxNode]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        write_document(&mut buffer, nodes).unwrap();
        buffer.into_inner()
    }

    fn read_u64(data: &[u8], at: usize) -> u64 {
        u64::from_le_bytes(data[at..at + 8].try_into().unwrap())
    }

    #[test]
    fn test_header() {
        let data = encode(&[]);
        assert_eq!(&data[0..21], FBX_MAGIC);
        let version = u32::from_le_bytes([data[23], data[24], data[25], data[26]]);
        assert_eq!(version, FBX_VERSION);
        assert_eq!(&data[data.len() - 16..], &FOOTER_MAGIC);
    }

    #[test]
    fn test_leaf_node_layout() {
        let data = encode(&[FbxNode::value("Count", 7i32)]);
        let node = 27;
        // 24 header bytes + name + 'I' and an i32
        let end = read_u64(&data, node);
        assert_eq!(end as usize, node + 24 + 1 + 5 + 5);
        assert_eq!(read_u64(&data, node + 8), 1);
        assert_eq!(read_u64(&data, node + 16), 5);
        assert_eq!(&data[node + 25..node + 30], b"Count");
        // top-level null record follows immediately
        assert!(data[end as usize..end as usize + 25].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_nested_node_end_offset() {
        let tree = FbxNode::new("Objects").child(FbxNode::value("Version", 1i32));
        let data = encode(&[tree]);
        let outer_end = read_u64(&data, 27) as usize;
        let inner = 27 + 24 + 1 + "Objects".len();
        let inner_end = read_u64(&data, inner) as usize;
        // children, then the node's own null record
        assert_eq!(outer_end, inner_end + 25);
        // empty property list
        assert_eq!(read_u64(&data, 27 + 8), 0);
    }

    #[test]
    fn test_array_encoding() {
        let mut buffer = Vec::new();
        Property::I32Array(vec![0, 1, -3])
            .write(&mut buffer)
            .unwrap();
        assert_eq!(buffer[0], b'i');
        assert_eq!(u32::from_le_bytes(buffer[1..5].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(buffer[5..9].try_into().unwrap()), 0);
        assert_eq!(u32::from_le_bytes(buffer[9..13].try_into().unwrap()), 12);
        assert_eq!(buffer.len(), 13 + 12);
    }

    #[test]
    fn test_object_name_separator() {
        assert_eq!(object_name("base", "Model").as_bytes()[4..6], [0x00, 0x01]);
    }
}
