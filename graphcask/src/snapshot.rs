//! Snapshot capture and load: a length-prefixed-sections file captured
//! under the store's global read lock, written to a temp file, fsynced,
//! and atomically renamed into place.

use crate::codec::{decode_edge, decode_node, encode_edge, encode_node, read_string, write_string};
use graphcask_core::{Edge, Error, Node, Result, ValueType};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum IndexDefinition {
    Single { field: String, value_type: ValueType },
    Composite { fields: Vec<(String, ValueType)> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHeader {
    pub version: u32,
    pub store_created_at: i64,
    pub last_applied_lsn: u64,
    pub next_node_id: u64,
    pub next_edge_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub header: SnapshotHeader,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub index_definitions: Vec<IndexDefinition>,
}

fn value_type_tag(t: ValueType) -> u8 {
    match t {
        ValueType::String => 0,
        ValueType::Int => 1,
        ValueType::Float => 2,
        ValueType::Bool => 3,
        ValueType::Timestamp => 4,
        ValueType::Bytes => 5,
        ValueType::StringArray => 6,
        ValueType::IntArray => 7,
        ValueType::FloatArray => 8,
        ValueType::BoolArray => 9,
    }
}

fn value_type_from_tag(tag: u8) -> Result<ValueType> {
    Ok(match tag {
        0 => ValueType::String,
        1 => ValueType::Int,
        2 => ValueType::Float,
        3 => ValueType::Bool,
        4 => ValueType::Timestamp,
        5 => ValueType::Bytes,
        6 => ValueType::StringArray,
        7 => ValueType::IntArray,
        8 => ValueType::FloatArray,
        9 => ValueType::BoolArray,
        _ => return Err(Error::MarshalFailed("snapshot: unknown value type tag".into())),
    })
}

impl Snapshot {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.header.version.to_le_bytes());
        out.extend_from_slice(&self.header.store_created_at.to_le_bytes());
        out.extend_from_slice(&self.header.last_applied_lsn.to_le_bytes());
        out.extend_from_slice(&self.header.next_node_id.to_le_bytes());
        out.extend_from_slice(&self.header.next_edge_id.to_le_bytes());

        out.extend_from_slice(&(self.nodes.len() as u32).to_le_bytes());
        for node in &self.nodes {
            let encoded = encode_node(node);
            out.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
            out.extend_from_slice(&encoded);
        }

        out.extend_from_slice(&(self.edges.len() as u32).to_le_bytes());
        for edge in &self.edges {
            let encoded = encode_edge(edge);
            out.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
            out.extend_from_slice(&encoded);
        }

        out.extend_from_slice(&(self.index_definitions.len() as u32).to_le_bytes());
        for def in &self.index_definitions {
            match def {
                IndexDefinition::Single { field, value_type } => {
                    out.push(0);
                    write_string(&mut out, field);
                    out.push(value_type_tag(*value_type));
                }
                IndexDefinition::Composite { fields } => {
                    out.push(1);
                    out.extend_from_slice(&(fields.len() as u32).to_le_bytes());
                    for (field, value_type) in fields {
                        write_string(&mut out, field);
                        out.push(value_type_tag(*value_type));
                    }
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        const OP: &str = "Snapshot::decode";
        if bytes.len() < 4 + 8 + 8 + 8 + 8 {
            return Err(Error::MarshalFailed(format!("{OP}: truncated header")));
        }
        let version = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let store_created_at = i64::from_le_bytes(bytes[4..12].try_into().unwrap());
        let last_applied_lsn = u64::from_le_bytes(bytes[12..20].try_into().unwrap());
        let next_node_id = u64::from_le_bytes(bytes[20..28].try_into().unwrap());
        let next_edge_id = u64::from_le_bytes(bytes[28..36].try_into().unwrap());
        let mut rest = &bytes[36..];

        if rest.len() < 4 {
            return Err(Error::MarshalFailed(format!("{OP}: truncated node count")));
        }
        let node_count = u32::from_le_bytes(rest[0..4].try_into().unwrap());
        rest = &rest[4..];
        let mut nodes = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            if rest.len() < 4 {
                return Err(Error::MarshalFailed(format!("{OP}: truncated node length")));
            }
            let len = u32::from_le_bytes(rest[0..4].try_into().unwrap()) as usize;
            rest = &rest[4..];
            if rest.len() < len {
                return Err(Error::MarshalFailed(format!("{OP}: truncated node body")));
            }
            nodes.push(decode_node(&rest[..len])?);
            rest = &rest[len..];
        }

        if rest.len() < 4 {
            return Err(Error::MarshalFailed(format!("{OP}: truncated edge count")));
        }
        let edge_count = u32::from_le_bytes(rest[0..4].try_into().unwrap());
        rest = &rest[4..];
        let mut edges = Vec::with_capacity(edge_count as usize);
        for _ in 0..edge_count {
            if rest.len() < 4 {
                return Err(Error::MarshalFailed(format!("{OP}: truncated edge length")));
            }
            let len = u32::from_le_bytes(rest[0..4].try_into().unwrap()) as usize;
            rest = &rest[4..];
            if rest.len() < len {
                return Err(Error::MarshalFailed(format!("{OP}: truncated edge body")));
            }
            edges.push(decode_edge(&rest[..len])?);
            rest = &rest[len..];
        }

        if rest.len() < 4 {
            return Err(Error::MarshalFailed(format!("{OP}: truncated index def count")));
        }
        let def_count = u32::from_le_bytes(rest[0..4].try_into().unwrap());
        rest = &rest[4..];
        let mut index_definitions = Vec::with_capacity(def_count as usize);
        for _ in 0..def_count {
            if rest.is_empty() {
                return Err(Error::MarshalFailed(format!("{OP}: truncated index def tag")));
            }
            let kind = rest[0];
            rest = &rest[1..];
            match kind {
                0 => {
                    let (field, after) = read_string(rest, OP)?;
                    if after.is_empty() {
                        return Err(Error::MarshalFailed(format!(
                            "{OP}: truncated single index value type"
                        )));
                    }
                    let value_type = value_type_from_tag(after[0])?;
                    index_definitions.push(IndexDefinition::Single { field, value_type });
                    rest = &after[1..];
                }
                1 => {
                    if rest.len() < 4 {
                        return Err(Error::MarshalFailed(format!(
                            "{OP}: truncated composite field count"
                        )));
                    }
                    let field_count = u32::from_le_bytes(rest[0..4].try_into().unwrap());
                    rest = &rest[4..];
                    let mut fields = Vec::with_capacity(field_count as usize);
                    for _ in 0..field_count {
                        let (field, after) = read_string(rest, OP)?;
                        if after.is_empty() {
                            return Err(Error::MarshalFailed(format!(
                                "{OP}: truncated composite field value type"
                            )));
                        }
                        fields.push((field, value_type_from_tag(after[0])?));
                        rest = &after[1..];
                    }
                    index_definitions.push(IndexDefinition::Composite { fields });
                }
                _ => return Err(Error::MarshalFailed(format!("{OP}: unknown index def kind"))),
            }
        }

        Ok(Snapshot {
            header: SnapshotHeader {
                version,
                store_created_at,
                last_applied_lsn,
                next_node_id,
                next_edge_id,
            },
            nodes,
            edges,
            index_definitions,
        })
    }

    /// Writes to a temp file beside `path`, fsyncs, then atomically renames
    /// into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&self.encode())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        if let Some(dir) = path.parent() {
            // Best-effort directory fsync so the rename itself is durable;
            // not all platforms support opening a directory for fsync, so a
            // failure here is not fatal to the snapshot already on disk.
            if let Ok(dir_file) = File::open(dir) {
                let _ = dir_file.sync_all();
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        Ok(Some(Snapshot::decode(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            header: SnapshotHeader {
                version: SNAPSHOT_VERSION,
                store_created_at: 1000,
                last_applied_lsn: 42,
                next_node_id: 3,
                next_edge_id: 2,
            },
            nodes: vec![Node {
                id: 1,
                labels: vec!["Person".into()],
                properties: BTreeMap::new(),
                created_at: 1,
                updated_at: 1,
                tenant: None,
            }],
            edges: vec![Edge {
                id: 1,
                from: 1,
                to: 2,
                edge_type: "KNOWS".into(),
                properties: BTreeMap::new(),
                weight: 1.0,
                created_at: 1,
                tenant: None,
            }],
            index_definitions: vec![
                IndexDefinition::Single {
                    field: "age".into(),
                    value_type: ValueType::Int,
                },
                IndexDefinition::Composite {
                    fields: vec![
                        ("country".into(), ValueType::String),
                        ("age".into(), ValueType::Int),
                    ],
                },
            ],
        }
    }

    #[test]
    fn encode_decode_round_trips() {
        let snap = sample_snapshot();
        let decoded = Snapshot::decode(&snap.encode()).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn save_then_load_round_trips_and_is_atomic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.bin");
        let snap = sample_snapshot();
        snap.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());
        let loaded = Snapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded, snap);
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        assert!(Snapshot::load(&path).unwrap().is_none());
    }
}
