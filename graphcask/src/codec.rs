//! Shared entity encoding: the same tagged binary format backs WAL create
//! records and the snapshot's node/edge sections (spec's "each entity is
//! encoded in the same payload format used for WAL create records").

use graphcask_core::{Edge, Error, Node, Result, Value};
use std::collections::BTreeMap;

pub(crate) fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

pub(crate) fn read_len_prefixed<'a>(
    bytes: &'a [u8],
    op: &'static str,
) -> Result<(&'a [u8], &'a [u8])> {
    if bytes.len() < 4 {
        return Err(Error::MarshalFailed(format!("{op}: truncated length prefix")));
    }
    let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let rest = &bytes[4..];
    if rest.len() < len {
        return Err(Error::MarshalFailed(format!("{op}: truncated payload")));
    }
    Ok((&rest[..len], &rest[len..]))
}

pub(crate) fn write_string(out: &mut Vec<u8>, s: &str) {
    write_len_prefixed(out, s.as_bytes());
}

pub(crate) fn read_string<'a>(bytes: &'a [u8], op: &'static str) -> Result<(String, &'a [u8])> {
    let (raw, rest) = read_len_prefixed(bytes, op)?;
    let s = String::from_utf8(raw.to_vec())
        .map_err(|_| Error::MarshalFailed(format!("{op}: invalid utf-8")))?;
    Ok((s, rest))
}

pub fn encode_properties(out: &mut Vec<u8>, props: &BTreeMap<String, Value>) {
    out.extend_from_slice(&(props.len() as u32).to_le_bytes());
    for (key, value) in props {
        write_string(out, key);
        write_len_prefixed(out, &value.encode());
    }
}

pub fn decode_properties<'a>(
    bytes: &'a [u8],
    op: &'static str,
) -> Result<(BTreeMap<String, Value>, &'a [u8])> {
    if bytes.len() < 4 {
        return Err(Error::MarshalFailed(format!("{op}: truncated property count")));
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let mut rest = &bytes[4..];
    let mut props = BTreeMap::new();
    for _ in 0..count {
        let (key, after_key) = read_string(rest, op)?;
        let (value_bytes, after_value) = read_len_prefixed(after_key, op)?;
        let value = Value::decode(value_bytes)?;
        props.insert(key, value);
        rest = after_value;
    }
    Ok((props, rest))
}

fn write_optional_string(out: &mut Vec<u8>, s: &Option<String>) {
    match s {
        Some(v) => {
            out.push(1);
            write_string(out, v);
        }
        None => out.push(0),
    }
}

fn read_optional_string<'a>(
    bytes: &'a [u8],
    op: &'static str,
) -> Result<(Option<String>, &'a [u8])> {
    if bytes.is_empty() {
        return Err(Error::MarshalFailed(format!("{op}: truncated option tag")));
    }
    match bytes[0] {
        0 => Ok((None, &bytes[1..])),
        1 => {
            let (s, rest) = read_string(&bytes[1..], op)?;
            Ok((Some(s), rest))
        }
        _ => Err(Error::MarshalFailed(format!("{op}: invalid option tag"))),
    }
}

pub fn encode_node(node: &Node) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&node.id.to_le_bytes());
    out.extend_from_slice(&(node.labels.len() as u32).to_le_bytes());
    for label in &node.labels {
        write_string(&mut out, label);
    }
    encode_properties(&mut out, &node.properties);
    out.extend_from_slice(&node.created_at.to_le_bytes());
    out.extend_from_slice(&node.updated_at.to_le_bytes());
    write_optional_string(&mut out, &node.tenant);
    out
}

pub fn decode_node(bytes: &[u8]) -> Result<Node> {
    const OP: &str = "decode_node";
    if bytes.len() < 8 + 4 {
        return Err(Error::MarshalFailed(format!("{OP}: truncated header")));
    }
    let id = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let label_count = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let mut rest = &bytes[12..];
    let mut labels = Vec::with_capacity(label_count as usize);
    for _ in 0..label_count {
        let (label, after) = read_string(rest, OP)?;
        labels.push(label);
        rest = after;
    }
    let (properties, rest) = decode_properties(rest, OP)?;
    if rest.len() < 16 {
        return Err(Error::MarshalFailed(format!("{OP}: truncated timestamps")));
    }
    let created_at = i64::from_le_bytes(rest[0..8].try_into().unwrap());
    let updated_at = i64::from_le_bytes(rest[8..16].try_into().unwrap());
    let (tenant, _) = read_optional_string(&rest[16..], OP)?;
    Ok(Node {
        id,
        labels,
        properties,
        created_at,
        updated_at,
        tenant,
    })
}

pub fn encode_edge(edge: &Edge) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&edge.id.to_le_bytes());
    out.extend_from_slice(&edge.from.to_le_bytes());
    out.extend_from_slice(&edge.to.to_le_bytes());
    write_string(&mut out, &edge.edge_type);
    encode_properties(&mut out, &edge.properties);
    out.extend_from_slice(&edge.weight.to_le_bytes());
    out.extend_from_slice(&edge.created_at.to_le_bytes());
    write_optional_string(&mut out, &edge.tenant);
    out
}

pub fn decode_edge(bytes: &[u8]) -> Result<Edge> {
    const OP: &str = "decode_edge";
    if bytes.len() < 24 {
        return Err(Error::MarshalFailed(format!("{OP}: truncated header")));
    }
    let id = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let from = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let to = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
    let (edge_type, rest) = read_string(&bytes[24..], OP)?;
    let (properties, rest) = decode_properties(rest, OP)?;
    if rest.len() < 16 {
        return Err(Error::MarshalFailed(format!("{OP}: truncated weight/timestamp")));
    }
    let weight = f64::from_le_bytes(rest[0..8].try_into().unwrap());
    let created_at = i64::from_le_bytes(rest[8..16].try_into().unwrap());
    let (tenant, _) = read_optional_string(&rest[16..], OP)?;
    Ok(Edge {
        id,
        from,
        to,
        edge_type,
        properties,
        weight,
        created_at,
        tenant,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn node_round_trips() {
        let mut props = BTreeMap::new();
        props.insert("age".to_string(), Value::Int(30));
        props.insert("name".to_string(), Value::String("ada".into()));
        let node = Node {
            id: 7,
            labels: vec!["Person".into(), "Employee".into()],
            properties: props,
            created_at: 100,
            updated_at: 200,
            tenant: Some("acme".into()),
        };
        let encoded = encode_node(&node);
        let decoded = decode_node(&encoded).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn node_without_tenant_round_trips() {
        let node = Node {
            id: 1,
            labels: vec![],
            properties: BTreeMap::new(),
            created_at: 1,
            updated_at: 1,
            tenant: None,
        };
        let decoded = decode_node(&encode_node(&node)).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn edge_round_trips() {
        let mut props = BTreeMap::new();
        props.insert("since".to_string(), Value::Timestamp(123));
        let edge = Edge {
            id: 3,
            from: 1,
            to: 2,
            edge_type: "FOLLOWS".into(),
            properties: props,
            weight: 1.5,
            created_at: 10,
            tenant: None,
        };
        let decoded = decode_edge(&encode_edge(&edge)).unwrap();
        assert_eq!(decoded, edge);
    }

    #[test]
    fn decode_node_rejects_truncated_bytes() {
        let node = Node {
            id: 1,
            labels: vec!["A".into()],
            properties: BTreeMap::new(),
            created_at: 1,
            updated_at: 1,
            tenant: None,
        };
        let mut encoded = encode_node(&node);
        encoded.truncate(encoded.len() - 2);
        assert!(decode_node(&encoded).is_err());
    }
}
