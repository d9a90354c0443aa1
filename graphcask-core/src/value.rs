use crate::error::{Error, Result};

const TAG_STRING: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_TIMESTAMP: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_STRING_ARRAY: u8 = 6;
const TAG_INT_ARRAY: u8 = 7;
const TAG_FLOAT_ARRAY: u8 = 8;
const TAG_BOOL_ARRAY: u8 = 9;

/// A typed property value. Tag and raw bytes round-trip exactly; decoding
/// against the wrong requested type is a typed error, never a panic.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Seconds since the Unix epoch.
    Timestamp(i64),
    Bytes(Vec<u8>),
    StringArray(Vec<String>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    BoolArray(Vec<bool>),
}

/// The type a property index or decode call is bound to, independent of any
/// particular value instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Int,
    Float,
    Bool,
    Timestamp,
    Bytes,
    StringArray,
    IntArray,
    FloatArray,
    BoolArray,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Bool(_) => ValueType::Bool,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Bytes(_) => ValueType::Bytes,
            Value::StringArray(_) => ValueType::StringArray,
            Value::IntArray(_) => ValueType::IntArray,
            Value::FloatArray(_) => ValueType::FloatArray,
            Value::BoolArray(_) => ValueType::BoolArray,
        }
    }

    /// Length of the value if it is one of the array variants, else a
    /// `TypeMismatch`. Named after the spec's boundary behavior for
    /// `ArrayLen` on a non-array value.
    pub fn array_len(&self, op: &'static str) -> Result<usize> {
        match self {
            Value::StringArray(v) => Ok(v.len()),
            Value::IntArray(v) => Ok(v.len()),
            Value::FloatArray(v) => Ok(v.len()),
            Value::BoolArray(v) => Ok(v.len()),
            _ => Err(Error::type_mismatch(op, "array_len")),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Value::String(s) => {
                out.push(TAG_STRING);
                encode_str(&mut out, s);
            }
            Value::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Value::Float(f) => {
                out.push(TAG_FLOAT);
                out.extend_from_slice(&f.to_le_bytes());
            }
            Value::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(if *b { 1 } else { 0 });
            }
            Value::Timestamp(t) => {
                out.push(TAG_TIMESTAMP);
                out.extend_from_slice(&t.to_le_bytes());
            }
            Value::Bytes(b) => {
                out.push(TAG_BYTES);
                encode_bytes(&mut out, b);
            }
            Value::StringArray(items) => {
                out.push(TAG_STRING_ARRAY);
                out.extend_from_slice(&(items.len() as u32).to_le_bytes());
                for s in items {
                    encode_str(&mut out, s);
                }
            }
            Value::IntArray(items) => {
                out.push(TAG_INT_ARRAY);
                out.extend_from_slice(&(items.len() as u32).to_le_bytes());
                for i in items {
                    out.extend_from_slice(&i.to_le_bytes());
                }
            }
            Value::FloatArray(items) => {
                out.push(TAG_FLOAT_ARRAY);
                out.extend_from_slice(&(items.len() as u32).to_le_bytes());
                for f in items {
                    out.extend_from_slice(&f.to_le_bytes());
                }
            }
            Value::BoolArray(items) => {
                out.push(TAG_BOOL_ARRAY);
                out.extend_from_slice(&(items.len() as u32).to_le_bytes());
                for b in items {
                    out.push(if *b { 1 } else { 0 });
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        const OP: &str = "Value::decode";
        if bytes.is_empty() {
            return Err(Error::type_mismatch(OP, "empty value bytes"));
        }
        let tag = bytes[0];
        let payload = &bytes[1..];
        match tag {
            TAG_STRING => decode_str(payload, OP).map(Value::String),
            TAG_INT => read_i64(payload, OP).map(Value::Int),
            TAG_FLOAT => read_f64(payload, OP).map(Value::Float),
            TAG_BOOL => read_bool(payload, OP).map(Value::Bool),
            TAG_TIMESTAMP => read_i64(payload, OP).map(Value::Timestamp),
            TAG_BYTES => decode_bytes(payload, OP).map(Value::Bytes),
            TAG_STRING_ARRAY => {
                let (count, mut rest) = read_count(payload, OP)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let (len, consumed) = read_u32_len(rest, OP)?;
                    rest = &rest[consumed..];
                    if rest.len() < len {
                        return Err(Error::type_mismatch(OP, "truncated string array"));
                    }
                    let s = std::str::from_utf8(&rest[..len])
                        .map_err(|_| Error::type_mismatch(OP, "invalid utf-8"))?
                        .to_string();
                    rest = &rest[len..];
                    items.push(s);
                }
                Ok(Value::StringArray(items))
            }
            TAG_INT_ARRAY => {
                let (count, rest) = read_count(payload, OP)?;
                read_fixed_array(rest, count, OP, |b| {
                    Ok(i64::from_le_bytes(b.try_into().unwrap()))
                })
                .map(Value::IntArray)
            }
            TAG_FLOAT_ARRAY => {
                let (count, rest) = read_count(payload, OP)?;
                read_fixed_array(rest, count, OP, |b| {
                    Ok(f64::from_le_bytes(b.try_into().unwrap()))
                })
                .map(Value::FloatArray)
            }
            TAG_BOOL_ARRAY => {
                let (count, rest) = read_count(payload, OP)?;
                if rest.len() < count {
                    return Err(Error::type_mismatch(OP, "truncated bool array"));
                }
                Ok(Value::BoolArray(
                    rest[..count].iter().map(|b| *b != 0).collect(),
                ))
            }
            _ => Err(Error::type_mismatch(OP, "unknown value tag")),
        }
    }
}

fn encode_str(out: &mut Vec<u8>, s: &str) {
    encode_bytes(out, s.as_bytes());
}

fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn read_u32_len(payload: &[u8], op: &'static str) -> Result<(usize, usize)> {
    if payload.len() < 4 {
        return Err(Error::type_mismatch(op, "truncated length prefix"));
    }
    let len = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
    Ok((len, 4))
}

fn decode_str(payload: &[u8], op: &'static str) -> Result<String> {
    decode_bytes(payload, op).and_then(|b| {
        String::from_utf8(b).map_err(|_| Error::type_mismatch(op, "invalid utf-8"))
    })
}

fn decode_bytes(payload: &[u8], op: &'static str) -> Result<Vec<u8>> {
    let (len, consumed) = read_u32_len(payload, op)?;
    let rest = &payload[consumed..];
    if rest.len() < len {
        return Err(Error::type_mismatch(op, "truncated payload"));
    }
    Ok(rest[..len].to_vec())
}

fn read_i64(payload: &[u8], op: &'static str) -> Result<i64> {
    if payload.len() != 8 {
        return Err(Error::type_mismatch(op, "expected 8 bytes"));
    }
    Ok(i64::from_le_bytes(payload.try_into().unwrap()))
}

fn read_f64(payload: &[u8], op: &'static str) -> Result<f64> {
    if payload.len() != 8 {
        return Err(Error::type_mismatch(op, "expected 8 bytes"));
    }
    Ok(f64::from_le_bytes(payload.try_into().unwrap()))
}

fn read_bool(payload: &[u8], op: &'static str) -> Result<bool> {
    if payload.len() != 1 {
        return Err(Error::type_mismatch(op, "expected 1 byte"));
    }
    Ok(payload[0] != 0)
}

fn read_count<'a>(payload: &'a [u8], op: &'static str) -> Result<(usize, &'a [u8])> {
    let (count, consumed) = read_u32_len(payload, op)?;
    Ok((count, &payload[consumed..]))
}

fn read_fixed_array<T>(
    bytes: &[u8],
    count: usize,
    op: &'static str,
    decode_one: impl Fn(&[u8]) -> Result<T>,
) -> Result<Vec<T>> {
    if bytes.len() < count * 8 {
        return Err(Error::type_mismatch(op, "truncated array"));
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(decode_one(&bytes[i * 8..i * 8 + 8])?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Value) {
        let encoded = v.encode();
        let decoded = Value::decode(&encoded).unwrap();
        assert_eq!(v, decoded);
    }

    #[test]
    fn roundtrips_every_scalar_variant() {
        roundtrip(Value::String("hello".into()));
        roundtrip(Value::String(String::new()));
        roundtrip(Value::Int(-42));
        roundtrip(Value::Int(i64::MIN));
        roundtrip(Value::Float(3.5));
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Timestamp(1_700_000_000));
        roundtrip(Value::Bytes(vec![0, 1, 2, 255]));
    }

    #[test]
    fn roundtrips_every_array_variant() {
        roundtrip(Value::StringArray(vec!["a".into(), "b".into(), "".into()]));
        roundtrip(Value::IntArray(vec![1, -1, 0, i64::MAX]));
        roundtrip(Value::FloatArray(vec![1.0, -2.5, 0.0]));
        roundtrip(Value::BoolArray(vec![true, false, true]));
        roundtrip(Value::StringArray(vec![]));
    }

    #[test]
    fn array_len_on_non_array_is_type_mismatch() {
        let v = Value::Int(5);
        let err = v.array_len("test").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn decode_rejects_mismatched_tag_without_panicking() {
        let mut bytes = Value::Int(7).encode();
        bytes.truncate(1); // tag only, no payload
        let err = Value::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
