//! Property indexes: single-key and composite, both keyed by the
//! order-preserving `value_to_key` encoding so range and prefix lookups work
//! lexicographically over the stored keys.

use graphcask_core::{Error, NodeId, Result, Value, ValueType};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

/// Component separator for composite index keys. Chosen because it cannot
/// occur in any `value_to_key` encoding (strings are sanitized at ingress,
/// which strips NUL but not this control character; bytes keys are the only
/// encoding that could in principle contain it, which is a documented
/// limitation of composite indexes over raw byte properties).
const COMPOSITE_SEPARATOR: char = '\u{1}';

/// Signed 64-bit bias so the zero-padded decimal string sorts the same as
/// the signed integer it encodes.
const INT_BIAS: i128 = 1 << 63;

/// Encodes a scalar `Value` into its canonical order-preserving string key.
/// Array values have no defined encoding and are rejected as a type
/// mismatch — indexes are bound to scalar property types.
pub fn value_to_key(value: &Value) -> Result<String> {
    const OP: &str = "value_to_key";
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Int(i) => Ok(format!("{:020}", *i as i128 + INT_BIAS)),
        Value::Float(f) => Ok(format!("{:020.6}", f)),
        Value::Bool(b) => Ok(if *b { "1".to_string() } else { "0".to_string() }),
        Value::Timestamp(t) => Ok(format!("{:020}", *t as i128 + INT_BIAS)),
        Value::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        _ => Err(Error::type_mismatch(OP, "property index key")),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStatistics {
    pub distinct_keys: usize,
    pub entry_count: usize,
}

struct IndexInner {
    entries: BTreeMap<String, BTreeSet<NodeId>>,
}

impl IndexInner {
    fn new() -> Self {
        IndexInner {
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, key: String, node: NodeId) {
        self.entries.entry(key).or_default().insert(node);
    }

    fn remove(&mut self, key: &str, node: NodeId) {
        if let Some(set) = self.entries.get_mut(key) {
            set.remove(&node);
            if set.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    fn lookup(&self, key: &str) -> Vec<NodeId> {
        self.entries
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn range_lookup(&self, lo: &str, hi: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        for (_, set) in self.entries.range(lo.to_string()..=hi.to_string()) {
            out.extend(set.iter().copied());
        }
        out
    }

    fn prefix_lookup(&self, prefix: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        for (key, set) in self.entries.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            out.extend(set.iter().copied());
        }
        out
    }

    fn statistics(&self) -> IndexStatistics {
        IndexStatistics {
            distinct_keys: self.entries.len(),
            entry_count: self.entries.values().map(|s| s.len()).sum(),
        }
    }

    fn all_keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// A single-key property index, bound to one property name and value type.
pub struct PropertyIndex {
    field: String,
    value_type: ValueType,
    inner: RwLock<IndexInner>,
}

impl PropertyIndex {
    pub fn new(field: impl Into<String>, value_type: ValueType) -> Self {
        PropertyIndex {
            field: field.into(),
            value_type,
            inner: RwLock::new(IndexInner::new()),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    fn check_type(&self, op: &'static str, value: &Value) -> Result<()> {
        if value.value_type() != self.value_type {
            return Err(Error::type_mismatch(op, &self.field));
        }
        Ok(())
    }

    pub fn insert(&self, node: NodeId, value: &Value) -> Result<()> {
        self.check_type("PropertyIndex::insert", value)?;
        let key = value_to_key(value)?;
        self.inner.write().insert(key, node);
        Ok(())
    }

    pub fn remove(&self, node: NodeId, value: &Value) -> Result<()> {
        self.check_type("PropertyIndex::remove", value)?;
        let key = value_to_key(value)?;
        self.inner.write().remove(&key, node);
        Ok(())
    }

    pub fn lookup(&self, value: &Value) -> Result<Vec<NodeId>> {
        self.check_type("PropertyIndex::lookup", value)?;
        let key = value_to_key(value)?;
        Ok(self.inner.read().lookup(&key))
    }

    /// Inclusive on both ends.
    pub fn range_lookup(&self, lo: &Value, hi: &Value) -> Result<Vec<NodeId>> {
        self.check_type("PropertyIndex::range_lookup", lo)?;
        self.check_type("PropertyIndex::range_lookup", hi)?;
        let lo_key = value_to_key(lo)?;
        let hi_key = value_to_key(hi)?;
        Ok(self.inner.read().range_lookup(&lo_key, &hi_key))
    }

    pub fn prefix_lookup(&self, prefix: &str) -> Result<Vec<NodeId>> {
        if self.value_type != ValueType::String {
            return Err(Error::type_mismatch("PropertyIndex::prefix_lookup", &self.field));
        }
        Ok(self.inner.read().prefix_lookup(prefix))
    }

    pub fn get_statistics(&self) -> IndexStatistics {
        self.inner.read().statistics()
    }

    pub fn get_all_keys(&self) -> Vec<String> {
        self.inner.read().all_keys()
    }
}

/// A composite index bound to an ordered tuple of (name, type) components.
pub struct CompositeIndex {
    fields: Vec<(String, ValueType)>,
    inner: RwLock<IndexInner>,
}

impl CompositeIndex {
    pub fn new(fields: Vec<(String, ValueType)>) -> Self {
        CompositeIndex {
            fields,
            inner: RwLock::new(IndexInner::new()),
        }
    }

    pub fn fields(&self) -> &[(String, ValueType)] {
        &self.fields
    }

    fn encode_tuple(&self, op: &'static str, values: &[Value]) -> Result<String> {
        if values.len() != self.fields.len() {
            return Err(Error::type_mismatch(op, "composite index arity"));
        }
        let mut parts = Vec::with_capacity(values.len());
        for (value, (name, value_type)) in values.iter().zip(&self.fields) {
            if value.value_type() != *value_type {
                return Err(Error::type_mismatch(op, name));
            }
            parts.push(value_to_key(value)?);
        }
        Ok(parts.join(&COMPOSITE_SEPARATOR.to_string()))
    }

    fn encode_prefix(&self, op: &'static str, prefix: &[Value]) -> Result<String> {
        if prefix.is_empty() || prefix.len() > self.fields.len() {
            return Err(Error::type_mismatch(op, "composite prefix length"));
        }
        let mut parts = Vec::with_capacity(prefix.len());
        for (value, (name, value_type)) in prefix.iter().zip(&self.fields) {
            if value.value_type() != *value_type {
                return Err(Error::type_mismatch(op, name));
            }
            parts.push(value_to_key(value)?);
        }
        let mut key = parts.join(&COMPOSITE_SEPARATOR.to_string());
        if prefix.len() < self.fields.len() {
            key.push(COMPOSITE_SEPARATOR);
        }
        Ok(key)
    }

    pub fn insert(&self, node: NodeId, values: &[Value]) -> Result<()> {
        let key = self.encode_tuple("CompositeIndex::insert", values)?;
        self.inner.write().insert(key, node);
        Ok(())
    }

    pub fn remove(&self, node: NodeId, values: &[Value]) -> Result<()> {
        let key = self.encode_tuple("CompositeIndex::remove", values)?;
        self.inner.write().remove(&key, node);
        Ok(())
    }

    pub fn lookup(&self, values: &[Value]) -> Result<Vec<NodeId>> {
        let key = self.encode_tuple("CompositeIndex::lookup", values)?;
        Ok(self.inner.read().lookup(&key))
    }

    /// Proper-prefix lookup: `prefix` must name at least one and fewer than
    /// all components (a full tuple is a `lookup`, not a prefix lookup).
    pub fn prefix_lookup(&self, prefix: &[Value]) -> Result<Vec<NodeId>> {
        if prefix.len() == self.fields.len() {
            return self.lookup(prefix);
        }
        let key = self.encode_prefix("CompositeIndex::prefix_lookup", prefix)?;
        Ok(self.inner.read().prefix_lookup(&key))
    }

    pub fn get_statistics(&self) -> IndexStatistics {
        self.inner.read().statistics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_encoding_preserves_signed_order() {
        let values = [i64::MIN, -100, -1, 0, 1, 100, i64::MAX];
        let keys: Vec<String> = values
            .iter()
            .map(|v| value_to_key(&Value::Int(*v)).unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn bool_encoding_is_0_or_1() {
        assert_eq!(value_to_key(&Value::Bool(false)).unwrap(), "0");
        assert_eq!(value_to_key(&Value::Bool(true)).unwrap(), "1");
    }

    #[test]
    fn array_values_are_rejected() {
        let err = value_to_key(&Value::IntArray(vec![1, 2])).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn single_key_insert_lookup_remove() {
        let index = PropertyIndex::new("age", ValueType::Int);
        index.insert(1, &Value::Int(30)).unwrap();
        index.insert(2, &Value::Int(30)).unwrap();
        index.insert(3, &Value::Int(40)).unwrap();
        let mut hits = index.lookup(&Value::Int(30)).unwrap();
        hits.sort();
        assert_eq!(hits, vec![1, 2]);
        index.remove(1, &Value::Int(30)).unwrap();
        assert_eq!(index.lookup(&Value::Int(30)).unwrap(), vec![2]);
    }

    #[test]
    fn single_key_lookup_type_mismatch() {
        let index = PropertyIndex::new("age", ValueType::Int);
        let err = index.lookup(&Value::String("x".into())).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn range_lookup_is_inclusive_both_ends() {
        let index = PropertyIndex::new("age", ValueType::Int);
        for age in 20..30 {
            index.insert(age as u64, &Value::Int(age)).unwrap();
        }
        let mut hits = index
            .range_lookup(&Value::Int(22), &Value::Int(25))
            .unwrap();
        hits.sort();
        assert_eq!(hits, vec![22, 23, 24, 25]);
    }

    #[test]
    fn prefix_lookup_only_for_strings() {
        let strings = PropertyIndex::new("name", ValueType::String);
        strings.insert(1, &Value::String("alice".into())).unwrap();
        strings.insert(2, &Value::String("alan".into())).unwrap();
        strings.insert(3, &Value::String("bob".into())).unwrap();
        let mut hits = strings.prefix_lookup("al").unwrap();
        hits.sort();
        assert_eq!(hits, vec![1, 2]);

        let ints = PropertyIndex::new("age", ValueType::Int);
        assert!(ints.prefix_lookup("2").is_err());
    }

    #[test]
    fn get_all_keys_is_sorted() {
        let index = PropertyIndex::new("age", ValueType::Int);
        index.insert(1, &Value::Int(5)).unwrap();
        index.insert(2, &Value::Int(1)).unwrap();
        index.insert(3, &Value::Int(3)).unwrap();
        let keys = index.get_all_keys();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn composite_index_full_lookup() {
        let index = CompositeIndex::new(vec![
            ("country".into(), ValueType::String),
            ("age".into(), ValueType::Int),
        ]);
        index
            .insert(1, &[Value::String("us".into()), Value::Int(30)])
            .unwrap();
        index
            .insert(2, &[Value::String("us".into()), Value::Int(30)])
            .unwrap();
        index
            .insert(3, &[Value::String("us".into()), Value::Int(40)])
            .unwrap();
        let mut hits = index
            .lookup(&[Value::String("us".into()), Value::Int(30)])
            .unwrap();
        hits.sort();
        assert_eq!(hits, vec![1, 2]);
    }

    #[test]
    fn composite_index_prefix_lookup() {
        let index = CompositeIndex::new(vec![
            ("country".into(), ValueType::String),
            ("age".into(), ValueType::Int),
        ]);
        index
            .insert(1, &[Value::String("us".into()), Value::Int(30)])
            .unwrap();
        index
            .insert(2, &[Value::String("us".into()), Value::Int(40)])
            .unwrap();
        index
            .insert(3, &[Value::String("de".into()), Value::Int(30)])
            .unwrap();
        let mut hits = index
            .prefix_lookup(&[Value::String("us".into())])
            .unwrap();
        hits.sort();
        assert_eq!(hits, vec![1, 2]);
    }

    #[test]
    fn composite_index_rejects_empty_and_overlong_prefix() {
        let index = CompositeIndex::new(vec![
            ("country".into(), ValueType::String),
            ("age".into(), ValueType::Int),
        ]);
        assert!(index.prefix_lookup(&[]).is_err());
        assert!(index
            .prefix_lookup(&[
                Value::String("us".into()),
                Value::Int(1),
                Value::Int(2)
            ])
            .is_err());
    }
}
