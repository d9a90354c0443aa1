//! Delta + variable-length-integer compressed edge id lists.
//!
//! Immutable once built: every modification (`add`/`remove`) decompresses,
//! mutates the plain sequence, and recompresses into a fresh instance.

use crate::varint::{read_uvarint, write_uvarint};
use graphcask_core::Error;

/// An immutable, sorted, compressed sequence of 64-bit ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedEdgeList {
    base: u64,
    deltas: Vec<u8>,
    count: u64,
}

impl CompressedEdgeList {
    /// Builds a compressed list from an arbitrary (possibly unsorted,
    /// possibly empty) set of ids. Sorts ascending before encoding; encoding
    /// never fails because the sort makes deltas non-negative by
    /// construction.
    pub fn compress(ids: &[u64]) -> Self {
        if ids.is_empty() {
            return CompressedEdgeList {
                base: 0,
                deltas: Vec::new(),
                count: 0,
            };
        }
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();

        let base = sorted[0];
        let mut deltas = Vec::with_capacity(sorted.len() * 2);
        let mut prev = base;
        for &id in &sorted[1..] {
            if id < prev {
                // Programmer error per spec: detecting a descending delta
                // after sort can only happen if the caller handed us a
                // value that can't be represented as u64 deltas from base,
                // which cannot happen for a freshly sorted slice.
                unreachable!("sorted slice produced a descending delta");
            }
            let delta = id - prev;
            write_uvarint(&mut deltas, delta);
            prev = id;
        }

        CompressedEdgeList {
            base,
            deltas,
            count: sorted.len() as u64,
        }
    }

    /// Decompresses into the full ascending sequence. On a truncated varint
    /// or an additive overflow, logs a warning and returns the prefix
    /// successfully decoded so far — this is defensive; callers should treat
    /// a returned length shorter than `count()` as corruption.
    pub fn decompress(&self) -> Vec<u64> {
        if self.count == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(self.count as usize);
        out.push(self.base);
        let mut prev = self.base;
        let mut pos = 0usize;
        while pos < self.deltas.len() {
            match read_uvarint(&self.deltas[pos..]) {
                Some((delta, consumed)) => match prev.checked_add(delta) {
                    Some(next) => {
                        out.push(next);
                        prev = next;
                        pos += consumed;
                    }
                    None => {
                        tracing::warn!(
                            decoded = out.len(),
                            expected = self.count,
                            "compressed edge list decode overflow, returning decoded prefix"
                        );
                        return out;
                    }
                },
                None => {
                    tracing::warn!(
                        decoded = out.len(),
                        expected = self.count,
                        "compressed edge list decode hit a truncated varint, returning decoded prefix"
                    );
                    return out;
                }
            }
        }
        out
    }

    /// Decompresses, failing loudly instead of logging-and-truncating. Used
    /// where corruption must surface as a typed error rather than a
    /// best-effort prefix (e.g. disk-backed adjacency reads).
    pub fn try_decompress(&self) -> Result<Vec<u64>, Error> {
        let out = self.decompress();
        if out.len() as u64 != self.count {
            return Err(Error::CompressionCorruption(format!(
                "expected {} ids, decoded {}",
                self.count,
                out.len()
            )));
        }
        Ok(out)
    }

    pub fn add(&self, id: u64) -> Self {
        let mut ids = self.decompress();
        if let Err(pos) = ids.binary_search(&id) {
            ids.insert(pos, id);
        }
        Self::compress(&ids)
    }

    pub fn remove(&self, id: u64) -> Self {
        let mut ids = self.decompress();
        if let Ok(pos) = ids.binary_search(&id) {
            ids.remove(pos);
        }
        Self::compress(&ids)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.decompress().binary_search(&id).is_ok()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Compressed footprint in bytes: base + count header plus the delta
    /// buffer.
    pub fn size(&self) -> usize {
        8 + 8 + self.deltas.len()
    }

    /// Footprint if stored as a flat array of 8-byte ids.
    pub fn uncompressed_size(&self) -> usize {
        self.count as usize * 8
    }

    /// `uncompressed_size / size`, or 0 for an empty list.
    pub fn compression_ratio(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.uncompressed_size() as f64 / self.size() as f64
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn deltas(&self) -> &[u8] {
        &self.deltas
    }

    /// Raw-field constructor used when deserializing the on-disk encoding
    /// (`[base:u64][count:u32][deltasLen:u32][deltas]`) in the disk-backed
    /// adjacency tier.
    pub fn from_parts(base: u64, count: u64, deltas: Vec<u8>) -> Self {
        CompressedEdgeList {
            base,
            deltas,
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_decompress_roundtrips_sequential_ids() {
        let ids: Vec<u64> = (1..=100).collect();
        let compressed = CompressedEdgeList::compress(&ids);
        assert_eq!(compressed.count(), 100);
        assert_eq!(compressed.uncompressed_size(), 800);
        assert!(compressed.size() < 800);
        assert!(compressed.compression_ratio() > 1.0);
        assert_eq!(compressed.decompress(), ids);
    }

    #[test]
    fn compress_decompress_roundtrips_unsorted_with_duplicates() {
        let ids = vec![50, 3, 3, 1000, 1, 7, 7, 0];
        let mut expected = ids.clone();
        expected.sort_unstable();
        let compressed = CompressedEdgeList::compress(&ids);
        assert_eq!(compressed.decompress(), expected);
    }

    #[test]
    fn empty_list_round_trips() {
        let compressed = CompressedEdgeList::compress(&[]);
        assert_eq!(compressed.count(), 0);
        assert!(compressed.is_empty());
        assert_eq!(compressed.compression_ratio(), 0.0);
        assert_eq!(compressed.decompress(), Vec::<u64>::new());
    }

    #[test]
    fn add_and_remove_are_stable() {
        let compressed = CompressedEdgeList::compress(&[1, 5, 9]);
        let with_added = compressed.add(3);
        assert_eq!(with_added.decompress(), vec![1, 3, 5, 9]);
        let with_removed = with_added.remove(5);
        assert_eq!(with_removed.decompress(), vec![1, 3, 9]);
        assert!(with_removed.contains(3));
        assert!(!with_removed.contains(5));
    }

    #[test]
    fn adding_duplicate_is_a_no_op() {
        let compressed = CompressedEdgeList::compress(&[1, 2, 3]);
        let same = compressed.add(2);
        assert_eq!(same.decompress(), vec![1, 2, 3]);
    }

    #[test]
    fn truncated_varint_yields_decoded_prefix() {
        let ids = vec![1, 2, 300, 400];
        let compressed = CompressedEdgeList::compress(&ids);
        let mut deltas = compressed.deltas().to_vec();
        deltas.pop();
        let corrupt =
            CompressedEdgeList::from_parts(compressed.base(), compressed.count(), deltas);
        let partial = corrupt.decompress();
        assert!(partial.len() < ids.len());
        assert_eq!(&partial[..], &ids[..partial.len()]);
        assert!(corrupt.try_decompress().is_err());
    }
}
