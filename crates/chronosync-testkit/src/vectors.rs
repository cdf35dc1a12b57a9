//! Golden fingerprint vectors.
//!
//! Each vector is a batch of producer states and the root digest a
//! [`DigestTree`] must report after applying it. The vectors live in
//! `vectors/fingerprints.json` so other implementations can check against
//! the same file.

use serde::Deserialize;

use chronosync_core::{Fingerprint, Name, UpdateRecord};
use chronosync_sync::DigestTree;

const FINGERPRINTS_JSON: &str = include_str!("../vectors/fingerprints.json");

/// One producer state inside a vector.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorRecord {
    /// Producer prefix in URI form.
    pub prefix: String,
    pub session: i64,
    pub seq: i64,
}

/// A golden test vector.
#[derive(Debug, Clone, Deserialize)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: String,
    /// Records applied to an empty tree, as one batch.
    pub records: Vec<VectorRecord>,
    /// Expected root digest (lowercase hex, `00` for the empty tree).
    pub fingerprint: String,
}

impl GoldenVector {
    /// The vector's records as update records.
    pub fn update_records(&self) -> chronosync_core::Result<Vec<UpdateRecord>> {
        self.records
            .iter()
            .map(|r| {
                r.prefix
                    .parse::<Name>()
                    .map(|prefix| UpdateRecord::new(prefix, r.session, r.seq))
            })
            .collect()
    }

    pub fn expected(&self) -> Fingerprint {
        Fingerprint::from(self.fingerprint.as_str())
    }
}

/// Get all golden test vectors.
pub fn all_vectors() -> serde_json::Result<Vec<GoldenVector>> {
    serde_json::from_str(FINGERPRINTS_JSON)
}

/// Build the digest tree described by a vector.
pub fn tree_from_vector(vector: &GoldenVector) -> chronosync_core::Result<DigestTree> {
    let mut tree = DigestTree::new();
    tree.update(&vector.update_records()?);
    Ok(tree)
}

/// Check every vector against this implementation.
///
/// Returns `(name, matches, computed root)` per vector. A vector whose
/// records do not parse is reported as a mismatch with the parse error.
pub fn verify_all_vectors() -> serde_json::Result<Vec<(String, bool, String)>> {
    Ok(all_vectors()?
        .iter()
        .map(|v| match tree_from_vector(v) {
            Ok(tree) => {
                let root = tree.root().to_string();
                (v.name.clone(), root == v.fingerprint, root)
            }
            Err(e) => (v.name.clone(), false, e.to_string()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_load() {
        let vectors = all_vectors().unwrap();
        assert!(vectors.len() >= 5);
        assert!(vectors.iter().all(|v| !v.fingerprint.is_empty()));
    }

    #[test]
    fn test_all_vectors_match() {
        for (name, matches, root) in verify_all_vectors().unwrap() {
            assert!(matches, "vector '{}' computed {}", name, root);
        }
    }

    #[test]
    fn test_empty_vector_is_bootstrap() {
        let vectors = all_vectors().unwrap();
        let empty = vectors.iter().find(|v| v.records.is_empty()).unwrap();
        assert!(empty.expected().is_bootstrap());
        assert!(tree_from_vector(empty).unwrap().root().is_bootstrap());
    }

    #[test]
    fn test_fingerprints_are_lowercase_hex() {
        for v in all_vectors().unwrap() {
            if v.records.is_empty() {
                continue;
            }
            assert_eq!(v.fingerprint.len(), 64, "vector '{}'", v.name);
            let bytes = hex::decode(&v.fingerprint).unwrap();
            assert_eq!(hex::encode(bytes), v.fingerprint);
        }
    }

    #[test]
    fn test_vectors_are_deterministic() {
        for v in all_vectors().unwrap() {
            let first = tree_from_vector(&v).unwrap();
            let second = tree_from_vector(&v).unwrap();
            assert_eq!(first.root(), second.root(), "vector '{}'", v.name);
        }
    }
}
