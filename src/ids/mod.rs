//! Case-insensitive protein identity
//!
//! Every artifact derived from a protein (box files, receptor files, result
//! directories) is addressed by the lower-cased canonical form of its id.
//! Older runs may have written files under the original casing, so lookups
//! try the exact key first and then fall back to a case-insensitive match.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::path::Path;

/// Canonical (lower-cased) protein identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ProteinId(String);

impl ProteinId {
    /// Create a protein id, canonicalising the raw name
    pub fn new(raw: &str) -> Self {
        Self(canonical(raw))
    }

    /// Derive the id from a structure file name (`1ABC.pdb` -> `1abc`)
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_stem().and_then(|s| s.to_str()).map(Self::new)
    }

    /// The canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Does a raw name refer to this protein?
    pub fn matches(&self, raw: &str) -> bool {
        canonical(raw) == self.0
    }
}

impl fmt::Display for ProteinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProteinId {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for ProteinId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<ProteinId> for String {
    fn from(id: ProteinId) -> Self {
        id.0
    }
}

impl AsRef<str> for ProteinId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical form of a protein name
pub fn canonical(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Maps keyed by raw protein names that support exact-then-case-insensitive lookup
pub trait CaseInsensitiveLookup<V> {
    fn get_ignore_case(&self, key: &str) -> Option<&V>;
}

impl<K, V> CaseInsensitiveLookup<V> for BTreeMap<K, V>
where
    K: Borrow<str> + Ord,
{
    fn get_ignore_case(&self, key: &str) -> Option<&V> {
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        let wanted = canonical(key);
        self.iter()
            .find(|(k, _)| canonical((*k).borrow()) == wanted)
            .map(|(_, v)| v)
    }
}

impl<K, V> CaseInsensitiveLookup<V> for HashMap<K, V>
where
    K: Borrow<str> + Eq + Hash,
{
    fn get_ignore_case(&self, key: &str) -> Option<&V> {
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        let wanted = canonical(key);
        self.iter()
            .find(|(k, _)| canonical((*k).borrow()) == wanted)
            .map(|(_, v)| v)
    }
}
