//! Institution canonicalization.
//!
//! Rosters and request bodies spell the same institution many ways. A lookup
//! table maps every known variant to one canonical tag; unknown names fall back
//! to their normalized spelling.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct InstitutionTable {
    variants: HashMap<String, String>,
}

impl InstitutionTable {
    /// Build from `canonical tag -> [variants]`. Each tag is also a variant of itself.
    pub fn new(table: &BTreeMap<String, Vec<String>>) -> Self {
        let mut variants = HashMap::new();
        for (canonical, names) in table {
            variants.insert(normalize(canonical), canonical.clone());
            for name in names {
                variants.insert(normalize(name), canonical.clone());
            }
        }
        Self { variants }
    }

    /// Canonical tag for a raw institution name
    pub fn canonicalize(&self, raw: &str) -> String {
        let normalized = normalize(raw);
        self.variants.get(&normalized).cloned().unwrap_or(normalized)
    }

    pub fn same(&self, a: &str, b: &str) -> bool {
        self.canonicalize(a) == self.canonicalize(b)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// Lowercase, trimmed, inner whitespace collapsed
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
