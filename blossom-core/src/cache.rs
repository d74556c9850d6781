#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::pattern::DecisionTable;

/// What checking one function body produced.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    pub decision_tables: Vec<DecisionTable>,
}

/// Per-body results keyed by the body's cache key.
///
/// Checking is pure with respect to the key, so a hit is returned as is.
/// The checker only reads the cache while workers run and records misses
/// once they are done.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticCache {
    #[serde(default)]
    entries: BTreeMap<String, FunctionResult>,
}

impl DiagnosticCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FunctionResult> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, result: FunctionResult) {
        self.entries.insert(key, result);
    }

    /// Keep only the listed keys (bodies that still exist).
    pub fn retain_keys<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        let keep: std::collections::BTreeSet<&str> = keys.into_iter().collect();
        self.entries.retain(|k, _| keep.contains(k.as_str()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
