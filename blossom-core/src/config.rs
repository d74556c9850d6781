#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Budgets and parallelism for one checker run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Specialization steps one match may spend before giving up.
    pub max_specializations: usize,
    /// Nesting depth for generic instantiation and recursive impl resolution.
    pub max_instantiation_depth: usize,
    /// Worker threads for per-function checks; 0 picks the machine's parallelism.
    pub jobs: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            max_specializations: 100_000,
            max_instantiation_depth: 32,
            jobs: 0,
        }
    }
}
