#![forbid(unsafe_code)]

pub mod borrowck;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod lower;
pub mod ownership;
pub mod pattern;
pub mod region;
pub mod solver;
pub mod types;

pub use borrowck::check_body;
pub use cache::{DiagnosticCache, FunctionResult};
pub use catalog::{TypeCatalog, TypeScope, build as build_catalog};
pub use config::CheckConfig;
pub use diagnostics::{Diagnostic, DiagnosticKind, Related, Stage, sort_diagnostics};
pub use driver::{CheckReport, Checker};
pub use error::{CatalogError, SolveError};
pub use lower::{LowerError, lower_function};
pub use ownership::{FlowState, Loan, OwnershipState};
pub use pattern::{DecisionTable, DecisionTree, MatchCheck, Witness};
pub use region::RegionGraph;
pub use solver::{ConstraintSolver, Evidence};
pub use types::{TyKind, TypeId, TypeTable};
