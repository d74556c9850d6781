#![forbid(unsafe_code)]

pub mod ir;
pub mod place;

pub mod pretty;
pub mod traversal;
pub mod validate;

pub use ir::*;
pub use pretty::*;
pub use place::*;
pub use traversal::*;
pub use validate::*;
