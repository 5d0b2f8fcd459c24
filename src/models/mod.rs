//! Parametric models defined by expression strings.

pub mod model;

pub use model::*;
