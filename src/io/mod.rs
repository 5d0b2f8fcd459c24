//! Input/output helpers.
//!
//! - dataset files: locate a named histogram (`dataset`)
//! - per-bin result export (CSV) (`export`)
//! - fit JSON read/write (`fitfile`)

pub mod dataset;
pub mod export;
pub mod fitfile;

pub use dataset::*;
pub use export::*;
pub use fitfile::*;
