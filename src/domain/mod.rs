//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the binned dataset (`Histogram`, `Binning`)
//! - run configuration (`FitConfig`, `GenerateConfig`, `FitMethod`, `RenderMode`)
//! - fit outputs (`FitReport`, `BinResidual`, `FitFile`)

pub mod types;

pub use types::*;
