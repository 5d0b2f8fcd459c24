//! Synthetic data used by `histfit generate` and by the fit tests.

pub mod sample;

pub use sample::*;
