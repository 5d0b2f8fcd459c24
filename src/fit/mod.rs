//! Curve fitting.
//!
//! Responsibilities:
//!
//! - select the bins inside the fit range
//! - minimise chi-square or Poisson deviance with Levenberg-Marquardt
//! - write best-fit values and uncertainties back into the model

pub mod fitter;

pub use fitter::*;
