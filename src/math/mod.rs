//! Mathematical utilities: expression parsing/evaluation and fit covariance.

pub mod expr;
pub mod ols;

pub use expr::*;
pub use ols::*;
