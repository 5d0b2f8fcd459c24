//! Covariance of least squares estimates.
//!
//! At a least squares optimum the parameter covariance is `(JᵀJ)⁻¹`. The
//! parameter dimension is tiny, so a dense Cholesky (or SVD) costs nothing
//! next to model evaluation.

use nalgebra::DMatrix;

/// Invert a small symmetric positive semi-definite matrix (e.g. `JᵀJ`).
///
/// Falls back to the SVD pseudo-inverse when Cholesky fails, so a parameter
/// the data does not constrain yields a zero (not NaN) variance.
pub fn invert_normal_matrix(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if let Some(chol) = m.clone().cholesky() {
        return Some(chol.inverse());
    }
    m.clone().pseudo_inverse(1e-12).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_matrix_inverse() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 0.25]);
        let inv = invert_normal_matrix(&m).unwrap();
        assert!((inv[(0, 0)] - 0.25).abs() < 1e-12);
        assert!((inv[(1, 1)] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn singular_matrix_uses_pseudo_inverse() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let inv = invert_normal_matrix(&m).unwrap();
        assert!(inv.iter().all(|v| v.is_finite()));
        assert!((inv[(0, 0)] - 0.25).abs() < 1e-12);
    }
}
