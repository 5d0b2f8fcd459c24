//! Parametric scalar models built from expression strings.
//!
//! A [`Model`] owns its parameter values. The fitter mutates them in place, so
//! after a successful fit the model *is* the fit result: values, errors and
//! the expression travel together.

use crate::error::ExpressionError;
use crate::math::Expr;

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    expression: String,
    expr: Expr,
    names: Vec<String>,
    values: Vec<f64>,
    errors: Option<Vec<f64>>,
    domain: Option<[f64; 2]>,
}

impl Model {
    /// Build a model from an expression, parameter names and initial guesses.
    ///
    /// The number of names must match both the number of initial values and
    /// the number of distinct parameters the expression references.
    pub fn define(
        expression: &str,
        names: &[impl AsRef<str>],
        initial_values: &[f64],
    ) -> Result<Model, ExpressionError> {
        let names: Vec<String> = names.iter().map(|n| n.as_ref().trim().to_string()).collect();

        if names.len() != initial_values.len() {
            return Err(ExpressionError::new(format!(
                "{} parameter name(s) but {} initial value(s)",
                names.len(),
                initial_values.len()
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if !is_valid_param_name(name) {
                return Err(ExpressionError::new(format!("'{name}' is not a valid parameter name")));
            }
            if names[..i].contains(name) {
                return Err(ExpressionError::new(format!("duplicate parameter name '{name}'")));
            }
        }
        if let Some(bad) = initial_values.iter().position(|v| !v.is_finite()) {
            return Err(ExpressionError::new(format!(
                "initial value for '{}' is not finite",
                names[bad]
            )));
        }

        let expr = Expr::parse(expression)?.bind(&names)?;

        Ok(Model {
            expression: expression.to_string(),
            expr,
            names,
            values: initial_values.to_vec(),
            errors: None,
            domain: None,
        })
    }

    /// Restrict the model to `[x_min, x_max]`.
    pub fn with_domain(mut self, x_min: f64, x_max: f64) -> Self {
        self.domain = Some([x_min, x_max]);
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Parameter uncertainties from the most recent successful fit.
    pub fn errors(&self) -> Option<&[f64]> {
        self.errors.as_deref()
    }

    pub fn domain(&self) -> Option<[f64; 2]> {
        self.domain
    }

    pub fn param_count(&self) -> usize {
        self.names.len()
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|i| self.values[i])
    }

    pub fn param_error(&self, name: &str) -> Option<f64> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.errors.as_ref().map(|e| e[idx])
    }

    pub(crate) fn set_fit_result(&mut self, values: &[f64], errors: Vec<f64>) {
        self.values.copy_from_slice(values);
        self.errors = Some(errors);
    }

    /// Evaluate at `x` with the current parameters.
    pub fn eval(&self, x: f64) -> f64 {
        self.expr.eval(x, &self.values)
    }

    /// Evaluate at `x` with explicit parameters (used by the fitter's trial steps).
    pub fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        self.expr.eval(x, params)
    }

    /// Sample the model on `n` evenly spaced points over `[x0, x1]`.
    pub fn sample(&self, x0: f64, x1: f64, n: usize) -> Vec<(f64, f64)> {
        let n = n.max(2);
        (0..n)
            .map(|i| {
                let u = i as f64 / (n as f64 - 1.0);
                let x = x0 + u * (x1 - x0);
                (x, self.eval(x))
            })
            .collect()
    }
}

fn is_valid_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name != "x"
        && name != "pi"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_canonical_model() {
        let m = Model::define("[0]*exp(-x/[1])+[2]", &["A", "tau", "C"], &[200.0, 2.0, 10.0]).unwrap();
        assert_eq!(m.param_count(), 3);
        assert_eq!(m.param("tau"), Some(2.0));
        assert!((m.eval(0.0) - 210.0).abs() < 1e-12);
        assert!(m.errors().is_none());
    }

    #[test]
    fn define_rejects_more_symbols_than_names() {
        let err = Model::define("A*exp(-x/tau)+C", &["A", "tau"], &[200.0, 2.0]).unwrap_err();
        assert!(err.message.contains("'C'"));
    }

    #[test]
    fn define_rejects_fewer_symbols_than_names() {
        assert!(Model::define("A*exp(-x/tau)", &["A", "tau", "C"], &[200.0, 2.0, 10.0]).is_err());
    }

    #[test]
    fn define_rejects_value_count_mismatch() {
        assert!(Model::define("A*exp(-x/tau)+C", &["A", "tau", "C"], &[200.0, 2.0]).is_err());
    }

    #[test]
    fn define_rejects_bad_names() {
        assert!(Model::define("A+x", &["A", "A"], &[1.0, 2.0]).is_err());
        assert!(Model::define("x", &["x"], &[1.0]).is_err());
        assert!(Model::define("[0]", &["2a"], &[1.0]).is_err());
    }
}
