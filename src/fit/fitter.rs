//! Levenberg-Marquardt fit of a [`Model`] to a [`Histogram`].
//!
//! Given:
//! - bin centers `x_i` and contents `n_i` inside the fit range
//! - a model `f(x; p)` with free parameters `p`
//!
//! we minimise `Σ r_i(p)^2`, where the residual depends on the method:
//!
//! - chi-square: `r_i = (n_i - f(x_i)) / σ_i` (bins with `σ_i = 0` are skipped)
//! - likelihood: `r_i = sign(n_i - μ_i) * sqrt(2 (μ_i - n_i + n_i ln(n_i/μ_i)))`,
//!   the signed Poisson deviance residual with `μ_i = f(x_i)`
//!
//! The minimisation itself is done by the `levenberg-marquardt` crate (a port
//! of MINPACK's `lmder`); this module supplies the residuals and a
//! forward-difference Jacobian through [`LeastSquaresProblem`].

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{DMatrix, DVector, Dyn, Owned};

use crate::domain::{FitMethod, FitReport, Histogram};
use crate::error::FitError;
use crate::math::invert_normal_matrix;
use crate::models::Model;

/// Parameter pairs correlated beyond this are not separately determined.
const MAX_CORRELATION: f64 = 1.0 - 1e-6;

/// Knobs for a single fit call.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub method: FitMethod,
    /// Iteration budget; the solver gives up after
    /// `max_iterations * (n_params + 1)` residual evaluations.
    pub max_iterations: usize,
    /// Relative cost decrease below which the fit has converged.
    pub ftol: f64,
    /// Relative step size below which the fit has converged.
    pub xtol: f64,
    /// Orthogonality of residuals and Jacobian columns below which the fit has converged.
    pub gtol: f64,
    /// Optional explicit fit range, intersected with the histogram and model domains.
    pub range: Option<[f64; 2]>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            method: FitMethod::ChiSquare,
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            range: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FitBin {
    x: f64,
    n: f64,
    sigma: f64,
}

/// Fit `model` to `hist`, writing best-fit values and errors into the model.
///
/// On error the model's parameters are left as they were.
pub fn fit(hist: &Histogram, model: &mut Model, opts: &FitOptions) -> Result<FitReport, FitError> {
    let range = fit_range(hist, model, opts)?;
    let bins = select_bins(hist, range, opts.method);
    let n_params = model.param_count();

    if bins.is_empty() {
        return Err(FitError::EmptyRange { x_min: range[0], x_max: range[1] });
    }
    if bins.len() < n_params {
        return Err(FitError::TooFewBins { bins: bins.len(), params: n_params });
    }

    log::info!(
        "fitting '{}' to '{}' ({}, {} bins in [{}, {}])",
        model.expression(),
        hist.name,
        opts.method.display_name(),
        bins.len(),
        range[0],
        range[1]
    );

    let problem = Problem {
        model: &*model,
        bins: &bins,
        method: opts.method,
        params: DVector::from_column_slice(model.values()),
    };
    problem.try_residuals().map_err(InvalidPoint::into_fit_error)?;

    let solver = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.max_iterations.max(1));
    let (problem, outcome) = solver.minimize(problem);
    let evaluations = outcome.number_of_evaluations;

    log::debug!(
        "solver stopped after {evaluations} evaluation(s): {:?}, params={:?}",
        outcome.termination,
        problem.params.as_slice()
    );

    match outcome.termination {
        TerminationReason::Converged { .. } | TerminationReason::Orthogonal | TerminationReason::ResidualsZero => {}
        other => {
            log::warn!("fit of '{}' stopped after {evaluations} evaluations: {other:?}", hist.name);
            return Err(FitError::NotConverged { evaluations, reason: format!("{other:?}") });
        }
    }

    let (r, jac) = match (problem.residuals(), problem.jacobian()) {
        (Some(r), Some(jac)) => (r, jac),
        _ => {
            return Err(FitError::NotConverged {
                evaluations,
                reason: "model is invalid at the final parameters".to_string(),
            });
        }
    };
    let errors = match invert_normal_matrix(&(jac.transpose() * &jac)) {
        Some(cov) => {
            check_correlations(&cov, model.names())?;
            (0..cov.nrows()).map(|i| cov[(i, i)].max(0.0).sqrt()).collect()
        }
        None => vec![f64::NAN; n_params],
    };

    let statistic = r.norm_squared();
    let params = problem.params.clone();
    model.set_fit_result(params.as_slice(), errors);

    let report = FitReport {
        method: opts.method,
        statistic,
        n_bins_used: bins.len(),
        ndf: bins.len() - n_params,
        evaluations,
        converged: true,
        range,
    };

    log::info!(
        "{} = {:.4} / ndf {} after {} evaluation(s)",
        opts.method.statistic_name(),
        report.statistic,
        report.ndf,
        report.evaluations
    );

    Ok(report)
}

/// Intersect the histogram domain with the model domain and the explicit range.
fn fit_range(hist: &Histogram, model: &Model, opts: &FitOptions) -> Result<[f64; 2], FitError> {
    let mut lo = hist.x_min;
    let mut hi = hist.x_max;
    for limit in [model.domain(), opts.range].into_iter().flatten() {
        lo = lo.max(limit[0]);
        hi = hi.min(limit[1]);
    }
    if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
        return Err(FitError::EmptyRange { x_min: lo, x_max: hi });
    }
    Ok([lo, hi])
}

fn select_bins(hist: &Histogram, range: [f64; 2], method: FitMethod) -> Vec<FitBin> {
    let mut out = Vec::with_capacity(hist.n_bins());
    for i in 0..hist.n_bins() {
        let x = hist.bin_center(i);
        if x < range[0] || x > range[1] {
            continue;
        }
        let n = hist.contents[i];
        let sigma = hist.bin_error(i);
        match method {
            FitMethod::ChiSquare if sigma > 0.0 => out.push(FitBin { x, n, sigma }),
            FitMethod::ChiSquare => {}
            FitMethod::Likelihood if n >= 0.0 => out.push(FitBin { x, n, sigma }),
            FitMethod::Likelihood => {
                log::warn!("skipping bin {i} with negative content {n} in likelihood fit");
            }
        }
    }
    out
}

/// Why the model cannot be compared to the data at some parameter point.
#[derive(Debug, Clone, Copy)]
enum InvalidPoint {
    NonFinite(f64),
    NonPositive(f64),
}

impl InvalidPoint {
    fn into_fit_error(self) -> FitError {
        match self {
            InvalidPoint::NonFinite(x) => FitError::NonFinite { x },
            InvalidPoint::NonPositive(x) => FitError::NonPositive { x },
        }
    }
}

struct Problem<'a> {
    model: &'a Model,
    bins: &'a [FitBin],
    method: FitMethod,
    params: DVector<f64>,
}

impl Problem<'_> {
    fn try_residuals(&self) -> Result<DVector<f64>, InvalidPoint> {
        residuals_at(self.model, self.bins, self.method, self.params.as_slice())
    }
}

fn residuals_at(
    model: &Model,
    bins: &[FitBin],
    method: FitMethod,
    params: &[f64],
) -> Result<DVector<f64>, InvalidPoint> {
    let mut out = DVector::zeros(bins.len());
    for (i, bin) in bins.iter().enumerate() {
        let f = model.eval_with(bin.x, params);
        if !f.is_finite() {
            return Err(InvalidPoint::NonFinite(bin.x));
        }
        out[i] = match method {
            FitMethod::ChiSquare => (bin.n - f) / bin.sigma,
            FitMethod::Likelihood => {
                if f <= 0.0 {
                    return Err(InvalidPoint::NonPositive(bin.x));
                }
                deviance_residual(bin.n, f)
            }
        };
    }
    Ok(out)
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for Problem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, p: &DVector<f64>) {
        self.params.copy_from(p);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    /// `None` where the model is invalid; the solver treats that as a failed step.
    fn residuals(&self) -> Option<DVector<f64>> {
        self.try_residuals().ok()
    }

    /// Forward-difference Jacobian; falls back to a backward difference when
    /// the forward point is invalid, and to a zero column when both are.
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let r = self.try_residuals().ok()?;
        let p = &self.params;
        let mut jac = DMatrix::zeros(r.len(), p.len());
        let mut work = p.clone();

        for j in 0..p.len() {
            let h = f64::EPSILON.sqrt() * p[j].abs().max(1e-3);
            let mut column = None;
            for step in [h, -h] {
                work[j] = p[j] + step;
                if let Ok(r_step) = residuals_at(self.model, self.bins, self.method, work.as_slice()) {
                    column = Some((r_step - &r) / step);
                    break;
                }
            }
            work[j] = p[j];
            match column {
                Some(col) => jac.set_column(j, &col),
                None => log::debug!("parameter {j} has no valid finite-difference neighbourhood"),
            }
        }
        Some(jac)
    }
}

fn deviance_residual(n: f64, mu: f64) -> f64 {
    let term = if n > 0.0 { mu - n + n * (n / mu).ln() } else { mu };
    let d = (2.0 * term).max(0.0).sqrt();
    if n >= mu { d } else { -d }
}

/// Reject optima where two parameters only enter as one combination, e.g.
/// an exponential whose decay constant ran off towards infinity.
fn check_correlations(cov: &DMatrix<f64>, names: &[String]) -> Result<(), FitError> {
    let n = cov.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let denom = (cov[(i, i)] * cov[(j, j)]).sqrt();
            if !(denom.is_finite() && denom > 0.0) {
                continue;
            }
            let rho = cov[(i, j)] / denom;
            if !rho.is_finite() || rho.abs() > MAX_CORRELATION {
                return Err(FitError::Degenerate {
                    first: names[i].clone(),
                    second: names[j].clone(),
                    correlation: rho,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::generate_histogram;
    use crate::domain::{Binning, NoiseKind};

    fn canonical_model(values: &[f64]) -> Model {
        Model::define("[0]*exp(-x/[1])+[2]", &["A", "tau", "C"], values).unwrap()
    }

    fn within(actual: f64, expected: f64, frac: f64) -> bool {
        (actual - expected).abs() <= frac * expected.abs()
    }

    #[test]
    fn recovers_parameters_from_bounded_noise() {
        let truth = canonical_model(&[200.0, 2.0, 10.0]);
        let hist =
            generate_histogram(&truth, "hist", Binning::default(), NoiseKind::Bounded, 0.05, 7).unwrap();

        let mut model = canonical_model(&[150.0, 1.0, 5.0]);
        let report = fit(&hist, &mut model, &FitOptions::default()).unwrap();

        assert!(report.converged);
        assert_eq!(report.ndf, report.n_bins_used - 3);
        assert!(within(model.param("A").unwrap(), 200.0, 0.10), "{:?}", model.values());
        assert!(within(model.param("tau").unwrap(), 2.0, 0.10), "{:?}", model.values());
        assert!(within(model.param("C").unwrap(), 10.0, 0.10), "{:?}", model.values());
        let errors = model.errors().unwrap();
        assert!(errors.iter().all(|e| e.is_finite() && *e > 0.0));
    }

    #[test]
    fn likelihood_recovers_parameters_from_poisson_counts() {
        let truth = canonical_model(&[2000.0, 2.0, 100.0]);
        let hist =
            generate_histogram(&truth, "hist", Binning::default(), NoiseKind::Poisson, 0.0, 11).unwrap();

        let mut model = canonical_model(&[1500.0, 1.5, 80.0]);
        let opts = FitOptions { method: FitMethod::Likelihood, ..FitOptions::default() };
        let report = fit(&hist, &mut model, &opts).unwrap();

        assert!(report.converged);
        assert_eq!(report.n_bins_used, 200);
        assert!(within(model.param("A").unwrap(), 2000.0, 0.10), "{:?}", model.values());
        assert!(within(model.param("tau").unwrap(), 2.0, 0.10), "{:?}", model.values());
        assert!(within(model.param("C").unwrap(), 100.0, 0.10), "{:?}", model.values());
    }

    #[test]
    fn exact_data_is_reproduced() {
        let truth = canonical_model(&[200.0, 2.0, 10.0]);
        let hist = generate_histogram(&truth, "hist", Binning::default(), NoiseKind::None, 0.0, 0).unwrap();

        let mut model = canonical_model(&[180.0, 2.5, 12.0]);
        let report = fit(&hist, &mut model, &FitOptions::default()).unwrap();
        assert!(report.statistic < 1e-8, "chi2 = {}", report.statistic);
        for (got, want) in model.values().iter().zip([200.0, 2.0, 10.0]) {
            assert!((got - want).abs() < 1e-4 * want, "{got} vs {want}");
        }
    }

    #[test]
    fn refit_of_converged_model_is_stable() {
        let truth = canonical_model(&[200.0, 2.0, 10.0]);
        let hist =
            generate_histogram(&truth, "hist", Binning::default(), NoiseKind::Bounded, 0.05, 3).unwrap();

        let mut model = canonical_model(&[200.0, 2.0, 10.0]);
        fit(&hist, &mut model, &FitOptions::default()).unwrap();
        let first = model.values().to_vec();

        fit(&hist, &mut model, &FitOptions::default()).unwrap();
        for (a, b) in first.iter().zip(model.values()) {
            assert!((a - b).abs() <= 1e-6 * a.abs().max(1.0), "{a} vs {b}");
        }
    }

    #[test]
    fn non_convergence_leaves_model_untouched() {
        let truth = canonical_model(&[200.0, 2.0, 10.0]);
        let hist =
            generate_histogram(&truth, "hist", Binning::default(), NoiseKind::Bounded, 0.05, 5).unwrap();

        let start = [20.0, 0.3, 0.0];
        let mut model = canonical_model(&start);
        let opts = FitOptions { max_iterations: 1, ..FitOptions::default() };
        let err = fit(&hist, &mut model, &opts).unwrap_err();

        assert!(matches!(err, FitError::NotConverged { .. }), "{err}");
        assert_eq!(model.values(), &start);
        assert!(model.errors().is_none());
    }

    /// Starts that send the decay constant to the wrong sign can only approach
    /// a straight line; that must not come back as a successful fit.
    #[test]
    fn bad_start_never_reports_a_poor_optimum() {
        let truth = canonical_model(&[200.0, 2.0, 10.0]);
        let hist =
            generate_histogram(&truth, "hist", Binning::default(), NoiseKind::Bounded, 0.05, 7).unwrap();

        let mut reference = canonical_model(&[150.0, 1.0, 5.0]);
        let best = fit(&hist, &mut reference, &FitOptions::default()).unwrap().statistic;

        let likelihood = FitOptions { method: FitMethod::Likelihood, ..FitOptions::default() };
        let mut best_likelihood = canonical_model(&[150.0, 1.0, 5.0]);
        let best_deviance = fit(&hist, &mut best_likelihood, &likelihood).unwrap().statistic;

        let cases = [
            ([200.0, 100.0, 10.0], FitOptions::default(), best),
            ([200.0, -2.0, 10.0], FitOptions::default(), best),
            ([1.0, 1.0, 1.0], likelihood.clone(), best_deviance),
        ];
        for (start, opts, optimum) in cases {
            let mut model = canonical_model(&start);
            match fit(&hist, &mut model, &opts) {
                Ok(report) => assert!(
                    report.statistic < 1.5 * optimum,
                    "start {start:?}: {} vs optimum {optimum}, params {:?}",
                    report.statistic,
                    model.values()
                ),
                Err(err) => {
                    assert!(
                        matches!(err, FitError::NotConverged { .. } | FitError::Degenerate { .. }),
                        "start {start:?}: {err}"
                    );
                    assert_eq!(model.values(), &start);
                }
            }
        }
    }

    #[test]
    fn redundant_parameters_are_degenerate() {
        let truth = canonical_model(&[200.0, 2.0, 10.0]);
        let hist =
            generate_histogram(&truth, "hist", Binning::default(), NoiseKind::Bounded, 0.05, 7).unwrap();

        let mut model = Model::define("a*b*exp(-x/2)+c", &["a", "b", "c"], &[14.0, 14.0, 10.0]).unwrap();
        let err = fit(&hist, &mut model, &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::Degenerate { .. }), "{err}");
        assert_eq!(model.values(), &[14.0, 14.0, 10.0]);
    }

    #[test]
    fn disjoint_model_domain_is_an_empty_range() {
        let truth = canonical_model(&[200.0, 2.0, 10.0]);
        let hist = generate_histogram(&truth, "hist", Binning::default(), NoiseKind::None, 0.0, 0).unwrap();

        let mut model = canonical_model(&[200.0, 2.0, 10.0]).with_domain(20.0, 30.0);
        let err = fit(&hist, &mut model, &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::EmptyRange { .. }));
    }

    #[test]
    fn explicit_range_limits_bins() {
        let truth = canonical_model(&[200.0, 2.0, 10.0]);
        let hist = generate_histogram(&truth, "hist", Binning::default(), NoiseKind::None, 0.0, 0).unwrap();

        let mut model = canonical_model(&[200.0, 2.0, 10.0]);
        let opts = FitOptions { range: Some([1.0, 3.0]), ..FitOptions::default() };
        let report = fit(&hist, &mut model, &opts).unwrap();
        // Centers 1.025 .. 2.975.
        assert_eq!(report.n_bins_used, 40);
        assert_eq!(report.range, [1.0, 3.0]);
    }

    #[test]
    fn invalid_start_point_is_reported() {
        let truth = canonical_model(&[200.0, 2.0, 10.0]);
        let hist = generate_histogram(&truth, "hist", Binning::default(), NoiseKind::None, 0.0, 0).unwrap();

        let mut model = Model::define("a*sqrt(x - b)", &["a", "b"], &[1.0, 5.0]).unwrap();
        let err = fit(&hist, &mut model, &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::NonFinite { .. }));
    }

    #[test]
    fn likelihood_needs_positive_prediction() {
        let truth = canonical_model(&[200.0, 2.0, 10.0]);
        let hist = generate_histogram(&truth, "hist", Binning::default(), NoiseKind::None, 0.0, 0).unwrap();

        let opts = FitOptions { method: FitMethod::Likelihood, ..FitOptions::default() };
        let mut model = canonical_model(&[0.0, 2.0, 0.0]);
        let err = fit(&hist, &mut model, &opts).unwrap_err();
        assert!(matches!(err, FitError::NonPositive { .. }), "{err}");
        assert!(err.to_string().contains("<= 0"), "{err}");
    }

    #[test]
    fn too_few_bins_for_parameters() {
        let mut hist = Histogram::new("h", "h", Binning { n_bins: 2, x_min: 0.0, x_max: 2.0 });
        hist.contents = vec![5.0, 3.0];
        let mut model = canonical_model(&[5.0, 1.0, 0.0]);
        let err = fit(&hist, &mut model, &FitOptions::default()).unwrap_err();
        assert_eq!(err, FitError::TooFewBins { bins: 2, params: 3 });
    }

    #[test]
    fn deviance_residual_signs() {
        assert!(deviance_residual(10.0, 5.0) > 0.0);
        assert!(deviance_residual(2.0, 5.0) < 0.0);
        assert!((deviance_residual(0.0, 2.0) + 2.0).abs() < 1e-12);
        assert_eq!(deviance_residual(4.0, 4.0), 0.0);
    }
}
