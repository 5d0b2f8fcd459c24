//! Shared "fit pipeline" logic used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! dataset load -> model definition -> fit -> residuals
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use crate::domain::{BinResidual, FitConfig, FitMethod, FitReport, Histogram};
use crate::error::AppError;
use crate::fit::FitOptions;
use crate::io::load_dataset;
use crate::models::Model;

/// All computed outputs of a single `histfit fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub hist: Histogram,
    /// The model as defined on the command line (initial values).
    pub initial: Model,
    /// The model after fitting.
    pub model: Model,
    pub report: FitReport,
    pub residuals: Vec<BinResidual>,
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    // 1) Locate the dataset.
    let hist = load_dataset(&config.data_path, &config.dataset, &config.binning)?;

    // 2) Define the model.
    let initial = Model::define(&config.expression, &config.param_names, &config.initial_values)?;

    // 3) Fit and compare.
    let (model, report) = refit(&hist, &initial, config, config.method)?;
    let residuals = crate::report::compute_residuals(&hist, &model, &report);

    Ok(RunOutput {
        hist,
        initial,
        model,
        report,
        residuals,
    })
}

/// Fit a copy of `start` to `hist` with the given method.
///
/// `start` is left untouched, so the TUI can refit from the same point.
pub fn refit(
    hist: &Histogram,
    start: &Model,
    config: &FitConfig,
    method: FitMethod,
) -> Result<(Model, FitReport), AppError> {
    let mut model = start.clone();
    let opts = fit_options(config, method);
    let report = crate::fit::fit(hist, &mut model, &opts)?;
    Ok((model, report))
}

pub fn fit_options(config: &FitConfig, method: FitMethod) -> FitOptions {
    FitOptions {
        method,
        max_iterations: config.max_iterations,
        range: config.range,
        ..FitOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Binning, NoiseKind, RenderMode};

    fn config_for(path: std::path::PathBuf) -> FitConfig {
        FitConfig {
            data_path: path,
            dataset: "hist".to_string(),
            binning: Binning::default(),
            expression: "[0]*exp(-x/[1])+[2]".to_string(),
            param_names: vec!["A".into(), "tau".into(), "C".into()],
            initial_values: vec![200.0, 2.0, 10.0],
            method: FitMethod::ChiSquare,
            range: None,
            max_iterations: 200,
            render: RenderMode::None,
            plot_width: 80,
            plot_height: 20,
            export_fit: None,
            export_bins: None,
        }
    }

    #[test]
    fn pipeline_fits_a_generated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("time_diff.json");
        let truth = Model::define("[0]*exp(-x/[1])+[2]", &["A", "tau", "C"], &[180.0, 2.2, 12.0]).unwrap();
        let hist = crate::data::generate_histogram(&truth, "hist", Binning::default(), NoiseKind::None, 0.0, 1)
            .unwrap();
        crate::io::write_dataset_file(&path, &[hist]).unwrap();

        let run = run_fit(&config_for(path)).unwrap();
        assert!(run.report.converged);
        assert_eq!(run.initial.values(), &[200.0, 2.0, 10.0]);
        assert!((run.model.param("tau").unwrap() - 2.2).abs() < 1e-4);
        assert_eq!(run.residuals.len(), 200);
    }

    #[test]
    fn missing_file_maps_to_input_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_fit(&config_for(dir.path().join("nope.json"))).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
