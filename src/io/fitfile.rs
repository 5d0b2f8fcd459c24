//! Read/write fit JSON files.
//!
//! Fit JSON is the "portable" representation of a fitted model:
//! - expression + named parameters (values and errors)
//! - the fit report (method, statistic, ndf, range)
//! - a precomputed curve grid for quick plotting
//!
//! The schema is defined by `domain::FitFile`.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::domain::{CurveGrid, FitFile, FitReport, Histogram, ParamEstimate};
use crate::error::AppError;
use crate::models::Model;

/// Number of grid points stored for plotting.
const GRID_POINTS: usize = 201;

/// Build the serializable form of a fitted model.
pub fn fit_file(hist: &Histogram, model: &Model, report: &FitReport) -> FitFile {
    let errors = model.errors();
    let params = model
        .names()
        .iter()
        .zip(model.values())
        .enumerate()
        .map(|(i, (name, &value))| ParamEstimate {
            name: name.clone(),
            value,
            error: errors.map(|e| e[i]),
        })
        .collect();

    let (x, y) = model
        .sample(report.range[0], report.range[1], GRID_POINTS)
        .into_iter()
        .unzip();

    FitFile {
        tool: "histfit".to_string(),
        created: Utc::now(),
        dataset: hist.name.clone(),
        expression: model.expression().to_string(),
        params,
        report: report.clone(),
        grid: CurveGrid { x, y },
    }
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, hist: &Histogram, model: &Model, report: &FitReport) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create fit JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(file, &fit_file(hist, model, report))
        .map_err(|e| AppError::new(4, format!("Failed to write fit JSON: {e}")))?;

    log::info!("wrote fit to {}", path.display());
    Ok(())
}

/// Read a fit JSON file.
pub fn read_fit_json(path: &Path) -> Result<FitFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    let fit: FitFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid fit JSON: {e}")))?;
    if fit.grid.x.len() != fit.grid.y.len() {
        return Err(AppError::new(2, "Invalid fit JSON: grid x/y lengths differ."));
    }
    Ok(fit)
}

/// Rebuild the model stored in a fit file (with its fitted values).
pub fn model_from_fit_file(fit: &FitFile) -> Result<Model, AppError> {
    let names: Vec<&str> = fit.params.iter().map(|p| p.name.as_str()).collect();
    let values: Vec<f64> = fit.params.iter().map(|p| p.value).collect();
    Ok(Model::define(&fit.expression, &names, &values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Binning, FitMethod};

    #[test]
    fn saved_fit_rebuilds_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.json");

        let hist = Histogram::new("hist", "hist", Binning::default());
        let model = Model::define("A*exp(-x/tau)+C", &["A", "tau", "C"], &[198.0, 2.05, 9.7]).unwrap();
        let report = FitReport {
            method: FitMethod::ChiSquare,
            statistic: 190.0,
            n_bins_used: 200,
            ndf: 197,
            evaluations: 6,
            converged: true,
            range: [0.0, 10.0],
        };
        write_fit_json(&path, &hist, &model, &report).unwrap();

        let fit = read_fit_json(&path).unwrap();
        assert_eq!(fit.dataset, "hist");
        assert_eq!(fit.report, report);
        assert_eq!(fit.grid.x.len(), GRID_POINTS);
        assert_eq!(fit.params[1].name, "tau");
        assert_eq!(fit.params[1].error, None);

        let rebuilt = model_from_fit_file(&fit).unwrap();
        assert_eq!(rebuilt.values(), model.values());
        assert!((fit.grid.y[0] - model.eval(0.0)).abs() < 1e-12);
    }
}
