//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Objective minimised by the fitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    /// Neyman chi-square with bin errors; empty bins are skipped.
    #[value(name = "chi2")]
    #[serde(rename = "chi2")]
    ChiSquare,
    /// Binned Poisson likelihood (deviance); all bins in range are used.
    Likelihood,
}

impl FitMethod {
    pub fn display_name(self) -> &'static str {
        match self {
            FitMethod::ChiSquare => "chi-square",
            FitMethod::Likelihood => "Poisson likelihood",
        }
    }

    /// Label for the minimised quantity in reports.
    pub fn statistic_name(self) -> &'static str {
        match self {
            FitMethod::ChiSquare => "Chi2",
            FitMethod::Likelihood => "Deviance",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            FitMethod::ChiSquare => FitMethod::Likelihood,
            FitMethod::Likelihood => FitMethod::ChiSquare,
        }
    }
}

/// How the fitted result is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RenderMode {
    /// Interactive terminal view.
    Tui,
    /// Fixed-size text plot on stdout.
    Ascii,
    /// Report only.
    None,
}

/// Noise applied to synthetic histograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    /// Poisson-distributed counts around the model value.
    Poisson,
    /// Uniform relative noise within `±noise_frac` of the model value.
    Bounded,
    /// Exact model values.
    None,
}

/// Binning used when raw samples are histogrammed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binning {
    pub n_bins: usize,
    pub x_min: f64,
    pub x_max: f64,
}

impl Default for Binning {
    fn default() -> Self {
        Self {
            n_bins: 200,
            x_min: 0.0,
            x_max: 10.0,
        }
    }
}

impl Binning {
    pub fn is_valid(&self) -> bool {
        self.n_bins > 0 && self.x_min.is_finite() && self.x_max.is_finite() && self.x_max > self.x_min
    }
}

/// A named, fixed-width, one-dimensional histogram.
///
/// Bin `i` covers `[x_min + i*w, x_min + (i+1)*w)` with `w = (x_max - x_min) / n_bins`.
/// Under/overflow are kept separately and never take part in a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub name: String,
    pub title: String,
    pub x_min: f64,
    pub x_max: f64,
    pub contents: Vec<f64>,
    /// Sum of squared weights per bin, when the producer stored it.
    pub sumw2: Option<Vec<f64>>,
    pub entries: f64,
    pub underflow: f64,
    pub overflow: f64,
}

impl Histogram {
    /// An empty histogram with the given binning.
    pub fn new(name: impl Into<String>, title: impl Into<String>, binning: Binning) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            x_min: binning.x_min,
            x_max: binning.x_max,
            contents: vec![0.0; binning.n_bins],
            sumw2: None,
            entries: 0.0,
            underflow: 0.0,
            overflow: 0.0,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.contents.len()
    }

    pub fn bin_width(&self) -> f64 {
        (self.x_max - self.x_min) / self.n_bins() as f64
    }

    pub fn bin_low_edge(&self, i: usize) -> f64 {
        self.x_min + i as f64 * self.bin_width()
    }

    pub fn bin_center(&self, i: usize) -> f64 {
        self.x_min + (i as f64 + 0.5) * self.bin_width()
    }

    pub fn bin_error(&self, i: usize) -> f64 {
        match &self.sumw2 {
            Some(w2) => w2[i].max(0.0).sqrt(),
            None => self.contents[i].abs().sqrt(),
        }
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Add one unit-weight entry at `x`.
    pub fn fill(&mut self, x: f64) {
        self.entries += 1.0;
        if x < self.x_min {
            self.underflow += 1.0;
            return;
        }
        if x >= self.x_max {
            self.overflow += 1.0;
            return;
        }
        if let Some(idx) = self.find_bin(x) {
            self.contents[idx] += 1.0;
        }
    }

    /// Bin index containing `x`, if it lies inside the histogram domain.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !(x >= self.x_min && x < self.x_max) {
            return None;
        }
        let idx = ((x - self.x_min) / self.bin_width()) as usize;
        // Rounding can land exactly on n_bins for x just below x_max.
        Some(idx.min(self.n_bins() - 1))
    }
}

/// Summary stats over the bins of a histogram.
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub n_bins: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub integral: f64,
    pub y_max: f64,
}

impl DatasetStats {
    pub fn from_histogram(hist: &Histogram) -> Self {
        Self {
            n_bins: hist.n_bins(),
            x_min: hist.x_min,
            x_max: hist.x_max,
            integral: hist.integral(),
            y_max: hist.contents.iter().copied().fold(0.0, f64::max),
        }
    }
}

/// Outcome of a single fit call. The fitted values themselves live in the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub method: FitMethod,
    /// Chi-square, or Poisson deviance for likelihood fits.
    pub statistic: f64,
    pub n_bins_used: usize,
    pub ndf: usize,
    /// Residual evaluations used by the solver.
    pub evaluations: usize,
    pub converged: bool,
    pub range: [f64; 2],
}

impl FitReport {
    /// Statistic per degree of freedom (NaN when `ndf == 0`).
    pub fn reduced(&self) -> f64 {
        if self.ndf == 0 {
            f64::NAN
        } else {
            self.statistic / self.ndf as f64
        }
    }
}

/// Per-bin comparison of data and fitted model.
#[derive(Debug, Clone)]
pub struct BinResidual {
    pub bin: usize,
    pub x_low: f64,
    pub x_center: f64,
    pub x_high: f64,
    pub content: f64,
    pub error: f64,
    pub fit: f64,
    pub residual: f64,
    /// Residual over bin error; `None` for bins with zero error.
    pub pull: Option<f64>,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub data_path: PathBuf,
    pub dataset: String,
    pub binning: Binning,

    pub expression: String,
    pub param_names: Vec<String>,
    pub initial_values: Vec<f64>,

    pub method: FitMethod,
    pub range: Option<[f64; 2]>,
    pub max_iterations: usize,

    pub render: RenderMode,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_fit: Option<PathBuf>,
    pub export_bins: Option<PathBuf>,
}

/// Configuration for writing a synthetic dataset file.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub out: PathBuf,
    pub name: String,
    pub expression: String,
    pub param_names: Vec<String>,
    pub values: Vec<f64>,
    pub binning: Binning,
    pub seed: u64,
    pub noise: NoiseKind,
    pub noise_frac: f64,
}

/// A fitted parameter as written to fit files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub name: String,
    pub value: f64,
    pub error: Option<f64>,
}

/// A saved fit (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub dataset: String,
    pub expression: String,
    pub params: Vec<ParamEstimate>,
    pub report: FitReport,
    pub grid: CurveGrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_routes_edges_to_flow_bins() {
        let mut h = Histogram::new("h", "h", Binning { n_bins: 4, x_min: 0.0, x_max: 4.0 });
        for x in [-0.5, 0.0, 0.99, 1.0, 3.999, 4.0, 7.0] {
            h.fill(x);
        }
        assert_eq!(h.contents, vec![2.0, 1.0, 0.0, 1.0]);
        assert_eq!(h.underflow, 1.0);
        assert_eq!(h.overflow, 2.0);
        assert_eq!(h.entries, 7.0);
    }

    #[test]
    fn bin_geometry() {
        let h = Histogram::new("h", "h", Binning::default());
        assert!((h.bin_width() - 0.05).abs() < 1e-15);
        assert!((h.bin_center(0) - 0.025).abs() < 1e-15);
        assert_eq!(h.find_bin(9.99), Some(199));
        assert_eq!(h.find_bin(10.0), None);
    }

    #[test]
    fn bin_error_prefers_sumw2() {
        let mut h = Histogram::new("h", "h", Binning { n_bins: 2, x_min: 0.0, x_max: 1.0 });
        h.contents = vec![9.0, 4.0];
        assert_eq!(h.bin_error(0), 3.0);
        h.sumw2 = Some(vec![16.0, 1.0]);
        assert_eq!(h.bin_error(0), 4.0);
        assert_eq!(h.bin_error(1), 1.0);
    }
}
