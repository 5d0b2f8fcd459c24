//! Reporting utilities: per-bin residuals and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::{BinResidual, FitReport, Histogram};
use crate::models::Model;

/// Compare every bin inside the fit range against the fitted model.
pub fn compute_residuals(hist: &Histogram, model: &Model, report: &FitReport) -> Vec<BinResidual> {
    let width = hist.bin_width();
    (0..hist.n_bins())
        .filter_map(|i| {
            let x_center = hist.bin_center(i);
            if x_center < report.range[0] || x_center > report.range[1] {
                return None;
            }
            let content = hist.contents[i];
            let error = hist.bin_error(i);
            let fit = model.eval(x_center);
            let residual = content - fit;
            Some(BinResidual {
                bin: i,
                x_low: hist.bin_low_edge(i),
                x_center,
                x_high: hist.bin_low_edge(i) + width,
                content,
                error,
                fit,
                residual,
                pull: (error > 0.0).then(|| residual / error),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Binning, FitMethod};

    #[test]
    fn residuals_respect_range_and_empty_bins() {
        let mut hist = Histogram::new("h", "h", Binning { n_bins: 4, x_min: 0.0, x_max: 4.0 });
        hist.contents = vec![4.0, 0.0, 9.0, 1.0];
        let model = Model::define("c", &["c"], &[3.0]).unwrap();
        let report = FitReport {
            method: FitMethod::ChiSquare,
            statistic: 0.0,
            n_bins_used: 3,
            ndf: 2,
            evaluations: 1,
            converged: true,
            range: [0.0, 3.0],
        };

        let rows = compute_residuals(&hist, &model, &report);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].pull, Some(0.5));
        assert_eq!(rows[1].pull, None);
        assert_eq!(rows[2].residual, 6.0);
        assert_eq!(rows[2].pull, Some(2.0));
        assert_eq!(rows[2].x_high, 3.0);
    }
}
