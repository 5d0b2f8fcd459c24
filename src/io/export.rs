//! Export per-bin results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::path::Path;

use serde::Serialize;

use crate::domain::BinResidual;
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct BinRow {
    bin: usize,
    x_low: f64,
    x_center: f64,
    x_high: f64,
    content: f64,
    error: f64,
    fit: f64,
    residual: f64,
    pull: Option<f64>,
}

/// Write per-bin results to a CSV file.
pub fn write_bins_csv(path: &Path, residuals: &[BinResidual]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(4, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    for r in residuals {
        writer
            .serialize(BinRow {
                bin: r.bin,
                x_low: r.x_low,
                x_center: r.x_center,
                x_high: r.x_high,
                content: r.content,
                error: r.error,
                fit: r.fit,
                residual: r.residual,
                pull: r.pull,
            })
            .map_err(|e| AppError::new(4, format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(4, format!("Failed to flush export CSV: {e}")))?;

    log::info!("wrote {} bin rows to {}", residuals.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_empty_pull() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bins.csv");
        let rows = vec![BinResidual {
            bin: 0,
            x_low: 0.0,
            x_center: 0.5,
            x_high: 1.0,
            content: 0.0,
            error: 0.0,
            fit: 1.5,
            residual: -1.5,
            pull: None,
        }];
        write_bins_csv(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("bin,x_low,x_center,x_high,content,error,fit,residual,pull")
        );
        assert_eq!(lines.next(), Some("0,0.0,0.5,1.0,0.0,0.0,1.5,-1.5,"));
    }
}
