//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (important for snapshot tests)

use crate::domain::{DatasetStats, FitFile, FitReport, Histogram};
use crate::models::Model;

/// Format the full run summary (dataset stats + fit diagnostics + parameters).
pub fn format_fit_summary(hist: &Histogram, model: &Model, report: &FitReport) -> String {
    let stats = DatasetStats::from_histogram(hist);
    let mut out = String::new();

    out.push_str("=== histfit ===\n");
    out.push_str(&format!("Dataset: {} ({})\n", hist.name, hist.title));
    out.push_str(&format!(
        "Bins: n={} | x=[{}, {}] | integral={:.1} | max={:.1}\n",
        stats.n_bins, stats.x_min, stats.x_max, stats.integral, stats.y_max
    ));
    out.push_str(&format!("Model: {}\n", model.expression()));
    out.push_str(&format!(
        "Method: {} | range=[{:.3}, {:.3}] | bins used={}\n",
        report.method.display_name(),
        report.range[0],
        report.range[1],
        report.n_bins_used
    ));
    out.push('\n');

    let stat = report.method.statistic_name();
    out.push_str(&format!("{:<12} = {:>14.4}\n", stat, report.statistic));
    out.push_str(&format!("{:<12} = {:>14}\n", "NDf", report.ndf));
    out.push_str(&format!("{:<12} = {:>14.4}\n", format!("{stat}/NDf"), report.reduced()));
    out.push_str(&format!("{:<12} = {:>14}\n", "Evaluations", report.evaluations));
    out.push('\n');

    out.push_str(&format_params(
        model.names(),
        model.values(),
        model.errors(),
    ));

    out
}

/// Format a saved fit (used by `histfit plot`).
pub fn format_fit_file(fit: &FitFile) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Fit of '{}' ({}), created {}\n",
        fit.dataset,
        fit.report.method.display_name(),
        fit.created.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("Model: {}\n", fit.expression));

    let names: Vec<String> = fit.params.iter().map(|p| p.name.clone()).collect();
    let values: Vec<f64> = fit.params.iter().map(|p| p.value).collect();
    let errors: Option<Vec<f64>> = fit.params.iter().map(|p| p.error).collect();
    out.push_str(&format_params(&names, &values, errors.as_deref()));
    out
}

/// Dataset names, one per line.
pub fn format_dataset_list(names: &[String]) -> String {
    let mut out = String::new();
    for name in names {
        out.push_str(name);
        out.push('\n');
    }
    out
}

fn format_params(names: &[String], values: &[f64], errors: Option<&[f64]>) -> String {
    let mut out = String::new();
    for (i, (name, value)) in names.iter().zip(values).enumerate() {
        let line = match errors {
            Some(err) => format!("{:<12} = {:>14} +/- {}\n", truncate(name, 12), fmt_num(*value), fmt_num(err[i])),
            None => format!("{:<12} = {:>14}\n", truncate(name, 12), fmt_num(*value)),
        };
        out.push_str(&line);
    }
    out
}

/// Four significant-ish decimals, switching to scientific for very large/small values.
fn fmt_num(v: f64) -> String {
    let a = v.abs();
    if v == 0.0 || (1e-3..1e6).contains(&a) {
        format!("{v:.4}")
    } else if v.is_finite() {
        format!("{v:.4e}")
    } else {
        format!("{v}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Binning, FitMethod};

    #[test]
    fn summary_lists_parameters_with_errors() {
        let mut hist = Histogram::new("hist", "time diff", Binning { n_bins: 2, x_min: 0.0, x_max: 2.0 });
        hist.contents = vec![3.0, 1.0];
        let mut model = Model::define("A*exp(-x/tau)", &["A", "tau"], &[1.0, 1.0]).unwrap();
        model.set_fit_result(&[3.5, 0.9], vec![0.25, 0.0001]);
        let report = FitReport {
            method: FitMethod::ChiSquare,
            statistic: 0.5,
            n_bins_used: 2,
            ndf: 0,
            evaluations: 4,
            converged: true,
            range: [0.0, 2.0],
        };

        let txt = format_fit_summary(&hist, &model, &report);
        let has_row = |want: &[&str]| {
            txt.lines()
                .any(|l| l.split_whitespace().collect::<Vec<_>>() == want)
        };
        assert!(txt.contains("Dataset: hist (time diff)"));
        assert!(has_row(&["Chi2/NDf", "=", "NaN"]));
        assert!(has_row(&["A", "=", "3.5000", "+/-", "0.2500"]));
        assert!(has_row(&["tau", "=", "0.9000", "+/-", "1.0000e-4"]));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(fmt_num(0.0), "0.0000");
        assert_eq!(fmt_num(12.5), "12.5000");
        assert_eq!(fmt_num(2.0e7), "2.0000e7");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
