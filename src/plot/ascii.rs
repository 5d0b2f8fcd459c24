//! ASCII/Unicode plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - bin contents: `o`
//! - bin errors: `|` vertical bars
//! - fitted curve: `-` line (drawn over the fit range only)

use crate::domain::{FitFile, Histogram};
use crate::models::Model;

/// Render a histogram with the fitted model overlaid.
pub fn render_ascii_plot(
    hist: &Histogram,
    model: &Model,
    fit_range: [f64; 2],
    width: usize,
    height: usize,
) -> String {
    let curve = model.sample(fit_range[0], fit_range[1], width.max(2));
    render_plot(Some(hist), &curve, hist.x_min, hist.x_max, width, height)
}

/// Render the curve grid stored in a saved fit.
pub fn render_ascii_plot_from_fit_file(fit: &FitFile, width: usize, height: usize) -> String {
    let curve: Vec<(f64, f64)> = fit
        .grid
        .x
        .iter()
        .zip(fit.grid.y.iter())
        .map(|(&x, &y)| (x, y))
        .collect();

    render_plot(None, &curve, fit.report.range[0], fit.report.range[1], width, height)
}

fn render_plot(
    hist: Option<&Histogram>,
    curve: &[(f64, f64)],
    x_min: f64,
    x_max: f64,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let points = hist.map(bin_points).unwrap_or_default();
    let (y_min, y_max) = y_range(&points, curve).unwrap_or((0.0, 1.0));

    let mut grid = vec![vec![' '; width]; height];

    // Draw curve first (so points can overlay).
    draw_curve(&mut grid, curve, x_min, x_max, y_min, y_max);

    for &(x, y, err) in &points {
        let col = map_x(x, x_min, x_max, width);
        if err > 0.0 {
            let top = map_y(y + err, y_min, y_max, height);
            let bottom = map_y(y - err, y_min, y_max, height);
            for row in grid.iter_mut().take(bottom + 1).skip(top) {
                if row[col] == ' ' {
                    row[col] = '|';
                }
            }
        }
        grid[map_y(y, y_min, y_max, height)][col] = 'o';
    }

    // Build final string. We include a small header with ranges.
    let mut out = String::new();
    out.push_str(&format!(
        "Plot: x=[{x_min:.3}, {x_max:.3}] | y=[{y_min:.2}, {y_max:.2}]\n"
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

/// (bin center, content, error) for every bin.
fn bin_points(hist: &Histogram) -> Vec<(f64, f64, f64)> {
    (0..hist.n_bins())
        .map(|i| (hist.bin_center(i), hist.contents[i], hist.bin_error(i)))
        .collect()
}

/// Counts start at zero unless something dips below it.
fn y_range(points: &[(f64, f64, f64)], curve: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for &(_, y, err) in points {
        min_y = min_y.min(y - err);
        max_y = max_y.max(y + err);
    }
    for &(_, y) in curve {
        if y.is_finite() {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }

    if !(min_y.is_finite() && max_y.is_finite() && max_y > min_y) {
        return None;
    }
    let pad = ((max_y - min_y) * 0.05).max(1e-12);
    if min_y >= 0.0 {
        Some((0.0, max_y + pad))
    } else {
        Some((min_y - pad, max_y + pad))
    }
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_min: f64, x_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        if !y.is_finite() {
            prev = None;
            continue;
        }
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        if let Some((c0, r0)) = prev {
            draw_line(grid, c0, r0, col, row, '-');
        } else {
            grid[row][col] = '-';
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Binning, FitMethod, FitReport};

    #[test]
    fn plot_golden_snapshot_small() {
        let mut hist = Histogram::new("h", "h", Binning { n_bins: 5, x_min: 0.0, x_max: 5.0 });
        hist.contents = vec![4.0, 3.0, 2.0, 1.0, 0.0];
        hist.sumw2 = Some(vec![0.0; 5]);
        let model = Model::define("c", &["c"], &[2.0]).unwrap();

        let txt = render_ascii_plot(&hist, &model, [0.0, 5.0], 10, 5);
        let expected = concat!(
            "Plot: x=[0.000, 5.000] | y=[0.00, 4.20]\n",
            " o        \n",
            "   o      \n",
            "-----o----\n",
            "      o   \n",
            "        o \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn error_bars_span_content_plus_minus_error() {
        let mut hist = Histogram::new("h", "h", Binning { n_bins: 1, x_min: 0.0, x_max: 1.0 });
        hist.contents = vec![4.0];
        let model = Model::define("c", &["c"], &[0.0]).unwrap();

        let txt = render_ascii_plot(&hist, &model, [0.0, 1.0], 10, 7);
        let body: String = txt.lines().skip(1).collect();
        assert_eq!(body.matches('|').count(), 4);
        assert_eq!(body.matches('o').count(), 1);
        assert_eq!(txt.lines().last(), Some("----------"));
    }

    #[test]
    fn saved_fit_plots_its_curve_grid() {
        let hist = Histogram::new("h", "h", Binning { n_bins: 5, x_min: 0.0, x_max: 5.0 });
        let model = Model::define("c", &["c"], &[2.0]).unwrap();
        let report = FitReport {
            method: FitMethod::ChiSquare,
            statistic: 0.0,
            n_bins_used: 5,
            ndf: 4,
            evaluations: 1,
            converged: true,
            range: [1.0, 4.0],
        };
        let fit = crate::io::fit_file(&hist, &model, &report);

        let txt = render_ascii_plot_from_fit_file(&fit, 10, 5);
        assert!(txt.starts_with("Plot: x=[1.000, 4.000]"), "{txt}");
        let body: Vec<&str> = txt.lines().skip(1).collect();
        assert_eq!(body.len(), 5);
        assert!(body.contains(&"----------"), "{txt}");
        assert!(body.iter().all(|l| !l.contains('o')));
    }
}
