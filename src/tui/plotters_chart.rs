//! Plotters-powered histogram + fit chart widget for Ratatui.
//!
//! Plotters gives us axes, tick labels and error bars without hand-placing
//! them in the terminal buffer. Output goes into the Ratatui buffer through
//! `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// One histogram bin as drawn: center, content, and the vertical error extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinMarker {
    pub x: f64,
    pub y: f64,
    pub y_low: f64,
    pub y_high: f64,
}

/// A render-only chart description.
///
/// All series and bounds are computed outside the render call (see
/// `tui::prepare_chart`), so `render()` only draws.
pub struct HistPlottersChart<'a> {
    /// Line series for the fitted model.
    pub curve: &'a [(f64, f64)],
    /// Histogram bins with their error bars.
    pub bins: &'a [BinMarker],
    /// X bounds (histogram axis).
    pub x_bounds: [f64; 2],
    /// Y bounds (already in log10 units when `log_y` is set).
    pub y_bounds: [f64; 2],
    pub x_label: &'a str,
    pub y_label: String,
    pub fmt_x: fn(f64) -> String,
    pub fmt_y: fn(f64) -> String,
}

impl<'a> Widget for HistPlottersChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters may fail to build a chart in a tiny area; show a hint instead.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let x0 = self.x_bounds[0];
        let x1 = self.x_bounds[1];
        let y0 = self.y_bounds[0];
        let y1 = self.y_bounds[1];

        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                // Terminal cells are low-res, so keep label areas compact.
                .set_label_area_size(LabelAreaPosition::Left, 7)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc(self.x_label)
                .y_desc(&self.y_label)
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| (self.fmt_x)(*v))
                .y_label_formatter(&|v| (self.fmt_y)(*v))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            let bar_color = RGBColor(128, 128, 128);
            let point_color = WHITE;
            let curve_color = RGBColor(255, 0, 0);

            // Histogram first, the fitted curve is overlaid on top of it.
            for b in self.bins.iter().filter(|b| b.y_high > b.y_low) {
                chart.draw_series(LineSeries::new([(b.x, b.y_low), (b.x, b.y_high)], &bar_color))?;
            }

            // `Circle` radii are mis-scaled by the ratatui backend; pixels render cleanly.
            chart.draw_series(self.bins.iter().map(|b| Pixel::new((b.x, b.y), point_color)))?;

            chart.draw_series(LineSeries::new(self.curve.iter().copied(), &curve_color))?;

            Ok(())
        });

        widget.render(area, buf);
    }
}
