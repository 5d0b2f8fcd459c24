//! Ratatui-based terminal UI.
//!
//! Shows the histogram with the fitted model overlaid, plus a parameter
//! table. The fit can be redone in place with a different method or from the
//! initial values.

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
    Terminal,
};

use crate::app::pipeline::{refit, RunOutput};
use crate::domain::{FitConfig, FitMethod, FitReport, Histogram};
use crate::error::AppError;
use crate::models::Model;

mod plotters_chart;

use plotters_chart::{BinMarker, HistPlottersChart};

/// Points used to draw the fitted curve.
const CURVE_POINTS: usize = 400;

/// Start the TUI on a completed run.
pub fn run(config: &FitConfig, output: RunOutput) -> Result<(), AppError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(config, output);
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App<'a> {
    config: &'a FitConfig,
    hist: Histogram,
    initial: Model,
    model: Model,
    /// `None` after a failed refit; the last good model is still shown.
    report: Option<FitReport>,
    method: FitMethod,
    log_y: bool,
    status: String,
}

impl<'a> App<'a> {
    fn new(config: &'a FitConfig, output: RunOutput) -> Self {
        let status = format!(
            "{} converged after {} evaluations.",
            output.report.method.display_name(),
            output.report.evaluations
        );
        Self {
            config,
            method: output.report.method,
            hist: output.hist,
            initial: output.initial,
            model: output.model,
            report: Some(output.report),
            log_y: false,
            status,
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))? {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the app should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('m') => {
                self.method = self.method.toggle();
                let start = self.model.clone();
                self.refit_from(&start);
            }
            KeyCode::Char('r') => {
                let start = self.initial.clone();
                self.refit_from(&start);
            }
            KeyCode::Char('l') => {
                self.log_y = !self.log_y;
                self.status = format!("y axis: {}", if self.log_y { "log" } else { "linear" });
            }
            _ => {}
        }
        false
    }

    fn refit_from(&mut self, start: &Model) {
        match refit(&self.hist, start, self.config, self.method) {
            Ok((model, report)) => {
                self.status = format!(
                    "{} converged after {} evaluations.",
                    self.method.display_name(),
                    report.evaluations
                );
                self.model = model;
                self.report = Some(report);
            }
            Err(err) => {
                log::warn!("refit failed: {err}");
                self.status = format!("{} fit failed: {err}", self.method.display_name());
                self.report = None;
            }
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let lines = vec![
            Line::from(vec![
                Span::styled("histfit", Style::default().fg(Color::Cyan)),
                Span::raw(format!(
                    " {} ({}) | {} bins in [{}, {}]",
                    self.hist.name,
                    self.hist.title,
                    self.hist.n_bins(),
                    self.hist.x_min,
                    self.hist.x_max
                )),
            ]),
            Line::from(Span::styled(
                format!("model: {} | method: {}", self.model.expression(), self.method.display_name()),
                Style::default().fg(Color::Gray),
            )),
        ];

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(38)])
            .split(area);

        self.draw_chart(frame, chunks[0]);
        self.draw_params(frame, chunks[1]);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let title = if self.log_y { "Fit (log y)" } else { "Fit" };
        let block = Block::default().title(title).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let range = self
            .report
            .as_ref()
            .map(|r| r.range)
            .unwrap_or([self.hist.x_min, self.hist.x_max]);
        let data = prepare_chart(&self.hist, &self.model, range, self.log_y);

        let (chart_rect, insets) = chart_layout(inner);
        let widget = HistPlottersChart {
            curve: &data.curve,
            bins: &data.bins,
            x_bounds: data.x_bounds,
            y_bounds: data.y_bounds,
            x_label: "x",
            y_label: y_axis_label(self.log_y).to_string(),
            fmt_x: fmt_axis_x,
            fmt_y: fmt_axis_y,
        };

        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(
                frame,
                inner,
                chart_rect,
                insets,
                data.x_bounds,
                data.y_bounds,
                self.log_y,
                y_axis_label(self.log_y),
            );
        }
    }

    fn draw_params(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let header = Row::new(vec!["name", "value", "error"])
            .style(Style::default().add_modifier(Modifier::BOLD));

        let errors = self.model.errors();
        let mut rows: Vec<Row> = self
            .model
            .names()
            .iter()
            .zip(self.model.values())
            .enumerate()
            .map(|(i, (name, value))| {
                let err = errors.map(|e| format!("{:.4}", e[i])).unwrap_or_else(|| "-".to_string());
                Row::new(vec![
                    Cell::from(name.clone()),
                    Cell::from(format!("{value:.4}")),
                    Cell::from(err),
                ])
            })
            .collect();

        if let Some(report) = &self.report {
            rows.push(Row::new(vec![Cell::from(""), Cell::from(""), Cell::from("")]));
            rows.push(Row::new(vec![
                Cell::from(report.method.statistic_name()),
                Cell::from(format!("{:.3}", report.statistic)),
                Cell::from(""),
            ]));
            rows.push(Row::new(vec![
                Cell::from("NDf"),
                Cell::from(report.ndf.to_string()),
                Cell::from(""),
            ]));
            rows.push(Row::new(vec![
                Cell::from(format!("{}/NDf", report.method.statistic_name())),
                Cell::from(format!("{:.3}", report.reduced())),
                Cell::from(""),
            ]));
        }

        let table = Table::new(
            rows,
            [Constraint::Length(12), Constraint::Length(12), Constraint::Length(10)],
        )
        .header(header)
        .block(Block::default().title("Parameters").borders(Borders::ALL));
        frame.render_widget(table, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "m method  r reset  l log-y  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Series and bounds for the chart widget.
#[derive(Debug, Clone)]
struct ChartData {
    bins: Vec<BinMarker>,
    curve: Vec<(f64, f64)>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

/// Build chart series for Plotters.
///
/// With `log_y`, every y value is log10'd; empty bins and non-positive curve
/// points are dropped.
fn prepare_chart(hist: &Histogram, model: &Model, range: [f64; 2], log_y: bool) -> ChartData {
    let x_bounds = [hist.x_min, hist.x_max];

    let floor = if log_y {
        hist.contents
            .iter()
            .copied()
            .filter(|&c| c > 0.0)
            .fold(f64::INFINITY, f64::min)
            * 0.5
    } else {
        f64::NEG_INFINITY
    };
    let scale = |y: f64| if log_y { y.max(floor).log10() } else { y };

    let bins: Vec<BinMarker> = (0..hist.n_bins())
        .filter(|&i| !log_y || hist.contents[i] > 0.0)
        .map(|i| {
            let y = hist.contents[i];
            let err = hist.bin_error(i);
            BinMarker {
                x: hist.bin_center(i),
                y: scale(y),
                y_low: scale(y - err),
                y_high: scale(y + err),
            }
        })
        .collect();

    let curve: Vec<(f64, f64)> = model
        .sample(range[0], range[1], CURVE_POINTS)
        .into_iter()
        .filter(|&(_, y)| y.is_finite() && (!log_y || y > 0.0))
        .map(|(x, y)| (x, if log_y { y.log10() } else { y }))
        .collect();

    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for b in &bins {
        y_min = y_min.min(b.y_low);
        y_max = y_max.max(b.y_high);
    }
    for &(_, y) in &curve {
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    if !y_min.is_finite() || !y_max.is_finite() || y_max <= y_min {
        y_min = 0.0;
        y_max = 1.0;
    }

    let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);
    let y_bounds = if !log_y && y_min >= 0.0 {
        [0.0, y_max + pad]
    } else {
        [y_min - pad, y_max + pad]
    };

    ChartData {
        bins,
        curve,
        x_bounds,
        y_bounds,
    }
}

fn fmt_axis_x(v: f64) -> String {
    format!("{v:.2}")
}

fn fmt_axis_y(v: f64) -> String {
    format!("{v:.1}")
}

fn y_axis_label(log_y: bool) -> &'static str {
    if log_y { "log10(entries)" } else { "entries" }
}

/// Tick text for a y-axis position; in log mode `value` is the exponent.
fn format_y_tick(value: f64, log_y: bool) -> String {
    let v = if log_y { 10f64.powf(value) } else { value };
    let a = v.abs();
    if a == 0.0 || (1.0..1e5).contains(&a) {
        format!("{v:.0}")
    } else if (1e-2..1.0).contains(&a) {
        format!("{v:.2}")
    } else {
        format!("{v:.1e}")
    }
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10
        || inner.height <= insets.top + insets.bottom + 5
    {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

#[allow(clippy::too_many_arguments)]
fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
    log_y: bool,
    y_label: &str,
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x_val = x_bounds[0] + u * (x_bounds[1] - x_bounds[0]);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = format!("{:.1}", x_val);
        let label_len = label.len() as u16;
        let start = x.saturating_sub((label.len() / 2) as u16);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let y_val = y_bounds[0] + u * (y_bounds[1] - y_bounds[0]);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = format_y_tick(y_val, log_y);
        let label_len = label.len() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label.len() as u16);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let x_label = Paragraph::new("x")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Gray));
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(x_label, x_rect);
    }

    let y_label = Paragraph::new(y_label)
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: insets.left.saturating_sub(1),
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}
