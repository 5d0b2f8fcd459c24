//! Command-line parsing for the histogram fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::{FitMethod, NoiseKind, RenderMode};

pub mod picker;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "histfit", version, about = "Fit a parametric model to a binned dataset")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a model to a dataset, print the fit report, and optionally plot/export.
    Fit(FitArgs),
    /// Write a synthetic dataset file drawn from a model.
    Generate(GenerateArgs),
    /// List the dataset names in a file.
    List(ListArgs),
    /// Plot a previously exported fit JSON.
    Plot(PlotArgs),
}

/// Binning applied to CSV sample columns.
#[derive(Debug, Args, Clone)]
pub struct BinningArgs {
    /// Number of bins.
    #[arg(long, default_value_t = 200)]
    pub bins: usize,

    /// Lower edge of the first bin.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub x_min: f64,

    /// Upper edge of the last bin.
    #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
    pub x_max: f64,
}

/// Options for fitting.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Dataset file (.json histograms or .csv sample columns).
    #[arg(short = 'f', long, default_value = "time_diff.json")]
    pub file: PathBuf,

    /// Pick the dataset file interactively from the current directory tree.
    #[arg(long, conflicts_with = "file")]
    pub pick: bool,

    /// Name of the dataset inside the file.
    #[arg(short = 'd', long, default_value = "hist")]
    pub dataset: String,

    /// Model expression in `x`, with parameters as `[k]` or by name.
    #[arg(short = 'e', long = "expr", default_value = "[0]*exp(-x/[1])+[2]")]
    pub expression: String,

    /// Parameter names, comma-separated, in index order.
    #[arg(short = 'p', long, value_delimiter = ',', default_value = "A,tau,C")]
    pub params: Vec<String>,

    /// Initial parameter values, comma-separated.
    #[arg(
        short = 'i',
        long = "init",
        value_delimiter = ',',
        default_value = "200,2,10",
        allow_hyphen_values = true
    )]
    pub init: Vec<f64>,

    #[command(flatten)]
    pub binning: BinningArgs,

    /// Lower bound of the fit range (defaults to the histogram axis).
    #[arg(long, allow_negative_numbers = true)]
    pub range_min: Option<f64>,

    /// Upper bound of the fit range (defaults to the histogram axis).
    #[arg(long, allow_negative_numbers = true)]
    pub range_max: Option<f64>,

    /// Objective to minimise.
    #[arg(long, value_enum, default_value_t = FitMethod::ChiSquare)]
    pub method: FitMethod,

    /// Levenberg-Marquardt budget: the solver gives up after
    /// `max-iter * (parameters + 1)` residual evaluations.
    #[arg(long = "max-iter", default_value_t = 200)]
    pub max_iter: usize,

    /// How to show the result (defaults to `tui` on a terminal, `ascii` otherwise).
    #[arg(long, value_enum)]
    pub render: Option<RenderMode>,

    /// ASCII plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// ASCII plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export the fitted model (expression + params + curve grid) to JSON.
    #[arg(long = "export-fit", value_name = "JSON")]
    pub export_fit: Option<PathBuf>,

    /// Export per-bin data, fit values and pulls to CSV.
    #[arg(long = "export-bins", value_name = "CSV")]
    pub export_bins: Option<PathBuf>,
}

/// Options for generating a synthetic dataset.
#[derive(Debug, Parser, Clone)]
pub struct GenerateArgs {
    /// Output file (.json writes a histogram, .csv writes raw decay samples).
    #[arg(short = 'o', long, default_value = "time_diff.json")]
    pub out: PathBuf,

    /// Dataset name written to the file.
    #[arg(long, default_value = "hist")]
    pub name: String,

    /// Model expression used for the bin expectations.
    #[arg(short = 'e', long = "expr", default_value = "[0]*exp(-x/[1])+[2]")]
    pub expression: String,

    /// Parameter names, comma-separated.
    #[arg(short = 'p', long, value_delimiter = ',', default_value = "A,tau,C")]
    pub params: Vec<String>,

    /// True parameter values, comma-separated.
    #[arg(long, value_delimiter = ',', default_value = "200,2,10", allow_hyphen_values = true)]
    pub values: Vec<f64>,

    #[command(flatten)]
    pub binning: BinningArgs,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Noise applied to the expected bin contents.
    #[arg(long, value_enum, default_value_t = NoiseKind::Poisson)]
    pub noise: NoiseKind,

    /// Relative half-width for `--noise bounded`.
    #[arg(long, default_value_t = 0.05)]
    pub noise_frac: f64,

    /// Number of raw samples for CSV output.
    #[arg(long, default_value_t = 10_000)]
    pub samples: usize,

    /// Flat background fraction for CSV output.
    #[arg(long, default_value_t = 0.05)]
    pub background: f64,
}

/// Options for listing datasets.
#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Dataset file.
    #[arg(short = 'f', long, default_value = "time_diff.json")]
    pub file: PathBuf,
}

/// Options for plotting a saved fit.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Fit JSON file produced by `histfit fit --export-fit`.
    #[arg(long, value_name = "JSON")]
    pub fit: PathBuf,

    /// Dataset file to overlay (the dataset name is read from the fit JSON).
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub binning: BinningArgs,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_defaults_match_the_decay_model() {
        let cli = Cli::parse_from(["histfit", "fit"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.file, PathBuf::from("time_diff.json"));
        assert_eq!(args.dataset, "hist");
        assert_eq!(args.params, ["A", "tau", "C"]);
        assert_eq!(args.init, [200.0, 2.0, 10.0]);
        assert_eq!(args.binning.bins, 200);
        assert_eq!(args.method, FitMethod::ChiSquare);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn lists_and_verbosity_parse() {
        let cli = Cli::parse_from([
            "histfit", "-vv", "fit", "-p", "a,b", "--init=-1.5,3", "--method", "likelihood", "--render", "ascii",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(cli.verbose, 2);
        assert_eq!(args.params, ["a", "b"]);
        assert_eq!(args.init, [-1.5, 3.0]);
        assert_eq!(args.method, FitMethod::Likelihood);
        assert_eq!(args.render, Some(RenderMode::Ascii));
    }
}
