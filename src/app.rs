//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments
//! - loads the dataset and fits the model
//! - prints reports/plots or opens the TUI
//! - writes optional exports

use std::io::{IsTerminal, Write};

use clap::Parser;

use crate::cli::{Command, FitArgs, GenerateArgs, ListArgs, PlotArgs};
use crate::domain::{Binning, FitConfig, GenerateConfig, RenderMode};
use crate::error::AppError;
use crate::models::Model;

pub mod pipeline;

/// Entry point for the `histfit` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is the common case.
    let _ = dotenvy::dotenv();

    // We want `histfit` and `histfit -f data.json` to behave like `histfit fit ...`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    setup_logging(cli.verbose);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Generate(args) => handle_generate(args),
        Command::List(args) => handle_list(args),
        Command::Plot(args) => handle_plot(args),
    }
}

/// Initialise `env_logger`. `RUST_LOG` wins over the `-v` count.
fn setup_logging(verbose: u8) {
    let mut builder = env_logger::Builder::new();
    if std::env::var_os("RUST_LOG").is_some() {
        builder.parse_default_env();
    } else {
        builder.filter_level(log_filter_from_verbosity(verbose));
    }
    builder.format(|buf, record| {
        writeln!(buf, "{:5} [{}]: {}", record.level(), record.target(), record.args())
    });
    // A logger may already be installed (tests, embedding).
    let _ = builder.try_init();
}

fn log_filter_from_verbosity(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let mut config = fit_config_from_args(&args);
    if args.pick {
        config.data_path = crate::cli::picker::prompt_for_dataset_path()?;
    }

    let run = pipeline::run_fit(&config)?;
    let summary = crate::report::format_fit_summary(&run.hist, &run.model, &run.report);

    // Optional exports.
    if let Some(path) = &config.export_fit {
        crate::io::write_fit_json(path, &run.hist, &run.model, &run.report)?;
    }
    if let Some(path) = &config.export_bins {
        crate::io::write_bins_csv(path, &run.residuals)?;
    }

    match config.render {
        RenderMode::Tui => {
            crate::tui::run(&config, run)?;
            // The alternate screen is gone by now; leave the report in the scrollback.
            println!("{summary}");
        }
        RenderMode::Ascii => {
            println!("{summary}");
            let plot = crate::plot::render_ascii_plot(
                &run.hist,
                &run.model,
                run.report.range,
                config.plot_width,
                config.plot_height,
            );
            println!("{plot}");
        }
        RenderMode::None => println!("{summary}"),
    }

    Ok(())
}

fn handle_generate(args: GenerateArgs) -> Result<(), AppError> {
    let config = generate_config_from_args(&args);
    let model = Model::define(&config.expression, &config.param_names, &config.values)?;

    let is_csv = config
        .out
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        == Some(true);

    if is_csv {
        let tau = model.param("tau").ok_or_else(|| {
            AppError::new(2, "CSV output draws exponential decay samples and needs a 'tau' parameter.")
        })?;
        let samples =
            crate::data::generate_decay_samples(args.samples, tau, args.background, config.binning, config.seed)?;
        crate::io::write_samples_csv(&config.out, &config.name, &samples)?;
        println!("Wrote {} samples of '{}' to {}", samples.len(), config.name, config.out.display());
    } else {
        let hist = crate::data::generate_histogram(
            &model,
            &config.name,
            config.binning,
            config.noise,
            config.noise_frac,
            config.seed,
        )?;
        crate::io::write_dataset_file(&config.out, std::slice::from_ref(&hist))?;
        println!(
            "Wrote '{}' ({} bins, integral {:.1}) to {}",
            hist.name,
            hist.n_bins(),
            hist.integral(),
            config.out.display()
        );
    }

    Ok(())
}

fn handle_list(args: ListArgs) -> Result<(), AppError> {
    let names = crate::io::list_datasets(&args.file)?;
    if names.is_empty() {
        log::warn!("{} contains no datasets", args.file.display());
    }
    print!("{}", crate::report::format_dataset_list(&names));
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let fit = crate::io::read_fit_json(&args.fit)?;
    // Rebuilding the model validates the saved expression and parameter names.
    let model = crate::io::model_from_fit_file(&fit)?;

    println!("{}", crate::report::format_fit_file(&fit));

    // With a dataset overlay the curve is drawn from the model itself;
    // without one we plot the saved curve grid.
    let plot = match &args.file {
        Some(path) => {
            let hist = crate::io::load_dataset(path, &fit.dataset, &binning_from_args(&args.binning))?;
            crate::plot::render_ascii_plot(&hist, &model, fit.report.range, args.width, args.height)
        }
        None => crate::plot::render_ascii_plot_from_fit_file(&fit, args.width, args.height),
    };
    println!("{plot}");
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    let range = match (args.range_min, args.range_max) {
        (None, None) => None,
        (lo, hi) => Some([lo.unwrap_or(f64::NEG_INFINITY), hi.unwrap_or(f64::INFINITY)]),
    };

    FitConfig {
        data_path: args.file.clone(),
        dataset: args.dataset.clone(),
        binning: binning_from_args(&args.binning),
        expression: args.expression.clone(),
        param_names: args.params.clone(),
        initial_values: args.init.clone(),
        method: args.method,
        range,
        max_iterations: args.max_iter,
        render: args.render.unwrap_or_else(default_render_mode),
        plot_width: args.width,
        plot_height: args.height,
        export_fit: args.export_fit.clone(),
        export_bins: args.export_bins.clone(),
    }
}

pub fn generate_config_from_args(args: &GenerateArgs) -> GenerateConfig {
    GenerateConfig {
        out: args.out.clone(),
        name: args.name.clone(),
        expression: args.expression.clone(),
        param_names: args.params.clone(),
        values: args.values.clone(),
        binning: binning_from_args(&args.binning),
        seed: args.seed,
        noise: args.noise,
        noise_frac: args.noise_frac,
    }
}

fn binning_from_args(args: &crate::cli::BinningArgs) -> Binning {
    Binning {
        n_bins: args.bins,
        x_min: args.x_min,
        x_max: args.x_max,
    }
}

/// Interactive view on a terminal, text plot when piped.
fn default_render_mode() -> RenderMode {
    if std::io::stdout().is_terminal() {
        RenderMode::Tui
    } else {
        RenderMode::Ascii
    }
}

/// Rewrite argv so `histfit` defaults to `histfit fit`.
///
/// Rules (leading `-v`/`--verbose` flags are skipped when looking at the first token):
/// - `histfit`                      -> `histfit fit`
/// - `histfit -f data.json ...`     -> `histfit fit -f data.json ...`
/// - `histfit --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let first = argv
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, a)| !is_verbosity_flag(a))
        .map(|(i, a)| (i, a.clone()));

    let Some((idx, arg)) = first else {
        argv.push("fit".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg.as_str(), "fit" | "generate" | "list" | "plot");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "fit flags".
    if arg.starts_with('-') {
        argv.insert(idx, "fit".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}

fn is_verbosity_flag(arg: &str) -> bool {
    arg == "--verbose" || (arg.len() > 1 && arg.starts_with('-') && arg[1..].chars().all(|c| c == 'v'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_defaults_to_fit() {
        assert_eq!(rewrite_args(argv(&["histfit"])), argv(&["histfit", "fit"]));
        assert_eq!(rewrite_args(argv(&["histfit", "-vv"])), argv(&["histfit", "-vv", "fit"]));
    }

    #[test]
    fn leading_flags_are_fit_flags() {
        assert_eq!(
            rewrite_args(argv(&["histfit", "-v", "-f", "a.json"])),
            argv(&["histfit", "-v", "fit", "-f", "a.json"])
        );
    }

    #[test]
    fn subcommands_and_help_are_untouched() {
        for items in [
            &["histfit", "list", "-f", "a.json"][..],
            &["histfit", "-v", "plot", "--fit", "f.json"][..],
            &["histfit", "--help"][..],
        ] {
            assert_eq!(rewrite_args(argv(items)), argv(items));
        }
    }

    #[test]
    fn one_sided_range_is_open_on_the_other_side() {
        let cli = crate::cli::Cli::parse_from(["histfit", "fit", "--range-min", "1.5", "--render", "none"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = fit_config_from_args(&args);
        assert_eq!(config.range, Some([1.5, f64::INFINITY]));
        assert_eq!(config.render, RenderMode::None);
        assert_eq!(config.binning, Binning::default());
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(log_filter_from_verbosity(0), log::LevelFilter::Warn);
        assert_eq!(log_filter_from_verbosity(2), log::LevelFilter::Debug);
        assert_eq!(log_filter_from_verbosity(9), log::LevelFilter::Trace);
    }

    fn saved_fit(dir: &std::path::Path) -> (std::path::PathBuf, crate::domain::FitFile) {
        let truth = Model::define("A*exp(-x/tau)+C", &["A", "tau", "C"], &[200.0, 2.0, 10.0]).unwrap();
        let hist = crate::data::generate_histogram(
            &truth,
            "hist",
            Binning::default(),
            crate::domain::NoiseKind::None,
            0.0,
            0,
        )
        .unwrap();
        let data_path = dir.join("data.json");
        crate::io::write_dataset_file(&data_path, std::slice::from_ref(&hist)).unwrap();

        let report = crate::domain::FitReport {
            method: crate::domain::FitMethod::ChiSquare,
            statistic: 0.0,
            n_bins_used: 200,
            ndf: 197,
            evaluations: 5,
            converged: true,
            range: [0.0, 10.0],
        };
        (data_path, crate::io::fit_file(&hist, &truth, &report))
    }

    fn plot_args(fit: &std::path::Path, data: Option<&std::path::Path>) -> PlotArgs {
        let mut argv = vec!["histfit".to_string(), "plot".into(), "--fit".into(), fit.display().to_string()];
        if let Some(data) = data {
            argv.extend(["-f".to_string(), data.display().to_string()]);
        }
        let Command::Plot(args) = crate::cli::Cli::parse_from(argv).command else {
            panic!("expected plot");
        };
        args
    }

    #[test]
    fn plot_overlays_the_dataset_through_the_saved_model() {
        let dir = tempfile::tempdir().unwrap();
        let (data_path, fit) = saved_fit(dir.path());
        let fit_path = dir.path().join("fit.json");
        std::fs::write(&fit_path, serde_json::to_string(&fit).unwrap()).unwrap();

        handle_plot(plot_args(&fit_path, Some(&data_path))).unwrap();
        handle_plot(plot_args(&fit_path, None)).unwrap();
    }

    #[test]
    fn plot_rejects_a_fit_whose_expression_does_not_bind() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut fit) = saved_fit(dir.path());
        fit.expression = "A*exp(-x/tau)+D".to_string();
        let fit_path = dir.path().join("fit.json");
        std::fs::write(&fit_path, serde_json::to_string(&fit).unwrap()).unwrap();

        let err = handle_plot(plot_args(&fit_path, None)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("'D'"), "{err}");
    }
}
