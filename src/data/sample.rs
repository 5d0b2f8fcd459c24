//! Synthetic histogram generation from a model.
//!
//! Each bin's expected content is the model evaluated at the bin center (the
//! same convention the fitter compares against). Noise is drawn from a seeded
//! `StdRng`, so a given seed always produces the same histogram.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Poisson;

use crate::domain::{Binning, Histogram, NoiseKind};
use crate::error::AppError;
use crate::models::Model;

pub fn generate_histogram(
    model: &Model,
    name: &str,
    binning: Binning,
    noise: NoiseKind,
    noise_frac: f64,
    seed: u64,
) -> Result<Histogram, AppError> {
    if !binning.is_valid() {
        return Err(AppError::new(
            2,
            format!(
                "Invalid binning: {} bins over [{}, {}].",
                binning.n_bins, binning.x_min, binning.x_max
            ),
        ));
    }
    if noise == NoiseKind::Bounded && !(noise_frac.is_finite() && (0.0..1.0).contains(&noise_frac)) {
        return Err(AppError::new(2, "Bounded noise fraction must be in [0, 1)."));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut hist = Histogram::new(name, name, binning);

    for i in 0..hist.n_bins() {
        let x = hist.bin_center(i);
        let expected = model.eval(x);
        if !expected.is_finite() {
            return Err(AppError::new(
                2,
                format!("Model '{}' is not finite at x={x}.", model.expression()),
            ));
        }

        let value = match noise {
            NoiseKind::None => expected,
            NoiseKind::Bounded => expected * (1.0 + noise_frac * rng.gen_range(-1.0..=1.0)),
            NoiseKind::Poisson => {
                if expected > 0.0 {
                    let dist = Poisson::new(expected)
                        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
                    dist.sample(&mut rng)
                } else {
                    0.0
                }
            }
        };
        hist.contents[i] = value;
    }

    hist.entries = hist.integral();
    log::debug!(
        "generated '{name}': {} bins, integral {:.1}, noise {noise:?}",
        hist.n_bins(),
        hist.entries
    );

    Ok(hist)
}

/// Raw samples from an exponential decay starting at `x_min` on top of a flat
/// background over the binning range. Used for CSV demo files.
pub fn generate_decay_samples(
    count: usize,
    tau: f64,
    background_frac: f64,
    binning: Binning,
    seed: u64,
) -> Result<Vec<f64>, AppError> {
    if !(tau.is_finite() && tau > 0.0) {
        return Err(AppError::new(2, "Decay constant must be positive."));
    }
    if !(0.0..=1.0).contains(&background_frac) {
        return Err(AppError::new(2, "Background fraction must be in [0, 1]."));
    }
    if !binning.is_valid() {
        return Err(AppError::new(
            2,
            format!("Invalid range [{}, {}] for background samples.", binning.x_min, binning.x_max),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let exp = rand_distr::Exp::new(1.0 / tau)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let samples = (0..count)
        .map(|_| {
            if rng.gen_bool(background_frac) {
                rng.gen_range(binning.x_min..binning.x_max)
            } else {
                binning.x_min + exp.sample(&mut rng)
            }
        })
        .collect();
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Model {
        Model::define("[0]*exp(-x/[1])+[2]", &["A", "tau", "C"], &[200.0, 2.0, 10.0]).unwrap()
    }

    #[test]
    fn same_seed_same_histogram() {
        let a = generate_histogram(&model(), "h", Binning::default(), NoiseKind::Poisson, 0.0, 42).unwrap();
        let b = generate_histogram(&model(), "h", Binning::default(), NoiseKind::Poisson, 0.0, 42).unwrap();
        assert_eq!(a, b);
        assert!(a.contents.iter().all(|c| c.fract() == 0.0 && *c >= 0.0));
    }

    #[test]
    fn bounded_noise_stays_within_band() {
        let m = model();
        let h = generate_histogram(&m, "h", Binning::default(), NoiseKind::Bounded, 0.05, 1).unwrap();
        for i in 0..h.n_bins() {
            let expected = m.eval(h.bin_center(i));
            assert!((h.contents[i] - expected).abs() <= 0.05 * expected + 1e-12);
        }
    }

    #[test]
    fn rejects_invalid_binning() {
        let bad = Binning { n_bins: 0, x_min: 0.0, x_max: 1.0 };
        assert!(generate_histogram(&model(), "h", bad, NoiseKind::None, 0.0, 0).is_err());
    }

    #[test]
    fn decay_samples_fill_mostly_low_bins() {
        let binning = Binning::default();
        let samples = generate_decay_samples(2000, 2.0, 0.1, binning, 9).unwrap();
        assert_eq!(samples.len(), 2000);
        let mut hist = Histogram::new("h", "h", binning);
        for x in &samples {
            hist.fill(*x);
        }
        let first_half: f64 = hist.contents[..100].iter().sum();
        let second_half: f64 = hist.contents[100..].iter().sum();
        assert!(first_half > 3.0 * second_half);
    }
}
