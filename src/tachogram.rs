//! Spectral synthesis of RR-interval series
//!
//! The target spectrum is a two-component Gaussian mixture over frequency
//! (low- and high-frequency heart-rate variability). A one-sided spectrum
//! with that magnitude and uniformly random phases is inverted into a real
//! series, which is optionally shifted and scaled to a target mean and
//! standard deviation.

use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::features::BeatFeatures;
use crate::spectral::irfft;
use crate::SimError;

/// Below this raw standard deviation the series is treated as constant
const DEGENERATE_STD: f64 = 1e-12;

/// Bimodal spectral target `(loc1, scale1, loc2, scale2, ratio)`
///
/// The first mode carries weight `ratio`, the second weight `1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralShape {
    pub loc1: f64,
    pub scale1: f64,
    pub loc2: f64,
    pub scale2: f64,
    pub ratio: f64,
}

impl SpectralShape {
    pub fn new(loc1: f64, scale1: f64, loc2: f64, scale2: f64, ratio: f64) -> Self {
        Self {
            loc1,
            scale1,
            loc2,
            scale2,
            ratio,
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let finite = [self.loc1, self.scale1, self.loc2, self.scale2, self.ratio]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(SimError::InvalidConfig(
                "spectral shape parameters must be finite".to_string(),
            ));
        }
        if self.scale1 <= 0.0 || self.scale2 <= 0.0 {
            return Err(SimError::InvalidConfig(
                "spectral shape scales must be > 0".to_string(),
            ));
        }
        if self.ratio < 0.0 {
            return Err(SimError::InvalidConfig(
                "spectral shape ratio must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SpectralShape {
    fn default() -> Self {
        Self::new(0.1, 0.01, 0.25, 0.01, 0.5)
    }
}

/// Mean and standard deviation of an RR series [s]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RrStats {
    pub mean: f64,
    pub std: f64,
}

impl RrStats {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }
}

impl Default for RrStats {
    fn default() -> Self {
        Self::new(1.0, 0.05)
    }
}

/// Density of the bimodal mixture at `x` (NaN for an invalid shape)
pub fn bimodal_pdf(x: f64, shape: &SpectralShape) -> f64 {
    mixture(shape, |d| d.pdf(x))
}

/// Cumulative distribution of the bimodal mixture at `x`
pub fn bimodal_cdf(x: f64, shape: &SpectralShape) -> f64 {
    mixture(shape, |d| d.cdf(x))
}

fn mixture(shape: &SpectralShape, eval: impl Fn(&Normal) -> f64) -> f64 {
    match (
        Normal::new(shape.loc1, shape.scale1),
        Normal::new(shape.loc2, shape.scale2),
    ) {
        (Ok(first), Ok(second)) => {
            (shape.ratio * eval(&first) + eval(&second)) / (1.0 + shape.ratio)
        }
        _ => f64::NAN,
    }
}

/// Maximum-likelihood normal fit (sample mean, population std)
pub fn fit_normal(rr: &[f64]) -> RrStats {
    RrStats {
        mean: rr.iter().mean(),
        std: rr.iter().population_std_dev(),
    }
}

/// Tachogram synthesis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TachogramConfig {
    pub shape: SpectralShape,
    pub stats: RrStats,
    /// Number of beats `Nb`
    pub beats: usize,
    /// Sampling rate of the synthesized series [Hz]
    pub fs: f64,
    /// Shift and scale the series to `stats`
    #[serde(default = "default_scaling")]
    pub scaling: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_scaling() -> bool {
    true
}

impl TachogramConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        self.shape.validate()?;
        if !(self.fs.is_finite() && self.fs > 0.0) {
            return Err(SimError::InvalidConfig(
                "tachogram fs must be finite and > 0".to_string(),
            ));
        }
        if !(self.stats.mean.is_finite() && self.stats.mean > 0.0) {
            return Err(SimError::InvalidConfig(
                "rr mean must be finite and > 0".to_string(),
            ));
        }
        if !(self.stats.std.is_finite() && self.stats.std >= 0.0) {
            return Err(SimError::InvalidConfig(
                "rr std must be finite and >= 0".to_string(),
            ));
        }
        if self.beats == 0 {
            return Err(SimError::InvalidConfig(
                "beats must be greater than zero".to_string(),
            ));
        }
        // the series is cut to even length, so one sample per beat can drop a beat
        if self.samples_per_beat() < 2 {
            return Err(SimError::InvalidConfig(
                "fs * rr mean must round to at least two samples per beat".to_string(),
            ));
        }
        Ok(())
    }

    pub fn samples_per_beat(&self) -> usize {
        (self.fs * self.stats.mean).round() as usize
    }
}

/// Synthesized RR series and the spectral target it was drawn from
#[derive(Debug, Clone, Default)]
pub struct Tachogram {
    /// Sample times [s]
    pub t: Vec<f64>,
    /// RR value per sample [s]
    pub rr: Vec<f64>,
    /// One-sided frequency grid [Hz]
    pub f: Vec<f64>,
    /// Target density on `f`
    pub psd: Vec<f64>,
    pub samples_per_beat: usize,
}

impl Tachogram {
    /// One RR value per synthesized beat
    ///
    /// At least two samples per beat are enforced, so trimming the series to
    /// even length never drops a beat.
    pub fn beat_intervals(&self) -> Vec<f64> {
        self.rr
            .iter()
            .step_by(self.samples_per_beat.max(1))
            .copied()
            .collect()
    }
}

/// Synthesize an RR series whose periodogram follows the bimodal target.
///
/// The series has `2 (M - 1)` samples with `M = N / 2 + 1` and
/// `N = beats * round(fs * rr_mean)`, matching the frequency grid
/// `f_m = m fs / (2 (M - 1))`.
pub fn tachogram(config: &TachogramConfig) -> Result<Tachogram, SimError> {
    config.validate()?;

    let samples_per_beat = config.samples_per_beat();
    let n = config.beats * samples_per_beat;
    if n < 2 {
        return Err(SimError::InvalidConfig(
            "tachogram needs at least two samples".to_string(),
        ));
    }
    let m = n / 2 + 1;
    let len = 2 * (m - 1);
    let fs = config.fs;

    let f: Vec<f64> = (0..m).map(|k| k as f64 * fs / len as f64).collect();
    let psd: Vec<f64> = f.iter().map(|&fk| bimodal_pdf(fk, &config.shape)).collect();

    let mut rng = config
        .seed
        .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let phase = Uniform::new(0.0, TAU);
    let spectrum: Vec<Complex<f64>> = psd
        .iter()
        .map(|&p| Complex::from_polar((m as f64 * fs * p).sqrt(), phase.sample(&mut rng)))
        .collect();

    let mut rr = irfft(&spectrum, len);
    if config.scaling {
        rescale(&mut rr, &config.stats);
    }

    debug!(n, m, len, fs, scaling = config.scaling, "synthesized tachogram");

    let t = (0..len).map(|k| k as f64 / fs).collect();
    Ok(Tachogram {
        t,
        rr,
        f,
        psd,
        samples_per_beat,
    })
}

fn rescale(rr: &mut [f64], target: &RrStats) {
    let raw = fit_normal(rr);
    if !(raw.std > DEGENERATE_STD) {
        debug!(raw_std = raw.std, "degenerate tachogram, using constant mean");
        rr.iter_mut().for_each(|x| *x = target.mean);
        return;
    }
    for x in rr.iter_mut() {
        *x = (*x - raw.mean) / raw.std * target.std + target.mean;
    }
}

/// Beat sequence with the template's shape and one beat per RR value
pub fn tachogram_features(template: &BeatFeatures, rr: &[f64]) -> Vec<BeatFeatures> {
    rr.iter().map(|&value| template.with_rr(value)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::periodogram;

    fn config(fs: f64, beats: usize, scaling: bool) -> TachogramConfig {
        TachogramConfig {
            shape: SpectralShape::new(0.1, 0.01, 0.25, 0.01, 0.5),
            stats: RrStats::new(1.0, 0.05),
            beats,
            fs,
            scaling,
            seed: Some(0),
        }
    }

    #[test]
    fn test_pdf_normalized_and_cdf_consistent() {
        let shape = SpectralShape::new(0.1, 0.02, 0.5, 0.05, 2.0);
        let dx = 1e-4;
        let mut area = 0.0;
        let mut x = -0.5;
        while x < 1.0 {
            area += bimodal_pdf(x, &shape) * dx;
            x += dx;
        }
        assert!((area - 1.0).abs() < 1e-3);
        assert!((bimodal_cdf(2.0, &shape) - 1.0).abs() < 1e-12);
        assert!(bimodal_cdf(-1.0, &shape) < 1e-12);
        // two thirds of the mass sits in the first mode
        assert!((bimodal_cdf(0.25, &shape) - 2.0 / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_shape_gives_nan() {
        let shape = SpectralShape::new(0.1, -1.0, 0.3, 0.05, 1.0);
        assert!(bimodal_pdf(0.1, &shape).is_nan());
        assert!(shape.validate().is_err());
    }

    #[test]
    fn test_periodogram_matches_target() {
        let tacho = tachogram(&config(1024.0, 200, false)).unwrap();
        let (f, p) = periodogram(&tacho.rr, 1024.0);
        assert_eq!(f.len(), tacho.f.len());
        for (a, b) in f.iter().zip(tacho.f.iter()) {
            assert!((a - b).abs() <= 1e-8 + 1e-4 * b.abs());
        }
        for (estimate, target) in p.iter().zip(tacho.psd.iter()).skip(1) {
            assert!((estimate - target).abs() <= 1e-8 + 1e-4 * target.abs());
        }
    }

    #[test]
    fn test_scaled_series_recovers_stats() {
        let tacho = tachogram(&config(256.0, 200, true)).unwrap();
        let fit = fit_normal(&tacho.rr);
        assert!((fit.mean - 1.0).abs() < 1e-2);
        assert!((fit.std - 0.05).abs() < 0.05 * 1e-2);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = tachogram(&config(64.0, 20, true)).unwrap();
        let b = tachogram(&config(64.0, 20, true)).unwrap();
        assert_eq!(a.rr, b.rr);
        assert_eq!(a.rr.len(), 64 * 20);
        assert_eq!(a.t.len(), a.rr.len());
    }

    #[test]
    fn test_degenerate_series_is_constant() {
        let mut cfg = config(64.0, 10, true);
        cfg.shape = SpectralShape::new(1e6, 1e-3, 2e6, 1e-3, 1.0);
        let tacho = tachogram(&cfg).unwrap();
        assert!(tacho.rr.iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_beat_intervals_feed_features() {
        let tacho = tachogram(&config(128.0, 15, true)).unwrap();
        let intervals = tacho.beat_intervals();
        assert_eq!(intervals.len(), 15);
        let template = BeatFeatures::example();
        let beats = tachogram_features(&template, &intervals);
        assert_eq!(beats.len(), 15);
        for (beat, &rr) in beats.iter().zip(intervals.iter()) {
            assert_eq!(beat.rr, rr);
            assert_eq!(beat.waves, template.waves);
        }
    }

    #[test]
    fn test_one_interval_per_requested_beat() {
        let mut cfg = config(1.0, 3, true);
        assert!(matches!(tachogram(&cfg), Err(SimError::InvalidConfig(_))));

        for (fs, beats) in [(2.0, 3), (3.0, 7), (64.0, 5)] {
            cfg = config(fs, beats, true);
            assert_eq!(tachogram(&cfg).unwrap().beat_intervals().len(), beats);
        }
    }

    #[test]
    fn test_rejects_zero_beats() {
        let cfg = config(256.0, 0, true);
        assert!(matches!(tachogram(&cfg), Err(SimError::InvalidConfig(_))));
    }
}
