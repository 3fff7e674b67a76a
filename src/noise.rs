//! Calibrated colored noise
//!
//! Gaussian noise with power spectral density proportional to `1 / f^beta`
//! (0 white, 1 pink, 2 Brownian), rescaled so that the signal-to-noise
//! ratio of the corrupted signal hits a target in dB exactly.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::spectral::{irfft, rfftfreq};
use crate::SimError;

/// Noise color, target SNR and seed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseSpec {
    /// Spectral exponent
    pub beta: f64,
    /// Target signal-to-noise ratio [dB]
    pub snr_db: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl NoiseSpec {
    pub fn new(beta: f64, snr_db: f64, seed: Option<u64>) -> Self {
        Self { beta, snr_db, seed }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !self.beta.is_finite() || !self.snr_db.is_finite() {
            return Err(SimError::InvalidConfig(
                "noise beta and snr_db must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Unit-variance (in expectation) power-law Gaussian noise of length `n`.
///
/// Each positive-frequency bin gets independent normal real and imaginary
/// parts scaled by `f^(-beta/2)`; frequencies below `1/n` are clamped to
/// `1/n`.
pub fn colored_noise(beta: f64, n: usize, seed: Option<u64>) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }

    let f = rfftfreq(n, 1.0);
    let fmin = 1.0 / n as f64;
    let amplitude: Vec<f64> = f
        .iter()
        .map(|&fk| fk.max(fmin).powf(-beta / 2.0))
        .collect();

    // Expected standard deviation of the raw inverse transform
    let mut weights: Vec<f64> = amplitude[1..].to_vec();
    if let Some(last) = weights.last_mut() {
        *last *= (1 + n % 2) as f64 / 2.0;
    }
    let sigma = 2.0 * weights.iter().map(|w| w * w).sum::<f64>().sqrt() / n as f64;

    let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let mut re: Vec<f64> = amplitude
        .iter()
        .map(|a| {
            let x: f64 = StandardNormal.sample(&mut rng);
            a * x
        })
        .collect();
    let mut im: Vec<f64> = amplitude
        .iter()
        .map(|a| {
            let x: f64 = StandardNormal.sample(&mut rng);
            a * x
        })
        .collect();

    let last = re.len() - 1;
    if n % 2 == 0 {
        im[last] = 0.0;
        re[last] *= std::f64::consts::SQRT_2;
    }
    im[0] = 0.0;
    re[0] *= std::f64::consts::SQRT_2;

    let spectrum: Vec<Complex<f64>> = re
        .into_iter()
        .zip(im)
        .map(|(r, i)| Complex::new(r, i))
        .collect();

    let raw = irfft(&spectrum, n);
    if sigma > 0.0 {
        raw.into_iter().map(|x| x / sigma).collect()
    } else {
        raw
    }
}

/// Mean power of a signal
pub fn mean_power(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|x| x * x).sum::<f64>() / signal.len() as f64
}

/// Realized signal-to-noise ratio [dB]
pub fn snr(signal: &[f64], noise: &[f64]) -> f64 {
    10.0 * (mean_power(signal) / mean_power(noise)).log10()
}

/// Noise scaled against `signal` so that `snr(signal, noise) == spec.snr_db`
pub fn calibrated_noise(signal: &[f64], spec: &NoiseSpec) -> Result<Vec<f64>, SimError> {
    spec.validate()?;
    if signal.len() < 2 {
        return Err(SimError::InvalidConfig(
            "noise needs a signal of at least two samples".to_string(),
        ));
    }

    let power = mean_power(signal);
    if !(power > 0.0) {
        return Err(SimError::InvalidConfig(
            "signal has zero power; SNR undefined".to_string(),
        ));
    }

    let mut noise = colored_noise(spec.beta, signal.len(), spec.seed);
    let target = power * 10f64.powf(-spec.snr_db / 10.0);
    let raw = mean_power(&noise);
    if !(raw > 0.0) {
        return Err(SimError::InvalidConfig(
            "generated noise has zero power".to_string(),
        ));
    }

    let gain = (target / raw).sqrt();
    noise.iter_mut().for_each(|x| *x *= gain);

    debug!(
        beta = spec.beta,
        snr_db = spec.snr_db,
        realized = snr(signal, &noise),
        "calibrated noise"
    );
    Ok(noise)
}

/// Corrupted copy of `signal`
pub fn add_noise(signal: &[f64], spec: &NoiseSpec) -> Result<Vec<f64>, SimError> {
    let noise = calibrated_noise(signal, spec)?;
    Ok(signal.iter().zip(noise.iter()).map(|(s, n)| s + n).collect())
}

/// Corrupt `signal` in place, returning the noise that was added
pub fn add_noise_in_place(signal: &mut [f64], spec: &NoiseSpec) -> Result<Vec<f64>, SimError> {
    let noise = calibrated_noise(signal, spec)?;
    signal
        .iter_mut()
        .zip(noise.iter())
        .for_each(|(s, n)| *s += n);
    Ok(noise)
}
