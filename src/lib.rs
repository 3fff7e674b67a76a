//! ECG dynamics - synthetic ECG from a switched phase oscillator
//!
//! A beat sequence (literal, randomized, or derived from a spectrally
//! synthesized RR tachogram) drives a three-state ODE whose output `z`
//! traces one Gaussian-kernel waveform per beat. The output can then be
//! corrupted with colored noise at a calibrated SNR.

pub mod features;
pub mod integrate;
pub mod noise;
pub mod randomize;
pub mod scenario;
pub mod scheduler;
pub mod simulator;
pub mod spectral;
pub mod tachogram;

use thiserror::Error;

// Re-export main types
pub use features::{
    repeat_beats, total_duration, BeatFeatures, GaussianKernels, State, Wave, WaveFeature,
    WaveformModel,
};
pub use noise::{add_noise, add_noise_in_place, colored_noise, snr, NoiseSpec};
pub use randomize::{random_features, FeatureEditor, WaveField};
pub use scenario::{Rhythm, Scenario, ScenarioRun};
pub use scheduler::BeatScheduler;
pub use simulator::{DampingLimits, Respiration, Simulator, SimulatorConfig, Solution};
pub use tachogram::{
    bimodal_cdf, bimodal_pdf, fit_normal, tachogram, tachogram_features, RrStats, SpectralShape,
    Tachogram, TachogramConfig,
};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid beat features: {0}")]
    InvalidFeatures(String),
    #[error("beat sequence exhausted at t = {t}: scheduled duration {duration} does not cover the integration span")]
    SequenceExhausted { t: f64, duration: f64 },
    #[error("damping limits are undefined for an undamped system (zeta = 0)")]
    Undamped,
    #[error("damping limits need a single RR period, found {first} and {other}")]
    HeterogeneousRr { first: f64, other: f64 },
    #[error("drift removal needs an undamped system, got zeta = {0}")]
    Damped(f64),
    #[error("step size {h} fell below float spacing at t = {t}")]
    StepSizeUnderflow { t: f64, h: f64 },
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
}
