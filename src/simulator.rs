//! Switched phase-oscillator ECG simulator
//!
//! State `(theta, rho, z)`:
//!
//! ```text
//! dtheta/dt = omega                       omega = 2 pi / RR_current
//! drho/dt   = (1 - rho) rho
//! dz/dt     = dfdt(state, omega) - zeta z + Ar wr cos(wr t)
//! ```
//!
//! The active beat is chosen by a [`BeatScheduler`] at every right-hand
//! side evaluation. The internal step is capped at one sample period so
//! every beat switch is seen within one sample.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};
use tracing::{debug, warn};

use crate::features::{
    total_duration, validate_sequence, BeatFeatures, GaussianKernels, State, WaveformModel,
};
use crate::integrate::{integrate, Rk45Options};
use crate::scheduler::BeatScheduler;
use crate::SimError;

/// Respiratory baseline modulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Respiration {
    /// Baseline amplitude
    pub amplitude: f64,
    /// Breathing frequency [Hz]
    pub frequency: f64,
}

impl Respiration {
    pub fn new(amplitude: f64, frequency: f64) -> Self {
        Self {
            amplitude,
            frequency,
        }
    }

    /// Contribution to `dz/dt` at time `t`
    pub fn forcing(&self, t: f64) -> f64 {
        let wr = TAU * self.frequency;
        self.amplitude * wr * (wr * t).cos()
    }
}

/// Initial condition `(theta0, rho0, z0)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialState {
    pub theta: f64,
    pub rho: f64,
    pub z: f64,
}

impl Default for InitialState {
    fn default() -> Self {
        Self {
            theta: 0.0,
            rho: 1.0,
            z: 0.0,
        }
    }
}

impl InitialState {
    pub fn as_array(&self) -> State {
        [self.theta, self.rho, self.z]
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Sampling rate [Hz]
    #[serde_as(as = "DefaultOnNull")]
    pub fs: f64,
    /// Damping coefficient, 0 for an undamped system
    #[serde_as(as = "DefaultOnNull")]
    pub zeta: f64,
    pub respiration: Option<Respiration>,
    pub initial_state: InitialState,
    #[serde_as(as = "DefaultOnNull")]
    pub rtol: f64,
    #[serde_as(as = "DefaultOnNull")]
    pub atol: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            fs: 512.0,
            zeta: 0.0,
            respiration: None,
            initial_state: InitialState::default(),
            rtol: 1e-3,
            atol: 1e-6,
        }
    }
}

impl SimulatorConfig {
    pub fn new(fs: f64, zeta: f64) -> Self {
        Self {
            fs,
            zeta,
            ..Default::default()
        }
    }

    pub fn with_respiration(mut self, amplitude: f64, frequency: f64) -> Self {
        self.respiration = Some(Respiration::new(amplitude, frequency));
        self
    }

    pub fn with_initial_state(mut self, theta: f64, rho: f64, z: f64) -> Self {
        self.initial_state = InitialState { theta, rho, z };
        self
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.fs.is_finite() && self.fs > 0.0) {
            return Err(SimError::InvalidConfig(
                "fs must be finite and > 0".to_string(),
            ));
        }

        if !(self.zeta.is_finite() && self.zeta >= 0.0) {
            return Err(SimError::InvalidConfig(
                "zeta must be finite and >= 0".to_string(),
            ));
        }

        if let Some(resp) = &self.respiration {
            if !resp.amplitude.is_finite() || !resp.frequency.is_finite() {
                return Err(SimError::InvalidConfig(
                    "respiration amplitude and frequency must be finite".to_string(),
                ));
            }
        }

        let init = self.initial_state.as_array();
        if init.iter().any(|v| !v.is_finite()) {
            return Err(SimError::InvalidConfig(
                "initial state must be finite".to_string(),
            ));
        }

        if !(self.rtol > 0.0 && self.atol > 0.0) {
            return Err(SimError::InvalidConfig(
                "rtol and atol must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn from_json(raw: &str) -> Result<Self, SimError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Largest internal solver step: one sample period
    pub fn max_step(&self) -> f64 {
        1.0 / self.fs
    }
}

/// Sampled trajectory returned by [`Simulator::solve`]
#[derive(Debug, Clone, Default)]
pub struct Solution {
    pub t: Vec<f64>,
    /// Unbounded phase; wrap with `rem_euclid(TAU)` for display
    pub theta: Vec<f64>,
    pub rho: Vec<f64>,
    pub z: Vec<f64>,
}

impl Solution {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn wrapped_theta(&self) -> Vec<f64> {
        self.theta.iter().map(|th| th.rem_euclid(TAU)).collect()
    }
}

/// Exponential convergence of a damped homogeneous run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampingLimits {
    /// Four time constants, `4 / zeta` [s]
    pub time_constant: f64,
    /// Limit of the per-beat level, relative to `z0`
    pub asymptotic_level: f64,
}

impl DampingLimits {
    /// `(time_constant, asymptotic_level)`
    pub fn as_tuple(&self) -> (f64, f64) {
        (self.time_constant, self.asymptotic_level)
    }
}

/// Sample times `k / fs` strictly below `duration`
pub fn sample_grid(duration: f64, fs: f64) -> Vec<f64> {
    let mut n = (duration * fs).ceil().max(0.0) as usize;
    while n > 0 && (n - 1) as f64 / fs >= duration {
        n -= 1;
    }
    (0..n).map(|k| k as f64 / fs).collect()
}

pub struct Simulator<M = GaussianKernels> {
    config: SimulatorConfig,
    model: M,
}

impl Simulator<GaussianKernels> {
    /// Simulator driven by the summed Gaussian kernels of each beat
    pub fn gaussian(config: SimulatorConfig) -> Result<Self, SimError> {
        Self::new(config, GaussianKernels)
    }
}

impl<M: WaveformModel> Simulator<M> {
    pub fn new(config: SimulatorConfig, model: M) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self { config, model })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Integrate over the whole scheduled duration of `beats`.
    ///
    /// Every call builds its own scheduler, so beat bookkeeping never leaks
    /// between runs.
    pub fn solve(&self, beats: &[BeatFeatures]) -> Result<Solution, SimError> {
        validate_sequence(beats)?;

        let cfg = &self.config;
        let max_step = cfg.max_step();
        let shortest = beats.iter().map(|b| b.rr).fold(f64::INFINITY, f64::min);
        if shortest < max_step {
            warn!(
                shortest,
                max_step, "beat shorter than one sample period; switches may lag"
            );
        }

        let duration = total_duration(beats);
        let t_eval = sample_grid(duration, cfg.fs);
        let mut scheduler = BeatScheduler::new(beats)?;
        let zeta = cfg.zeta;
        let respiration = cfg.respiration;
        let model = &self.model;

        debug!(
            beats = beats.len(),
            duration,
            samples = t_eval.len(),
            zeta,
            "solving"
        );

        let rhs = |t: f64, y: &State| -> Result<State, SimError> {
            let beat = scheduler.advance(t)?;
            let omega = TAU / beat.rr;
            let [_, rho, z] = *y;
            let forcing = respiration.map_or(0.0, |resp| resp.forcing(t));
            Ok([
                omega,
                (1.0 - rho) * rho,
                model.dfdt(y, omega, beat) - zeta * z + forcing,
            ])
        };

        let opts = Rk45Options {
            rtol: cfg.rtol,
            atol: cfg.atol,
            max_step,
        };
        let trajectory = integrate(rhs, cfg.initial_state.as_array(), &t_eval, &opts)?;

        debug!(
            accepted = trajectory.accepted_steps,
            rejected = trajectory.rejected_steps,
            "solved"
        );

        Ok(Solution {
            theta: trajectory.component(0),
            rho: trajectory.component(1),
            z: trajectory.component(2),
            t: trajectory.t,
        })
    }

    /// Closed-form convergence limits for a damped, homogeneous run.
    ///
    /// `z` must be the output of [`Simulator::solve`] on `beats`.
    pub fn exp_lims(&self, z: &[f64], beats: &[BeatFeatures]) -> Result<DampingLimits, SimError> {
        let zeta = self.config.zeta;
        if zeta == 0.0 {
            return Err(SimError::Undamped);
        }

        let first = beats
            .first()
            .ok_or_else(|| SimError::InvalidFeatures("beat sequence must not be empty".to_string()))?
            .rr;
        if let Some(other) = beats.iter().map(|b| b.rr).find(|&rr| rr != first) {
            return Err(SimError::HeterogeneousRr { first, other });
        }

        let index = (self.config.fs * first).round() as usize;
        let z_rr = *z.get(index).ok_or(SimError::LengthMismatch {
            context: "signal for one beat",
            expected: index + 1,
            got: z.len(),
        })?;
        let z0 = self.config.initial_state.z;

        Ok(DampingLimits {
            time_constant: 4.0 / zeta,
            asymptotic_level: (z_rr - z0) / (1.0 - (-zeta * first).exp()),
        })
    }

    /// Subtract the once-per-second anchor samples from an undamped signal.
    pub fn remove_drift(&self, z: &[f64]) -> Result<Vec<f64>, SimError> {
        let zeta = self.config.zeta;
        if zeta != 0.0 {
            return Err(SimError::Damped(zeta));
        }

        let fs = self.config.fs;
        if fs.fract() != 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "drift removal needs an integral fs, got {fs}"
            )));
        }
        let stride = fs as usize;

        Ok(z
            .iter()
            .enumerate()
            .map(|(i, &value)| value - z[(i / stride) * stride])
            .collect())
    }
}
