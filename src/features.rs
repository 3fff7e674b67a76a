//! Beat features and the Gaussian waveform kernel
//!
//! A beat is a set of named Gaussian kernels laid out over one cycle of the
//! phase variable theta, plus the beat period RR. The simulator only ever
//! consumes the phase derivative of the waveform, which is exposed through
//! the [`WaveformModel`] capability.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::SimError;

/// Integrator state `[theta, rho, z]`
pub type State = [f64; 3];

/// One Gaussian kernel contribution to the waveform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveFeature {
    /// Amplitude [V]
    pub a: f64,
    /// Phase location [rad]
    #[serde(alias = "μ")]
    pub mu: f64,
    /// Phase width [rad], strictly positive
    #[serde(alias = "σ")]
    pub sigma: f64,
}

impl WaveFeature {
    pub fn new(a: f64, mu: f64, sigma: f64) -> Self {
        Self { a, mu, sigma }
    }

    /// Normalized offset of the wrapped phase from the kernel centre
    pub fn offset(&self, theta: f64) -> f64 {
        (theta.rem_euclid(TAU) - self.mu) / self.sigma
    }

    /// Kernel value at normalized offset `v`
    pub fn kernel(&self, v: f64) -> f64 {
        self.a * (-0.5 * v * v).exp()
    }

    /// Time derivative of the kernel when the phase advances at `omega`
    pub fn dgdt(&self, theta: f64, omega: f64) -> f64 {
        let v = self.offset(theta);
        -self.kernel(v) * v * omega / self.sigma
    }
}

/// A named wave inside a beat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    pub name: String,
    #[serde(flatten)]
    pub feature: WaveFeature,
}

/// Full waveform shape and duration of one heartbeat
///
/// Waves keep their declared order; that order defines the flattened
/// vector layout used by the randomizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatFeatures {
    /// Beat period [s]
    #[serde(rename = "RR", alias = "rr")]
    pub rr: f64,
    pub waves: Vec<Wave>,
}

impl BeatFeatures {
    pub fn new(rr: f64, waves: Vec<Wave>) -> Self {
        Self { rr, waves }
    }

    /// Five canonical waves in P, Q, R, S, T order
    pub fn pqrst(
        p: WaveFeature,
        q: WaveFeature,
        r: WaveFeature,
        s: WaveFeature,
        t: WaveFeature,
        rr: f64,
    ) -> Self {
        let waves = [("P", p), ("Q", q), ("R", r), ("S", s), ("T", t)]
            .into_iter()
            .map(|(name, feature)| Wave {
                name: name.to_string(),
                feature,
            })
            .collect();
        Self { rr, waves }
    }

    /// Reference single-lead beat at 60 bpm
    pub fn example() -> Self {
        Self::pqrst(
            WaveFeature::new(0.2, PI * 2.0 / 3.0, 0.25),
            WaveFeature::new(-0.2, PI * 11.0 / 12.0, 0.1),
            WaveFeature::new(1.2, PI, 0.1),
            WaveFeature::new(-0.3, PI * 13.0 / 12.0, 0.1),
            WaveFeature::new(0.4, PI * 3.0 / 2.0, 0.4),
            1.0,
        )
    }

    pub fn wave(&self, name: &str) -> Option<&WaveFeature> {
        self.waves
            .iter()
            .find(|wave| wave.name == name)
            .map(|wave| &wave.feature)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.waves.iter().map(|wave| wave.name.as_str())
    }

    /// Copy of this beat with a different period
    pub fn with_rr(&self, rr: f64) -> Self {
        Self {
            rr,
            waves: self.waves.clone(),
        }
    }

    /// Static waveform value at phase `theta`
    pub fn waveform(&self, theta: f64) -> f64 {
        self.waves
            .iter()
            .map(|wave| {
                let fe = &wave.feature;
                fe.kernel(fe.offset(theta))
            })
            .sum()
    }

    /// Summed kernel derivative over all declared waves
    pub fn dfdt(&self, theta: f64, omega: f64) -> f64 {
        self.waves
            .iter()
            .map(|wave| wave.feature.dgdt(theta, omega))
            .sum()
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.rr.is_finite() && self.rr > 0.0) {
            return Err(SimError::InvalidFeatures(format!(
                "RR must be finite and > 0, got {}",
                self.rr
            )));
        }

        for wave in &self.waves {
            let fe = &wave.feature;
            if !(fe.a.is_finite() && fe.mu.is_finite()) {
                return Err(SimError::InvalidFeatures(format!(
                    "wave {} has non-finite amplitude or location",
                    wave.name
                )));
            }
            if !(fe.sigma.is_finite() && fe.sigma > 0.0) {
                return Err(SimError::InvalidFeatures(format!(
                    "wave {} width must be finite and > 0, got {}",
                    wave.name, fe.sigma
                )));
            }
        }

        Ok(())
    }
}

/// Source of the waveform derivative driving `dz/dt`
///
/// `beat` is the feature set currently selected by the scheduler.
pub trait WaveformModel {
    fn dfdt(&self, state: &State, omega: f64, beat: &BeatFeatures) -> f64;
}

/// Default provider: sum of every declared Gaussian kernel
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianKernels;

impl WaveformModel for GaussianKernels {
    fn dfdt(&self, state: &State, omega: f64, beat: &BeatFeatures) -> f64 {
        beat.dfdt(state[0], omega)
    }
}

impl<F> WaveformModel for F
where
    F: Fn(&State, f64, &BeatFeatures) -> f64,
{
    fn dfdt(&self, state: &State, omega: f64, beat: &BeatFeatures) -> f64 {
        self(state, omega, beat)
    }
}

/// Total scheduled duration of a sequence [s]
pub fn total_duration(beats: &[BeatFeatures]) -> f64 {
    beats.iter().map(|beat| beat.rr).sum()
}

/// Repeat every element of `beats` `n` times, keeping order
pub fn repeat_beats(beats: &[BeatFeatures], n: usize) -> Vec<BeatFeatures> {
    beats
        .iter()
        .flat_map(|beat| std::iter::repeat(beat).take(n).cloned())
        .collect()
}

pub fn validate_sequence(beats: &[BeatFeatures]) -> Result<(), SimError> {
    if beats.is_empty() {
        return Err(SimError::InvalidFeatures(
            "beat sequence must not be empty".to_string(),
        ));
    }
    beats.iter().try_for_each(BeatFeatures::validate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_peaks_at_location() {
        let fe = WaveFeature::new(1.2, PI, 0.1);
        assert!((fe.kernel(fe.offset(PI)) - 1.2).abs() < 1e-12);
        assert!(fe.kernel(fe.offset(PI + 0.3)) < 1.2 * (-4.0_f64).exp());
    }

    #[test]
    fn test_offset_wraps_phase() {
        let fe = WaveFeature::new(1.0, 1.0, 0.5);
        let a = fe.offset(1.2);
        let b = fe.offset(1.2 + 3.0 * TAU);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_dgdt_matches_finite_difference() {
        let beat = BeatFeatures::example();
        let omega = TAU / beat.rr;
        let dt = 1e-6;
        for &t in &[0.31, 0.5, 0.55, 0.74] {
            let theta = omega * t;
            let numeric =
                (beat.waveform(theta + omega * dt) - beat.waveform(theta - omega * dt)) / (2.0 * dt);
            assert!((beat.dfdt(theta, omega) - numeric).abs() < 1e-4);
        }
    }

    #[test]
    fn test_validate_rejects_bad_width() {
        let mut beat = BeatFeatures::example();
        beat.waves[2].feature.sigma = 0.0;
        assert!(matches!(beat.validate(), Err(SimError::InvalidFeatures(_))));
        assert!(beat.with_rr(1.0).validate().is_err());
        assert!(BeatFeatures::example().with_rr(-1.0).validate().is_err());
    }

    #[test]
    fn test_repeat_and_duration() {
        let a = BeatFeatures::example();
        let b = a.with_rr(0.5);
        let seq = repeat_beats(&[a, b], 3);
        assert_eq!(seq.len(), 6);
        assert_eq!(seq[2].rr, 1.0);
        assert_eq!(seq[3].rr, 0.5);
        assert!((total_duration(&seq) - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_closure_waveform_model() {
        let flat = |_: &State, _: f64, _: &BeatFeatures| 0.25;
        let beat = BeatFeatures::example();
        assert_eq!(flat.dfdt(&[0.0, 1.0, 0.0], 1.0, &beat), 0.25);
        let theta = 3.0;
        assert_eq!(
            GaussianKernels.dfdt(&[theta, 1.0, 0.0], 2.0, &beat),
            beat.dfdt(theta, 2.0)
        );
    }

    #[test]
    fn test_json_round_names() {
        let beat = BeatFeatures::example();
        let json = serde_json::to_string(&beat).unwrap();
        assert!(json.contains("\"RR\""));
        let back: BeatFeatures = serde_json::from_str(&json).unwrap();
        assert_eq!(back, beat);
        assert_eq!(back.names().collect::<Vec<_>>(), ["P", "Q", "R", "S", "T"]);
    }
}
