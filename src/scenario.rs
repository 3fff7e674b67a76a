//! JSON-configured end-to-end runs: rhythm -> simulation -> optional noise.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::features::{repeat_beats, BeatFeatures};
use crate::noise::{add_noise, NoiseSpec};
use crate::randomize::random_features;
use crate::simulator::{Simulator, SimulatorConfig, Solution};
use crate::tachogram::{tachogram, tachogram_features, RrStats, SpectralShape, TachogramConfig};
use crate::SimError;

/// Where the beat sequence comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rhythm {
    /// The template repeated `beats` times
    Fixed { beats: usize },
    /// Template shape with RR values drawn from a synthesized tachogram
    Tachogram {
        #[serde(default)]
        shape: SpectralShape,
        #[serde(default)]
        stats: RrStats,
        beats: usize,
        /// Sampling rate of the synthesized RR series [Hz]
        fs: f64,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Every field drawn around the template with spread `std`
    Randomized {
        std: BeatFeatures,
        beats: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl Rhythm {
    pub fn beats(&self, template: &BeatFeatures) -> Result<Vec<BeatFeatures>, SimError> {
        match self {
            Rhythm::Fixed { beats } => Ok(repeat_beats(std::slice::from_ref(template), *beats)),
            Rhythm::Tachogram {
                shape,
                stats,
                beats,
                fs,
                seed,
            } => {
                let tacho = tachogram(&TachogramConfig {
                    shape: *shape,
                    stats: *stats,
                    beats: *beats,
                    fs: *fs,
                    scaling: true,
                    seed: *seed,
                })?;
                Ok(tachogram_features(template, &tacho.beat_intervals()))
            }
            Rhythm::Randomized { std, beats, seed } => {
                random_features(template, std, *beats, *seed)
            }
        }
    }
}

fn default_template() -> BeatFeatures {
    BeatFeatures::example()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default = "default_template")]
    pub template: BeatFeatures,
    pub rhythm: Rhythm,
    #[serde(default)]
    pub noise: Option<NoiseSpec>,
}

/// Everything a scenario produced
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub beats: Vec<BeatFeatures>,
    pub solution: Solution,
    /// `solution.z` with calibrated noise, when the scenario asks for it
    pub noisy: Option<Vec<f64>>,
}

impl Scenario {
    pub fn validate(&self) -> Result<(), SimError> {
        self.simulator.validate()?;
        self.template.validate()?;
        if let Some(noise) = &self.noise {
            noise.validate()?;
        }
        Ok(())
    }

    pub fn from_json(raw: &str) -> Result<Self, SimError> {
        let scenario: Self = serde_json::from_str(raw)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, SimError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn run(&self) -> Result<ScenarioRun, SimError> {
        self.validate()?;
        let beats = self.rhythm.beats(&self.template)?;
        let simulator = Simulator::gaussian(self.simulator.clone())?;
        let solution = simulator.solve(&beats)?;
        let noisy = self
            .noise
            .as_ref()
            .map(|spec| add_noise(&solution.z, spec))
            .transpose()?;

        info!(
            beats = beats.len(),
            samples = solution.len(),
            fs = self.simulator.fs,
            zeta = self.simulator.zeta,
            noisy = noisy.is_some(),
            "scenario complete"
        );

        Ok(ScenarioRun {
            beats,
            solution,
            noisy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_rhythm_from_json() {
        let scenario = Scenario::from_json(
            r#"{
                "simulator": {"fs": 128, "zeta": 0.1},
                "rhythm": {"kind": "fixed", "beats": 3}
            }"#,
        )
        .unwrap();
        assert_eq!(scenario.template, BeatFeatures::example());
        assert!(scenario.noise.is_none());

        let run = scenario.run().unwrap();
        assert_eq!(run.beats.len(), 3);
        assert_eq!(run.solution.len(), 384);
        assert!(run.noisy.is_none());
    }

    #[test]
    fn test_tachogram_rhythm_with_noise() {
        let scenario = Scenario {
            simulator: SimulatorConfig::new(128.0, 0.5),
            template: BeatFeatures::example(),
            rhythm: Rhythm::Tachogram {
                shape: SpectralShape::default(),
                stats: RrStats::new(0.9, 0.03),
                beats: 12,
                fs: 32.0,
                seed: Some(11),
            },
            noise: Some(NoiseSpec::new(1.0, 10.0, Some(2))),
        };
        let run = scenario.run().unwrap();
        assert_eq!(run.beats.len(), 12);
        let noisy = run.noisy.unwrap();
        assert_eq!(noisy.len(), run.solution.z.len());
        assert_ne!(noisy, run.solution.z);
    }

    #[test]
    fn test_randomized_rhythm_is_seeded() {
        let mut std = BeatFeatures::example();
        std.rr = 0.02;
        for wave in &mut std.waves {
            wave.feature = crate::features::WaveFeature::new(0.01, 0.01, 0.005);
        }
        let rhythm = Rhythm::Randomized {
            std,
            beats: 4,
            seed: Some(9),
        };
        let template = BeatFeatures::example();
        assert_eq!(rhythm.beats(&template).unwrap(), rhythm.beats(&template).unwrap());
    }

    #[test]
    fn test_invalid_scenarios_rejected() {
        assert!(matches!(
            Scenario::from_json(r#"{"rhythm": {"kind": "fixed", "beats": 2}, "simulator": {"fs": -1}}"#),
            Err(SimError::InvalidConfig(_))
        ));
        assert!(matches!(
            Scenario::from_json(r#"{"rhythm": {"kind": "unknown"}}"#),
            Err(SimError::Json(_))
        ));
        assert!(matches!(
            Scenario::load(Path::new("does/not/exist.json")),
            Err(SimError::Io(_))
        ));
    }
}
