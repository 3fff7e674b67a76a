//! Feature randomization and bulk editing
//!
//! Beats flatten to `[RR, w1.a, w1.mu, w1.sigma, w2.a, ...]` in declared
//! wave order. Randomization samples every component independently.

use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::features::{BeatFeatures, Wave, WaveFeature};
use crate::SimError;

/// Flatten a beat into `[RR, a, mu, sigma, ...]`
pub fn vectorize(beat: &BeatFeatures) -> Vec<f64> {
    let mut out = Vec::with_capacity(1 + 3 * beat.waves.len());
    out.push(beat.rr);
    for wave in &beat.waves {
        let fe = &wave.feature;
        out.extend_from_slice(&[fe.a, fe.mu, fe.sigma]);
    }
    out
}

/// Rebuild a beat from a flattened vector, taking wave names from `layout`
pub fn modelize(layout: &BeatFeatures, values: &[f64]) -> Result<BeatFeatures, SimError> {
    let expected = 1 + 3 * layout.waves.len();
    if values.len() != expected {
        return Err(SimError::LengthMismatch {
            context: "feature vector",
            expected,
            got: values.len(),
        });
    }

    let waves = layout
        .waves
        .iter()
        .zip(values[1..].chunks_exact(3))
        .map(|(wave, chunk)| Wave {
            name: wave.name.clone(),
            feature: WaveFeature::new(chunk[0], chunk[1], chunk[2]),
        })
        .collect();

    Ok(BeatFeatures::new(values[0], waves))
}

/// Draw `n` beats with every scalar sampled from an independent normal
/// distribution centred on `mean` with spread `std`.
///
/// Draws are not clipped, so wide spreads can yield non-positive RR or
/// widths; such beats are rejected later by sequence validation.
pub fn random_features(
    mean: &BeatFeatures,
    std: &BeatFeatures,
    n: usize,
    seed: Option<u64>,
) -> Result<Vec<BeatFeatures>, SimError> {
    if !mean.names().eq(std.names()) {
        return Err(SimError::InvalidFeatures(
            "mean and std templates must declare the same waves in the same order".to_string(),
        ));
    }

    let distributions = vectorize(mean)
        .into_iter()
        .zip(vectorize(std))
        .map(|(mu, sd)| {
            Normal::new(mu, sd).map_err(|e| {
                SimError::InvalidFeatures(format!("cannot sample N({mu}, {sd}): {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

    (0..n)
        .map(|_| {
            let values: Vec<f64> = distributions.iter().map(|d| d.sample(&mut rng)).collect();
            modelize(mean, &values)
        })
        .collect()
}

/// Wave-level scalar field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveField {
    A,
    Mu,
    Sigma,
}

/// Bulk transforms over an independent copy of a beat
///
/// Transforms touch the wave fields only; RR changes solely through
/// [`FeatureEditor::set_rr`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEditor {
    model: BeatFeatures,
}

impl FeatureEditor {
    pub fn new(beat: &BeatFeatures) -> Self {
        Self {
            model: beat.clone(),
        }
    }

    pub fn scale(&mut self, factor: f64, field: Option<WaveField>) -> &mut Self {
        self.apply(|x| x * factor, field)
    }

    pub fn abs(&mut self, field: Option<WaveField>) -> &mut Self {
        self.apply(f64::abs, field)
    }

    pub fn constant(&mut self, value: f64, field: Option<WaveField>) -> &mut Self {
        self.apply(|_| value, field)
    }

    /// Apply `fun` to one field of every wave, or to all three when `field`
    /// is `None`.
    pub fn apply(&mut self, fun: impl Fn(f64) -> f64, field: Option<WaveField>) -> &mut Self {
        for wave in &mut self.model.waves {
            let fe = &mut wave.feature;
            match field {
                Some(WaveField::A) => fe.a = fun(fe.a),
                Some(WaveField::Mu) => fe.mu = fun(fe.mu),
                Some(WaveField::Sigma) => fe.sigma = fun(fe.sigma),
                None => {
                    fe.a = fun(fe.a);
                    fe.mu = fun(fe.mu);
                    fe.sigma = fun(fe.sigma);
                }
            }
        }
        self
    }

    pub fn set_rr(&mut self, rr: f64) -> &mut Self {
        self.model.rr = rr;
        self
    }

    pub fn features(&self) -> &BeatFeatures {
        &self.model
    }

    pub fn into_features(self) -> BeatFeatures {
        self.model
    }
}

impl fmt::Display for FeatureEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(&self.model).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spread() -> BeatFeatures {
        let mut std = BeatFeatures::example();
        std.rr = 0.05;
        for (i, wave) in std.waves.iter_mut().enumerate() {
            let k = (i + 1) as f64;
            wave.feature = WaveFeature::new(0.01 * k, 0.02 * k, 0.005 * k);
        }
        std
    }

    #[test]
    fn test_vectorize_layout() {
        let beat = BeatFeatures::example();
        let v = vectorize(&beat);
        assert_eq!(v.len(), 16);
        assert_eq!(v[0], 1.0);
        assert_eq!(v[7], 1.2);
        assert_eq!(modelize(&beat, &v).unwrap(), beat);
        assert!(matches!(
            modelize(&beat, &v[..15]),
            Err(SimError::LengthMismatch { expected: 16, got: 15, .. })
        ));
    }

    #[test]
    fn test_random_features_statistics() {
        let mean = BeatFeatures::example();
        let std = spread();
        let n = 100_000;
        let samples = random_features(&mean, &std, n, Some(0)).unwrap();
        assert_eq!(samples.len(), n);

        let mu = vectorize(&mean);
        let sd = vectorize(&std);
        let rows: Vec<Vec<f64>> = samples.iter().map(vectorize).collect();
        for k in 0..mu.len() {
            let column: Vec<f64> = rows.iter().map(|row| row[k]).collect();
            let m = column.iter().sum::<f64>() / n as f64;
            let var = column.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64;
            let se = sd[k] / (n as f64).sqrt();
            assert!((m - mu[k]).abs() < 4.5 * se, "mean of component {k}");
            assert!((var.sqrt() - sd[k]).abs() < 0.02 * sd[k], "std of component {k}");
        }
    }

    #[test]
    fn test_random_features_reproducible() {
        let mean = BeatFeatures::example();
        let a = random_features(&mean, &spread(), 5, Some(7)).unwrap();
        let b = random_features(&mean, &spread(), 5, Some(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_features_rejects_mismatched_templates() {
        let mean = BeatFeatures::example();
        let mut std = spread();
        std.waves.pop();
        assert!(random_features(&mean, &std, 3, Some(0)).is_err());

        let mut negative = spread();
        negative.rr = -1.0;
        assert!(random_features(&mean, &negative, 3, Some(0)).is_err());
    }

    #[test]
    fn test_scale_all_fields_keeps_rr() {
        let beat = BeatFeatures::example();
        let mut editor = FeatureEditor::new(&beat);
        editor.scale(0.2, None);
        let edited = editor.features();
        assert_eq!(edited.rr, beat.rr);
        for (new, old) in edited.waves.iter().zip(beat.waves.iter()) {
            assert!((new.feature.a - 0.2 * old.feature.a).abs() < 1e-12);
            assert!((new.feature.mu - 0.2 * old.feature.mu).abs() < 1e-12);
            assert!((new.feature.sigma - 0.2 * old.feature.sigma).abs() < 1e-12);
        }
        // template untouched
        assert_eq!(beat, BeatFeatures::example());
    }

    #[test]
    fn test_field_restricted_transforms() {
        let beat = BeatFeatures::example();
        let mut editor = FeatureEditor::new(&beat);
        editor.constant(0.0, Some(WaveField::A)).abs(Some(WaveField::Mu)).set_rr(0.8);
        let edited = editor.into_features();
        assert_eq!(edited.rr, 0.8);
        for (new, old) in edited.waves.iter().zip(beat.waves.iter()) {
            assert_eq!(new.feature.a, 0.0);
            assert_eq!(new.feature.mu, old.feature.mu.abs());
            assert_eq!(new.feature.sigma, old.feature.sigma);
        }
    }

    #[test]
    fn test_display_is_json() {
        let editor = FeatureEditor::new(&BeatFeatures::example());
        let text = editor.to_string();
        let back: BeatFeatures = serde_json::from_str(&text).unwrap();
        assert_eq!(&back, editor.features());
    }
}
