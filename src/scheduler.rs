//! Beat scheduler
//!
//! Walks a beat sequence as integration time advances. The scheduler holds
//! the cumulative RR boundaries of the sequence and a monotonic index into
//! them; the active beat switches on the first evaluation at or after the
//! current boundary (`t >= acc`), so a sample landing exactly on a boundary
//! already belongs to the next beat.

use crate::features::BeatFeatures;
use crate::SimError;

/// Single-use scheduler over one beat sequence
#[derive(Debug, Clone)]
pub struct BeatScheduler<'a> {
    beats: &'a [BeatFeatures],
    /// `boundaries[i]` is the end time of beat `i`
    boundaries: Vec<f64>,
    index: usize,
}

impl<'a> BeatScheduler<'a> {
    pub fn new(beats: &'a [BeatFeatures]) -> Result<Self, SimError> {
        if beats.is_empty() {
            return Err(SimError::InvalidFeatures(
                "beat sequence must not be empty".to_string(),
            ));
        }

        let boundaries = beats
            .iter()
            .scan(0.0, |acc, beat| {
                *acc += beat.rr;
                Some(*acc)
            })
            .collect();

        Ok(Self {
            beats,
            boundaries,
            index: 0,
        })
    }

    /// Advance at most one beat if `t` has reached the current boundary
    /// and return the active beat.
    ///
    /// Only one boundary is crossed per call; callers bound the spacing of
    /// successive evaluations by the shortest RR.
    pub fn advance(&mut self, t: f64) -> Result<&'a BeatFeatures, SimError> {
        if t >= self.boundaries[self.index] {
            if self.index + 1 >= self.beats.len() {
                return Err(SimError::SequenceExhausted {
                    t,
                    duration: self.duration(),
                });
            }
            self.index += 1;
        }
        Ok(&self.beats[self.index])
    }

    pub fn current(&self) -> &'a BeatFeatures {
        &self.beats[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Accumulated boundary of the active beat
    pub fn acc(&self) -> f64 {
        self.boundaries[self.index]
    }

    pub fn duration(&self) -> f64 {
        self.boundaries[self.boundaries.len() - 1]
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(rrs: &[f64]) -> Vec<BeatFeatures> {
        let template = BeatFeatures::example();
        rrs.iter().map(|&rr| template.with_rr(rr)).collect()
    }

    #[test]
    fn test_initial_state() {
        let beats = sequence(&[0.8, 1.2, 1.0]);
        let scheduler = BeatScheduler::new(&beats).unwrap();
        assert_eq!(scheduler.index(), 0);
        assert!((scheduler.acc() - 0.8).abs() < 1e-12);
        assert!((scheduler.duration() - 3.0).abs() < 1e-12);
        assert_eq!(scheduler.current().rr, 0.8);
    }

    #[test]
    fn test_boundary_belongs_to_next_beat() {
        let beats = sequence(&[0.5, 1.0, 1.0]);
        let mut scheduler = BeatScheduler::new(&beats).unwrap();
        assert_eq!(scheduler.advance(0.49).unwrap().rr, 0.5);
        assert_eq!(scheduler.index(), 0);
        assert_eq!(scheduler.advance(0.5).unwrap().rr, 1.0);
        assert_eq!(scheduler.index(), 1);
        assert!((scheduler.acc() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_single_step_advance() {
        let beats = sequence(&[0.1, 0.1, 0.1, 0.1]);
        let mut scheduler = BeatScheduler::new(&beats).unwrap();
        scheduler.advance(0.35).unwrap();
        assert_eq!(scheduler.index(), 1);
        scheduler.advance(0.35).unwrap();
        assert_eq!(scheduler.index(), 2);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let beats = sequence(&[1.0, 1.0]);
        let mut scheduler = BeatScheduler::new(&beats).unwrap();
        scheduler.advance(1.0).unwrap();
        let err = scheduler.advance(2.0).unwrap_err();
        assert!(matches!(err, SimError::SequenceExhausted { .. }));
    }

    #[test]
    fn test_empty_sequence_rejected() {
        assert!(BeatScheduler::new(&[]).is_err());
    }
}
