//! Anomaly scoring utilities.
//!
//! The raw anomaly score is the fraction of active columns the previous
//! timestep failed to predict; [`AnomalyWindow`] smooths the raw stream for
//! monitoring callers that alert on sustained anomaly rather than
//! single-step spikes.

use crate::types::Bitset;

use std::collections::VecDeque;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Computes the raw anomaly score of one timestep.
///
/// Returns `(active − predicted_active) / active`, i.e. the fraction of
/// active columns that were not predicted, in [0.0, 1.0]. An empty active
/// set scores 0.0 by convention.
///
/// # Panics
///
/// Panics if the bitsets differ in length.
///
/// # Example
///
/// ```rust
/// use veles::algorithms::anomaly_score;
/// use veles::types::Bitset;
///
/// let active = Bitset::from_indices(16, &[1, 2, 3, 4]).unwrap();
/// let predicted = Bitset::from_indices(16, &[2, 3, 9]).unwrap();
///
/// assert!((anomaly_score(&active, &predicted) - 0.5).abs() < 1e-9);
/// ```
pub fn anomaly_score(active: &Bitset, predicted: &Bitset) -> f64 {
    let active_count = active.count();
    if active_count == 0 {
        return 0.0;
    }

    let predicted_active = active.overlap(predicted);
    (active_count - predicted_active) as f64 / active_count as f64
}

/// A sliding-window mean over raw anomaly scores.
///
/// # Example
///
/// ```rust
/// use veles::algorithms::AnomalyWindow;
///
/// let mut window = AnomalyWindow::new(3);
/// window.record(1.0);
/// window.record(0.5);
/// assert!((window.mean() - 0.75).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnomalyWindow {
    capacity: usize,
    scores: VecDeque<f64>,
    sum: f64,
}

impl AnomalyWindow {
    /// Creates a window averaging over the last `capacity` scores.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be > 0");
        Self {
            capacity,
            scores: VecDeque::with_capacity(capacity),
            sum: 0.0,
        }
    }

    /// Records a score, evicting the oldest once full, and returns the
    /// current windowed mean.
    pub fn record(&mut self, score: f64) -> f64 {
        if self.scores.len() == self.capacity {
            if let Some(evicted) = self.scores.pop_front() {
                self.sum -= evicted;
            }
        }
        self.scores.push_back(score);
        self.sum += score;
        self.mean()
    }

    /// Returns the mean over the recorded scores, 0.0 when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.scores.is_empty() {
            0.0
        } else {
            self.sum / self.scores.len() as f64
        }
    }

    /// Returns the number of recorded scores (at most the capacity).
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns true when no score has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Discards all recorded scores.
    pub fn clear(&mut self) {
        self.scores.clear();
        self.sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_predicted() {
        let active = Bitset::from_indices(10, &[1, 2, 3]).unwrap();
        let predicted = Bitset::from_indices(10, &[1, 2, 3, 7]).unwrap();
        assert_eq!(anomaly_score(&active, &predicted), 0.0);
    }

    #[test]
    fn test_fully_anomalous() {
        let active = Bitset::from_indices(10, &[1, 2, 3]).unwrap();
        let predicted = Bitset::from_indices(10, &[4, 5]).unwrap();
        assert_eq!(anomaly_score(&active, &predicted), 1.0);
    }

    #[test]
    fn test_partially_predicted() {
        let active = Bitset::from_indices(10, &[0, 1, 2]).unwrap();
        let predicted = Bitset::from_indices(10, &[0]).unwrap();
        let score = anomaly_score(&active, &predicted);
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_active_scores_zero() {
        let active = Bitset::new(10);
        let predicted = Bitset::from_indices(10, &[4, 5]).unwrap();
        assert_eq!(anomaly_score(&active, &predicted), 0.0);
    }

    #[test]
    fn test_window_mean_and_eviction() {
        let mut window = AnomalyWindow::new(2);
        assert_eq!(window.mean(), 0.0);

        assert!((window.record(1.0) - 1.0).abs() < 1e-9);
        assert!((window.record(0.0) - 0.5).abs() < 1e-9);

        // Third score evicts the first.
        assert!((window.record(0.0) - 0.0).abs() < 1e-9);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_window_clear() {
        let mut window = AnomalyWindow::new(4);
        window.record(0.7);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.mean(), 0.0);
    }
}
