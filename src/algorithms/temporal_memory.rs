//! Temporal Memory implementation.
//!
//! The Temporal Memory learns sequences of column activations by growing
//! dendritic segments between cells, and predicts which columns it expects
//! to activate next. One call to [`TemporalMemory::compute`] is one
//! timestep: activate cells per column (predict, burst or punish), drive
//! learning, recompute segment activity against the new active cells, prune
//! decayed state, and derive the prediction and anomaly score.

use crate::algorithms::anomaly::anomaly_score;
use crate::algorithms::{Connections, ConnectionsParams};
use crate::error::{Result, VelesError};
use crate::types::{Bitset, CellIdx, Permanence, SegIdx};
use crate::utils::Random;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for creating a Temporal Memory.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemporalMemoryParams {
    /// Number of columns in the input space.
    pub num_columns: usize,

    /// Number of cells per column.
    pub cells_per_column: usize,

    /// Maximum segments per cell.
    pub segments_per_cell: usize,

    /// Maximum synapses per segment.
    pub synapses_per_segment: usize,

    /// Connected synapses onto active cells required for a segment to be
    /// active (predictive).
    pub activation_threshold: usize,

    /// Unconnected synapses onto active cells required for a segment to be
    /// matching (a learning candidate). Must be strictly below
    /// `activation_threshold`.
    pub matching_threshold: usize,

    /// Initial permanence of grown synapses.
    pub initial_permanence: Permanence,

    /// Permanence at or above which a synapse is connected.
    pub connected_permanence: Permanence,

    /// Permanence gain for synapses that predicted correctly.
    pub permanence_increment: Permanence,

    /// Permanence loss for synapses onto inactive cells during
    /// reinforcement.
    pub permanence_decrement: Permanence,

    /// Permanence loss applied to matching segments of columns that were
    /// predicted but did not activate. Zero disables punishment.
    pub predicted_segment_decrement: Permanence,

    /// Maximum new synapses grown on a segment per timestep.
    pub max_new_synapses: usize,

    /// Random seed for synapse sampling and tie-breaking.
    pub seed: u64,
}

impl Default for TemporalMemoryParams {
    fn default() -> Self {
        Self {
            num_columns: 2048,
            cells_per_column: 32,
            segments_per_cell: 16,
            synapses_per_segment: 16,
            activation_threshold: 12,
            matching_threshold: 10,
            initial_permanence: 0.21,
            connected_permanence: 0.5,
            permanence_increment: 0.05,
            permanence_decrement: 0.03,
            predicted_segment_decrement: 0.0,
            max_new_synapses: 20,
            seed: 42,
        }
    }
}

/// The Temporal Memory algorithm.
///
/// # Example
///
/// ```rust
/// use veles::prelude::*;
///
/// let mut tm = TemporalMemory::new(TemporalMemoryParams {
///     num_columns: 100,
///     cells_per_column: 4,
///     activation_threshold: 3,
///     matching_threshold: 2,
///     ..Default::default()
/// })
/// .unwrap();
///
/// let active = Bitset::from_indices(100, &[1, 5, 10, 20]).unwrap();
/// tm.compute(&active, true).unwrap();
///
/// assert!(tm.anomaly() > 0.99); // nothing was predicted yet
/// assert_eq!(tm.active_cell_indices().len(), 16); // 4 columns burst
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemporalMemory {
    // Configuration
    num_columns: usize,
    cells_per_column: usize,
    num_cells: usize,
    activation_threshold: usize,
    matching_threshold: usize,
    initial_permanence: Permanence,
    connected_permanence: Permanence,
    permanence_increment: Permanence,
    permanence_decrement: Permanence,
    predicted_segment_decrement: Permanence,
    max_new_synapses: usize,

    // Connectivity
    connections: Connections,

    // Per-timestep cell state
    prev_active_cells: Bitset,
    prev_winner_cells: Bitset,
    active_cells: Bitset,
    winner_cells: Bitset,

    // Derived outputs
    prediction: Bitset,
    anomaly: f64,
    accuracy: f64,
    num_segments: usize,
    num_synapses: usize,

    rng: Random,
    iteration: u64,
}

impl TemporalMemory {
    /// Creates a new Temporal Memory with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns an error for zero dimensions/bounds, permanence parameters
    /// outside [0.0, 1.0], or `matching_threshold >= activation_threshold`
    /// (the threshold ordering is what makes every active segment a
    /// matching segment).
    pub fn new(params: TemporalMemoryParams) -> Result<Self> {
        if params.activation_threshold == 0 {
            return Err(VelesError::InvalidParameter {
                name: "activation_threshold",
                message: "must be > 0".to_string(),
            });
        }
        if params.matching_threshold >= params.activation_threshold {
            return Err(VelesError::InvalidParameter {
                name: "matching_threshold",
                message: format!(
                    "must be strictly below activation_threshold ({} >= {})",
                    params.matching_threshold, params.activation_threshold
                ),
            });
        }
        for (name, value) in [
            ("initial_permanence", params.initial_permanence),
            ("connected_permanence", params.connected_permanence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(VelesError::InvalidParameter {
                    name,
                    message: format!("must be in [0.0, 1.0], got {value}"),
                });
            }
        }

        let connections = Connections::new(ConnectionsParams {
            num_columns: params.num_columns,
            cells_per_column: params.cells_per_column,
            segments_per_cell: params.segments_per_cell,
            synapses_per_segment: params.synapses_per_segment,
        })?;

        let num_cells = params.num_columns * params.cells_per_column;

        Ok(Self {
            num_columns: params.num_columns,
            cells_per_column: params.cells_per_column,
            num_cells,
            activation_threshold: params.activation_threshold,
            matching_threshold: params.matching_threshold,
            initial_permanence: params.initial_permanence,
            connected_permanence: params.connected_permanence,
            permanence_increment: params.permanence_increment,
            permanence_decrement: params.permanence_decrement,
            predicted_segment_decrement: params.predicted_segment_decrement,
            max_new_synapses: params.max_new_synapses,

            connections,

            prev_active_cells: Bitset::new(num_cells),
            prev_winner_cells: Bitset::new(num_cells),
            active_cells: Bitset::new(num_cells),
            winner_cells: Bitset::new(num_cells),

            prediction: Bitset::new(params.num_columns),
            anomaly: 0.0,
            accuracy: 0.0,
            num_segments: 0,
            num_synapses: 0,

            rng: Random::new(params.seed),
            iteration: 0,
        })
    }

    /// Runs one timestep of the algorithm on the given active columns.
    ///
    /// With `learn` enabled, permanences are adapted, synapses grown and
    /// false predictions punished; without it the step is inference-only.
    /// Either way the per-cell state advances, so compute is never
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns a dimension mismatch error when `active_columns` is not
    /// exactly `num_columns` long; the input is never truncated or padded.
    pub fn compute(&mut self, active_columns: &Bitset, learn: bool) -> Result<()> {
        if active_columns.len() != self.num_columns {
            return Err(VelesError::DimensionMismatch {
                expected: self.num_columns,
                actual: active_columns.len(),
            });
        }

        // Score this input against what the previous timestep predicted.
        self.anomaly = anomaly_score(active_columns, &self.prediction);
        self.accuracy = if self.prediction.none() {
            0.0
        } else {
            self.prediction.overlap(active_columns) as f64 / self.prediction.count() as f64
        };

        self.activate_cells(active_columns, learn);

        // Segment activity against the new active cells determines the next
        // timestep's predictions.
        self.connections.clear();
        self.connections.compute_activity(
            &self.active_cells,
            self.connected_permanence,
            self.activation_threshold,
            self.matching_threshold,
        );

        self.connections.cleanup();

        self.prediction = self.connections.predicted_columns();
        let (num_segments, num_synapses) = self.connections.compute_stats();
        self.num_segments = num_segments;
        self.num_synapses = num_synapses;

        if learn {
            self.iteration += 1;
            self.connections.start_new_iteration();
        }

        Ok(())
    }

    /// Determines active and winner cells for every column and drives
    /// learning on the way.
    fn activate_cells(&mut self, active_columns: &Bitset, learn: bool) {
        self.prev_active_cells =
            std::mem::replace(&mut self.active_cells, Bitset::new(self.num_cells));
        self.prev_winner_cells =
            std::mem::replace(&mut self.winner_cells, Bitset::new(self.num_cells));

        for col in 0..self.num_columns {
            if active_columns.get(col) {
                if self.connections.active_segments_for_column(col) > 0 {
                    self.activate_predicted_column(col, learn);
                } else {
                    self.burst_column(col, learn);
                }
            } else if learn
                && self.predicted_segment_decrement > 0.0
                && self.connections.matching_segments_for_column(col) > 0
            {
                self.punish_column(col);
            }
        }
    }

    /// Activates the correctly-predicted cells of an active column.
    fn activate_predicted_column(&mut self, col: usize, learn: bool) {
        for cell in self.connections.cells_for_column(col) {
            if self.connections.active_segments_for_cell(cell) == 0 {
                continue;
            }

            self.active_cells.set(cell);
            self.winner_cells.set(cell);

            if learn {
                let active_segments: Vec<SegIdx> = self
                    .connections
                    .segments_for_cell(cell)
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.active)
                    .map(|(i, _)| i)
                    .collect();

                for seg in active_segments {
                    self.connections.adapt_segment(
                        cell,
                        seg,
                        &self.prev_active_cells,
                        self.permanence_increment,
                        self.permanence_decrement,
                    );
                    self.connections.grow_synapses(
                        cell,
                        seg,
                        &self.prev_winner_cells,
                        self.initial_permanence,
                        self.max_new_synapses,
                        &mut self.rng,
                    );
                }
            }
        }
    }

    /// Bursts an unpredicted active column: every cell activates, and one
    /// cell is selected to learn the transition.
    fn burst_column(&mut self, col: usize, learn: bool) {
        for cell in self.connections.cells_for_column(col) {
            self.active_cells.set(cell);
        }

        let winner = if self.connections.matching_segments_for_column(col) > 0 {
            let (cell, seg) = self
                .connections
                .best_matching_segment_in_column(col, &mut self.rng)
                .expect("a column with matching segments has at least one segment");

            if learn {
                self.connections.adapt_segment(
                    cell,
                    seg,
                    &self.prev_active_cells,
                    self.permanence_increment,
                    self.permanence_decrement,
                );
                self.connections.grow_synapses(
                    cell,
                    seg,
                    &self.prev_winner_cells,
                    self.initial_permanence,
                    self.max_new_synapses,
                    &mut self.rng,
                );
            }

            cell
        } else {
            let cell = self.connections.least_used_cell_in_column(col, &mut self.rng);

            // No previous winners means nothing to grow toward; a fresh
            // segment would stay empty until cleanup reaped it.
            if learn && !self.prev_winner_cells.none() {
                let seg = self.connections.create_segment(cell);
                self.connections.grow_synapses(
                    cell,
                    seg,
                    &self.prev_winner_cells,
                    self.initial_permanence,
                    self.max_new_synapses,
                    &mut self.rng,
                );
            }

            cell
        };

        self.winner_cells.set(winner);
    }

    /// Weakens every matching segment of a column that was predicted but
    /// did not activate.
    fn punish_column(&mut self, col: usize) {
        for cell in self.connections.cells_for_column(col) {
            if self.connections.matching_segments_for_cell(cell) == 0 {
                continue;
            }

            let matching_segments: Vec<SegIdx> = self
                .connections
                .segments_for_cell(cell)
                .iter()
                .enumerate()
                .filter(|(_, s)| s.matching)
                .map(|(i, _)| i)
                .collect();

            for seg in matching_segments {
                self.connections.punish_segment(
                    cell,
                    seg,
                    &self.prev_active_cells,
                    self.predicted_segment_decrement,
                );
            }
        }
    }

    /// Clears all per-timestep cell state and the current prediction, so no
    /// sequence is learned across a discontinuity in the input stream.
    ///
    /// Learned permanences and topology are untouched.
    pub fn reset(&mut self) {
        self.prev_active_cells.clear_all();
        self.prev_winner_cells.clear_all();
        self.active_cells.clear_all();
        self.winner_cells.clear_all();
        self.prediction.clear_all();
        self.anomaly = 0.0;
        self.accuracy = 0.0;
        self.connections.clear();
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Returns the number of columns.
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Returns the number of cells per column.
    pub fn cells_per_column(&self) -> usize {
        self.cells_per_column
    }

    /// Returns the total number of cells.
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Returns the currently active cells.
    pub fn active_cells(&self) -> &Bitset {
        &self.active_cells
    }

    /// Returns the currently active cells as a sparse index list, the form
    /// classifiers consume.
    pub fn active_cell_indices(&self) -> Vec<CellIdx> {
        self.active_cells.ones().map(|i| i as CellIdx).collect()
    }

    /// Returns the winner cells of the last timestep.
    pub fn winner_cells(&self) -> &Bitset {
        &self.winner_cells
    }

    /// Returns the winner cells as a sparse index list.
    pub fn winner_cell_indices(&self) -> Vec<CellIdx> {
        self.winner_cells.ones().map(|i| i as CellIdx).collect()
    }

    /// Returns the columns predicted to activate on the next timestep.
    pub fn prediction(&self) -> &Bitset {
        &self.prediction
    }

    /// Returns the anomaly score of the last timestep: the fraction of
    /// active columns that arrived unpredicted, in [0, 1].
    pub fn anomaly(&self) -> f64 {
        self.anomaly
    }

    /// Returns the accuracy of the previous prediction: the fraction of
    /// predicted columns that actually activated, 0.0 when nothing was
    /// predicted.
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Returns the (segments, synapses) totals from the last timestep.
    pub fn stats(&self) -> (usize, usize) {
        (self.num_segments, self.num_synapses)
    }

    /// Returns a reference to the connectivity store.
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    /// Returns the number of learning timesteps taken.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}
