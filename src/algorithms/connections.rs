//! Connections - the synaptic connectivity store.
//!
//! The store owns the full population of cells, organized into columns, and
//! everything hanging off them: each cell owns its segments by value, each
//! segment owns its synapses by value, and every cross-reference is a plain
//! integer index. The temporal memory drives all mutation through this type;
//! nothing here allocates cells after construction.
//!
//! Per timestep the store is used in three phases: learning mutations
//! (segment creation, synapse growth, permanence adaptation), activity
//! recomputation against the new active-cell set ([`Connections::clear`]
//! followed by [`Connections::compute_activity`]), and maintenance
//! ([`Connections::cleanup`]).

use crate::error::{Result, VelesError};
use crate::types::{
    Bitset, CellIdx, Permanence, SegIdx, MAX_PERMANENCE, MIN_PERMANENCE, SYNAPSE_PRUNE_EPSILON,
};
use crate::utils::Random;

use ahash::AHashSet;
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single synapse: a weighted link from a dendritic segment to a
/// presynaptic cell.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Synapse {
    /// The presynaptic cell this synapse connects to.
    pub presynaptic_cell: CellIdx,

    /// The permanence strength of this synapse, always in [0.0, 1.0].
    pub permanence: Permanence,
}

/// A dendritic segment: an ordered collection of synapses on one cell.
///
/// `live`, `dead`, `active` and `matching` are transient per-timestep state:
/// they are filled in by [`Connections::compute_activity`] and zeroed by
/// [`Connections::clear`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Segment {
    /// The cell this segment belongs to.
    pub cell: CellIdx,

    /// The synapses on this segment, unique by presynaptic cell.
    pub synapses: SmallVec<[Synapse; 16]>,

    /// Connected synapses onto currently active cells.
    pub live: usize,

    /// Potential-but-unconnected synapses onto currently active cells.
    pub dead: usize,

    /// Whether the segment reached the activation threshold.
    pub active: bool,

    /// Whether the segment reached the matching threshold (an active
    /// segment always matches).
    pub matching: bool,

    /// Iteration stamp of the last creation/adaptation/growth, used for
    /// least-recently-used eviction.
    pub last_used: u64,
}

impl Segment {
    fn new(cell: CellIdx, iteration: u64) -> Self {
        Self {
            cell,
            synapses: SmallVec::new(),
            live: 0,
            dead: 0,
            active: false,
            matching: false,
            last_used: iteration,
        }
    }
}

/// A cell: an ordered, bounded collection of segments plus counters over
/// their transient activity flags.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cell {
    /// The segments on this cell.
    pub segments: Vec<Segment>,

    /// Number of segments currently marked active.
    pub num_active_segments: usize,

    /// Number of segments currently marked matching.
    pub num_matching_segments: usize,
}

/// Parameters for creating a [`Connections`] store.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionsParams {
    /// Number of columns.
    pub num_columns: usize,

    /// Number of cells per column.
    pub cells_per_column: usize,

    /// Maximum segments per cell; exceeding it evicts the
    /// least-recently-used segment.
    pub segments_per_cell: usize,

    /// Maximum synapses per segment; exceeding it evicts the
    /// lowest-permanence synapse.
    pub synapses_per_segment: usize,
}

impl Default for ConnectionsParams {
    fn default() -> Self {
        Self {
            num_columns: 2048,
            cells_per_column: 32,
            segments_per_cell: 16,
            synapses_per_segment: 16,
        }
    }
}

/// The synaptic connectivity store: cells → segments → synapses.
///
/// Cells are addressed by flat index; the cells of column `c` are the
/// contiguous range returned by [`Connections::cells_for_column`]. The store
/// trusts its caller: out-of-bounds cell or segment indices are programming
/// errors and panic.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Connections {
    num_columns: usize,
    cells_per_column: usize,
    segments_per_cell: usize,
    synapses_per_segment: usize,

    cells: Vec<Cell>,

    /// Recency counter, advanced once per learning timestep.
    iteration: u64,
}

impl Connections {
    /// Creates a new store with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if any dimension or bound is zero.
    pub fn new(params: ConnectionsParams) -> Result<Self> {
        for (name, value) in [
            ("num_columns", params.num_columns),
            ("cells_per_column", params.cells_per_column),
            ("segments_per_cell", params.segments_per_cell),
            ("synapses_per_segment", params.synapses_per_segment),
        ] {
            if value == 0 {
                return Err(VelesError::InvalidParameter {
                    name,
                    message: "must be > 0".to_string(),
                });
            }
        }

        Ok(Self {
            num_columns: params.num_columns,
            cells_per_column: params.cells_per_column,
            segments_per_cell: params.segments_per_cell,
            synapses_per_segment: params.synapses_per_segment,
            cells: vec![Cell::default(); params.num_columns * params.cells_per_column],
            iteration: 0,
        })
    }

    /// Returns the number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Returns the number of cells per column.
    #[inline]
    pub fn cells_per_column(&self) -> usize {
        self.cells_per_column
    }

    /// Returns the total number of cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns the current iteration count.
    #[inline]
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Returns all cells. Read access for serializers and inspection.
    #[inline]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Returns the segments on a cell.
    #[inline]
    pub fn segments_for_cell(&self, cell: usize) -> &[Segment] {
        &self.cells[cell].segments
    }

    /// Returns the contiguous range of cell indices belonging to a column.
    #[inline]
    pub fn cells_for_column(&self, col: usize) -> std::ops::Range<usize> {
        debug_assert!(col < self.num_columns, "column {col} out of bounds");
        let start = col * self.cells_per_column;
        start..start + self.cells_per_column
    }

    /// Returns the column a cell belongs to.
    #[inline]
    pub fn column_for_cell(&self, cell: usize) -> usize {
        cell / self.cells_per_column
    }

    // ========================================================================
    // Segment and synapse creation
    // ========================================================================

    /// Creates a new empty segment on `cell` and returns its index.
    ///
    /// If the cell is at its segment bound, the least-recently-used segment
    /// (oldest `last_used`, first encountered on ties) is evicted first.
    pub fn create_segment(&mut self, cell: usize) -> SegIdx {
        while self.cells[cell].segments.len() >= self.segments_per_cell {
            let lru = self.least_recent_segment(cell);
            self.destroy_segment(cell, lru);
        }

        let segment = Segment::new(cell as CellIdx, self.iteration);
        let segments = &mut self.cells[cell].segments;
        segments.push(segment);
        segments.len() - 1
    }

    /// Removes a segment, keeping the cell's activity counters in sync with
    /// the removed segment's flags. Later segment indices on the cell shift
    /// down by one.
    pub fn destroy_segment(&mut self, cell: usize, seg: SegIdx) {
        let cell_ref = &mut self.cells[cell];
        let removed = cell_ref.segments.remove(seg);
        if removed.active {
            cell_ref.num_active_segments -= 1;
        }
        if removed.matching {
            cell_ref.num_matching_segments -= 1;
        }
    }

    fn least_recent_segment(&self, cell: usize) -> SegIdx {
        self.cells[cell]
            .segments
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.last_used)
            .map(|(i, _)| i)
            .expect("eviction requires at least one segment")
    }

    /// Creates a synapse from `(cell, seg)` onto `target` with the given
    /// initial permanence (clamped to [0.0, 1.0]).
    ///
    /// A duplicate target is a no-op. If the segment is at its synapse
    /// bound, the lowest-permanence synapse (first encountered on ties) is
    /// evicted first.
    pub fn create_synapse(
        &mut self,
        cell: usize,
        seg: SegIdx,
        target: CellIdx,
        permanence: Permanence,
    ) {
        let segment = &mut self.cells[cell].segments[seg];

        if segment
            .synapses
            .iter()
            .any(|s| s.presynaptic_cell == target)
        {
            return;
        }

        while segment.synapses.len() >= self.synapses_per_segment {
            let mut weakest = 0;
            for (i, syn) in segment.synapses.iter().enumerate() {
                if syn.permanence < segment.synapses[weakest].permanence {
                    weakest = i;
                }
            }
            segment.synapses.remove(weakest);
        }

        segment.synapses.push(Synapse {
            presynaptic_cell: target,
            permanence: permanence.clamp(MIN_PERMANENCE, MAX_PERMANENCE),
        });
    }

    // ========================================================================
    // Learning operations
    // ========================================================================

    /// Hebbian reinforcement of one segment against the previous timestep's
    /// active cells.
    ///
    /// Every synapse onto a previously-active cell gains `inc`; every other
    /// synapse loses `dec`. Each update is clamped to [0.0, 1.0]. Refreshes
    /// the segment's recency stamp.
    pub fn adapt_segment(
        &mut self,
        cell: usize,
        seg: SegIdx,
        prev_active: &Bitset,
        inc: Permanence,
        dec: Permanence,
    ) {
        let segment = &mut self.cells[cell].segments[seg];
        for syn in &mut segment.synapses {
            let delta = if prev_active.get(syn.presynaptic_cell as usize) {
                inc
            } else {
                -dec
            };
            syn.permanence = (syn.permanence + delta).clamp(MIN_PERMANENCE, MAX_PERMANENCE);
        }
        segment.last_used = self.iteration;
    }

    /// Negative reinforcement of one segment for a false prediction.
    ///
    /// Only synapses onto previously-active cells are weakened; there is no
    /// increase branch, and the recency stamp is left alone.
    pub fn punish_segment(
        &mut self,
        cell: usize,
        seg: SegIdx,
        prev_active: &Bitset,
        penalty: Permanence,
    ) {
        let segment = &mut self.cells[cell].segments[seg];
        for syn in &mut segment.synapses {
            if prev_active.get(syn.presynaptic_cell as usize) {
                syn.permanence =
                    (syn.permanence - penalty).clamp(MIN_PERMANENCE, MAX_PERMANENCE);
            }
        }
    }

    /// Grows new synapses on `(cell, seg)` toward the previous timestep's
    /// winner cells.
    ///
    /// Candidates are the winner cells the segment is not yet synapsed onto.
    /// When at most `max_new` candidates exist, all of them are used in a
    /// randomly permuted order (order only matters for later eviction
    /// tie-breaking); otherwise a uniform sample of `max_new` is drawn
    /// without replacement. Refreshes the segment's recency stamp.
    pub fn grow_synapses(
        &mut self,
        cell: usize,
        seg: SegIdx,
        prev_winners: &Bitset,
        permanence: Permanence,
        max_new: usize,
        rng: &mut Random,
    ) {
        let existing: AHashSet<CellIdx> = self.cells[cell].segments[seg]
            .synapses
            .iter()
            .map(|s| s.presynaptic_cell)
            .collect();

        let mut candidates: Vec<CellIdx> = prev_winners
            .ones()
            .map(|i| i as CellIdx)
            .filter(|c| !existing.contains(c))
            .collect();

        if candidates.is_empty() || max_new == 0 {
            return;
        }

        let targets = if candidates.len() <= max_new {
            rng.shuffle(&mut candidates);
            candidates
        } else {
            rng.sample(candidates, max_new)
        };

        for target in targets {
            self.create_synapse(cell, seg, target, permanence);
        }

        self.cells[cell].segments[seg].last_used = self.iteration;
    }

    // ========================================================================
    // Activity computation
    // ========================================================================

    /// Recomputes every segment's activity against an active-cell set.
    ///
    /// For each segment, `live` counts synapses onto active cells with
    /// permanence at or above `connected`; `dead` counts synapses onto
    /// active cells below it. A segment is active when
    /// `live >= active_threshold` and matching when active or
    /// `dead >= match_threshold`: connected overlap is a subset of potential
    /// overlap, so an active segment always matches. Cell counters are
    /// incremented accordingly.
    ///
    /// Callers run [`Connections::clear`] first; this method only adds to
    /// the counters. Cost is O(total synapse count) - the dominant cost of a
    /// timestep.
    pub fn compute_activity(
        &mut self,
        active: &Bitset,
        connected: Permanence,
        active_threshold: usize,
        match_threshold: usize,
    ) {
        debug_assert_eq!(active.len(), self.cells.len(), "active-cell bitset size");

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            self.cells.par_iter_mut().for_each(|cell| {
                Self::compute_cell_activity(cell, active, connected, active_threshold, match_threshold);
            });
        }

        #[cfg(not(feature = "rayon"))]
        for cell in &mut self.cells {
            Self::compute_cell_activity(cell, active, connected, active_threshold, match_threshold);
        }
    }

    fn compute_cell_activity(
        cell: &mut Cell,
        active: &Bitset,
        connected: Permanence,
        active_threshold: usize,
        match_threshold: usize,
    ) {
        for seg in &mut cell.segments {
            let mut live = 0;
            let mut dead = 0;
            for syn in &seg.synapses {
                if active.get(syn.presynaptic_cell as usize) {
                    if syn.permanence >= connected {
                        live += 1;
                    } else {
                        dead += 1;
                    }
                }
            }

            seg.live = live;
            seg.dead = dead;
            seg.active = live >= active_threshold;
            seg.matching = seg.active || dead >= match_threshold;

            if seg.active {
                cell.num_active_segments += 1;
            }
            if seg.matching {
                cell.num_matching_segments += 1;
            }
        }
    }

    /// Resets every segment's transient activity state and every cell's
    /// counters. Permanences and topology are untouched.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.num_active_segments = 0;
            cell.num_matching_segments = 0;
            for seg in &mut cell.segments {
                seg.live = 0;
                seg.dead = 0;
                seg.active = false;
                seg.matching = false;
            }
        }
    }

    /// Advances the recency counter used for segment eviction.
    pub fn start_new_iteration(&mut self) {
        self.iteration += 1;
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Removes decayed synapses and empty segments.
    ///
    /// Every synapse with permanence below the prune epsilon is destroyed;
    /// every segment left with zero synapses is destroyed, with the owning
    /// cell's counters kept in sync. Idempotent.
    pub fn cleanup(&mut self) {
        for cell in &mut self.cells {
            for seg in &mut cell.segments {
                seg.synapses
                    .retain(|s| s.permanence >= SYNAPSE_PRUNE_EPSILON);
            }

            // Removal shifts later indices down, so the scan only advances
            // past elements it keeps.
            let mut i = 0;
            while i < cell.segments.len() {
                if cell.segments[i].synapses.is_empty() {
                    let removed = cell.segments.remove(i);
                    if removed.active {
                        cell.num_active_segments -= 1;
                    }
                    if removed.matching {
                        cell.num_matching_segments -= 1;
                    }
                } else {
                    i += 1;
                }
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of active segments on a cell.
    #[inline]
    pub fn active_segments_for_cell(&self, cell: usize) -> usize {
        self.cells[cell].num_active_segments
    }

    /// Number of matching segments on a cell.
    #[inline]
    pub fn matching_segments_for_cell(&self, cell: usize) -> usize {
        self.cells[cell].num_matching_segments
    }

    /// Number of active segments across a column's cells.
    pub fn active_segments_for_column(&self, col: usize) -> usize {
        self.cells_for_column(col)
            .map(|c| self.cells[c].num_active_segments)
            .sum()
    }

    /// Number of matching segments across a column's cells.
    pub fn matching_segments_for_column(&self, col: usize) -> usize {
        self.cells_for_column(col)
            .map(|c| self.cells[c].num_matching_segments)
            .sum()
    }

    /// Picks the cell in a column with the fewest segments, uniformly at
    /// random among ties.
    ///
    /// Spreads new-segment growth evenly across a bursting column that has
    /// no matching segment to reinforce.
    pub fn least_used_cell_in_column(&self, col: usize, rng: &mut Random) -> usize {
        let min = self
            .cells_for_column(col)
            .map(|c| self.cells[c].segments.len())
            .min()
            .expect("column has at least one cell");

        let ties: Vec<usize> = self
            .cells_for_column(col)
            .filter(|&c| self.cells[c].segments.len() == min)
            .collect();

        ties[rng.index(ties.len())]
    }

    /// Picks the segment in a column with the highest `live` count,
    /// uniformly at random among ties; `None` if the column has no
    /// segments.
    ///
    /// Selects which partially-correct prediction to reinforce when the
    /// column bursts.
    pub fn best_matching_segment_in_column(
        &self,
        col: usize,
        rng: &mut Random,
    ) -> Option<(usize, SegIdx)> {
        let mut best_live: Option<usize> = None;
        let mut ties: Vec<(usize, SegIdx)> = Vec::new();

        for cell in self.cells_for_column(col) {
            for (i, seg) in self.cells[cell].segments.iter().enumerate() {
                match best_live {
                    Some(best) if seg.live < best => {}
                    Some(best) if seg.live == best => ties.push((cell, i)),
                    _ => {
                        best_live = Some(seg.live);
                        ties.clear();
                        ties.push((cell, i));
                    }
                }
            }
        }

        if ties.is_empty() {
            None
        } else {
            Some(ties[rng.index(ties.len())])
        }
    }

    /// Returns the columns in which any cell has an active segment.
    pub fn predicted_columns(&self) -> Bitset {
        let mut predicted = Bitset::new(self.num_columns);
        for col in 0..self.num_columns {
            let any_active = self
                .cells_for_column(col)
                .any(|c| self.cells[c].num_active_segments > 0);
            if any_active {
                predicted.set(col);
            }
        }
        predicted
    }

    /// Counts segments and synapses by full traversal.
    pub fn compute_stats(&self) -> (usize, usize) {
        let mut num_segments = 0;
        let mut num_synapses = 0;
        for cell in &self.cells {
            num_segments += cell.segments.len();
            for seg in &cell.segments {
                num_synapses += seg.synapses.len();
            }
        }
        (num_segments, num_synapses)
    }
}
