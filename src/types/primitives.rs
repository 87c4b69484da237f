//! Primitive type definitions shared by the connectivity store and the
//! temporal memory.

/// Flat index of a cell in the connectivity store.
///
/// Cells are laid out column-major: the cells of column `c` occupy indices
/// `c * cells_per_column .. (c + 1) * cells_per_column`.
pub type CellIdx = u32;

/// Index of a segment within its owning cell.
///
/// Segment indices are only stable between mutations of the owning cell's
/// segment list; callers obtain them from the store and use them within the
/// same timestep.
pub type SegIdx = usize;

/// Synapse permanence value (0.0 to 1.0).
pub type Permanence = f32;

/// Minimum permanence value.
pub const MIN_PERMANENCE: Permanence = 0.0;

/// Maximum permanence value.
pub const MAX_PERMANENCE: Permanence = 1.0;

/// Synapses whose permanence decays below this are destroyed during cleanup.
pub const SYNAPSE_PRUNE_EPSILON: Permanence = 0.001;
