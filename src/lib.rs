//! # Veles - Temporal Memory sequence learning in Rust
//!
//! Veles implements the sequence-learning core of Hierarchical Temporal
//! Memory (HTM): a Temporal Memory driven by a synaptic connectivity store,
//! operating over sparse distributed binary representations (SDRs).
//!
//! ## Overview
//!
//! The crate models a population of cells grouped into columns. Each cell
//! grows dendritic segments, and each segment holds synapses onto other
//! cells. Feeding a stream of column activations (typically produced by a
//! spatial pooler) through [`TemporalMemory::compute`] makes the region
//! learn the transitions in the stream and predict the columns it expects
//! next; the fraction of active columns that arrive unpredicted is reported
//! as an anomaly score.
//!
//! Encoders, spatial pooling, classification and persistence are left to
//! external collaborators: the input is a plain column [`Bitset`], and all
//! learned state is reachable through public accessors.
//!
//! [`TemporalMemory::compute`]: algorithms::TemporalMemory::compute
//! [`Bitset`]: types::Bitset
//!
//! ## Quick Start
//!
//! ```rust
//! use veles::prelude::*;
//!
//! let mut tm = TemporalMemory::new(TemporalMemoryParams {
//!     num_columns: 64,
//!     cells_per_column: 8,
//!     activation_threshold: 3,
//!     matching_threshold: 2,
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! // One timestep: columns 3, 7 and 12 are active.
//! let active = Bitset::from_indices(64, &[3, 7, 12]).unwrap();
//! tm.compute(&active, true).unwrap();
//!
//! let anomaly = tm.anomaly();
//! let predicted = tm.prediction();
//! # let _ = (anomaly, predicted);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: serialization/deserialization support for all state-bearing
//!   types
//! - `rayon`: parallel segment activity computation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod types;
pub mod algorithms;
pub mod utils;

/// Re-export of commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::types::{
        Bitset, CellIdx, Permanence, SegIdx, MAX_PERMANENCE, MIN_PERMANENCE,
        SYNAPSE_PRUNE_EPSILON,
    };
    pub use crate::algorithms::{
        anomaly_score, AnomalyWindow, Cell, Connections, ConnectionsParams, Segment, Synapse,
        TemporalMemory, TemporalMemoryParams,
    };
    pub use crate::utils::Random;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library.
pub mod error {
    use thiserror::Error;

    /// Main error type for veles operations.
    #[derive(Error, Debug)]
    pub enum VelesError {
        /// Invalid parameter value.
        #[error("Invalid parameter '{name}': {message}")]
        InvalidParameter {
            /// Name of the invalid parameter.
            name: &'static str,
            /// Description of the error.
            message: String,
        },

        /// Index out of bounds.
        #[error("Index {index} out of bounds (size: {size})")]
        IndexOutOfBounds {
            /// The invalid index.
            index: usize,
            /// The valid size.
            size: usize,
        },

        /// Input vector length does not match the configured dimensions.
        #[error("Dimension mismatch: expected {expected}, got {actual}")]
        DimensionMismatch {
            /// Expected length.
            expected: usize,
            /// Actual length.
            actual: usize,
        },
    }

    /// Result type alias using VelesError.
    pub type Result<T> = std::result::Result<T, VelesError>;
}

pub use error::{Result, VelesError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
