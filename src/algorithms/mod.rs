//! The sequence-learning core.
//!
//! - **Connections**: the synaptic connectivity store (cells → segments →
//!   synapses)
//! - **Temporal Memory**: the per-timestep activation/learning state machine
//! - **Anomaly**: scoring of inputs against predictions

pub mod anomaly;
mod connections;
mod temporal_memory;

pub use anomaly::{anomaly_score, AnomalyWindow};
pub use connections::{Cell, Connections, ConnectionsParams, Segment, Synapse};
pub use temporal_memory::{TemporalMemory, TemporalMemoryParams};
