//! Core type definitions: index aliases, permanence constants, and the
//! bitset the algorithms exchange state through.

mod bitset;
mod primitives;

pub use bitset::{Bitset, Ones};
pub use primitives::{
    CellIdx, Permanence, SegIdx, MAX_PERMANENCE, MIN_PERMANENCE, SYNAPSE_PRUNE_EPSILON,
};
