//! Deterministic pseudo-random number generator.
//!
//! All randomness in the crate (synapse target sampling, tie-breaking among
//! equally-loaded cells or equally-matching segments) flows through an
//! explicitly passed [`Random`] handle, so a fixed seed reproduces a run
//! exactly and the core has no hidden global state.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// A seedable pseudo-random number generator.
///
/// Backed by ChaCha20 for reproducible, platform-independent sequences.
///
/// # Example
///
/// ```rust
/// use veles::utils::Random;
///
/// let mut rng = Random::new(42);
///
/// // Pick an index for tie-breaking
/// let i = rng.index(8);
/// assert!(i < 8);
///
/// // Sample 3 unique items
/// let picked = rng.sample((0..10).collect::<Vec<u32>>(), 3);
/// assert_eq!(picked.len(), 3);
/// ```
pub struct Random {
    rng: ChaCha20Rng,
    seed: u64,
    /// Number of draws taken (for state reconstruction).
    steps: u64,
}

// Serialization stores seed and draw count; deserialization replays the
// stream to reach the same generator state.
#[cfg(feature = "serde")]
mod serde_impl {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct RandomState {
        seed: u64,
        steps: u64,
    }

    impl Serialize for Random {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            RandomState {
                seed: self.seed,
                steps: self.steps,
            }
            .serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Random {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let state = RandomState::deserialize(deserializer)?;
            let mut rng = ChaCha20Rng::seed_from_u64(state.seed);
            for _ in 0..state.steps {
                let _: u64 = rng.gen();
            }
            Ok(Random {
                rng,
                seed: state.seed,
                steps: state.steps,
            })
        }
    }
}

impl Random {
    /// Creates a new generator with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
            steps: 0,
        }
    }

    /// Returns the seed used for this generator.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns a uniformly random index in `[0, n)`.
    ///
    /// Returns 0 when `n == 0`; callers picking among candidates check for
    /// emptiness themselves.
    pub fn index(&mut self, n: usize) -> usize {
        self.steps += 1;
        if n == 0 {
            return 0;
        }
        self.rng.gen_range(0..n)
    }

    /// Shuffles a slice in place (Fisher-Yates).
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let n = slice.len();
        if n <= 1 {
            return;
        }
        for i in (1..n).rev() {
            let j = self.index(i + 1);
            slice.swap(i, j);
        }
    }

    /// Samples `k` unique items from `items` without replacement.
    ///
    /// If `k >= items.len()`, returns a shuffled copy of all items. The
    /// order of the returned sample is itself random.
    pub fn sample<T>(&mut self, mut items: Vec<T>, k: usize) -> Vec<T> {
        let n = items.len();
        if k >= n {
            self.shuffle(&mut items);
            return items;
        }

        // Partial Fisher-Yates: only the first k positions are settled.
        for i in 0..k {
            let j = i + self.index(n - i);
            items.swap(i, j);
        }
        items.truncate(k);
        items
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clone for Random {
    fn clone(&self) -> Self {
        Self {
            rng: self.rng.clone(),
            seed: self.seed,
            steps: self.steps,
        }
    }
}

impl std::fmt::Debug for Random {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Random")
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}
