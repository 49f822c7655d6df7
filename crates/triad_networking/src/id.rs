//! # Network Ids
//!
//! Every peer mints ids for the entities it creates, with no coordination,
//! so ids are drawn at random from the full `u32` space. Zero is reserved.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Globally unique id of one networked entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub u32);

impl NetworkId {
    /// Reserved, never allocated.
    pub const NULL: Self = Self(0);

    /// Returns true for the reserved id.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Random network id source.
pub struct NetworkIdAllocator {
    rng: StdRng,
}

impl NetworkIdAllocator {
    /// Seeds from operating system entropy.
    ///
    /// Falls back to a clock-derived seed if the OS source is unavailable;
    /// collisions with other peers stay improbable, just not cryptographically so.
    #[must_use]
    pub fn from_entropy() -> Self {
        let mut seed = [0u8; 32];
        match getrandom::fill(&mut seed) {
            Ok(()) => Self {
                rng: StdRng::from_seed(seed),
            },
            Err(err) => {
                tracing::warn!(%err, "OS entropy unavailable; seeding network ids from the clock");
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos());
                #[allow(clippy::cast_possible_truncation)]
                let folded = nanos as u64 ^ (nanos >> 64) as u64;
                Self::seeded(folded)
            }
        }
    }

    /// Deterministic ids for tests and replays.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws a nonzero id for which `in_use` returns false.
    pub fn allocate(&mut self, in_use: impl Fn(NetworkId) -> bool) -> NetworkId {
        loop {
            let id = NetworkId(self.rng.gen());
            if !id.is_null() && !in_use(id) {
                return id;
            }
        }
    }
}

impl Default for NetworkIdAllocator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_seeded_is_deterministic() {
        let mut a = NetworkIdAllocator::seeded(7);
        let mut b = NetworkIdAllocator::seeded(7);
        for _ in 0..16 {
            assert_eq!(a.allocate(|_| false), b.allocate(|_| false));
        }
    }

    #[test]
    fn test_skips_ids_in_use() {
        let mut probe = NetworkIdAllocator::seeded(11);
        let first = probe.allocate(|_| false);

        let mut alloc = NetworkIdAllocator::seeded(11);
        let id = alloc.allocate(|candidate| candidate == first);
        assert_ne!(id, first);
        assert!(!id.is_null());
    }

    #[test]
    fn test_entropy_ids_are_distinct() {
        let mut alloc = NetworkIdAllocator::from_entropy();
        let mut seen = HashSet::new();
        for _ in 0..256 {
            let id = alloc.allocate(|candidate| seen.contains(&candidate));
            assert!(seen.insert(id));
        }
    }
}
