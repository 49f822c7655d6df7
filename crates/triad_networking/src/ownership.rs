//! # Ownership Arbitration
//!
//! Two peers may claim the same entity at nearly the same time. Every peer
//! compares claims with the same total order, so all of them settle on the
//! same winner without talking to a server:
//!
//! 1. the later `last_owned` stamp wins;
//! 2. on equal stamps, the greater owner key wins.
//!
//! The owner key must be identical on every peer (the replicator uses the
//! protocol-level user id, never a session-local participant number).

/// A (timestamp, owner key) ownership claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OwnershipStamp<K> {
    /// Time the owner took ownership, in network milliseconds.
    pub last_owned: u32,
    /// Tie-break key of the owner.
    pub owner: K,
}

impl<K: Ord> OwnershipStamp<K> {
    /// Creates a stamp.
    #[inline]
    pub const fn new(last_owned: u32, owner: K) -> Self {
        Self { last_owned, owner }
    }

    /// Whether this claim displaces `current`.
    ///
    /// Strict: a claim never wins against itself.
    #[inline]
    #[must_use]
    pub fn wins_over(&self, current: &Self) -> bool {
        self.last_owned > current.last_owned
            || (self.last_owned == current.last_owned && self.owner > current.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_stamp_wins() {
        let current = OwnershipStamp::new(100, 5u32);
        assert!(OwnershipStamp::new(101, 0u32).wins_over(&current));
        assert!(!OwnershipStamp::new(99, 99u32).wins_over(&current));
    }

    #[test]
    fn test_tie_broken_by_owner_key() {
        let current = OwnershipStamp::new(100, 5u32);
        assert!(OwnershipStamp::new(100, 7u32).wins_over(&current));
        assert!(!OwnershipStamp::new(100, 3u32).wins_over(&current));
        assert!(!current.wins_over(&current));
    }

    #[test]
    fn test_order_is_antisymmetric() {
        let a = OwnershipStamp::new(100, "@alice:example.org");
        let b = OwnershipStamp::new(100, "@bob:example.org");
        assert!(b.wins_over(&a));
        assert!(!a.wins_over(&b));
    }

    #[test]
    fn test_departed_owner_ranks_lowest() {
        let departed: OwnershipStamp<Option<&str>> = OwnershipStamp::new(50, None);
        assert!(OwnershipStamp::new(50, Some("@anyone")).wins_over(&departed));
    }
}
