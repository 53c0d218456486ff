use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Unordered pair of distinct image ids, stored as `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    a: usize,
    b: usize,
}

impl Pair {
    /// Canonicalize `(x, y)`; a self-pair is not a pair.
    pub fn new(x: usize, y: usize) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self { a: x, b: y }),
            std::cmp::Ordering::Greater => Some(Self { a: y, b: x }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn first(&self) -> usize {
        self.a
    }

    pub fn second(&self) -> usize {
        self.b
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.a, self.b)
    }
}

/// Pairs already confirmed as duplicates during one run.
///
/// Both orientations are stored so a lookup by `(x, y)` or `(y, x)` is a
/// single probe. The ledger only grows.
#[derive(Debug, Default)]
pub struct PairLedger {
    seen: HashSet<(usize, usize)>,
}

impl PairLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        self.seen.contains(&(x, y)) || self.seen.contains(&(y, x))
    }

    pub fn contains_pair(&self, pair: Pair) -> bool {
        self.contains(pair.first(), pair.second())
    }

    /// Record a confirmed pair. Returns `false` when it was already present.
    pub fn record(&mut self, pair: Pair) -> bool {
        if self.contains_pair(pair) {
            return false;
        }
        self.seen.insert((pair.first(), pair.second()));
        self.seen.insert((pair.second(), pair.first()));
        true
    }

    /// Number of distinct unordered pairs recorded.
    pub fn len(&self) -> usize {
        self.seen.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_canonical_order() {
        assert_eq!(Pair::new(5, 2), Pair::new(2, 5));
        let pair = Pair::new(5, 2).unwrap();
        assert_eq!((pair.first(), pair.second()), (2, 5));
        assert_eq!(pair.to_string(), "(2, 5)");
    }

    #[test]
    fn test_no_self_pairs() {
        assert!(Pair::new(4, 4).is_none());
    }

    #[test]
    fn test_record_both_orientations() {
        let mut ledger = PairLedger::new();
        assert!(ledger.is_empty());
        assert!(ledger.record(Pair::new(1, 3).unwrap()));

        assert!(ledger.contains(1, 3));
        assert!(ledger.contains(3, 1));
        assert!(!ledger.contains(1, 2));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_double_record_is_rejected() {
        let mut ledger = PairLedger::new();
        assert!(ledger.record(Pair::new(0, 1).unwrap()));
        assert!(!ledger.record(Pair::new(1, 0).unwrap()));
        assert_eq!(ledger.len(), 1);
    }
}
