use crate::core::cancel::CancelToken;
use crate::core::error::Result;
use crate::core::ledger::{Pair, PairLedger};
use crate::core::signature::Signature;
use std::collections::BTreeSet;

impl Signature {
    /// Number of differing bits. Both signatures must have the same length.
    pub fn hamming_distance(&self, other: &Signature) -> usize {
        debug_assert_eq!(self.len(), other.len());
        self.as_bytes()
            .iter()
            .zip(other.as_bytes())
            .map(|(a, b)| (a ^ b).count_ones() as usize)
            .sum()
    }

    /// Fraction of agreeing bits, in [0, 1].
    pub fn similarity(&self, other: &Signature) -> f64 {
        if self.is_empty() {
            return 1.0;
        }
        let bits = self.len();
        (bits - self.hamming_distance(other)) as f64 / bits as f64
    }
}

/// A candidate confirmed by the Hamming filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashMatch {
    pub pair: Pair,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct HammingFilter {
    threshold: f64,
}

impl HammingFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Inclusive: a similarity exactly at the threshold is a duplicate.
    pub fn is_duplicate(&self, a: &Signature, b: &Signature) -> bool {
        a.similarity(b) >= self.threshold
    }

    /// Check each candidate not yet in the ledger, in ascending pair order,
    /// recording confirmed ones. Rejected candidates are not recorded.
    pub fn confirm(
        &self,
        candidates: &BTreeSet<Pair>,
        signatures: &[Signature],
        ledger: &mut PairLedger,
        cancel: &CancelToken,
    ) -> Result<Vec<HashMatch>> {
        let mut confirmed = Vec::new();
        for &pair in candidates {
            cancel.check()?;
            if ledger.contains_pair(pair) {
                continue;
            }
            let (a, b) = (&signatures[pair.first()], &signatures[pair.second()]);
            if self.is_duplicate(a, b) && ledger.record(pair) {
                confirmed.push(HashMatch {
                    pair,
                    similarity: a.similarity(b),
                });
            }
        }
        log::info!(
            "Hamming filter confirmed {} of {} candidate pairs",
            confirmed.len(),
            candidates.len()
        );
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(ones: &[usize], len: usize) -> Signature {
        Signature::from_bits((0..len).map(|i| ones.contains(&i)))
    }

    fn candidates(list: &[(usize, usize)]) -> BTreeSet<Pair> {
        list.iter()
            .map(|&(x, y)| Pair::new(x, y).unwrap())
            .collect()
    }

    #[test]
    fn test_self_similarity_is_one() {
        let sig = signature(&[0, 3, 9], 16);
        assert_eq!(sig.hamming_distance(&sig), 0);
        assert_eq!(sig.similarity(&sig.clone()), 1.0);
        assert!(HammingFilter::new(1.0).is_duplicate(&sig, &sig.clone()));
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = signature(&[0, 1, 2, 3], 16);
        let b = signature(&[2, 3, 4, 5, 6], 16);
        assert_eq!(a.hamming_distance(&b), 5);
        assert_eq!(a.similarity(&b), b.similarity(&a));
        assert_eq!(a.similarity(&b), 11.0 / 16.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // 4 of 16 bits differ: similarity 0.75 exactly
        let a = signature(&[], 16);
        let b = signature(&[0, 1, 2, 3], 16);
        assert!(HammingFilter::new(0.75).is_duplicate(&a, &b));
        // one bit more than the signature's granularity allows
        assert!(!HammingFilter::new(0.75 + 1.0 / 16.0).is_duplicate(&a, &b));
    }

    #[test]
    fn test_confirm_uses_inclusive_threshold() {
        let signatures = vec![signature(&[], 16), signature(&[0, 1, 2, 3], 16)];
        let pairs = candidates(&[(0, 1)]);

        let mut ledger = PairLedger::new();
        let confirmed = HammingFilter::new(0.75)
            .confirm(&pairs, &signatures, &mut ledger, &CancelToken::new())
            .unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].similarity, 0.75);

        let mut ledger = PairLedger::new();
        let confirmed = HammingFilter::new(0.75 + 1.0 / 16.0)
            .confirm(&pairs, &signatures, &mut ledger, &CancelToken::new())
            .unwrap();
        assert!(confirmed.is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_confirm_records_and_skips_ledger_pairs() {
        let signatures = vec![
            signature(&[0, 1], 8),
            signature(&[0, 1], 8),
            signature(&[0, 1, 2], 8),
            signature(&[4, 5, 6, 7], 8),
        ];
        let mut ledger = PairLedger::new();
        ledger.record(Pair::new(0, 2).unwrap());

        let confirmed = HammingFilter::new(0.8)
            .confirm(
                &candidates(&[(0, 1), (0, 2), (1, 2), (0, 3)]),
                &signatures,
                &mut ledger,
                &CancelToken::new(),
            )
            .unwrap();

        let pairs: Vec<Pair> = confirmed.iter().map(|m| m.pair).collect();
        assert_eq!(pairs, vec![Pair::new(0, 1).unwrap(), Pair::new(1, 2).unwrap()]);
        assert_eq!(confirmed[0].similarity, 1.0);
        assert!(ledger.contains(1, 0));
        assert!(ledger.contains(2, 1));
        // rejected candidates stay out of the ledger
        assert!(!ledger.contains(0, 3));
        assert_eq!(ledger.len(), 3);
    }
}
