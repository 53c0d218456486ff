use crate::core::cancel::CancelToken;
use crate::core::config::DetectionConfig;
use crate::core::error::Result;
use crate::core::ledger::Pair;
use crate::core::signature::Signature;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

/// Contiguous run of signature bits.
#[derive(Debug, Clone, Copy)]
pub struct Band<'a> {
    signature: &'a Signature,
    start: usize,
    len: usize,
}

impl<'a> Band<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + 'a {
        let signature = self.signature;
        (self.start..self.start + self.len).map(move |i| signature.bit(i))
    }

    /// Bucket key: the band's bits repacked LSB-first from a byte boundary.
    pub fn key(&self) -> Vec<u8> {
        let mut key = vec![0u8; self.len.div_ceil(8)];
        for (offset, bit) in self.bits().enumerate() {
            if bit {
                key[offset / 8] |= 1 << (offset % 8);
            }
        }
        key
    }
}

impl Signature {
    /// The `index`-th band of `rows` bits.
    pub fn band(&self, index: usize, rows: usize) -> Band<'_> {
        let start = index * rows;
        debug_assert!(start + rows <= self.len());
        Band {
            signature: self,
            start,
            len: rows,
        }
    }
}

/// Band key → ids of images whose band carries that key, in batch order.
pub type BucketMap = HashMap<Vec<u8>, Vec<usize>>;

/// LSH banding over a batch of signatures.
#[derive(Debug, Clone, Copy)]
pub struct BandIndex {
    bands: usize,
    rows: usize,
}

impl BandIndex {
    pub fn new(bands: usize, rows: usize) -> Self {
        Self { bands, rows }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.bands, config.rows_per_band())
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn bucket_map(&self, signatures: &[Signature], band: usize) -> BucketMap {
        let mut buckets = BucketMap::new();
        for (id, signature) in signatures.iter().enumerate() {
            buckets
                .entry(signature.band(band, self.rows).key())
                .or_default()
                .push(id);
        }
        buckets
    }

    /// Every unordered pair sharing at least one band, each listed once.
    ///
    /// Buckets are built per band in parallel; the per-band pair lists are
    /// merged on the calling thread.
    pub fn candidate_pairs(
        &self,
        signatures: &[Signature],
        cancel: &CancelToken,
    ) -> Result<BTreeSet<Pair>> {
        let per_band: Vec<Vec<Pair>> = (0..self.bands)
            .into_par_iter()
            .map(|band| -> Result<Vec<Pair>> {
                cancel.check()?;
                let buckets = self.bucket_map(signatures, band);
                let mut pairs = Vec::new();
                for group in buckets.values().filter(|group| group.len() > 1) {
                    for (i, &x) in group.iter().enumerate() {
                        pairs.extend(group[i + 1..].iter().filter_map(|&y| Pair::new(x, y)));
                    }
                }
                Ok(pairs)
            })
            .collect::<Result<_>>()?;

        let mut candidates = BTreeSet::new();
        for pairs in per_band {
            candidates.extend(pairs);
        }
        log::debug!(
            "{} bands of {} bits proposed {} candidate pairs",
            self.bands,
            self.rows,
            candidates.len()
        );
        Ok(candidates)
    }
}
