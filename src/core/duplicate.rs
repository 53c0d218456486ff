// Two-phase duplicate detection over one in-memory batch:
// - phase 1: perceptual signatures, LSH banding, Hamming confirmation
// - phase 2: exhaustive feature matching over every pair phase 1 did not confirm

use crate::core::assembler::{self, Artifact};
use crate::core::band::BandIndex;
use crate::core::cancel::CancelToken;
use crate::core::config::DetectionConfig;
use crate::core::error::{DetectError, Result};
use crate::core::features::{FeatureExtractor, FeatureOutcome, FeatureVerifier};
use crate::core::hamming::{HammingFilter, HashMatch};
use crate::core::image::Image;
use crate::core::ledger::{Pair, PairLedger};
use crate::core::signature::SignatureComputer;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// The stage that confirmed a duplicate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateType {
    /// Hamming similarity of perceptual signatures.
    Hash,
    /// Local feature matching.
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub pair: Pair,
    pub duplicate_type: DuplicateType,
    /// Hamming similarity for `Hash`, match score for `Feature`.
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HashPhase {
    pub candidate_count: usize,
    pub matches: Vec<HashMatch>,
}

/// Outcome of a full run. `pairs` lists phase-1 pairs first, then phase-2
/// pairs, each in discovery order.
#[derive(Debug, Clone, Default)]
pub struct DetectionReport {
    pub image_count: usize,
    pub candidate_count: usize,
    pub feature_pairs_examined: usize,
    pub pairs: Vec<DuplicatePair>,
}

impl DetectionReport {
    pub fn duplicate_pairs(&self) -> Vec<Pair> {
        self.pairs.iter().map(|p| p.pair).collect()
    }

    /// Left/right artifacts for every pair, numbered from 1.
    pub fn artifacts<'a>(&self, images: &'a [Image]) -> Vec<(Artifact<'a>, Artifact<'a>)> {
        assembler::assemble(&self.duplicate_pairs(), images)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectionPhase {
    Signatures,
    Candidates,
    HashFilter,
    Features,
    Verification,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionProgress {
    pub phase: DetectionPhase,
    pub completed: usize,
    pub total: usize,
}

pub type ProgressCallback = Box<dyn Fn(DetectionProgress) + Send + Sync>;

pub struct DuplicateDetector {
    config: DetectionConfig,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
}

impl DuplicateDetector {
    /// Validates `config` up front so bad parameters never reach image work.
    pub fn new(config: DetectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
            progress: None,
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    fn report(&self, phase: DetectionPhase, completed: usize, total: usize) {
        if let Some(callback) = &self.progress {
            let progress = DetectionProgress {
                phase,
                completed,
                total,
            };
            // a panicking callback is logged, not propagated
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(progress);
            })) {
                log::warn!("Progress callback panicked: {:?}", e);
            }
        }
    }

    /// Phase 1. Image ids are positions in `images`.
    pub fn find_near_duplicates(
        &self,
        images: &[Image],
        ledger: &mut PairLedger,
    ) -> Result<HashPhase> {
        check_batch_order(images)?;
        let total = images.len();
        self.report(DetectionPhase::Signatures, 0, total);
        let computer = SignatureComputer::new(self.config.hash_size);
        let signatures = computer.compute_batch(images, &self.cancel)?;
        self.report(DetectionPhase::Signatures, total, total);

        let index = BandIndex::from_config(&self.config);
        self.report(DetectionPhase::Candidates, 0, index.bands());
        let candidates = index.candidate_pairs(&signatures, &self.cancel)?;
        self.report(DetectionPhase::Candidates, index.bands(), index.bands());

        self.report(DetectionPhase::HashFilter, 0, candidates.len());
        let matches = HammingFilter::new(self.config.similarity_threshold).confirm(
            &candidates,
            &signatures,
            ledger,
            &self.cancel,
        )?;
        self.report(
            DetectionPhase::HashFilter,
            candidates.len(),
            candidates.len(),
        );

        Ok(HashPhase {
            candidate_count: candidates.len(),
            matches,
        })
    }

    /// Phase 2: every pair not already in the ledger is scored.
    pub fn verify_features(
        &self,
        images: &[Image],
        ledger: &mut PairLedger,
    ) -> Result<FeatureOutcome> {
        check_batch_order(images)?;
        let total = images.len();
        if total < 2 {
            return Ok(FeatureOutcome::default());
        }

        self.report(DetectionPhase::Features, 0, total);
        let features =
            FeatureExtractor::new(self.config.feature.clone()).extract_batch(images, &self.cancel)?;
        self.report(DetectionPhase::Features, total, total);

        let rows_done = AtomicUsize::new(0);
        self.report(DetectionPhase::Verification, 0, total);
        let verifier = FeatureVerifier::new(self.config.match_threshold, self.config.feature.ratio);
        verifier.verify(&features, ledger, &self.cancel, |_| {
            let done = rows_done.fetch_add(1, Ordering::Relaxed) + 1;
            self.report(DetectionPhase::Verification, done, total);
        })
    }

    /// Run both phases over one batch, sharing a single ledger.
    pub fn detect(&self, images: &[Image]) -> Result<DetectionReport> {
        let mut ledger = PairLedger::new();

        let hash_phase = self.find_near_duplicates(images, &mut ledger)?;
        log::info!(
            "Phase 1: {} candidates, {} near-duplicates among {} images",
            hash_phase.candidate_count,
            hash_phase.matches.len(),
            images.len()
        );

        let feature_phase = self.verify_features(images, &mut ledger)?;
        log::info!(
            "Phase 2: {} pairs examined, {} additional duplicates",
            feature_phase.examined,
            feature_phase.matches.len()
        );

        let mut pairs = Vec::with_capacity(ledger.len());
        pairs.extend(hash_phase.matches.iter().map(|m| DuplicatePair {
            pair: m.pair,
            duplicate_type: DuplicateType::Hash,
            score: m.similarity,
        }));
        pairs.extend(feature_phase.matches.iter().map(|m| DuplicatePair {
            pair: m.pair,
            duplicate_type: DuplicateType::Feature,
            score: m.score,
        }));
        self.report(DetectionPhase::Complete, pairs.len(), pairs.len());

        Ok(DetectionReport {
            image_count: images.len(),
            candidate_count: hash_phase.candidate_count,
            feature_pairs_examined: feature_phase.examined,
            pairs,
        })
    }
}

/// Pairs are keyed by batch position, so every image id must equal its position.
fn check_batch_order(images: &[Image]) -> Result<()> {
    match images
        .iter()
        .enumerate()
        .find(|(position, image)| image.id() != *position)
    {
        Some((position, image)) => Err(DetectError::BatchOrder {
            position,
            id: image.id(),
        }),
        None => Ok(()),
    }
}
