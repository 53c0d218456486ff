//! Near-duplicate image detection: perceptual-hash LSH candidates confirmed by
//! Hamming similarity, followed by exhaustive local-feature verification.

pub mod core;
pub mod services;

pub use crate::core::cancel::CancelToken;
pub use crate::core::config::{DetectionConfig, FeatureConfig};
pub use crate::core::duplicate::{
    DetectionPhase, DetectionProgress, DetectionReport, DuplicateDetector, DuplicatePair,
    DuplicateType,
};
pub use crate::core::error::{DetectError, Result};
pub use crate::core::image::Image;
pub use crate::core::ledger::{Pair, PairLedger};
