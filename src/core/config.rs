use crate::core::error::{DetectError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Largest supported hash side. Anything above this produces signatures far
/// bigger than the 256x256 raster they are computed from.
pub const MAX_HASH_SIZE: u32 = 256;

/// Run-scoped parameters of one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum Hamming similarity for a phase-1 candidate to be confirmed.
    pub similarity_threshold: f64,
    /// Side length of the perceptual hash; signatures have `hash_size²` bits.
    pub hash_size: u32,
    /// Number of LSH bands the signature is split into.
    pub bands: usize,
    /// Minimum feature match score for a phase-2 pair to be confirmed.
    pub match_threshold: f64,
    pub feature: FeatureConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.55,
            hash_size: 32,
            bands: 75,
            match_threshold: 0.3,
            feature: FeatureConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Intensity difference for a FAST circle pixel to count as brighter/darker.
    pub fast_threshold: u8,
    /// Strongest keypoints kept per image.
    pub max_keypoints: usize,
    /// Nearest / second-nearest distance ratio for a match to be kept.
    pub ratio: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            max_keypoints: 500,
            ratio: 0.75,
        }
    }
}

impl DetectionConfig {
    /// Load a config from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn signature_bits(&self) -> usize {
        (self.hash_size as usize) * (self.hash_size as usize)
    }

    /// Bits per band. Trailing bits beyond `bands * rows_per_band` are not
    /// part of any band.
    pub fn rows_per_band(&self) -> usize {
        self.signature_bits() / self.bands
    }

    pub fn dropped_bits(&self) -> usize {
        self.signature_bits() - self.rows_per_band() * self.bands
    }

    /// Reject parameter combinations before any image is touched.
    pub fn validate(&self) -> Result<()> {
        if !self.similarity_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.similarity_threshold)
        {
            return Err(DetectError::config(format!(
                "similarity threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.hash_size < 2 || self.hash_size > MAX_HASH_SIZE {
            return Err(DetectError::config(format!(
                "hash size must be within [2, {}], got {}",
                MAX_HASH_SIZE, self.hash_size
            )));
        }
        if self.bands == 0 {
            return Err(DetectError::config("band count must be at least 1"));
        }
        if self.bands > self.signature_bits() {
            return Err(DetectError::config(format!(
                "band count {} exceeds the {} signature bits",
                self.bands,
                self.signature_bits()
            )));
        }
        if !self.match_threshold.is_finite() || self.match_threshold < 0.0 {
            return Err(DetectError::config(format!(
                "match threshold must be a non-negative number, got {}",
                self.match_threshold
            )));
        }
        if self.feature.max_keypoints == 0 {
            return Err(DetectError::config("max keypoints must be at least 1"));
        }
        if !(self.feature.ratio > 0.0 && self.feature.ratio <= 1.0) {
            return Err(DetectError::config(format!(
                "ratio test factor must be within (0, 1], got {}",
                self.feature.ratio
            )));
        }

        let dropped = self.dropped_bits();
        if dropped > 0 {
            log::warn!(
                "{} bands of {} bits leave {} trailing signature bits unbanded",
                self.bands,
                self.rows_per_band(),
                dropped
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = DetectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.signature_bits(), 1024);
        assert_eq!(config.rows_per_band(), 13);
        assert_eq!(config.dropped_bits(), 1024 - 13 * 75);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut config = DetectionConfig::default();
        config.similarity_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(DetectError::InvalidConfig { .. })
        ));

        config.similarity_threshold = f64::NAN;
        assert!(config.validate().is_err());

        config.similarity_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_band_count_limits() {
        let mut config = DetectionConfig::default();
        config.bands = 0;
        assert!(config.validate().is_err());

        config.bands = 1025;
        assert!(config.validate().is_err());

        config.bands = 1024;
        assert!(config.validate().is_ok());
        assert_eq!(config.rows_per_band(), 1);
    }

    #[test]
    fn test_hash_size_and_feature_limits() {
        let mut config = DetectionConfig::default();
        config.hash_size = 1;
        assert!(config.validate().is_err());

        let mut config = DetectionConfig::default();
        config.match_threshold = -0.1;
        assert!(config.validate().is_err());

        let mut config = DetectionConfig::default();
        config.feature.ratio = 0.0;
        assert!(config.validate().is_err());

        let mut config = DetectionConfig::default();
        config.feature.max_keypoints = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "bands": 64, "feature": { "ratio": 0.8 } }"#).unwrap();

        let config = DetectionConfig::from_json_file(&path).unwrap();
        assert_eq!(config.bands, 64);
        assert_eq!(config.hash_size, 32);
        assert_eq!(config.feature.ratio, 0.8);
        assert_eq!(config.feature.max_keypoints, 500);
        assert!(config.validate().is_ok());
    }
}
