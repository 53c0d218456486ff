use crate::core::config::DetectionConfig;
use crate::core::duplicate::{DetectionReport, DuplicateType};
use crate::core::error::Result;
use crate::core::image::Image;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPair {
    pub index: usize,
    pub left: String,
    pub right: String,
    pub duplicate_type: DuplicateType,
    pub score: f64,
}

/// JSON summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: String,
    pub config: DetectionConfig,
    pub image_count: usize,
    pub candidate_count: usize,
    pub feature_pairs_examined: usize,
    pub pairs: Vec<ReportPair>,
}

impl RunReport {
    pub fn new(config: &DetectionConfig, report: &DetectionReport, images: &[Image]) -> Self {
        let source = |id: usize| images[id].source().to_string_lossy().into_owned();
        let pairs = report
            .pairs
            .iter()
            .enumerate()
            .map(|(offset, found)| ReportPair {
                index: offset + 1,
                left: source(found.pair.first()),
                right: source(found.pair.second()),
                duplicate_type: found.duplicate_type,
                score: found.score,
            })
            .collect();

        Self {
            generated_at: Utc::now().to_rfc3339(),
            config: config.clone(),
            image_count: report.image_count,
            candidate_count: report.candidate_count,
            feature_pairs_examined: report.feature_pairs_examined,
            pairs,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
