//! Local keypoints, binary descriptors and ratio-test matching.
//!
//! Keypoints are FAST-9 corners kept after 3x3 non-maximum suppression on a
//! patch-variance response. Each keypoint gets an intensity-centroid
//! orientation and a 256-bit steered BRIEF descriptor, so a rotated copy of
//! an image produces (nearly) the same descriptors.

use crate::core::cancel::CancelToken;
use crate::core::config::FeatureConfig;
use crate::core::error::Result;
use crate::core::image::Image;
use crate::core::ledger::{Pair, PairLedger};
use image::GrayImage;
use rayon::prelude::*;

pub const DESCRIPTOR_BYTES: usize = 32;
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

const FAST_RADIUS: u32 = 3;
const FAST_ARC: usize = 9;
const FAST_CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];
const ORIENTATION_RADIUS: i32 = 15;
const PATTERN_RADIUS: u32 = 13;

/// 256 point-pair tests within a 27x27 patch, generated once at compile time.
const BRIEF_PATTERN: [[i8; 4]; DESCRIPTOR_BYTES * 8] = brief_pattern(0x9E37_79B9);

const fn brief_pattern(seed: u32) -> [[i8; 4]; DESCRIPTOR_BYTES * 8] {
    let mut pattern = [[0i8; 4]; DESCRIPTOR_BYTES * 8];
    let mut state = seed;
    let mut i = 0;
    while i < pattern.len() {
        let mut j = 0;
        while j < 4 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            pattern[i][j] = (state % (2 * PATTERN_RADIUS + 1)) as i8 - PATTERN_RADIUS as i8;
            j += 1;
        }
        i += 1;
    }
    pattern
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: u32,
    pub y: u32,
    /// Scaled variance of the 5x5 patch around the corner.
    pub response: u64,
    /// Intensity-centroid orientation in radians.
    pub angle: f64,
}

/// Keypoints of one image with one descriptor per keypoint.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty() || self.descriptors.is_empty()
    }
}

pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, gray: &GrayImage) -> FeatureSet {
        let keypoints = self.detect(gray);
        let descriptors = keypoints
            .iter()
            .map(|keypoint| describe(gray, keypoint))
            .collect();
        FeatureSet {
            keypoints,
            descriptors,
        }
    }

    /// One feature set per image, in batch order.
    pub fn extract_batch(&self, images: &[Image], cancel: &CancelToken) -> Result<Vec<FeatureSet>> {
        images
            .par_iter()
            .map(|image| -> Result<FeatureSet> {
                cancel.check()?;
                Ok(self.extract(&image.to_luma8()))
            })
            .collect()
    }

    fn detect(&self, gray: &GrayImage) -> Vec<Keypoint> {
        let (width, height) = gray.dimensions();
        if width <= 2 * FAST_RADIUS || height <= 2 * FAST_RADIUS {
            return Vec::new();
        }

        let threshold = self.config.fast_threshold;
        let corners: Vec<(u32, u32, u64)> = (FAST_RADIUS..height - FAST_RADIUS)
            .into_par_iter()
            .flat_map_iter(|y| {
                (FAST_RADIUS..width - FAST_RADIUS).filter_map(move |x| {
                    is_fast_corner(gray, x, y, threshold).then(|| (x, y, patch_response(gray, x, y)))
                })
            })
            .collect();

        // 3x3 non-maximum suppression; equal neighbours both survive
        let mut responses: Vec<Option<u64>> = vec![None; (width * height) as usize];
        for &(x, y, response) in &corners {
            responses[(y * width + x) as usize] = Some(response);
        }
        let mut kept: Vec<(u32, u32, u64)> = corners
            .into_iter()
            .filter(|&(x, y, response)| {
                (-1i32..=1).all(|dy| {
                    (-1i32..=1).all(|dx| {
                        let nx = (x as i32 + dx) as u32;
                        let ny = (y as i32 + dy) as u32;
                        match responses[(ny * width + nx) as usize] {
                            Some(neighbour) => neighbour <= response,
                            None => true,
                        }
                    })
                })
            })
            .collect();

        kept.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)).then(a.0.cmp(&b.0)));
        kept.truncate(self.config.max_keypoints);

        kept.into_iter()
            .map(|(x, y, response)| Keypoint {
                x,
                y,
                response,
                angle: orientation(gray, x, y),
            })
            .collect()
    }
}

fn is_fast_corner(gray: &GrayImage, x: u32, y: u32, threshold: u8) -> bool {
    let center = gray.get_pixel(x, y)[0];
    let bright = center.saturating_add(threshold);
    let dark = center.saturating_sub(threshold);

    let mut bright_run = 0;
    let mut dark_run = 0;
    // walk the circle twice so arcs that wrap around are counted
    for i in 0..FAST_CIRCLE.len() * 2 {
        let (dx, dy) = FAST_CIRCLE[i % FAST_CIRCLE.len()];
        let pixel = gray.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0];
        if pixel > bright {
            bright_run += 1;
            dark_run = 0;
        } else if pixel < dark {
            dark_run += 1;
            bright_run = 0;
        } else {
            bright_run = 0;
            dark_run = 0;
        }
        if bright_run >= FAST_ARC || dark_run >= FAST_ARC {
            return true;
        }
    }
    false
}

/// `n² · variance` of the 5x5 patch, kept integral so that ties are exact.
fn patch_response(gray: &GrayImage, x: u32, y: u32) -> u64 {
    let mut sum = 0u64;
    let mut sum_sq = 0u64;
    let mut count = 0u64;
    for py in y - 2..=y + 2 {
        for px in x - 2..=x + 2 {
            let value = gray.get_pixel(px, py)[0] as u64;
            sum += value;
            sum_sq += value * value;
            count += 1;
        }
    }
    count * sum_sq - sum * sum
}

fn orientation(gray: &GrayImage, x: u32, y: u32) -> f64 {
    let (width, height) = gray.dimensions();
    let mut m10 = 0i64;
    let mut m01 = 0i64;
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
                continue;
            }
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                continue;
            }
            let intensity = gray.get_pixel(px as u32, py as u32)[0] as i64;
            m10 += intensity * dx as i64;
            m01 += intensity * dy as i64;
        }
    }
    (m01 as f64).atan2(m10 as f64)
}

fn describe(gray: &GrayImage, keypoint: &Keypoint) -> Descriptor {
    let (width, height) = gray.dimensions();
    let (sin, cos) = keypoint.angle.sin_cos();
    let sample = |dx: i8, dy: i8| {
        let rx = (dx as f64 * cos - dy as f64 * sin).round() as i32;
        let ry = (dx as f64 * sin + dy as f64 * cos).round() as i32;
        let px = (keypoint.x as i32 + rx).clamp(0, width as i32 - 1) as u32;
        let py = (keypoint.y as i32 + ry).clamp(0, height as i32 - 1) as u32;
        gray.get_pixel(px, py)[0]
    };

    let mut descriptor = [0u8; DESCRIPTOR_BYTES];
    for (bit, &[x1, y1, x2, y2]) in BRIEF_PATTERN.iter().enumerate() {
        if sample(x1, y1) < sample(x2, y2) {
            descriptor[bit / 8] |= 1 << (bit % 8);
        }
    }
    descriptor
}

pub fn descriptor_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Count query descriptors whose nearest train descriptor is closer than
/// `ratio` times the second nearest. A train set with fewer than two
/// descriptors gives no ratio-test survivors.
pub fn count_good_matches(query: &FeatureSet, train: &FeatureSet, ratio: f32) -> usize {
    if train.descriptors.len() < 2 {
        return 0;
    }
    query
        .descriptors
        .iter()
        .filter(|descriptor| {
            let mut best = u32::MAX;
            let mut second = u32::MAX;
            for candidate in &train.descriptors {
                let distance = descriptor_distance(descriptor, candidate);
                if distance < best {
                    second = best;
                    best = distance;
                } else if distance < second {
                    second = distance;
                }
            }
            (best as f32) < ratio * second as f32
        })
        .count()
}

/// `good matches / min(keypoints)`, or `None` when either side has no
/// descriptors.
pub fn match_score(a: &FeatureSet, b: &FeatureSet, ratio: f32) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let good = count_good_matches(a, b, ratio);
    Some(good as f64 / a.len().min(b.len()) as f64)
}

/// A pair confirmed by feature matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    pub pair: Pair,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureOutcome {
    pub matches: Vec<FeatureMatch>,
    /// Pairs actually scored, i.e. all pairs minus those already in the ledger.
    pub examined: usize,
}

/// Exhaustive pairwise verification over every pair not yet in the ledger.
#[derive(Debug, Clone, Copy)]
pub struct FeatureVerifier {
    threshold: f64,
    ratio: f32,
}

impl FeatureVerifier {
    pub fn new(threshold: f64, ratio: f32) -> Self {
        Self { threshold, ratio }
    }

    /// The match score of a duplicate pair, `None` when the pair is not one.
    pub fn confirmed_score(&self, a: &FeatureSet, b: &FeatureSet) -> Option<f64> {
        match_score(a, b, self.ratio).filter(|&score| score >= self.threshold)
    }

    /// Score all pairs `(i, j)`, `i < j`, absent from the ledger. Rows are
    /// scored in parallel against a frozen view of the ledger; confirmations
    /// are then recorded here in ascending `(i, j)` order. `on_row` receives
    /// the number of pairs scored for each finished row.
    pub fn verify<F>(
        &self,
        features: &[FeatureSet],
        ledger: &mut PairLedger,
        cancel: &CancelToken,
        on_row: F,
    ) -> Result<FeatureOutcome>
    where
        F: Fn(usize) + Sync,
    {
        let count = features.len();
        let frozen: &PairLedger = ledger;
        let rows: Vec<(usize, Vec<FeatureMatch>)> = (0..count)
            .into_par_iter()
            .map(|i| -> Result<(usize, Vec<FeatureMatch>)> {
                let mut examined = 0;
                let mut found = Vec::new();
                for j in i + 1..count {
                    cancel.check()?;
                    if frozen.contains(i, j) {
                        continue;
                    }
                    examined += 1;
                    if let Some(score) = self.confirmed_score(&features[i], &features[j]) {
                        if let Some(pair) = Pair::new(i, j) {
                            found.push(FeatureMatch { pair, score });
                        }
                    }
                }
                on_row(examined);
                Ok((examined, found))
            })
            .collect::<Result<_>>()?;

        let mut outcome = FeatureOutcome::default();
        for (examined, found) in rows {
            outcome.examined += examined;
            for feature_match in found {
                if ledger.record(feature_match.pair) {
                    outcome.matches.push(feature_match);
                }
            }
        }
        log::info!(
            "Feature verification examined {} pairs and confirmed {}",
            outcome.examined,
            outcome.matches.len()
        );
        Ok(outcome)
    }
}
