//! ORB-style coin matching: FAST-9 keypoints described with BRIEF and
//! matched by Hamming distance against reference coin photos.

use image::{imageops, GrayImage};
use imageproc::binary_descriptors::brief::{brief, BriefDescriptor, TestPair};
use imageproc::binary_descriptors::BinaryDescriptor;
use imageproc::corners::corners_fast9;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detection::templates::load_grouped;
use crate::models::CoinKind;

/// Keypoints closer than this to the border have no full BRIEF patch
const PATCH_MARGIN: u32 = 17;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureParams {
    /// Side length coin crops and references are resized to
    pub size: u32,
    pub fast_threshold: u8,
    pub max_keypoints: usize,
    /// BRIEF descriptor length in bits (multiple of 128)
    pub descriptor_bits: usize,
    pub max_hamming: u32,
    /// Best/second-best distance ratio for accepting a match
    pub ratio: f32,
    /// Fewer good matches than this leaves the coin unmatched
    pub min_matches: usize,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            size: 128,
            fast_threshold: 20,
            max_keypoints: 200,
            descriptor_bits: 256,
            max_hamming: 64,
            ratio: 0.8,
            min_matches: 5,
        }
    }
}

/// Result of matching one coin against the references
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    pub kind: CoinKind,
    pub good_matches: usize,
    /// Good matches as a percentage of the coin's keypoints
    pub percent: f32,
}

struct Reference {
    kind: CoinKind,
    descriptors: Vec<BriefDescriptor>,
}

/// Reference descriptors for every known coin photo
pub struct ReferenceSet {
    params: FeatureParams,
    test_pairs: Option<Vec<TestPair>>,
    references: Vec<Reference>,
}

fn keypoints(img: &GrayImage, params: &FeatureParams) -> Vec<Point<u32>> {
    let (w, h) = img.dimensions();
    if w <= 2 * PATCH_MARGIN || h <= 2 * PATCH_MARGIN {
        return Vec::new();
    }
    let mut corners = corners_fast9(img, params.fast_threshold);
    corners.retain(|c| {
        c.x >= PATCH_MARGIN && c.y >= PATCH_MARGIN && c.x < w - PATCH_MARGIN && c.y < h - PATCH_MARGIN
    });
    corners.sort_by(|a, b| b.score.total_cmp(&a.score));
    corners.truncate(params.max_keypoints);
    corners.into_iter().map(|c| Point::new(c.x, c.y)).collect()
}

impl ReferenceSet {
    pub fn new(params: FeatureParams) -> Self {
        Self { params, test_pairs: None, references: Vec::new() }
    }

    /// Load reference coin photos grouped by filename
    pub fn load(dir: &Path, params: FeatureParams) -> anyhow::Result<Self> {
        let mut set = Self::new(params);
        for (kind, images) in load_grouped(dir, set.params.size)? {
            for img in images {
                set.add(kind, &img)?;
            }
        }
        tracing::info!("Loaded {} feature references from {}", set.len(), dir.display());
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn params(&self) -> &FeatureParams {
        &self.params
    }

    /// Describe an image with the shared BRIEF test pairs
    fn describe(&mut self, img: &GrayImage) -> anyhow::Result<Vec<BriefDescriptor>> {
        let resized = self.normalise(img);
        let points = keypoints(&resized, &self.params);
        if points.is_empty() {
            return Ok(Vec::new());
        }
        let (descriptors, pairs) = brief(&resized, &points, self.params.descriptor_bits, self.test_pairs.as_ref())
            .map_err(|e| anyhow::anyhow!("BRIEF extraction failed: {}", e))?;
        if self.test_pairs.is_none() {
            self.test_pairs = Some(pairs);
        }
        Ok(descriptors)
    }

    fn normalise(&self, img: &GrayImage) -> GrayImage {
        if img.dimensions() == (self.params.size, self.params.size) {
            img.clone()
        } else {
            imageops::resize(img, self.params.size, self.params.size, imageops::FilterType::Triangle)
        }
    }

    /// Add one reference photo; photos without keypoints are ignored
    pub fn add(&mut self, kind: CoinKind, img: &GrayImage) -> anyhow::Result<()> {
        let descriptors = self.describe(img)?;
        if descriptors.is_empty() {
            tracing::debug!("Reference for {} has no keypoints", kind);
            return Ok(());
        }
        self.references.push(Reference { kind, descriptors });
        Ok(())
    }

    /// Match a coin crop against every reference
    pub fn classify(&self, coin: &GrayImage) -> anyhow::Result<Option<FeatureMatch>> {
        let Some(pairs) = self.test_pairs.as_ref() else {
            return Ok(None);
        };
        let resized = self.normalise(coin);
        let points = keypoints(&resized, &self.params);
        if points.is_empty() {
            return Ok(None);
        }
        let (query, _) = brief(&resized, &points, self.params.descriptor_bits, Some(pairs))
            .map_err(|e| anyhow::anyhow!("BRIEF extraction failed: {}", e))?;

        let mut best: Option<FeatureMatch> = None;
        for reference in &self.references {
            let good = count_good_matches(&query, &reference.descriptors, &self.params);
            if best.is_none_or(|b| good > b.good_matches) {
                best = Some(FeatureMatch {
                    kind: reference.kind,
                    good_matches: good,
                    percent: good as f32 * 100.0 / query.len() as f32,
                });
            }
        }

        Ok(best.filter(|b| b.good_matches >= self.params.min_matches))
    }
}

/// Brute-force matching with a best/second-best ratio test
fn count_good_matches(query: &[BriefDescriptor], train: &[BriefDescriptor], params: &FeatureParams) -> usize {
    query
        .iter()
        .filter(|q| {
            let mut best = u32::MAX;
            let mut second = u32::MAX;
            for t in train {
                let d = q.hamming_distance(t);
                if d < best {
                    second = best;
                    best = d;
                } else if d < second {
                    second = d;
                }
            }
            if best > params.max_hamming {
                return false;
            }
            best == 0 || second == u32::MAX || (best as f32) < params.ratio * second as f32
        })
        .count()
}
