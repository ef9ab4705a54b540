use crate::pipeline::{PipelineData, PipelineStep, PipelineContext, BoundingBox, MetadataValue};
use crate::detection::{circles, classify, contours, features, hough, preprocessing, templates};
use crate::error::{CoinError, CoinResult};
use crate::models::{Circle, CoinKind};
use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Metadata keys shared between steps
pub mod keys {
    pub const CENTER_X: &str = "center_x";
    pub const CENTER_Y: &str = "center_y";
    pub const RADIUS: &str = "radius";
    pub const VOTES: &str = "votes";
    pub const LARGEST_RADIUS: &str = "largest_radius";
    pub const COIN_KIND: &str = "coin_kind";
    pub const MATCH_SCORE: &str = "match_score";
    pub const BLUR_SIGMA: &str = "blur_sigma";
    pub const BLUR_PSNR: &str = "blur_psnr";
    pub const OTSU_LEVEL: &str = "otsu_level";
    pub const CONTOUR_COUNT: &str = "contour_count";
}

/// Read the circle a [`HoughCircleStep`] stored on an item
pub fn circle_of(item: &PipelineData, step: &'static str) -> Result<Circle> {
    let votes = item.get_int(keys::VOTES).unwrap_or(0).max(0) as u32;
    Ok(Circle {
        x: item.require_float(keys::CENTER_X, step)?,
        y: item.require_float(keys::CENTER_Y, step)?,
        radius: item.require_float(keys::RADIUS, step)?,
        votes,
    })
}

fn set_kind(item: &mut PipelineData, kind: CoinKind) {
    item.set(keys::COIN_KIND, MetadataValue::String(kind.as_key().to_string()));
}

/// Convert image to grayscale
pub struct GrayscaleStep;

impl PipelineStep for GrayscaleStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| item.with_image(DynamicImage::ImageLuma8(preprocessing::to_grayscale(&item.image))))
            .collect())
    }

    fn name(&self) -> &str {
        "Grayscale Conversion"
    }
}

/// Apply Gaussian blur
pub struct BlurStep {
    pub sigma: f32,
}

impl PipelineStep for BlurStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let gray = item.image.to_luma8();
            let blurred = preprocessing::apply_blur(&gray, self.sigma);
            result.push(item.with_image(DynamicImage::ImageLuma8(blurred)));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Gaussian Blur"
    }
}

/// Median denoising
pub struct DenoiseStep {
    pub radius: u32,
}

impl PipelineStep for DenoiseStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let denoised = preprocessing::denoise(&item.image.to_luma8(), self.radius);
            result.push(item.with_image(DynamicImage::ImageLuma8(denoised)));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Denoise"
    }
}

/// Contrast limited adaptive histogram equalisation
pub struct ClaheStep {
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub clip_limit: f32,
}

impl PipelineStep for ClaheStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let equalized =
                preprocessing::equalize_clahe(&item.image.to_luma8(), self.tiles_x, self.tiles_y, self.clip_limit);
            result.push(item.with_image(DynamicImage::ImageLuma8(equalized)));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "CLAHE"
    }
}

/// Gaussian blur with the sigma chosen by PSNR against the unblurred input
pub struct TunedBlurStep {
    pub candidates: Vec<f32>,
    pub target_psnr_db: f64,
}

impl PipelineStep for TunedBlurStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let tuned = preprocessing::tune_blur(&item.image.to_luma8(), &self.candidates, self.target_psnr_db);
            tracing::debug!("Tuned blur: sigma={:.2} psnr={:.2}dB", tuned.sigma, tuned.psnr);
            let mut new_item = item.with_image(DynamicImage::ImageLuma8(tuned.image));
            new_item.set(keys::BLUR_SIGMA, MetadataValue::Float(tuned.sigma));
            new_item.set(keys::BLUR_PSNR, MetadataValue::Float(tuned.psnr as f32));
            result.push(new_item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Tuned Blur"
    }
}

/// How Canny thresholds are chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeThresholds {
    Fixed { low: f32, high: f32 },
    /// High threshold is the Otsu level, low is `low_ratio` of it
    Otsu { low_ratio: f32 },
}

impl EdgeThresholds {
    pub fn validate(&self) -> CoinResult<()> {
        match *self {
            EdgeThresholds::Fixed { low, high } => check_canny_pair(low, high, "edges.thresholds"),
            EdgeThresholds::Otsu { low_ratio } if !(low_ratio > 0.0 && low_ratio <= 1.0) => Err(
                CoinError::InvalidParameters(format!("Otsu low_ratio must be in (0, 1], got {}", low_ratio)),
            ),
            EdgeThresholds::Otsu { .. } => Ok(()),
        }
    }
}

/// Canny needs `0 < low <= high`
pub fn check_canny_pair(low: f32, high: f32, what: &str) -> CoinResult<()> {
    if low > 0.0 && low <= high {
        Ok(())
    } else {
        Err(CoinError::InvalidParameters(format!(
            "{} Canny thresholds need 0 < low <= high, got ({}, {})",
            what, low, high
        )))
    }
}

/// Detect edges using Canny
pub struct EdgeDetectionStep {
    pub thresholds: EdgeThresholds,
}

impl PipelineStep for EdgeDetectionStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let gray = item.image.to_luma8();
            let (low, high, otsu) = match self.thresholds {
                EdgeThresholds::Fixed { low, high } => (low, high, None),
                EdgeThresholds::Otsu { low_ratio } => {
                    let (level, _) = preprocessing::otsu_threshold(&gray);
                    if level == 0 {
                        tracing::debug!("Otsu level 0 on a flat image, no edges");
                    }
                    let high = level as f32;
                    (high * low_ratio, high, Some(level))
                }
            };
            let edges = preprocessing::detect_edges(&gray, low, high);
            let mut new_item = item.with_image(DynamicImage::ImageLuma8(edges));
            if let Some(level) = otsu {
                tracing::debug!("Otsu level {} -> Canny({:.1}, {:.1})", level, low, high);
                new_item.set(keys::OTSU_LEVEL, MetadataValue::Int(level as i32));
            }
            result.push(new_item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Edge Detection"
    }
}

/// Morphological dilation with a square element
pub struct DilateStep {
    pub radius: u8,
}

impl PipelineStep for DilateStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let dilated = preprocessing::dilate(&item.image.to_luma8(), self.radius);
            result.push(item.with_image(DynamicImage::ImageLuma8(dilated)));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Dilation"
    }
}

/// Replace the edge image with a drawing of its round contours
pub struct ContourFilterStep {
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl PipelineStep for ContourFilterStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let edges = item.image.to_luma8();
            let round = contours::find_round_contours(&edges, self.min_ratio, self.max_ratio);
            tracing::debug!("{} contours inside circularity window", round.len());
            let canvas = contours::draw_contours(edges.width(), edges.height(), &round);
            let mut new_item = item.with_image(DynamicImage::ImageLuma8(canvas));
            new_item.set(keys::CONTOUR_COUNT, MetadataValue::Int(round.len() as i32));
            result.push(new_item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Contour Filtering"
    }
}

/// Find circles - splits one image into one item per coin, largest first
pub struct HoughCircleStep {
    pub params: hough::HoughParams,
    /// Extra pixels around each coin crop
    pub padding: u32,
}

impl PipelineStep for HoughCircleStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let gray = item.image.to_luma8();
            let mut found = hough::detect_circles(&gray, &self.params);
            circles::sort_by_radius_desc(&mut found);
            tracing::info!("{} circles detected", found.len());

            let Some(largest) = circles::largest_radius(&found) else {
                continue;
            };
            let (img_width, img_height) = (item.original.width(), item.original.height());

            for circle in found {
                tracing::debug!(
                    "Circle at ({:.1}, {:.1}) r={:.1} votes={}",
                    circle.x, circle.y, circle.radius, circle.votes
                );
                let Some((x, y, width, height)) =
                    circles::clamped_roi(&circle, self.padding, img_width, img_height)
                else {
                    continue;
                };
                let bbox = BoundingBox { x, y, width, height };
                let cropped = item.original.crop_imm(x, y, width, height);

                let coin = PipelineData::from_region(cropped, item.original.clone(), bbox)
                    .with_metadata(keys::CENTER_X, MetadataValue::Float(circle.x))
                    .with_metadata(keys::CENTER_Y, MetadataValue::Float(circle.y))
                    .with_metadata(keys::RADIUS, MetadataValue::Float(circle.radius))
                    .with_metadata(keys::VOTES, MetadataValue::Int(circle.votes as i32))
                    .with_metadata(keys::LARGEST_RADIUS, MetadataValue::Float(largest));
                result.push(coin);
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Circle Detection"
    }
}

/// Keep circles inside a radius window and above a circularity
pub struct CircleFilterStep {
    pub min_radius: f32,
    pub max_radius: f32,
    pub min_circularity: f32,
}

impl PipelineStep for CircleFilterStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let circle = circle_of(&item, "Circle Filtering")?;
            let kept = circles::filter_circles(&[circle], self.min_radius, self.max_radius, self.min_circularity);
            if !kept.is_empty() {
                result.push(item);
            }
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Circle Filtering"
    }
}

/// Classify by absolute radius
pub struct RadiusClassifyStep {
    pub bands: classify::RadiusBands,
}

impl PipelineStep for RadiusClassifyStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for mut item in data {
            let radius = item.require_float(keys::RADIUS, "Radius Classification")?;
            let kind = self.bands.classify(radius);
            tracing::debug!("Detected circle radius: {:.0} -> {}", radius, kind);
            set_kind(&mut item, kind);
            result.push(item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Radius Classification"
    }
}

/// Classify by area ratio against the largest coin; small ratios stay unlabelled
pub struct RatioClassifyStep {
    pub thresholds: classify::RatioThresholds,
}

impl PipelineStep for RatioClassifyStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for mut item in data {
            let radius = item.require_float(keys::RADIUS, "Ratio Classification")?;
            let largest = item.require_float(keys::LARGEST_RADIUS, "Ratio Classification")?;
            if let Some(kind) = self.thresholds.classify(radius, largest) {
                set_kind(&mut item, kind);
            }
            result.push(item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Ratio Classification"
    }
}

/// Compare each coin's edges with the edge templates. Coins whose square
/// crop leaves the image are dropped.
pub struct TemplateClassifyStep {
    pub templates: Arc<templates::TemplateSet>,
    pub canny_low: f32,
    pub canny_high: f32,
}

impl PipelineStep for TemplateClassifyStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let circle = circle_of(&item, "Template Matching")?;
            let (w, h) = (item.original.width(), item.original.height());
            let Some((x, y, side, _)) = circles::inscribed_roi(&circle, w, h) else {
                tracing::debug!("Coin at ({:.0}, {:.0}) crosses the image border, skipped", circle.x, circle.y);
                continue;
            };
            let roi = item.original.crop_imm(x, y, side, side).to_luma8();
            let edges = templates::coin_edges(&roi, self.templates.size(), self.canny_low, self.canny_high);
            let matched = self.templates.classify(&edges);
            tracing::debug!("Coin at ({:.0}, {:.0}): {} ({:.1}%)", circle.x, circle.y, matched.kind, matched.percent);

            let mut new_item = item.with_image(DynamicImage::ImageLuma8(edges));
            set_kind(&mut new_item, matched.kind);
            new_item.set(keys::MATCH_SCORE, MetadataValue::Float(matched.percent));
            result.push(new_item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Template Matching"
    }
}

/// Match coin keypoints against reference photos; falls back to the
/// radius ratio when too few features agree.
pub struct FeatureClassifyStep {
    pub references: Arc<features::ReferenceSet>,
    pub fallback: classify::RatioThresholds,
}

impl PipelineStep for FeatureClassifyStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for mut item in data {
            let circle = circle_of(&item, "Feature Matching")?;
            let coin = item.image.to_luma8();
            match self.references.classify(&coin)? {
                Some(matched) => {
                    tracing::debug!(
                        "Coin at ({:.0}, {:.0}): {} with {} good matches",
                        circle.x, circle.y, matched.kind, matched.good_matches
                    );
                    set_kind(&mut item, matched.kind);
                    item.set(keys::MATCH_SCORE, MetadataValue::Float(matched.percent));
                }
                None => {
                    let largest = item.require_float(keys::LARGEST_RADIUS, "Feature Matching")?;
                    if let Some(kind) = self.fallback.classify(circle.radius, largest) {
                        set_kind(&mut item, kind);
                    }
                }
            }
            result.push(item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Feature Matching"
    }
}
