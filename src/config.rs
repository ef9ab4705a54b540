//! Detector configuration.
//!
//! Every variant ships tuned defaults via [`DetectorConfig::for_variant`];
//! a JSON file can override any field.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detection::classify::{RadiusBands, RatioThresholds};
use crate::detection::features::FeatureParams;
use crate::detection::hough::{HoughParams, MinDist};
use crate::detection::steps::{check_canny_pair, EdgeThresholds};
use crate::detection::Variant;
use crate::error::{CoinError, CoinResult};
use crate::overlay::{LabelPlacement, OverlayStyle, Rgb8};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaheConfig {
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub clip_limit: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlurTuning {
    pub candidates: Vec<f32>,
    pub target_psnr_db: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub thresholds: EdgeThresholds,
    /// Square dilation radius applied after the first Canny pass (0 = none)
    pub dilate_radius: u8,
    /// Optional second Canny pass over the dilated edges
    pub second_pass: Option<(f32, f32)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContourWindow {
    pub min_ratio: f64,
    pub max_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircleWindow {
    pub min_radius: f32,
    pub max_radius: f32,
    pub min_circularity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMatching {
    pub canny_low: f32,
    pub canny_high: f32,
}

/// Full detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub variant: Variant,
    pub blur_sigma: f32,
    pub clahe: ClaheConfig,
    pub blur_tuning: BlurTuning,
    pub edges: EdgeConfig,
    pub contour_window: ContourWindow,
    pub hough: HoughParams,
    /// Extra pixels kept around each coin crop
    pub crop_padding: u32,
    pub circle_window: CircleWindow,
    pub radius_bands: RadiusBands,
    pub ratio_thresholds: RatioThresholds,
    pub template_matching: TemplateMatching,
    pub features: FeatureParams,
    pub overlay: OverlayStyle,
}

const RED: Rgb8 = Rgb8([255, 0, 0]);
const GREEN: Rgb8 = Rgb8([0, 255, 0]);

impl DetectorConfig {
    /// Tuned defaults for a variant
    pub fn for_variant(variant: Variant) -> Self {
        let base = Self {
            variant,
            blur_sigma: 1.5,
            clahe: ClaheConfig { tiles_x: 8, tiles_y: 8, clip_limit: 2.0 },
            blur_tuning: BlurTuning {
                candidates: vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0],
                target_psnr_db: 30.0,
            },
            edges: EdgeConfig {
                thresholds: EdgeThresholds::Otsu { low_ratio: 0.5 },
                dilate_radius: 1,
                second_pass: Some((50.0, 200.0)),
            },
            contour_window: ContourWindow { min_ratio: 10.0, max_ratio: 30.0 },
            hough: HoughParams::default(),
            crop_padding: 5,
            circle_window: CircleWindow { min_radius: 0.0, max_radius: 2000.0, min_circularity: 0.7 },
            radius_bands: RadiusBands::default(),
            ratio_thresholds: RatioThresholds::default(),
            template_matching: TemplateMatching { canny_low: 50.0, canny_high: 150.0 },
            features: FeatureParams::default(),
            overlay: OverlayStyle::default(),
        };

        match variant {
            Variant::Hough => Self {
                blur_sigma: 2.0,
                hough: HoughParams {
                    dp: 1.0,
                    min_dist: MinDist::RowsOver(8.0),
                    param1: 120.0,
                    param2: 30.0,
                    min_radius: 0,
                    max_radius: 0,
                    ..HoughParams::default()
                },
                overlay: OverlayStyle {
                    circle_color: GREEN,
                    circle_thickness: 3,
                    draw_center: false,
                    draw_box: false,
                    label_color: GREEN,
                    label_placement: LabelPlacement::AboveLeft,
                    draw_total: true,
                    ..OverlayStyle::default()
                },
                ..base
            },
            Variant::Tuned => Self {
                hough: HoughParams {
                    dp: 1.0,
                    min_dist: MinDist::RowsOver(8.0),
                    param1: 120.0,
                    param2: 30.0,
                    min_radius: 10,
                    max_radius: 0,
                    ..HoughParams::default()
                },
                ..base
            },
            Variant::Contour | Variant::Features => Self {
                hough: HoughParams {
                    dp: 2.0,
                    min_dist: MinDist::RowsOver(8.0),
                    param1: 100.0,
                    param2: 30.0,
                    min_radius: 15,
                    max_radius: 45,
                    ..HoughParams::default()
                },
                ..base
            },
            Variant::Template => Self {
                blur_sigma: 2.0,
                hough: HoughParams {
                    dp: 1.0,
                    min_dist: MinDist::RowsOver(12.0),
                    param1: 100.0,
                    param2: 50.0,
                    min_radius: 30,
                    max_radius: 150,
                    ..HoughParams::default()
                },
                crop_padding: 0,
                overlay: OverlayStyle {
                    circle_color: RED,
                    circle_thickness: 2,
                    draw_center: false,
                    draw_box: false,
                    label_color: GREEN,
                    label_placement: LabelPlacement::AboveCentered,
                    ..OverlayStyle::default()
                },
                ..base
            },
        }
    }

    /// Load a full configuration from JSON
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> CoinResult<()> {
        if self.blur_sigma < 0.0 {
            return Err(CoinError::InvalidParameters("blur_sigma must not be negative".to_string()));
        }
        if self.blur_tuning.candidates.iter().all(|s| *s <= 0.0) {
            return Err(CoinError::InvalidParameters(
                "blur_tuning needs at least one positive sigma".to_string(),
            ));
        }
        if self.contour_window.min_ratio >= self.contour_window.max_ratio {
            return Err(CoinError::InvalidParameters(format!(
                "contour window ({}, {}] is empty",
                self.contour_window.min_ratio, self.contour_window.max_ratio
            )));
        }
        if self.circle_window.min_radius > self.circle_window.max_radius {
            return Err(CoinError::InvalidParameters("circle_window min_radius exceeds max_radius".to_string()));
        }
        if self.features.descriptor_bits == 0 || self.features.descriptor_bits % 128 != 0 {
            return Err(CoinError::InvalidParameters(format!(
                "descriptor_bits must be a positive multiple of 128, got {}",
                self.features.descriptor_bits
            )));
        }
        self.edges.thresholds.validate()?;
        if let Some((low, high)) = self.edges.second_pass {
            check_canny_pair(low, high, "edges.second_pass")?;
        }
        check_canny_pair(self.template_matching.canny_low, self.template_matching.canny_high, "template_matching")?;
        self.hough.validate()?;
        self.radius_bands.validate()?;
        self.ratio_thresholds.validate()?;
        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::for_variant(Variant::Contour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_default_is_valid() {
        for v in [Variant::Hough, Variant::Tuned, Variant::Contour, Variant::Features, Variant::Template] {
            let cfg = DetectorConfig::for_variant(v);
            assert_eq!(cfg.variant, v);
            cfg.validate().unwrap();
        }
    }

    #[test]
    fn json_round_trip_keeps_hough_params() {
        let cfg = DetectorConfig::for_variant(Variant::Template);
        let json = cfg.to_json().unwrap();
        let back: DetectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hough.min_dist, MinDist::RowsOver(12.0));
        assert_eq!(back.hough.param2, 50.0);
        assert_eq!(back.variant, Variant::Template);
    }

    #[test]
    fn rejects_empty_contour_window() {
        let mut cfg = DetectorConfig::default();
        cfg.contour_window.max_ratio = cfg.contour_window.min_ratio;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unusable_canny_thresholds() {
        let mut cfg = DetectorConfig::default();
        cfg.edges.thresholds = EdgeThresholds::Fixed { low: 120.0, high: 60.0 };
        assert!(cfg.validate().is_err());
        cfg.edges.thresholds = EdgeThresholds::Fixed { low: 0.0, high: 60.0 };
        assert!(cfg.validate().is_err());
        cfg.edges.thresholds = EdgeThresholds::Fixed { low: 30.0, high: 60.0 };
        cfg.validate().unwrap();

        for ratio in [0.0, -0.5, 1.5] {
            cfg.edges.thresholds = EdgeThresholds::Otsu { low_ratio: ratio };
            assert!(cfg.validate().is_err(), "low_ratio {ratio}");
        }
        cfg.edges.thresholds = EdgeThresholds::Otsu { low_ratio: 1.0 };
        cfg.validate().unwrap();

        cfg.edges.second_pass = Some((200.0, 50.0));
        assert!(cfg.validate().is_err());
        cfg.edges.second_pass = None;
        cfg.validate().unwrap();

        let mut template = DetectorConfig::for_variant(Variant::Template);
        template.template_matching.canny_low = 200.0;
        assert!(template.validate().is_err());
    }
}
