pub mod preprocessing;
pub mod hough;
pub mod contours;
pub mod circles;
pub mod classify;
pub mod templates;
pub mod features;
pub mod steps;

use anyhow::Context;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::DetectorConfig;
use crate::error::CoinError;
use crate::models::{CoinDetection, CoinKind, DetectionReport};
use crate::pipeline::{Pipeline, PipelineStep};
use features::ReferenceSet;
use steps::*;
use templates::TemplateSet;

/// Pipeline variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Blur + Hough, absolute-radius classification
    Hough,
    /// CLAHE + PSNR-tuned blur + Hough, ratio classification
    Tuned,
    /// Otsu Canny + dilation + contour circularity prefilter + Hough, ratio classification
    Contour,
    /// Contour front end + FAST/BRIEF matching against reference photos
    Features,
    /// Hough + edge-template matching
    Template,
}

impl Variant {
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Hough => "hough",
            Variant::Tuned => "tuned",
            Variant::Contour => "contour",
            Variant::Features => "features",
            Variant::Template => "template",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Templates and reference photos some variants classify against
#[derive(Clone, Default)]
pub struct Resources {
    pub templates: Option<Arc<TemplateSet>>,
    pub references: Option<Arc<ReferenceSet>>,
}

impl Resources {
    /// Load whatever the configured variant needs from the given folders
    pub fn load(config: &DetectorConfig, templates_dir: Option<&Path>, references_dir: Option<&Path>) -> anyhow::Result<Self> {
        let mut resources = Self::default();
        if let Some(dir) = templates_dir {
            resources.templates = Some(Arc::new(TemplateSet::load(dir)?));
        }
        if let Some(dir) = references_dir {
            resources.references = Some(Arc::new(ReferenceSet::load(dir, config.features.clone())?));
        }
        Ok(resources)
    }
}

/// Grayscale, blur, Otsu-guided Canny, dilation, second Canny and the
/// round-contour canvas the Hough transform runs on
fn contour_front_end(pipeline: Pipeline, config: &DetectorConfig) -> Pipeline {
    let mut pipeline = pipeline
        .add_step(Arc::new(GrayscaleStep))
        .add_step(Arc::new(BlurStep { sigma: config.blur_sigma }))
        .add_step(Arc::new(EdgeDetectionStep { thresholds: config.edges.thresholds }));
    if config.edges.dilate_radius > 0 {
        pipeline = pipeline.add_step(Arc::new(DilateStep { radius: config.edges.dilate_radius }));
    }
    if let Some((low, high)) = config.edges.second_pass {
        pipeline = pipeline.add_step(Arc::new(EdgeDetectionStep {
            thresholds: EdgeThresholds::Fixed { low, high },
        }));
    }
    pipeline
        .add_step(Arc::new(ContourFilterStep {
            min_ratio: config.contour_window.min_ratio,
            max_ratio: config.contour_window.max_ratio,
        }))
        .add_step(Arc::new(HoughCircleStep { params: config.hough.clone(), padding: config.crop_padding }))
}

fn circle_window(config: &DetectorConfig) -> Arc<dyn PipelineStep> {
    Arc::new(CircleFilterStep {
        min_radius: config.circle_window.min_radius,
        max_radius: config.circle_window.max_radius,
        min_circularity: config.circle_window.min_circularity,
    })
}

/// Assemble the step sequence for the configured variant
pub fn build_pipeline(config: &DetectorConfig, resources: &Resources) -> anyhow::Result<Pipeline> {
    config.validate()?;
    let pipeline = Pipeline::new();

    let pipeline = match config.variant {
        Variant::Hough => pipeline
            .add_step(Arc::new(GrayscaleStep))
            .add_step(Arc::new(BlurStep { sigma: config.blur_sigma }))
            .add_step(Arc::new(HoughCircleStep { params: config.hough.clone(), padding: config.crop_padding }))
            .add_step(circle_window(config))
            .add_step(Arc::new(RadiusClassifyStep { bands: config.radius_bands.clone() })),

        Variant::Tuned => pipeline
            .add_step(Arc::new(GrayscaleStep))
            .add_step(Arc::new(ClaheStep {
                tiles_x: config.clahe.tiles_x,
                tiles_y: config.clahe.tiles_y,
                clip_limit: config.clahe.clip_limit,
            }))
            .add_step(Arc::new(TunedBlurStep {
                candidates: config.blur_tuning.candidates.clone(),
                target_psnr_db: config.blur_tuning.target_psnr_db,
            }))
            .add_step(Arc::new(HoughCircleStep { params: config.hough.clone(), padding: config.crop_padding }))
            .add_step(circle_window(config))
            .add_step(Arc::new(RatioClassifyStep { thresholds: config.ratio_thresholds.clone() })),

        Variant::Contour => contour_front_end(pipeline, config)
            .add_step(Arc::new(RatioClassifyStep { thresholds: config.ratio_thresholds.clone() })),

        Variant::Features => {
            let references = resources
                .references
                .clone()
                .context("The features variant needs reference coin photos (--references DIR)")?;
            contour_front_end(pipeline, config).add_step(Arc::new(FeatureClassifyStep {
                references,
                fallback: config.ratio_thresholds.clone(),
            }))
        }

        Variant::Template => {
            let templates = resources
                .templates
                .clone()
                .context("The template variant needs edge templates (--templates DIR)")?;
            if templates.is_empty() {
                tracing::warn!("Template set is empty; every coin will be Unknown");
            }
            pipeline
                .add_step(Arc::new(GrayscaleStep))
                .add_step(Arc::new(BlurStep { sigma: config.blur_sigma }))
                .add_step(Arc::new(HoughCircleStep { params: config.hough.clone(), padding: config.crop_padding }))
                .add_step(Arc::new(TemplateClassifyStep {
                    templates,
                    canny_low: config.template_matching.canny_low,
                    canny_high: config.template_matching.canny_high,
                }))
        }
    };

    tracing::debug!("{} pipeline: {}", config.variant, pipeline.step_names().join(" -> "));
    Ok(pipeline)
}

/// Runs one variant's pipeline and turns its items into a report
pub struct CoinDetector {
    config: DetectorConfig,
    pipeline: Pipeline,
    use_executor: bool,
}

impl CoinDetector {
    pub fn new(config: DetectorConfig, resources: &Resources) -> anyhow::Result<Self> {
        let pipeline = build_pipeline(&config, resources)?;
        Ok(Self { config, pipeline, use_executor: false })
    }

    /// Save every step's images below `dir` (must be empty or absent)
    pub fn with_debug(mut self, dir: PathBuf) -> anyhow::Result<Self> {
        self.pipeline = self.pipeline.with_debug(dir)?;
        Ok(self)
    }

    /// Process items one at a time through the work queue
    pub fn with_executor(mut self, use_executor: bool) -> Self {
        self.use_executor = use_executor;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Detect and classify every coin; coins are ordered largest first
    pub fn detect(&self, image: &DynamicImage) -> anyhow::Result<DetectionReport> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CoinError::EmptyImage.into());
        }

        let items = if self.use_executor {
            self.pipeline.run_with_executor(image.clone())?
        } else {
            self.pipeline.run(image.clone())?
        };

        let mut coins = Vec::with_capacity(items.len());
        for item in &items {
            let circle = circle_of(item, "Coin Detector")?;
            let kind = item.get_string(keys::COIN_KIND).and_then(CoinKind::from_key);
            let score = item.get_float(keys::MATCH_SCORE);
            coins.push(CoinDetection { circle, kind, score });
        }
        coins.sort_by(|a, b| b.circle.radius.total_cmp(&a.circle.radius));

        let report = DetectionReport::new(self.config.variant.as_str(), (image.width(), image.height()), coins);
        tracing::info!("{} coins, {}", report.coins.len(), report.total_text());
        Ok(report)
    }
}
