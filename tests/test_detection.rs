mod common;

use common::*;
use coinsum::detection::features::{FeatureParams, ReferenceSet};
use coinsum::detection::steps::RatioClassifyStep;
use coinsum::detection::templates::{TemplateSet, COMMON_SIZE};
use coinsum::overlay::{Annotator, OverlayStyle};
use coinsum::{build_pipeline, Pipeline};
use image::{GrayImage, Luma, Rgb};
use std::sync::Arc;

fn detector(variant: Variant) -> anyhow::Result<CoinDetector> {
    CoinDetector::new(DetectorConfig::for_variant(variant), &Resources::default())
}

fn quarter_and_dime_templates() -> Resources {
    let mut templates = TemplateSet::new(COMMON_SIZE);
    templates.add(CoinKind::Dime, GrayImage::new(COMMON_SIZE, COMMON_SIZE));
    templates.add(CoinKind::Quarter, GrayImage::from_pixel(COMMON_SIZE, COMMON_SIZE, Luma([255])));
    Resources {
        templates: Some(Arc::new(templates)),
        references: None,
    }
}

#[test]
fn hough_variant_classifies_by_radius() -> anyhow::Result<()> {
    let report = detector(Variant::Hough)?.detect(&three_coin_photo())?;

    assert_eq!(report.coins.len(), 3, "{:?}", report.coins);
    for (coin, &(x, y, r)) in report.coins.iter().zip([THREE_COINS[0], THREE_COINS[2], THREE_COINS[1]].iter()) {
        assert!((coin.circle.x - x as f32).abs() < 3.0, "{:?}", coin.circle);
        assert!((coin.circle.y - y as f32).abs() < 3.0, "{:?}", coin.circle);
        assert!((coin.circle.radius - r as f32).abs() < 3.0, "{:?}", coin.circle);
    }
    assert_eq!(report.coins[0].kind, Some(CoinKind::Nickel));
    assert_eq!(report.coins[2].kind, Some(CoinKind::Dime));
    let sum: u32 = report.coins.iter().map(|c| c.cents()).sum();
    assert_eq!(report.total.cents, sum);
    assert!(report.total.cents >= 15);
    assert_eq!(report.variant, "hough");
    assert_eq!((report.image_width, report.image_height), (480, 360));
    Ok(())
}

#[test]
fn hough_total_text_for_nickel_and_dime() -> anyhow::Result<()> {
    let photo = coin_photo(480, 360, &[THREE_COINS[0], THREE_COINS[1]]);
    let report = detector(Variant::Hough)?.detect(&photo)?;

    assert_eq!(report.coins.len(), 2, "{:?}", report.coins);
    assert_eq!(report.coins[0].kind, Some(CoinKind::Nickel));
    assert_eq!(report.coins[1].kind, Some(CoinKind::Dime));
    assert_eq!(report.total.cents, 15);
    assert_eq!(report.total_text(), "Total Money: $0.15");
    Ok(())
}

#[test]
fn tuned_variant_finds_every_coin() -> anyhow::Result<()> {
    let report = detector(Variant::Tuned)?.detect(&three_coin_photo())?;

    assert_eq!(report.coins.len(), 3, "{:?}", report.coins);
    assert_eq!(report.variant, "tuned");
    assert_eq!(report.coins[0].kind, Some(CoinKind::Quarter));
    assert!((report.coins[0].circle.x - 110.0).abs() < 3.0, "{:?}", report.coins[0].circle);
    // (30 / 35)^2 sits inside the nickel ratio band
    assert_eq!(report.coins[1].kind, Some(CoinKind::Nickel));
    let sum: u32 = report.coins.iter().map(|c| c.cents()).sum();
    assert_eq!(report.total.cents, sum);
    assert!(report.total.cents >= 30);
    Ok(())
}

#[test]
fn contour_variant_labels_largest_coin_quarter() -> anyhow::Result<()> {
    let photo = coin_photo(300, 300, &[(90, 90, 40), (210, 200, 28)]);
    let report = detector(Variant::Contour)?.detect(&photo)?;

    assert_eq!(report.coins.len(), 2, "{:?}", report.coins);
    assert!(report.coins[0].circle.radius > report.coins[1].circle.radius);
    assert!((report.coins[0].circle.x - 90.0).abs() < 4.0, "{:?}", report.coins[0].circle);
    assert!((report.coins[1].circle.x - 210.0).abs() < 4.0, "{:?}", report.coins[1].circle);
    assert_eq!(report.coins[0].kind, Some(CoinKind::Quarter));
    assert_eq!(report.coins[1].kind, Some(CoinKind::Dime));
    assert_eq!(report.total.cents, 35);
    Ok(())
}

#[test]
fn empty_table_totals_zero() -> anyhow::Result<()> {
    for variant in [Variant::Contour, Variant::Hough, Variant::Tuned] {
        let report = detector(variant)?.detect(&empty_photo(200, 200))?;

        assert!(report.coins.is_empty(), "{variant:?}: {:?}", report.coins);
        assert_eq!(report.total.cents, 0);
        assert_eq!(report.total_text(), "Total Money: $0.00");
    }
    Ok(())
}

#[test]
fn executor_matches_batch_run() -> anyhow::Result<()> {
    let photo = three_coin_photo();

    let batch = detector(Variant::Hough)?.detect(&photo)?;
    let queued = detector(Variant::Hough)?.with_executor(true).detect(&photo)?;

    assert_eq!(batch.coins.len(), 3);
    assert_eq!(batch.coins.len(), queued.coins.len());
    assert_eq!(batch.total, queued.total);
    for (a, b) in batch.coins.iter().zip(&queued.coins) {
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.circle.center(), b.circle.center());
    }
    Ok(())
}

#[test]
fn template_variant_picks_overlapping_template() -> anyhow::Result<()> {
    let photo = coin_photo(200, 200, &[(100, 100, 40)]);
    let detector = CoinDetector::new(DetectorConfig::for_variant(Variant::Template), &quarter_and_dime_templates())?;

    let report = detector.detect(&photo)?;

    assert_eq!(report.coins.len(), 1, "{:?}", report.coins);
    let coin = &report.coins[0];
    assert_eq!(coin.kind, Some(CoinKind::Quarter));
    let score = coin.score.expect("template match score");
    assert!(score > 0.0 && score <= 100.0);
    assert!(coin.label().is_some_and(|l| l.starts_with("Quarter (")));
    assert_eq!(report.total.cents, 25);
    Ok(())
}

#[test]
fn template_coin_crossing_border_is_dropped() -> anyhow::Result<()> {
    // The right coin is cut by the border, so its square crop leaves the photo
    let photo = coin_photo(300, 200, &[(100, 100, 40), (270, 100, 40)]);
    let detector = CoinDetector::new(DetectorConfig::for_variant(Variant::Template), &quarter_and_dime_templates())?;

    let report = detector.detect(&photo)?;

    assert_eq!(report.coins.len(), 1, "{:?}", report.coins);
    assert!((report.coins[0].circle.x - 100.0).abs() < 3.0, "{:?}", report.coins[0].circle);
    assert_eq!(report.coins[0].kind, Some(CoinKind::Quarter));
    assert_eq!(report.total.cents, 25);

    let out = Annotator::without_text(detector.config().overlay.clone()).annotate(&photo, &report);
    let rgb = photo.to_rgb8();
    // Left rim of the dropped coin stays untouched
    for x in 228..=232 {
        assert_eq!(out.get_pixel(x, 100), rgb.get_pixel(x, 100), "x = {x}");
    }
    let (cx, cy) = report.coins[0].circle.center();
    let r = report.coins[0].circle.radius.round() as u32;
    assert_eq!(out.get_pixel(cx as u32 + r, cy as u32), &Rgb(detector.config().overlay.circle_color.0));
    Ok(())
}

#[test]
fn template_variant_requires_templates() {
    let result = build_pipeline(&DetectorConfig::for_variant(Variant::Template), &Resources::default());
    assert!(result.is_err());
}

#[test]
fn features_variant_requires_references() {
    let result = build_pipeline(&DetectorConfig::for_variant(Variant::Features), &Resources::default());
    assert!(result.is_err());
}

#[test]
fn features_without_matches_fall_back_to_ratio() -> anyhow::Result<()> {
    let photo = coin_photo(300, 300, &[(90, 90, 40), (210, 200, 28)]);
    let resources = Resources {
        templates: None,
        references: Some(Arc::new(ReferenceSet::new(FeatureParams::default()))),
    };

    let features = CoinDetector::new(DetectorConfig::for_variant(Variant::Features), &resources)?.detect(&photo)?;
    let contour = detector(Variant::Contour)?.detect(&photo)?;

    assert_eq!(features.coins.len(), 2, "{:?}", features.coins);
    assert_eq!(features.coins.len(), contour.coins.len());
    assert_eq!(features.coins[0].kind, Some(CoinKind::Quarter));
    assert_eq!(features.total, contour.total);
    assert!(features.coins.iter().all(|c| c.score.is_none()));
    Ok(())
}

#[test]
fn classify_step_before_detection_reports_missing_metadata() {
    let pipeline = Pipeline::new().add_step(Arc::new(RatioClassifyStep {
        thresholds: Default::default(),
    }));
    let err = match pipeline.run(empty_photo(50, 50)) {
        Ok(_) => panic!("ratio classification without circles should fail"),
        Err(e) => e,
    };
    assert!(matches!(
        err.downcast_ref::<CoinError>(),
        Some(CoinError::MissingMetadata { key: "radius", .. })
    ));
}

#[test]
fn empty_image_is_rejected() -> anyhow::Result<()> {
    let err = detector(Variant::Hough)?
        .detect(&image::DynamicImage::new_rgb8(0, 0))
        .expect_err("empty image");
    assert!(matches!(err.downcast_ref::<CoinError>(), Some(CoinError::EmptyImage)));
    Ok(())
}

#[test]
fn report_serialises_with_run_metadata() -> anyhow::Result<()> {
    let photo = coin_photo(480, 360, &[THREE_COINS[0]]);
    let report = detector(Variant::Hough)?.detect(&photo)?;

    let json = serde_json::to_value(&report)?;
    assert!(json["run_id"].is_string());
    assert!(json["generated_at"].is_string());
    assert_eq!(json["variant"], "hough");
    assert_eq!(json["total"]["cents"], report.total.cents);

    let back: DetectionReport = serde_json::from_value(json)?;
    assert_eq!(back.run_id, report.run_id);
    assert_eq!(back.coins.len(), report.coins.len());
    Ok(())
}

#[test]
fn annotated_output_marks_each_coin() -> anyhow::Result<()> {
    let photo = coin_photo(480, 360, &[THREE_COINS[0]]);
    let detector = detector(Variant::Hough)?;
    let report = detector.detect(&photo)?;
    assert_eq!(report.coins.len(), 1);

    let style = OverlayStyle {
        draw_center: true,
        ..detector.config().overlay.clone()
    };
    let out = Annotator::without_text(style.clone()).annotate(&photo, &report);

    let (cx, cy) = report.coins[0].circle.center();
    assert_eq!(out.get_pixel(cx as u32, cy as u32), &Rgb(style.center_color.0));
    let r = report.coins[0].circle.radius.round() as u32;
    assert_eq!(out.get_pixel(cx as u32 + r, cy as u32), &Rgb(style.circle_color.0));
    Ok(())
}
