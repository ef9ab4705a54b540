//! Draw detected coins, their labels and the money total onto the photo.

use ab_glyph::{FontVec, PxScale};
use anyhow::Context;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CoinError;
use crate::models::{CoinDetection, DetectionReport};

/// Fonts tried when no font is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// An RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb8(pub [u8; 3]);

impl From<Rgb8> for Rgb<u8> {
    fn from(c: Rgb8) -> Self {
        Rgb(c.0)
    }
}

/// Where a coin's label goes relative to its circle.
/// Positions are the text baseline, as in the classic overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPlacement {
    /// `(cx - r, cy + r + 15)`
    BelowLeft,
    /// `(cx - r, cy - r - 5)`
    AboveLeft,
    /// `(cx - 40, cy - r - 10)`
    AboveCentered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayStyle {
    pub circle_color: Rgb8,
    pub circle_thickness: u32,
    /// Filled dot of radius 3 at the centre
    pub draw_center: bool,
    pub center_color: Rgb8,
    /// Square of half-size `r + 5` around the coin
    pub draw_box: bool,
    pub box_color: Rgb8,
    pub label_color: Rgb8,
    pub label_placement: LabelPlacement,
    /// Label height in pixels
    pub text_scale: f32,
    pub draw_total: bool,
    pub total_color: Rgb8,
    pub font_path: Option<PathBuf>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            circle_color: Rgb8([255, 0, 0]),
            circle_thickness: 2,
            draw_center: true,
            center_color: Rgb8([0, 255, 0]),
            draw_box: true,
            box_color: Rgb8([255, 0, 0]),
            label_color: Rgb8([255, 255, 0]),
            label_placement: LabelPlacement::BelowLeft,
            text_scale: 20.0,
            draw_total: true,
            total_color: Rgb8([255, 255, 0]),
            font_path: None,
        }
    }
}

/// Load a TrueType/OpenType font from disk
pub fn load_font(path: &Path) -> anyhow::Result<FontVec> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read font {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|_| CoinError::FontLoad(path.to_path_buf()).into())
}

fn find_system_font() -> Option<FontVec> {
    SYSTEM_FONTS.iter().map(Path::new).filter(|p| p.is_file()).find_map(|p| match load_font(p) {
        Ok(font) => {
            tracing::debug!("Using font {}", p.display());
            Some(font)
        }
        Err(e) => {
            tracing::debug!("Skipping font {}: {}", p.display(), e);
            None
        }
    })
}

/// Renders a [`DetectionReport`] onto the image it was computed from
pub struct Annotator {
    style: OverlayStyle,
    font: Option<FontVec>,
}

impl Annotator {
    /// A configured font must load; otherwise common system fonts are tried.
    /// Without any font only shapes are drawn.
    pub fn new(style: OverlayStyle) -> anyhow::Result<Self> {
        let font = match &style.font_path {
            Some(path) => Some(load_font(path)?),
            None => {
                let found = find_system_font();
                if found.is_none() {
                    tracing::warn!("No font found; labels and total will not be drawn (use --font)");
                }
                found
            }
        };
        Ok(Self { style, font })
    }

    pub fn with_font(style: OverlayStyle, font: FontVec) -> Self {
        Self { style, font: Some(font) }
    }

    pub fn without_text(style: OverlayStyle) -> Self {
        Self { style, font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn annotate(&self, image: &DynamicImage, report: &DetectionReport) -> RgbImage {
        let mut canvas = image.to_rgb8();
        for coin in &report.coins {
            self.draw_coin(&mut canvas, coin);
        }
        if self.style.draw_total {
            let (w, h) = canvas.dimensions();
            let x = (w / 10) as i32;
            let baseline = (h - h / 10) as i32;
            self.draw_label(&mut canvas, &report.total_text(), x, baseline, self.style.total_color);
        }
        canvas
    }

    fn draw_coin(&self, canvas: &mut RgbImage, coin: &CoinDetection) {
        let (cx, cy) = coin.circle.center();
        let r = coin.circle.radius.round() as i32;

        if self.style.draw_center {
            draw_filled_circle_mut(canvas, (cx, cy), 3, self.style.center_color.into());
        }

        // Thickness grows inwards and outwards around the nominal radius
        let thickness = self.style.circle_thickness.max(1) as i32;
        let inner = r - (thickness - 1) / 2;
        for radius in inner..inner + thickness {
            if radius > 0 {
                draw_hollow_circle_mut(canvas, (cx, cy), radius, self.style.circle_color.into());
            }
        }

        if self.style.draw_box {
            let half = r + 5;
            let side = (2 * half + 1).max(1) as u32;
            draw_hollow_rect_mut(canvas, Rect::at(cx - half, cy - half).of_size(side, side), self.style.box_color.into());
        }

        let Some(label) = coin.label() else {
            return;
        };
        let (x, baseline) = match self.style.label_placement {
            LabelPlacement::BelowLeft => (cx - r, cy + r + 15),
            LabelPlacement::AboveLeft => (cx - r, cy - r - 5),
            LabelPlacement::AboveCentered => (cx - 40, cy - r - 10),
        };
        self.draw_label(canvas, &label, x, baseline, self.style.label_color);
    }

    fn draw_label(&self, canvas: &mut RgbImage, text: &str, x: i32, baseline: i32, color: Rgb8) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(self.style.text_scale);
        let (_, height) = text_size(scale, font, text);
        draw_text_mut(canvas, color.into(), x, baseline - height as i32, scale, font, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Circle, CoinKind};

    fn report(coins: Vec<CoinDetection>) -> DetectionReport {
        DetectionReport::new("contour", (200, 200), coins)
    }

    #[test]
    fn draws_circle_and_center_without_font() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(200, 200));
        let coin = CoinDetection {
            circle: Circle::new(100.0, 100.0, 40.0),
            kind: Some(CoinKind::Quarter),
            score: None,
        };
        let annotator = Annotator::without_text(OverlayStyle::default());
        let out = annotator.annotate(&img, &report(vec![coin]));

        assert_eq!(out.get_pixel(100, 100), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(140, 100), &Rgb([255, 0, 0]));
        // box edge at r + 5
        assert_eq!(out.get_pixel(145, 120), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(10, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn plain_style_skips_center_and_box() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(200, 200));
        let coin = CoinDetection {
            circle: Circle::new(100.0, 100.0, 40.0),
            kind: None,
            score: None,
        };
        let style = OverlayStyle {
            draw_center: false,
            draw_box: false,
            circle_color: Rgb8([0, 255, 0]),
            circle_thickness: 3,
            ..OverlayStyle::default()
        };
        let out = Annotator::without_text(style).annotate(&img, &report(vec![coin]));
        assert_eq!(out.get_pixel(100, 100), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(145, 120), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(139, 100), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(141, 100), &Rgb([0, 255, 0]));
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let style = OverlayStyle {
            font_path: Some(PathBuf::from("/nonexistent/font.ttf")),
            ..OverlayStyle::default()
        };
        assert!(Annotator::new(style).is_err());
    }
}
