//! Gradient Hough circle transform.
//!
//! Every Canny edge pixel votes along both directions of its Sobel gradient
//! for each radius in `[min_radius, max_radius]`. Coin rims produce peaks in
//! the accumulator at their centres because the gradients of a circular
//! boundary converge radially. The radius of each accepted centre is then
//! read off a histogram of edge-pixel distances.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::{CoinError, CoinResult};
use crate::detection::preprocessing;
use crate::models::Circle;

/// Minimum spacing between detected centres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinDist {
    /// Absolute distance in pixels
    Pixels(f32),
    /// Image rows divided by this value
    RowsOver(f32),
}

impl MinDist {
    pub fn resolve(self, rows: u32) -> f32 {
        match self {
            MinDist::Pixels(px) => px,
            MinDist::RowsOver(div) => rows as f32 / div,
        }
    }
}

/// Hough circle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoughParams {
    /// Inverse ratio of accumulator resolution to image resolution
    pub dp: f32,
    pub min_dist: MinDist,
    /// Upper Canny threshold; the lower one is half of it.
    /// On the scale of `imageproc::edges::canny`, which smooths with
    /// σ = 1.4 before measuring gradients: a sharp 255-step peaks near 450
    /// and a 1 px white line near 196.
    pub param1: f32,
    /// Accumulator threshold for centres and radius support
    pub param2: f32,
    pub min_radius: u32,
    /// `0` means "up to the larger image dimension"
    pub max_radius: u32,
    /// Fraction of the circumference that must be backed by edge pixels
    pub min_coverage: f32,
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            dp: 1.0,
            min_dist: MinDist::RowsOver(8.0),
            param1: 100.0,
            param2: 30.0,
            min_radius: 0,
            max_radius: 0,
            min_coverage: 0.3,
        }
    }
}

impl HoughParams {
    pub fn validate(&self) -> CoinResult<()> {
        if !(self.dp >= 1.0) {
            return Err(CoinError::InvalidParameters(format!("hough dp must be >= 1, got {}", self.dp)));
        }
        if self.param1 <= 0.0 || self.param2 <= 0.0 {
            return Err(CoinError::InvalidParameters(
                "hough param1 and param2 must be positive".to_string(),
            ));
        }
        if self.max_radius > 0 && self.min_radius > self.max_radius {
            return Err(CoinError::InvalidParameters(format!(
                "hough min_radius {} exceeds max_radius {}",
                self.min_radius, self.max_radius
            )));
        }
        match self.min_dist {
            MinDist::Pixels(px) if px < 0.0 => {
                return Err(CoinError::InvalidParameters("hough min_dist must not be negative".to_string()));
            }
            MinDist::RowsOver(div) if div <= 0.0 => {
                return Err(CoinError::InvalidParameters("hough min_dist divisor must be positive".to_string()));
            }
            _ => {}
        }
        Ok(())
    }

    fn radius_range(&self, width: u32, height: u32) -> (u32, u32) {
        let limit = width.max(height);
        let min_r = self.min_radius.max(1);
        let max_r = if self.max_radius == 0 { limit } else { self.max_radius.min(limit) };
        (min_r, max_r)
    }
}

struct EdgePoint {
    x: f32,
    y: f32,
}

/// Detect circles in a grayscale image.
///
/// Returns circles ordered by accumulator votes (strongest first).
pub fn detect_circles(gray: &GrayImage, params: &HoughParams) -> Vec<Circle> {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return Vec::new();
    }

    let edges = preprocessing::detect_edges(gray, params.param1 / 2.0, params.param1);
    let gx = imageproc::gradients::horizontal_sobel(gray);
    let gy = imageproc::gradients::vertical_sobel(gray);

    let (min_r, max_r) = params.radius_range(w, h);
    if min_r > max_r {
        return Vec::new();
    }

    let dp = params.dp;
    let aw = (w as f32 / dp).ceil() as usize;
    let ah = (h as f32 / dp).ceil() as usize;
    let mut accum = vec![0u32; aw * ah];
    let mut points = Vec::new();

    for (x, y, px) in edges.enumerate_pixels() {
        if px[0] == 0 {
            continue;
        }
        let dx = gx.get_pixel(x, y)[0] as f32;
        let dy = gy.get_pixel(x, y)[0] as f32;
        let mag = (dx * dx + dy * dy).sqrt();
        if mag < 1e-3 {
            continue;
        }
        points.push(EdgePoint { x: x as f32, y: y as f32 });

        let (ux, uy) = (dx / mag, dy / mag);
        for sign in [-1.0f32, 1.0] {
            for r in min_r..=max_r {
                let cx = (x as f32 + sign * ux * r as f32) / dp;
                let cy = (y as f32 + sign * uy * r as f32) / dp;
                if cx < 0.0 || cy < 0.0 {
                    break;
                }
                let (ix, iy) = (cx as usize, cy as usize);
                if ix >= aw || iy >= ah {
                    break;
                }
                accum[iy * aw + ix] += 1;
            }
        }
    }

    if points.is_empty() {
        return Vec::new();
    }

    let summed = box_sum(&accum, aw, ah);
    let mut centres = local_maxima(&summed, aw, ah, params.param2);
    centres.sort_by(|a, b| b.2.cmp(&a.2));
    tracing::trace!("{} centre candidates from {} edge pixels", centres.len(), points.len());

    let min_dist = params.min_dist.resolve(h);
    let mut circles: Vec<Circle> = Vec::new();

    for (ax, ay, votes) in centres {
        let cx = (ax as f32 + 0.5) * dp;
        let cy = (ay as f32 + 0.5) * dp;

        if circles
            .iter()
            .any(|c| ((c.x - cx).powi(2) + (c.y - cy).powi(2)).sqrt() < min_dist)
        {
            continue;
        }

        if let Some(radius) = estimate_radius(&points, cx, cy, min_r, max_r, params) {
            circles.push(Circle { x: cx, y: cy, radius, votes });
        }
    }

    circles
}

/// 3x3 neighbourhood sum so that votes spread over adjacent cells still count
fn box_sum(accum: &[u32], aw: usize, ah: usize) -> Vec<u32> {
    let mut out = vec![0u32; accum.len()];
    for y in 0..ah {
        for x in 0..aw {
            let mut sum = 0;
            for ny in y.saturating_sub(1)..=(y + 1).min(ah - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(aw - 1) {
                    sum += accum[ny * aw + nx];
                }
            }
            out[y * aw + x] = sum;
        }
    }
    out
}

/// Cells above `threshold` that dominate their 4-neighbourhood.
/// Ties resolve towards the right/lower cell.
fn local_maxima(acc: &[u32], aw: usize, ah: usize, threshold: f32) -> Vec<(usize, usize, u32)> {
    let mut out = Vec::new();
    for y in 1..ah.saturating_sub(1) {
        for x in 1..aw.saturating_sub(1) {
            let i = y * aw + x;
            let v = acc[i];
            if (v as f32) > threshold
                && v > acc[i - 1]
                && v >= acc[i + 1]
                && v > acc[i - aw]
                && v >= acc[i + aw]
            {
                out.push((x, y, v));
            }
        }
    }
    out
}

/// Best-supported radius around a centre, refined to the mean distance of
/// the supporting edge pixels.
fn estimate_radius(
    points: &[EdgePoint],
    cx: f32,
    cy: f32,
    min_r: u32,
    max_r: u32,
    params: &HoughParams,
) -> Option<f32> {
    let bins = max_r as usize + 2;
    let mut hist = vec![0u32; bins];
    let mut sums = vec![0f32; bins];

    for p in points {
        let d = ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt();
        let bin = d.round() as usize;
        if bin < bins {
            hist[bin] += 1;
            sums[bin] += d;
        }
    }

    let mut best: Option<(u32, u32)> = None;
    for r in min_r..=max_r {
        let r_us = r as usize;
        let support = hist[r_us - 1] + hist[r_us] + hist[r_us + 1];
        if (support as f32) < params.param2 {
            continue;
        }
        let coverage = support as f32 / (2.0 * std::f32::consts::PI * r as f32);
        if coverage < params.min_coverage {
            continue;
        }
        if best.is_none_or(|(_, s)| support > s) {
            best = Some((r, support));
        }
    }

    let (r, support) = best?;
    let r_us = r as usize;
    let dist_sum = sums[r_us - 1] + sums[r_us] + sums[r_us + 1];
    Some(dist_sum / support as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    fn disks(w: u32, h: u32, disks: &[(i32, i32, i32)]) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([210]));
        for &(x, y, r) in disks {
            draw_filled_circle_mut(&mut img, (x, y), r, Luma([50]));
        }
        imageproc::filter::gaussian_blur_f32(&img, 1.5)
    }

    #[test]
    fn finds_single_disk() {
        let img = disks(160, 160, &[(80, 80, 30)]);
        let params = HoughParams {
            min_radius: 15,
            max_radius: 50,
            ..Default::default()
        };
        let circles = detect_circles(&img, &params);
        assert_eq!(circles.len(), 1, "{circles:?}");
        let c = circles[0];
        assert!((c.x - 80.0).abs() < 3.0 && (c.y - 80.0).abs() < 3.0, "{c:?}");
        assert!((c.radius - 30.0).abs() < 3.0, "{c:?}");
    }

    #[test]
    fn separates_two_disks() {
        let img = disks(240, 140, &[(60, 70, 35), (170, 70, 22)]);
        let params = HoughParams {
            min_radius: 10,
            max_radius: 50,
            ..Default::default()
        };
        let mut circles = detect_circles(&img, &params);
        circles.sort_by(|a, b| a.x.total_cmp(&b.x));
        assert_eq!(circles.len(), 2, "{circles:?}");
        assert!((circles[0].radius - 35.0).abs() < 3.0);
        assert!((circles[1].radius - 22.0).abs() < 3.0);
    }

    #[test]
    fn finds_circle_drawn_as_thin_outline() {
        let mut canvas = GrayImage::new(120, 120);
        imageproc::drawing::draw_hollow_circle_mut(&mut canvas, (60, 60), 30, Luma([255]));
        let params = HoughParams {
            dp: 2.0,
            min_radius: 15,
            max_radius: 45,
            ..Default::default()
        };
        let circles = detect_circles(&canvas, &params);
        assert_eq!(circles.len(), 1, "{circles:?}");
        assert!((circles[0].x - 60.0).abs() < 3.0 && (circles[0].y - 60.0).abs() < 3.0);
        assert!((circles[0].radius - 30.0).abs() < 3.0, "{:?}", circles[0]);
    }

    #[test]
    fn flat_image_has_no_circles() {
        let img = GrayImage::from_pixel(64, 64, Luma([128]));
        assert!(detect_circles(&img, &HoughParams::default()).is_empty());
        assert!(detect_circles(&GrayImage::new(2, 2), &HoughParams::default()).is_empty());
    }

    #[test]
    fn rejects_inverted_radius_window() {
        let params = HoughParams {
            min_radius: 50,
            max_radius: 10,
            ..Default::default()
        };
        assert!(params.validate().is_err());
        assert!(HoughParams::default().validate().is_ok());
    }

    #[test]
    fn min_dist_resolves_against_rows() {
        assert_eq!(MinDist::RowsOver(8.0).resolve(640), 80.0);
        assert_eq!(MinDist::Pixels(12.0).resolve(640), 12.0);
    }
}
