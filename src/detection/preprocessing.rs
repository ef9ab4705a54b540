use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::{gaussian_blur_f32, median_filter};

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return img.clone();
    }
    gaussian_blur_f32(img, sigma)
}

/// Median denoising; stands in for non-local means on template photos
pub fn denoise(img: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return img.clone();
    }
    median_filter(img, radius, radius)
}

/// Detect edges using Canny edge detector.
/// A high threshold below 1 (e.g. an Otsu level of 0 on a flat photo) yields
/// no edges; the low threshold is clamped into `[1, high]`.
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    if high_threshold.is_nan() || high_threshold < 1.0 {
        return GrayImage::new(img.width(), img.height());
    }
    canny(img, low_threshold.clamp(1.0, high_threshold), high_threshold)
}

/// Otsu binarisation. Returns the chosen level and the binary image
/// (pixels above the level become 255).
pub fn otsu_threshold(img: &GrayImage) -> (u8, GrayImage) {
    let level = otsu_level(img);
    (level, threshold(img, level, ThresholdType::Binary))
}

/// Dilate with a `(2r+1)x(2r+1)` square structuring element
pub fn dilate(img: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return img.clone();
    }
    imageproc::morphology::dilate(img, Norm::LInf, radius)
}

/// Peak signal-to-noise ratio in dB between two equally sized images.
/// Identical images give `f64::INFINITY`.
pub fn psnr(a: &GrayImage, b: &GrayImage) -> f64 {
    let mut sq = 0f64;
    for (pa, pb) in a.pixels().zip(b.pixels()) {
        let d = pa[0] as f64 - pb[0] as f64;
        sq += d * d;
    }
    let n = (a.width() * a.height()) as f64;
    if n == 0.0 || sq == 0.0 {
        return f64::INFINITY;
    }
    let mse = sq / n;
    10.0 * (255.0f64 * 255.0 / mse).log10()
}

/// Outcome of PSNR-driven blur selection
#[derive(Debug, Clone)]
pub struct TunedBlur {
    pub image: GrayImage,
    pub sigma: f32,
    pub psnr: f64,
}

/// Pick the strongest blur whose PSNR against the input stays at or above
/// `target_db`. Falls back to the weakest candidate when none qualifies.
pub fn tune_blur(img: &GrayImage, candidates: &[f32], target_db: f64) -> TunedBlur {
    let mut sorted: Vec<f32> = candidates.iter().copied().filter(|s| *s > 0.0).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut chosen: Option<TunedBlur> = None;
    let mut weakest: Option<TunedBlur> = None;

    for sigma in sorted {
        let blurred = gaussian_blur_f32(img, sigma);
        let score = psnr(img, &blurred);
        tracing::trace!("blur sigma={:.2} psnr={:.2}dB", sigma, score);
        let candidate = TunedBlur { image: blurred, sigma, psnr: score };
        if weakest.is_none() {
            weakest = Some(candidate.clone());
        }
        if score >= target_db {
            chosen = Some(candidate);
        } else {
            break;
        }
    }

    chosen.or(weakest).unwrap_or_else(|| TunedBlur {
        image: img.clone(),
        sigma: 0.0,
        psnr: f64::INFINITY,
    })
}

/// Contrast limited adaptive histogram equalisation.
///
/// Each tile gets a clipped-histogram CDF lookup table; output pixels
/// blend the tables of the four nearest tile centres bilinearly.
pub fn equalize_clahe(img: &GrayImage, tiles_x: u32, tiles_y: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || tiles_x == 0 || tiles_y == 0 {
        return img.clone();
    }
    let tiles_x = tiles_x.min(w);
    let tiles_y = tiles_y.min(h);
    let tile_w = w / tiles_x;
    let tile_h = h / tiles_y;

    let mut maps = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = if tx == tiles_x - 1 { w } else { x0 + tile_w };
            let y1 = if ty == tiles_y - 1 { h } else { y0 + tile_h };
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[img.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let pixels = (x1 - x0) * (y1 - y0);
            maps[(ty * tiles_x + tx) as usize] = clipped_cdf(&mut hist, pixels, clip_limit);
        }
    }

    let mut out = GrayImage::new(w, h);
    for (x, y, p) in img.enumerate_pixels() {
        // Position relative to tile centres
        let gx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let gy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let tx0 = gx.floor().clamp(0.0, (tiles_x - 1) as f32) as u32;
        let ty0 = gy.floor().clamp(0.0, (tiles_y - 1) as f32) as u32;
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let fx = (gx - tx0 as f32).clamp(0.0, 1.0);
        let fy = (gy - ty0 as f32).clamp(0.0, 1.0);

        let v = p[0] as usize;
        let m = |tx: u32, ty: u32| maps[(ty * tiles_x + tx) as usize][v] as f32;
        let top = m(tx0, ty0) * (1.0 - fx) + m(tx1, ty0) * fx;
        let bottom = m(tx0, ty1) * (1.0 - fx) + m(tx1, ty1) * fx;
        let value = top * (1.0 - fy) + bottom * fy;
        out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
    }
    out
}

fn clipped_cdf(hist: &mut [u32; 256], pixels: u32, clip_limit: f32) -> [u8; 256] {
    let clip = ((clip_limit * pixels as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let per_bin = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += per_bin;
        if i < remainder {
            *bin += 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    let cdf_min = hist.iter().copied().find(|&v| v > 0).unwrap_or(0);
    let denom = pixels.saturating_sub(cdf_min);
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = if denom == 0 {
            i as u8
        } else {
            ((cdf.saturating_sub(cdf_min)) as f32 * 255.0 / denom as f32).round() as u8
        };
    }
    lut
}
