//! Edge-template coin classification and template preparation.

use anyhow::Context;
use image::{imageops, GrayImage};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::detection::preprocessing;
use crate::error::CoinError;
use crate::models::CoinKind;

/// Side length templates and coin crops are compared at
pub const COMMON_SIZE: u32 = 100;

const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Edge templates grouped by denomination
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    groups: BTreeMap<CoinKind, Vec<GrayImage>>,
    size: u32,
}

/// Best template match for one coin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    pub kind: CoinKind,
    /// Percentage of pixels that are edges in both images
    pub percent: f32,
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Image files in a folder, sorted by name
pub fn list_images(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| CoinError::TemplateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load a folder of images grouped by the coin name in each filename,
/// converted to grayscale and resized to `size x size`.
pub fn load_grouped(dir: &Path, size: u32) -> anyhow::Result<BTreeMap<CoinKind, Vec<GrayImage>>> {
    let mut groups: BTreeMap<CoinKind, Vec<GrayImage>> = BTreeMap::new();
    for path in list_images(dir)? {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let Some(kind) = CoinKind::from_filename(&name) else {
            tracing::debug!("Skipping {} (no coin name in filename)", name);
            continue;
        };
        let img = match image::open(&path) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!("Could not load {}: {}", path.display(), e);
                continue;
            }
        };
        let gray = imageops::resize(&img.to_luma8(), size, size, imageops::FilterType::Triangle);
        groups.entry(kind).or_default().push(gray);
    }
    Ok(groups)
}

impl TemplateSet {
    pub fn new(size: u32) -> Self {
        Self { groups: BTreeMap::new(), size }
    }

    /// Load prepared edge templates from a folder
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let groups = load_grouped(dir, COMMON_SIZE)?;
        let set = Self { groups, size: COMMON_SIZE };
        tracing::info!("Loaded {} edge templates from {}", set.len(), dir.display());
        Ok(set)
    }

    pub fn add(&mut self, kind: CoinKind, template: GrayImage) {
        let template = if template.dimensions() == (self.size, self.size) {
            template
        } else {
            imageops::resize(&template, self.size, self.size, imageops::FilterType::Triangle)
        };
        self.groups.entry(kind).or_default().push(template);
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-matching template; `Unknown` at 0% when nothing overlaps
    pub fn classify(&self, coin_edges: &GrayImage) -> TemplateMatch {
        let mut best = TemplateMatch { kind: CoinKind::Unknown, percent: 0.0 };
        for (kind, templates) in &self.groups {
            for tmpl in templates {
                let percent = edge_match_percent(coin_edges, tmpl);
                if percent > best.percent {
                    best = TemplateMatch { kind: *kind, percent };
                }
            }
        }
        best
    }
}

/// Pixels that are edges in both images, as a percentage of all pixels
pub fn edge_match_percent(a: &GrayImage, b: &GrayImage) -> f32 {
    if a.dimensions() != b.dimensions() || a.width() == 0 || a.height() == 0 {
        return 0.0;
    }
    let both = a.pixels().zip(b.pixels()).filter(|(pa, pb)| pa[0] > 0 && pb[0] > 0).count();
    both as f32 * 100.0 / (a.width() * a.height()) as f32
}

/// Resize a coin crop to the template size and extract its Canny edges
pub fn coin_edges(roi: &GrayImage, size: u32, low: f32, high: f32) -> GrayImage {
    let resized = imageops::resize(roi, size, size, imageops::FilterType::Triangle);
    preprocessing::detect_edges(&resized, low, high)
}

/// Settings for turning template photos into edge templates
#[derive(Debug, Clone)]
pub struct TemplatePrep {
    pub denoise_radius: u32,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
}

impl Default for TemplatePrep {
    fn default() -> Self {
        Self {
            denoise_radius: 2,
            blur_sigma: 1.5,
            canny_low: 50.0,
            canny_high: 100.0,
        }
    }
}

/// Convert every template photo in `input_dir` to an edge image saved as
/// `output_dir/edge_<filename>`. Unreadable files are skipped.
/// Returns the written paths.
pub fn prepare_templates(input_dir: &Path, output_dir: &Path, prep: &TemplatePrep) -> anyhow::Result<Vec<PathBuf>> {
    if !output_dir.exists() {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    }

    let mut written = Vec::new();
    for path in list_images(input_dir)? {
        let img = match image::open(&path) {
            Ok(img) => img.to_luma8(),
            Err(e) => {
                tracing::warn!("Could not load image {}: {}", path.display(), e);
                continue;
            }
        };

        let denoised = preprocessing::denoise(&img, prep.denoise_radius);
        let blurred = preprocessing::apply_blur(&denoised, prep.blur_sigma);
        let edges = preprocessing::detect_edges(&blurred, prep.canny_low, prep.canny_high);

        let Some(name) = path.file_name() else { continue };
        let out_path = output_dir.join(format!("edge_{}", name.to_string_lossy()));
        edges
            .save(&out_path)
            .with_context(|| format!("Failed to save {}", out_path.display()))?;
        tracing::info!("Processed and saved: {}", out_path.display());
        written.push(out_path);
    }

    tracing::info!(
        "{} template images converted to edges in {}",
        written.len(),
        output_dir.display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn match_percent_counts_shared_edges() {
        let mut a = GrayImage::new(10, 10);
        let mut b = GrayImage::new(10, 10);
        for x in 0..10 {
            a.put_pixel(x, 0, Luma([255]));
            b.put_pixel(x, 0, Luma([255]));
            b.put_pixel(x, 1, Luma([255]));
        }
        assert_eq!(edge_match_percent(&a, &b), 10.0);
        assert_eq!(edge_match_percent(&a, &GrayImage::new(5, 5)), 0.0);
    }

    #[test]
    fn empty_set_is_unknown() {
        let set = TemplateSet::new(COMMON_SIZE);
        let m = set.classify(&GrayImage::new(COMMON_SIZE, COMMON_SIZE));
        assert_eq!(m.kind, CoinKind::Unknown);
        assert_eq!(m.percent, 0.0);
    }

    #[test]
    fn best_template_wins() {
        let mut set = TemplateSet::new(4);
        let mut dime = GrayImage::new(4, 4);
        dime.put_pixel(0, 0, Luma([255]));
        let quarter = GrayImage::from_pixel(4, 4, Luma([255]));
        set.add(CoinKind::Dime, dime);
        set.add(CoinKind::Quarter, quarter);

        let probe = GrayImage::from_pixel(4, 4, Luma([255]));
        let m = set.classify(&probe);
        assert_eq!(m.kind, CoinKind::Quarter);
        assert_eq!(m.percent, 100.0);
        assert_eq!(set.len(), 2);
    }
}
