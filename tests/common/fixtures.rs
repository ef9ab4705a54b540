use image::{DynamicImage, GrayImage, Luma};
use imageproc::drawing::draw_filled_circle_mut;
use std::path::{Path, PathBuf};

/// Table colour behind the coins
pub const BACKGROUND: u8 = 210;
/// Coin colour
pub const COIN: u8 = 50;

/// A photo of dark disks on a light table, softened like a camera would.
/// Each coin is `(x, y, radius)`.
pub fn coin_photo(width: u32, height: u32, coins: &[(i32, i32, i32)]) -> DynamicImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([BACKGROUND]));
    for &(x, y, r) in coins {
        draw_filled_circle_mut(&mut img, (x, y), r, Luma([COIN]));
    }
    let softened = imageproc::filter::gaussian_blur_f32(&img, 1.0);
    DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(softened).to_rgb8())
}

/// Nickel, dime and a mid-sized coin, left to right
pub const THREE_COINS: &[(i32, i32, i32)] = &[(110, 180, 35), (250, 180, 22), (380, 180, 30)];

/// [`THREE_COINS`] on a 480x360 table
pub fn three_coin_photo() -> DynamicImage {
    coin_photo(480, 360, THREE_COINS)
}

/// A photo with nothing on the table
pub fn empty_photo(width: u32, height: u32) -> DynamicImage {
    coin_photo(width, height, &[])
}

/// Saves an image as PNG inside `dir` and returns its path
pub fn save_png(img: &DynamicImage, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    img.save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test image");
    path
}
