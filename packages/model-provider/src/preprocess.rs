//! Fixed preprocessing pipeline: resize, center crop, planar float conversion.

use image::RgbImage;
use image::imageops::{self, FilterType};

/// Side length both dimensions are resized to before cropping
pub const RESIZE: u32 = 256;
/// Side length of the network input
pub const CROP: u32 = 224;

/// Resize to `RESIZE`×`RESIZE` (aspect ratio is not preserved), then center crop to `CROP`×`CROP`.
pub fn resize_and_crop(image: &RgbImage) -> RgbImage {
    let resized = if image.dimensions() == (RESIZE, RESIZE) {
        image.clone()
    } else {
        imageops::resize(image, RESIZE, RESIZE, FilterType::Triangle)
    };
    center_crop(&resized, CROP, CROP)
}

/// Crop the central `width`×`height` region. Offsets round half away from zero.
/// A region larger than the image is clamped to the image.
pub fn center_crop(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = image.dimensions();
    let (width, height) = (width.min(src_w), height.min(src_h));
    let left = ((src_w - width) as f32 / 2.0).round() as u32;
    let top = ((src_h - height) as f32 / 2.0).round() as u32;
    imageops::crop_imm(image, left, top, width, height).to_image()
}

/// Channel-first planar layout (`[R.., G.., B..]`) with values scaled to `[0, 1]`.
pub fn to_chw(image: &RgbImage) -> Vec<f32> {
    let plane = image.width() as usize * image.height() as usize;
    let mut data = vec![0f32; 3 * plane];
    for (i, pixel) in image.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }
    data
}
