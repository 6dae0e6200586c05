use image::{DynamicImage, GrayImage};

/// Collapse to a single luminance channel
/// Single-channel 8-bit input is passed through untouched
pub fn apply(image: DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray,
        other => other.to_luma8(),
    }
}
