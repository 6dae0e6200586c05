use image::{imageops, GrayImage};

/// Orientation correction applied before equalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    /// 90 degrees counter-clockwise
    Left,
}

impl Rotation {
    /// Parse a rotation direction
    ///
    /// Anything other than "left" (including orientations not handled yet)
    /// falls back to no rotation.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "left" => Self::Left,
            "none" | "" => Self::None,
            other => {
                tracing::debug!("Unrecognized rotation '{}', leaving image as is", other);
                Self::None
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Left => "left",
        }
    }
}

/// Rotate with an exact canvas fit (width and height swap for `Left`)
pub fn apply(image: GrayImage, rotation: Rotation) -> GrayImage {
    match rotation {
        Rotation::None => image,
        Rotation::Left => imageops::rotate270(&image),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([(x * 3 + y * 5) as u8]))
    }

    #[test]
    fn test_parse_rotation() {
        assert_eq!(Rotation::parse("left"), Rotation::Left);
        assert_eq!(Rotation::parse(" LEFT "), Rotation::Left);
        assert_eq!(Rotation::parse("none"), Rotation::None);
        assert_eq!(Rotation::parse("right"), Rotation::None);
        assert_eq!(Rotation::parse("upside-down"), Rotation::None);
    }

    #[test]
    fn test_left_swaps_dimensions() {
        let rotated = apply(gradient(30, 20), Rotation::Left);
        assert_eq!(rotated.dimensions(), (20, 30));
    }

    #[test]
    fn test_left_is_counter_clockwise() {
        let mut img = GrayImage::new(4, 3);
        img.put_pixel(3, 0, Luma([255])); // top-right corner

        let rotated = apply(img, Rotation::Left);

        // Top-right moves to top-left when turning counter-clockwise
        assert_eq!(rotated.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn test_four_left_rotations_restore_original() {
        let original = gradient(17, 9);
        let mut img = original.clone();
        for _ in 0..4 {
            img = apply(img, Rotation::Left);
        }
        assert_eq!(img, original);
    }

    #[test]
    fn test_none_is_identity() {
        let original = gradient(8, 5);
        assert_eq!(apply(original.clone(), Rotation::None), original);
    }
}
