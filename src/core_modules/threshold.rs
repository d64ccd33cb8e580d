// THEORY:
// Thresholding is the first reduction of a frame: every pixel becomes either
// foreground (255) or background (0). Light sources saturate the sensor, so
// a high fixed level isolates them cleanly from the rest of the scene. The
// same machinery run with inverted polarity isolates dark regions instead.

use crate::core_modules::pixel::pixel::Pixel;
use image::{GrayImage, Luma, RgbaImage};
use imageproc::contrast::ThresholdType;

/// Which side of the threshold counts as foreground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Polarity {
    /// Pixels strictly brighter than the level are foreground.
    #[default]
    Bright,
    /// Pixels at or below the level are foreground.
    Dark,
}

/// Mirrors the frame around its vertical axis.
pub fn mirror_horizontal(frame: &RgbaImage) -> RgbaImage {
    image::imageops::flip_horizontal(frame)
}

/// Converts an RGBA frame to Rec. 601 luma.
pub fn to_luma(frame: &RgbaImage) -> GrayImage {
    let mut gray = GrayImage::new(frame.width(), frame.height());
    for (x, y, rgba) in frame.enumerate_pixels() {
        let value = Pixel::from(rgba).luminance().round().clamp(0.0, 255.0) as u8;
        gray.put_pixel(x, y, Luma([value]));
    }
    gray
}

/// Binary threshold: foreground pixels become 255, the rest 0.
pub fn threshold(gray: &GrayImage, level: u8, polarity: Polarity) -> GrayImage {
    let kind = match polarity {
        Polarity::Bright => ThresholdType::Binary,
        Polarity::Dark => ThresholdType::BinaryInverted,
    };
    imageproc::contrast::threshold(gray, level, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn bright_polarity_keeps_values_above_level() {
        let gray = GrayImage::from_raw(3, 1, vec![229, 230, 231]).unwrap();
        let binary = threshold(&gray, 230, Polarity::Bright);
        assert_eq!(binary.as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn dark_polarity_inverts() {
        let gray = GrayImage::from_raw(3, 1, vec![10, 50, 51]).unwrap();
        let binary = threshold(&gray, 50, Polarity::Dark);
        assert_eq!(binary.as_raw(), &vec![255, 255, 0]);
    }

    #[test]
    fn mirror_swaps_columns() {
        let mut frame = RgbaImage::new(2, 1);
        frame.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let mirrored = mirror_horizontal(&frame);
        assert_eq!(mirrored.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(mirrored.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn luma_of_pure_white_saturates() {
        let frame = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255]));
        assert_eq!(to_luma(&frame).get_pixel(0, 0).0[0], 255);
    }
}
