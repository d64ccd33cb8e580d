pub mod image_helper {
    use crate::error::EstimateError;
    use image::{GrayImage, ImageEncoder, RgbaImage};
    use std::path::Path;

    /// Loads any supported image file as an RGBA frame.
    pub fn load_frame(path: impl AsRef<Path>) -> Result<RgbaImage, EstimateError> {
        Ok(image::open(path)?.to_rgba8())
    }

    /// Writes a thresholded frame as a grayscale PNG.
    pub fn save_binary(path: impl AsRef<Path>, binary: &GrayImage) -> Result<(), EstimateError> {
        let output = std::fs::File::create(path).map_err(image::ImageError::IoError)?;
        let encoder = image::codecs::png::PngEncoder::new(output);
        encoder.write_image(
            binary.as_raw(),
            binary.width(),
            binary.height(),
            image::ExtendedColorType::L8,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::image_helper::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn png_frame_loads_as_rgba() {
        let dir = tempfile::tempdir().expect("Error creating temp dir.");
        let path = dir.path().join("gradient.png");

        let mut frame = RgbaImage::new(40, 30);
        for (x, y, pixel) in frame.enumerate_pixels_mut() {
            *pixel = Rgba([(x * 6) as u8, (y * 8) as u8, 128, 255]);
        }
        frame.save(&path).expect("Error Saving File.");

        let loaded = load_frame(&path).expect("Error Loading File.");
        assert_eq!(loaded, frame);
    }

    #[test]
    fn binary_mask_is_saved_as_grayscale() {
        let dir = tempfile::tempdir().expect("Error creating temp dir.");
        let path = dir.path().join("mask.png");

        let mut binary = GrayImage::new(16, 16);
        binary.put_pixel(4, 5, Luma([255]));
        save_binary(&path, &binary).expect("Error Saving File.");

        let loaded = image::open(&path).unwrap().to_luma8();
        assert_eq!(loaded.get_pixel(4, 5).0[0], 255);
        assert_eq!(loaded.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn missing_file_is_an_image_error() {
        let dir = tempfile::tempdir().expect("Error creating temp dir.");
        assert!(load_frame(dir.path().join("absent.png")).is_err());
    }
}
