// THEORY:
// The `Pixel` module is the most fundamental unit of the estimator. A `Pixel`
// is a "dumb" RGBA container with single-pixel heuristics only: the Rec. 601
// luma used to build the grayscale frame before thresholding, and nothing
// that needs a neighbour.
//
// Multi-pixel color work lives in `ColorAccumulator`, which averages the
// original (non-thresholded) colors under a candidate's mask. Its mean color
// and the perceived intensity derived from it are the color half of a
// `LightObservation`.

pub mod pixel {
    use image::Rgba;

    pub type Channel = u8;
    pub type Luminance = f64;

    /// Weights for the perceived brightness of a light's mean color.
    pub const INTENSITY_WEIGHTS: [f64; 3] = [0.3, 0.6, 0.1];

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// Luminance estimate (Rec. 601 luma), 0..255.
        pub fn luminance(&self) -> Luminance {
            0.299 * self.red as f64 + 0.587 * self.green as f64 + 0.114 * self.blue as f64
        }
    }

    impl From<&Rgba<u8>> for Pixel {
        fn from(rgba: &Rgba<u8>) -> Self {
            let [red, green, blue, alpha] = rgba.0;
            Pixel::new(red, green, blue, alpha)
        }
    }

    /// Mean RGBA color of a region, each channel on the 0..255 scale.
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct MeanColor {
        pub r: f64,
        pub g: f64,
        pub b: f64,
        pub a: f64,
    }

    impl MeanColor {
        /// Weighted channel sum approximating perceived brightness.
        pub fn perceived_intensity(&self) -> f64 {
            INTENSITY_WEIGHTS[0] * self.r + INTENSITY_WEIGHTS[1] * self.g + INTENSITY_WEIGHTS[2] * self.b
        }
    }

    /// Running per-channel sums for a masked mean.
    #[derive(Debug, Clone, Default)]
    pub struct ColorAccumulator {
        sum: [u64; 4],
        count: u64,
    }

    impl ColorAccumulator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&mut self, pixel: Pixel) {
            self.sum[0] += pixel.red as u64;
            self.sum[1] += pixel.green as u64;
            self.sum[2] += pixel.blue as u64;
            self.sum[3] += pixel.alpha as u64;
            self.count += 1;
        }

        /// The mean color, or `None` when nothing was pushed.
        pub fn mean(&self) -> Option<MeanColor> {
            if self.count == 0 {
                return None;
            }
            let n = self.count as f64;
            Some(MeanColor {
                r: self.sum[0] as f64 / n,
                g: self.sum[1] as f64 / n,
                b: self.sum[2] as f64 / n,
                a: self.sum[3] as f64 / n,
            })
        }
    }
}
