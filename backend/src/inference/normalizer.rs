use image::imageops::FilterType;
use ndarray::Array3;

pub const IMAGE_HEIGHT: u32 = 100;
pub const IMAGE_WIDTH: u32 = 125;
pub const CHANNELS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Unexpected pixel buffer shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// RGB pixels in height x width x channel order, values 0-255.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pixels: Array3<u8>,
}

#[cfg_attr(not(feature = "torch"), allow(dead_code))]
impl NormalizedImage {
    pub fn pixels(&self) -> &Array3<u8> {
        &self.pixels
    }

    /// Row-major copy of the pixel buffer.
    pub fn to_hwc_vec(&self) -> Vec<u8> {
        self.pixels.iter().copied().collect()
    }

    pub fn shape(&self) -> [usize; 3] {
        let (h, w, c) = self.pixels.dim();
        [h, w, c]
    }
}

/// Decodes `bytes` and produces the fixed 125x100 RGB input the classifier was trained on.
///
/// The resize ignores the source aspect ratio. The frozen model expects exactly this
/// stretching, so revisit it only together with a retrained artifact.
pub fn normalize(bytes: &[u8]) -> Result<NormalizedImage, NormalizeError> {
    let decoded = image::load_from_memory(bytes)?;
    let resized = decoded.resize_exact(IMAGE_WIDTH, IMAGE_HEIGHT, FilterType::Lanczos3);
    let rgb = resized.to_rgb8();

    let pixels = Array3::from_shape_vec(
        (IMAGE_HEIGHT as usize, IMAGE_WIDTH as usize, CHANNELS),
        rgb.into_raw(),
    )?;
    log::debug!("Normalized image to {:?}", pixels.dim());
    Ok(NormalizedImage { pixels })
}
