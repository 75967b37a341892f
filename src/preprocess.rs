use image::{imageops::FilterType, DynamicImage};

use crate::error::DecodeError;

pub const IMAGE_WIDTH: u32 = 150;
pub const IMAGE_HEIGHT: u32 = 150;
pub const IMAGE_CHANNELS: u32 = 3;

/// Normalized RGB pixels in row-major HWC order, always 150x150x3.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
}

impl ImageTensor {
    /// Batched input shape for the model.
    pub const BATCH_DIMS: [u64; 4] = [
        1,
        IMAGE_HEIGHT as u64,
        IMAGE_WIDTH as u64,
        IMAGE_CHANNELS as u64,
    ];

    pub const LEN: usize = (IMAGE_WIDTH * IMAGE_HEIGHT * IMAGE_CHANNELS) as usize;

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[cfg(test)]
    pub fn get(&self, x: u32, y: u32, channel: u32) -> Option<f32> {
        if x >= IMAGE_WIDTH || y >= IMAGE_HEIGHT || channel >= IMAGE_CHANNELS {
            return None;
        }
        let idx = ((y * IMAGE_WIDTH + x) * IMAGE_CHANNELS + channel) as usize;
        self.data.get(idx).copied()
    }
}

/// Decodes an uploaded image into the fixed model input.
///
/// The image is converted to RGB first (alpha dropped, grayscale
/// triplicated), then resampled to 150x150 with bicubic interpolation and
/// scaled from `0..=255` to `[0.0, 1.0]`.
pub fn decode(image_data: &[u8]) -> Result<ImageTensor, DecodeError> {
    if image_data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let img = image::load_from_memory(image_data)?;
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let resized = rgb
        .resize_exact(IMAGE_WIDTH, IMAGE_HEIGHT, FilterType::CatmullRom)
        .to_rgb8();

    let mut data = Vec::with_capacity(ImageTensor::LEN);
    for pixel in resized.pixels() {
        data.push(pixel[0] as f32 / 255.0);
        data.push(pixel[1] as f32 / 255.0);
        data.push(pixel[2] as f32 / 255.0);
    }

    Ok(ImageTensor { data })
}

#[cfg(test)]
pub(crate) fn encode_png(img: &DynamicImage) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageOutputFormat::Png)
        .expect("png encoding");
    buf.into_inner()
}
