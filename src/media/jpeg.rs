use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

use super::MediaError;

/// Quality OpenCV's `imwrite` applies to JPEG output unless told otherwise.
pub const JPEG_QUALITY: u8 = 95;

pub fn write_jpeg(image: &RgbImage, path: &Path) -> Result<(), MediaError> {
    let mut writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(image)?;
    writer.flush()?;
    Ok(())
}

/// Saves `image` in the format implied by the extension of `path`. JPEG goes
/// through [`write_jpeg`].
pub fn save_image(image: &RgbImage, path: &Path) -> Result<(), MediaError> {
    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) => write_jpeg(image, path),
        _ => Ok(image.save(path)?),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Busy pattern whose encoded size depends strongly on quality.
    pub fn textured(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 37 + y * 91) ^ (x * y)) as u8;
            image::Rgb([v, v.wrapping_mul(3), v.wrapping_add(x as u8)])
        })
    }

    pub fn encode_at(image: &RgbImage, quality: u8) -> Vec<u8> {
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality)
            .encode_image(image)
            .unwrap();
        bytes
    }
}
