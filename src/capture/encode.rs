//! Frame encoding for the detection service

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::CaptureError;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Encode a frame as a JPEG `data:` URL
pub fn to_data_url(image: &RgbImage, quality: u8) -> Result<String, CaptureError> {
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    encoder.encode_image(image)?;

    let mut url = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    url.push_str(DATA_URL_PREFIX);
    STANDARD.encode_string(&jpeg, &mut url);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_is_decodable_jpeg() {
        let image = RgbImage::from_pixel(16, 8, image::Rgb([200, 40, 40]));
        let url = to_data_url(&image, 80).unwrap();

        let payload = url.strip_prefix(DATA_URL_PREFIX).unwrap();
        let bytes = STANDARD.decode(payload).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}
