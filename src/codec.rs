//! # Raster Codec Module
//!
//! Confine verso la capacità esterna di decode/resize/encode.
//!
//! ## Responsabilità:
//! - Definisce il trait `ImageCodec` usato dal transcoder
//! - Fornisce `WebpCodec`: decode e resize con `image`, encode lossy con `webp`
//! - Fornisce `flatten_onto_white` per eliminare la trasparenza prima del resample
//!
//! ## Contratto:
//! Il transcoder chiede solo "codifica questi pixel al formato target con qualità Q";
//! l'algoritmo di compressione resta interno al codec.
//!
//! ## Esempio:
//! ```rust,ignore
//! let codec = WebpCodec::new();
//! let pixels = codec.decode(&bytes)?;
//! let webp = codec.encode(&pixels, 75.0)?;
//! ```

use crate::error::ConvertError;
use image::imageops::FilterType;
use image::RgbaImage;
use tracing::debug;

/// External raster decode/encode capability
pub trait ImageCodec: Send + Sync {
    /// Decode raw bytes into an RGBA pixel buffer
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, ConvertError>;

    /// Resample to exactly `width` x `height` in a single pass
    fn resize(&self, pixels: &RgbaImage, width: u32, height: u32) -> RgbaImage;

    /// Encode at `quality` on the 0-100 scale
    fn encode(&self, pixels: &RgbaImage, quality: f32) -> Result<Vec<u8>, ConvertError>;

    /// File extension of the target format, without the dot
    fn extension(&self) -> &'static str;
}

/// Lossy WebP codec
#[derive(Debug, Clone, Copy)]
pub struct WebpCodec {
    filter: FilterType,
}

impl WebpCodec {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }
}

impl Default for WebpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCodec for WebpCodec {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, ConvertError> {
        if bytes.is_empty() {
            return Err(ConvertError::Decode("empty source".to_string()));
        }
        let image = image::load_from_memory(bytes)?;
        Ok(image.to_rgba8())
    }

    fn resize(&self, pixels: &RgbaImage, width: u32, height: u32) -> RgbaImage {
        debug!(
            "Resampling {}x{} -> {}x{} ({:?})",
            pixels.width(),
            pixels.height(),
            width,
            height,
            self.filter
        );
        image::imageops::resize(pixels, width, height, self.filter)
    }

    fn encode(&self, pixels: &RgbaImage, quality: f32) -> Result<Vec<u8>, ConvertError> {
        let encoder = webp::Encoder::from_rgba(pixels.as_raw(), pixels.width(), pixels.height());
        let memory = encoder
            .encode_simple(false, quality.clamp(0.0, 100.0))
            .map_err(|e| ConvertError::Encode(format!("libwebp rejected the image: {:?}", e)))?;
        Ok(memory.to_vec())
    }

    fn extension(&self) -> &'static str {
        "webp"
    }
}

/// Composite every pixel over opaque white, leaving alpha at 255
pub fn flatten_onto_white(pixels: &mut RgbaImage) {
    for pixel in pixels.pixels_mut() {
        let alpha = pixel[3] as u32;
        if alpha == 255 {
            continue;
        }
        for channel in 0..3 {
            let value = pixel[channel] as u32;
            // c * a + 255 * (1 - a), rounded
            pixel[channel] = ((value * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        }
        pixel[3] = 255;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgba};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buffer, ImageOutputFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_flatten_transparent_becomes_white() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([10, 20, 30, 255]));

        flatten_onto_white(&mut img);

        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(1, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_flatten_half_alpha_blends() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        flatten_onto_white(&mut img);

        let pixel = img.get_pixel(0, 0);
        assert_eq!(pixel[3], 255);
        assert!(pixel[0] >= 126 && pixel[0] <= 128, "got {}", pixel[0]);
    }

    #[test]
    fn test_webp_roundtrip_header() {
        let codec = WebpCodec::new();
        let pixels = codec.decode(&png_bytes(32, 16)).unwrap();
        assert_eq!(pixels.dimensions(), (32, 16));

        let encoded = codec.encode(&pixels, 75.0).unwrap();
        assert!(!encoded.is_empty());
        assert_eq!(&encoded[0..4], b"RIFF");
        assert_eq!(&encoded[8..12], b"WEBP");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = WebpCodec::new();
        assert!(matches!(
            codec.decode(b"definitely not an image"),
            Err(ConvertError::Decode(_))
        ));
        assert!(matches!(codec.decode(&[]), Err(ConvertError::Decode(_))));
    }

    #[test]
    fn test_resize_exact_dimensions() {
        let codec = WebpCodec::new();
        let pixels = RgbaImage::from_pixel(40, 20, Rgba([1, 2, 3, 255]));
        let resized = codec.resize(&pixels, 10, 5);
        assert_eq!(resized.dimensions(), (10, 5));
    }
}
