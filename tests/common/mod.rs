#![allow(dead_code)]

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use webp_batch_converter::{ConvertError, ImageCodec, SourceImage};

/// Marker byte that makes `ScriptedCodec::decode` fail
pub const CORRUPT: u8 = 0xFF;

/// Deterministic codec driven by the source bytes.
///
/// Byte 0 is a decode delay in 10ms steps, byte 1 == `CORRUPT` fails decoding.
/// The decoded image is `len x 1` and encodes to `len * quality / 100` bytes,
/// doubled when `inflate` is set.
pub struct ScriptedCodec {
    pub inflate: bool,
    decodes: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    qualities: Mutex<Vec<f32>>,
}

impl ScriptedCodec {
    pub fn new() -> Self {
        Self {
            inflate: false,
            decodes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            qualities: Mutex::new(Vec::new()),
        }
    }

    pub fn inflating() -> Self {
        Self {
            inflate: true,
            ..Self::new()
        }
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn qualities(&self) -> Vec<f32> {
        self.qualities.lock().unwrap().clone()
    }
}

impl ImageCodec for ScriptedCodec {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, ConvertError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = bytes.first().copied().unwrap_or(0) as u64 * 10;
        std::thread::sleep(Duration::from_millis(delay));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if bytes.len() < 2 || bytes[1] == CORRUPT {
            return Err(ConvertError::Decode("unrecognized image data".to_string()));
        }
        Ok(RgbaImage::from_pixel(bytes.len() as u32, 1, Rgba([0, 0, 0, 255])))
    }

    fn resize(&self, pixels: &RgbaImage, width: u32, height: u32) -> RgbaImage {
        image::imageops::resize(pixels, width, height, image::imageops::FilterType::Nearest)
    }

    fn encode(&self, pixels: &RgbaImage, quality: f32) -> Result<Vec<u8>, ConvertError> {
        self.qualities.lock().unwrap().push(quality);
        let mut size = (pixels.width() as f32 * quality / 100.0).max(1.0) as usize;
        if self.inflate {
            size *= 2;
        }
        Ok(vec![7u8; size])
    }

    fn extension(&self) -> &'static str {
        "webp"
    }
}

/// Source understood by `ScriptedCodec`
pub fn scripted(name: &str, delay_steps: u8, len: usize) -> SourceImage {
    let mut bytes = vec![1u8; len.max(2)];
    bytes[0] = delay_steps;
    SourceImage::new(name, bytes)
}

pub fn corrupt(name: &str) -> SourceImage {
    SourceImage::new(name, vec![0u8, CORRUPT, 0, 0])
}

pub fn encoded(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8, 255])
    });
    let mut buffer = Cursor::new(Vec::new());
    let image = match format {
        ImageOutputFormat::Jpeg(_) => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
        _ => DynamicImage::ImageRgba8(img),
    };
    image.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

pub fn zip_entry_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
