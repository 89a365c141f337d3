//! Decoded RGBA8 texture data.

use std::path::Path;

use crate::{Error, Result};

/// CPU-side texture, always 4 bytes per pixel.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Wrap raw RGBA8 pixels.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(Error::InvalidData(format!(
                "{width}x{height} RGBA8 texture needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decode an encoded image (PNG, JPEG, ...) held in memory.
    pub fn from_memory(bytes: &[u8]) -> Result<Self> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba8(width, height, rgba.into_raw())
    }

    /// Decode an image file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        tracing::debug!("Loaded texture {} ({width}x{height})", path.display());
        Self::from_rgba8(width, height, rgba.into_raw())
    }

    /// Generated two-tone checkerboard, used when no texture file is supplied.
    pub fn checkerboard(size: u32, cells: u32) -> Self {
        let size = size.max(1);
        let cell = (size / cells.max(1)).max(1);
        let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let light = ((x / cell) + (y / cell)) % 2 == 0;
                let texel: [u8; 4] = if light {
                    [230, 230, 230, 255]
                } else {
                    [40, 40, 40, 255]
                };
                pixels.extend_from_slice(&texel);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// Size of the pixel data in bytes.
    pub fn byte_size(&self) -> u64 {
        self.pixels.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_mismatched_pixel_count() {
        assert!(TextureData::from_rgba8(2, 2, vec![0; 15]).is_err());
        assert!(TextureData::from_rgba8(0, 2, Vec::new()).is_err());
        assert!(TextureData::from_rgba8(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn decodes_png_to_rgba() {
        let mut img = image::RgbImage::new(3, 2);
        img.put_pixel(1, 0, image::Rgb([10, 20, 30]));

        let mut encoded = Vec::new();
        img.write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
            .unwrap();

        let tex = TextureData::from_memory(&encoded).unwrap();
        assert_eq!((tex.width, tex.height), (3, 2));
        assert_eq!(tex.byte_size(), 3 * 2 * 4);
        assert_eq!(&tex.pixels[4..8], &[10, 20, 30, 255]);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = TextureData::from_path("does/not/exist.png").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn checkerboard_alternates() {
        let tex = TextureData::checkerboard(4, 2);
        assert_eq!(tex.pixels.len(), 4 * 4 * 4);
        let texel = |x: usize, y: usize| tex.pixels[(y * 4 + x) * 4];
        assert_eq!(texel(0, 0), texel(1, 1));
        assert_ne!(texel(0, 0), texel(2, 0));
        assert_ne!(texel(0, 0), texel(0, 2));
    }
}
