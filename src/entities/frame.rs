//! Decoded bitmaps with reusable pixel storage
//!
//! **Why**: A flip-book decodes one image per displayed frame. Allocating a
//! fresh buffer for every frame churns memory, so a `Bitmap` keeps its pixel
//! storage behind a mutex: once retired it can be handed to the reuse pool and
//! refilled by the next decode without a new allocation.
//!
//! **Used by**: FrameSource (decode target), BitmapReusePool (weak candidates),
//! FrameRenderer (current frame), Canvas implementations (pixel access)
//!
//! # Pixel Formats
//!
//! - `PixelFormat::Argb8888`: 4 bytes/pixel, stored R,G,B,A
//! - `PixelFormat::Rgb565`: 2 bytes/pixel, little-endian, alpha dropped (default)
//! - `PixelFormat::Argb4444`: 2 bytes/pixel, little-endian
//! - `PixelFormat::Alpha8`: 1 byte/pixel, alpha only

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Shared ownership of one decoded image buffer
pub type BitmapHandle = Arc<Bitmap>;

/// Target pixel layout of a decode
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Argb8888,
    /// Reduced footprint, used unless a caller overrides it
    #[default]
    Rgb565,
    Argb4444,
    Alpha8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Argb8888 => 4,
            PixelFormat::Rgb565 | PixelFormat::Argb4444 => 2,
            PixelFormat::Alpha8 => 1,
        }
    }

    /// Pack one RGBA8 pixel into `out` (exactly `bytes_per_pixel()` long)
    #[inline]
    pub fn pack(self, rgba: [u8; 4], out: &mut [u8]) {
        let [r, g, b, a] = rgba;
        match self {
            PixelFormat::Argb8888 => out.copy_from_slice(&rgba),
            PixelFormat::Rgb565 => {
                let v = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                out.copy_from_slice(&v.to_le_bytes());
            }
            PixelFormat::Argb4444 => {
                let v = ((r as u16 >> 4) << 12)
                    | ((g as u16 >> 4) << 8)
                    | ((b as u16 >> 4) << 4)
                    | (a as u16 >> 4);
                out.copy_from_slice(&v.to_le_bytes());
            }
            PixelFormat::Alpha8 => out[0] = a,
        }
    }
}

/// Frame decode errors
#[derive(Debug)]
pub enum FrameError {
    /// Resource does not exist in the store
    Missing(PathBuf),
    Io(String),
    /// Corrupt or undecodable image data
    Decode(String),
    /// Pixel allocation for the decode failed
    OutOfMemory { bytes: usize },
    UnsupportedFormat(String),
}

impl FrameError {
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, FrameError::OutOfMemory { .. })
    }
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Missing(p) => write!(f, "Frame resource not found: {}", p.display()),
            FrameError::Io(e) => write!(f, "I/O error: {}", e),
            FrameError::Decode(e) => write!(f, "Decode error: {}", e),
            FrameError::OutOfMemory { bytes } => {
                write!(f, "Out of memory allocating {} bytes", bytes)
            }
            FrameError::UnsupportedFormat(e) => write!(f, "Unsupported format: {}", e),
        }
    }
}

impl std::error::Error for FrameError {}

/// Internal bitmap data protected by mutex
#[derive(Debug)]
struct BitmapData {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    released: bool,
}

/// One decoded image. Storage can be refilled in place via [`Bitmap::reconfigure`].
#[derive(Debug)]
pub struct Bitmap {
    data: Mutex<BitmapData>,
    mutable: bool,
}

impl Bitmap {
    /// Allocate a zeroed bitmap, reporting allocation failure instead of aborting
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<BitmapHandle, FrameError> {
        let bytes = byte_footprint(width, height, format);
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(bytes)
            .map_err(|_| FrameError::OutOfMemory { bytes })?;
        pixels.resize(bytes, 0);

        Ok(Arc::new(Self {
            data: Mutex::new(BitmapData {
                pixels,
                width,
                height,
                format,
                released: false,
            }),
            mutable: true,
        }))
    }

    /// Wrap already packed pixels. Immutable bitmaps are never reused by the pool.
    pub fn from_pixels(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
        mutable: bool,
    ) -> Result<BitmapHandle, FrameError> {
        let expected = byte_footprint(width, height, format);
        if pixels.len() != expected {
            return Err(FrameError::Decode(format!(
                "pixel buffer is {} bytes, {}x{} {:?} needs {}",
                pixels.len(),
                width,
                height,
                format,
                expected
            )));
        }
        Ok(Arc::new(Self {
            data: Mutex::new(BitmapData {
                pixels,
                width,
                height,
                format,
                released: false,
            }),
            mutable,
        }))
    }

    fn lock(&self) -> MutexGuard<'_, BitmapData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn width(&self) -> u32 {
        self.lock().width
    }

    pub fn height(&self) -> u32 {
        self.lock().height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let data = self.lock();
        (data.width, data.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.lock().format
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Bytes used by the current configuration
    pub fn byte_count(&self) -> usize {
        self.lock().pixels.len()
    }

    /// Bytes actually allocated; may exceed `byte_count()` after a smaller reuse
    pub fn allocation_byte_count(&self) -> usize {
        self.lock().pixels.capacity()
    }

    /// Run `f` with read access to the packed pixels
    pub fn with_pixels<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.lock().pixels)
    }

    /// Reshape storage for a new decode, growing only when capacity is short.
    ///
    /// Returns the writable pixel slice via `fill`.
    pub fn reconfigure(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        fill: impl FnOnce(&mut [u8]),
    ) -> Result<(), FrameError> {
        if !self.mutable {
            return Err(FrameError::UnsupportedFormat(
                "cannot reconfigure an immutable bitmap".into(),
            ));
        }
        let bytes = byte_footprint(width, height, format);
        let mut data = self.lock();
        if data.pixels.capacity() < bytes {
            let extra = bytes - data.pixels.len();
            data.pixels
                .try_reserve_exact(extra)
                .map_err(|_| FrameError::OutOfMemory { bytes })?;
        }
        data.pixels.resize(bytes, 0);
        data.width = width;
        data.height = height;
        data.format = format;
        data.released = false;
        fill(data.pixels.as_mut_slice());
        Ok(())
    }

    /// Free pixel storage. The handle stays valid but draws nothing.
    pub fn release(&self) {
        let mut data = self.lock();
        data.pixels = Vec::new();
        data.released = true;
    }
}

/// Bytes needed for `width * height` pixels of `format`
pub fn byte_footprint(width: u32, height: u32, format: PixelFormat) -> usize {
    width as usize * height as usize * format.bytes_per_pixel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(PixelFormat::Argb8888.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgb565.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Argb4444.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Alpha8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::default(), PixelFormat::Rgb565);
    }

    #[test]
    fn test_pack_rgb565() {
        let mut out = [0u8; 2];
        PixelFormat::Rgb565.pack([255, 0, 0, 255], &mut out);
        assert_eq!(u16::from_le_bytes(out), 0xF800);
        PixelFormat::Rgb565.pack([0, 255, 0, 255], &mut out);
        assert_eq!(u16::from_le_bytes(out), 0x07E0);
        PixelFormat::Rgb565.pack([0, 0, 255, 0], &mut out);
        assert_eq!(u16::from_le_bytes(out), 0x001F);
    }

    #[test]
    fn test_reconfigure_reuses_capacity() {
        let bmp = Bitmap::new(10, 10, PixelFormat::Argb8888).unwrap();
        assert_eq!(bmp.byte_count(), 400);

        bmp.reconfigure(8, 8, PixelFormat::Rgb565, |px| px.fill(7)).unwrap();
        assert_eq!(bmp.dimensions(), (8, 8));
        assert_eq!(bmp.byte_count(), 128);
        assert!(bmp.allocation_byte_count() >= 400);
        assert!(bmp.with_pixels(|px| px.iter().all(|&b| b == 7)));
    }

    #[test]
    fn test_immutable_rejects_reconfigure() {
        let bmp = Bitmap::from_pixels(1, 1, PixelFormat::Alpha8, vec![9], false).unwrap();
        assert!(!bmp.is_mutable());
        assert!(bmp.reconfigure(1, 1, PixelFormat::Alpha8, |_| {}).is_err());
    }

    #[test]
    fn test_release_frees_pixels() {
        let bmp = Bitmap::new(4, 4, PixelFormat::Alpha8).unwrap();
        bmp.release();
        assert!(bmp.is_released());
        assert_eq!(bmp.byte_count(), 0);
    }
}
