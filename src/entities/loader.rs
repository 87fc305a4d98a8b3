//! Frame loading: resource store, image decoder, and pool-aware FrameSource
//!
//! Default backends:
//! - `FsResourceStore`: frames on disk under a root directory (glob enumeration)
//! - `ImageDecoder`: `image` crate, packs RGBA8 into the target `PixelFormat`
//!
//! `FrameSource` ties them to an `AnimationSequence` and a `BitmapReusePool`:
//! before decoding it probes the image size and asks the pool for a retired
//! bitmap large enough to be refilled in place.

use std::borrow::Cow;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader, RgbaImage};
use log::{debug, trace};

use super::frame::{byte_footprint, Bitmap, BitmapHandle, FrameError, PixelFormat};
use super::sequence::AnimationSequence;
use super::traits::{FrameDecoder, ResourceStore};
use crate::core::bitmap_pool::BitmapReusePool;

/// Decode target configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub format: PixelFormat,
    /// Downscale factor, rounded down to a power of two (1 = full size)
    pub sample_size: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            format: PixelFormat::default(),
            sample_size: 1,
        }
    }
}

impl DecodeOptions {
    /// Effective power-of-two sample size
    pub fn sample(&self) -> u32 {
        let s = self.sample_size.max(1);
        1 << (31 - s.leading_zeros())
    }

    /// Output dimensions for a source of `width x height`
    pub fn scaled(&self, width: u32, height: u32) -> (u32, u32) {
        let s = self.sample();
        ((width / s).max(1), (height / s).max(1))
    }
}

// ===== Resource Store =====

/// Frames stored as files under `root`
#[derive(Debug, Clone)]
pub struct FsResourceStore {
    root: PathBuf,
}

impl FsResourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceStore for FsResourceStore {
    fn count(&self, folder: &Path) -> io::Result<usize> {
        let dir = self.root.join(folder);
        if !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", dir.display()),
            ));
        }
        let pattern = format!(
            "{}/*",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let entries = glob::glob(&pattern)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let mut count = 0;
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => count += 1,
                Ok(_) => {}
                Err(e) => return Err(e.into_error()),
            }
        }
        Ok(count)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(path))
    }
}

// ===== Decoder =====

/// `image` crate decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl ImageDecoder {
    fn map_error(e: ImageError, options: &DecodeOptions) -> FrameError {
        match e {
            ImageError::Limits(l) => {
                debug!("Decode hit memory limits: {}", l);
                FrameError::OutOfMemory { bytes: 0 }
            }
            ImageError::Unsupported(u) => FrameError::UnsupportedFormat(u.to_string()),
            ImageError::IoError(io) => FrameError::Io(io.to_string()),
            other => FrameError::Decode(format!("{} (target {:?})", other, options.format)),
        }
    }
}

impl FrameDecoder for ImageDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        options: &DecodeOptions,
        reuse: Option<BitmapHandle>,
    ) -> Result<BitmapHandle, FrameError> {
        let img = image::load_from_memory(bytes).map_err(|e| Self::map_error(e, options))?;
        let (width, height) = options.scaled(img.width(), img.height());
        let img = if (width, height) != (img.width(), img.height()) {
            img.resize_exact(width, height, FilterType::Triangle)
        } else {
            img
        };

        let format = options.format;
        let fill = |out: &mut [u8]| pack_into(&img, format, out);

        if let Some(bitmap) = reuse.filter(|b| b.is_mutable()) {
            bitmap.reconfigure(width, height, format, fill)?;
            trace!("Decoded {}x{} {:?} into reused bitmap", width, height, format);
            return Ok(bitmap);
        }

        let bytes = byte_footprint(width, height, format);
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(bytes)
            .map_err(|_| FrameError::OutOfMemory { bytes })?;
        pixels.resize(bytes, 0);
        fill(pixels.as_mut_slice());
        Bitmap::from_pixels(width, height, format, pixels, true)
    }

    fn probe(&self, bytes: &[u8], options: &DecodeOptions) -> Option<(u32, u32)> {
        let (w, h) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()?;
        Some(options.scaled(w, h))
    }
}

fn pack_into(img: &DynamicImage, format: PixelFormat, out: &mut [u8]) {
    // Only non-RGBA8 sources need an intermediate conversion
    let rgba: Cow<'_, RgbaImage> = match img {
        DynamicImage::ImageRgba8(buf) => Cow::Borrowed(buf),
        other => Cow::Owned(other.to_rgba8()),
    };
    let bpp = format.bytes_per_pixel();
    for (px, chunk) in rgba.pixels().zip(out.chunks_exact_mut(bpp)) {
        format.pack(px.0, chunk);
    }
}

// ===== Frame Source =====

/// Produces decoded bitmaps for sequence indices, reusing retired buffers.
pub struct FrameSource {
    sequence: AnimationSequence,
    store: Arc<dyn ResourceStore>,
    decoder: Arc<dyn FrameDecoder>,
    pool: Arc<BitmapReusePool>,
    options: DecodeOptions,
    /// Last retired bitmap, kept alive so the pool can hand it back
    spare: Option<BitmapHandle>,
}

impl FrameSource {
    pub fn new(
        sequence: AnimationSequence,
        store: Arc<dyn ResourceStore>,
        decoder: Arc<dyn FrameDecoder>,
        pool: Arc<BitmapReusePool>,
    ) -> Self {
        Self {
            sequence,
            store,
            decoder,
            pool,
            options: DecodeOptions::default(),
            spare: None,
        }
    }

    pub fn sequence(&self) -> &AnimationSequence {
        &self.sequence
    }

    pub fn pool(&self) -> &Arc<BitmapReusePool> {
        &self.pool
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    pub fn set_pixel_format(&mut self, format: PixelFormat) {
        self.options.format = format;
    }

    pub fn set_sample_size(&mut self, sample_size: u32) {
        self.options.sample_size = sample_size.max(1);
    }

    /// Decode frame `index`.
    pub fn load(&self, index: usize) -> Result<BitmapHandle, FrameError> {
        let path = self.sequence.path(index);
        if !self.sequence.contains(index) {
            return Err(FrameError::Missing(path));
        }

        let bytes = self.store.read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FrameError::Missing(path.clone()),
            io::ErrorKind::OutOfMemory => FrameError::OutOfMemory { bytes: 0 },
            _ => FrameError::Io(format!("{}: {}", path.display(), e)),
        })?;

        let reuse = self
            .decoder
            .probe(&bytes, &self.options)
            .and_then(|(w, h)| self.pool.acquire(w, h, self.options.format));
        let claimed = reuse.clone();

        match self.decoder.decode(&bytes, &self.options, reuse) {
            Ok(bitmap) => {
                debug!(
                    "Loaded frame {} ({}) {}x{} reused={}",
                    index,
                    path.display(),
                    bitmap.width(),
                    bitmap.height(),
                    claimed.is_some_and(|c| Arc::ptr_eq(&c, &bitmap))
                );
                Ok(bitmap)
            }
            Err(e) => {
                // Candidate was removed from the pool but not consumed
                if let Some(candidate) = claimed {
                    self.pool.offer(&candidate);
                }
                Err(e)
            }
        }
    }

    /// Retire `previous` after `current` replaced it: donate it to the pool
    /// unless it is the same bitmap.
    pub fn retire(&mut self, previous: Option<BitmapHandle>, current: &BitmapHandle) {
        let Some(previous) = previous else { return };
        if Arc::ptr_eq(&previous, current) {
            return;
        }
        self.pool.offer(&previous);
        self.spare = Some(previous);
    }

    /// Drop the spare bitmap (teardown)
    pub fn release(&mut self) {
        self.spare = None;
        self.pool.prune();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Encode a solid `w x h` PNG
    pub(crate) fn png(w: u32, h: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// In-memory store keyed by path
    #[derive(Default)]
    pub(crate) struct MemStore {
        pub files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    }

    impl MemStore {
        pub(crate) fn with_frames(template: &str, frames: &[Vec<u8>]) -> Self {
            let seq = AnimationSequence::new(template, frames.len());
            let store = Self::default();
            for (i, f) in frames.iter().enumerate() {
                store.files.lock().unwrap().insert(seq.path(i), f.clone());
            }
            store
        }
    }

    impl ResourceStore for MemStore {
        fn count(&self, folder: &Path) -> io::Result<usize> {
            Ok(self
                .files
                .lock()
                .unwrap()
                .keys()
                .filter(|p| p.parent() == Some(folder))
                .count())
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "missing"))
        }
    }

    fn source(frames: &[Vec<u8>]) -> FrameSource {
        let template = "anim/f_%d.png";
        FrameSource::new(
            AnimationSequence::new(template, frames.len()),
            Arc::new(MemStore::with_frames(template, frames)),
            Arc::new(ImageDecoder),
            Arc::new(BitmapReusePool::default()),
        )
    }

    #[test]
    fn test_sample_size_rounds_to_power_of_two() {
        let opts = DecodeOptions { format: PixelFormat::Rgb565, sample_size: 3 };
        assert_eq!(opts.sample(), 2);
        assert_eq!(opts.scaled(10, 7), (5, 3));
        let opts = DecodeOptions { sample_size: 0, ..opts };
        assert_eq!(opts.sample(), 1);
    }

    #[test]
    fn test_decode_default_rgb565() {
        let src = source(&[png(4, 2, [255, 0, 0, 255])]);
        let bmp = src.load(0).unwrap();
        assert_eq!(bmp.dimensions(), (4, 2));
        assert_eq!(bmp.format(), PixelFormat::Rgb565);
        assert_eq!(bmp.byte_count(), 16);
        assert!(bmp.with_pixels(|px| px.chunks(2).all(|c| u16::from_le_bytes([c[0], c[1]]) == 0xF800)));
    }

    #[test]
    fn test_missing_frame() {
        let src = source(&[png(1, 1, [0; 4])]);
        assert!(matches!(src.load(1), Err(FrameError::Missing(_))));
    }

    #[test]
    fn test_corrupt_frame_is_decode_failure() {
        let src = source(&[b"not an image".to_vec()]);
        let err = src.load(0).unwrap_err();
        assert!(!err.is_out_of_memory());
        assert!(matches!(err, FrameError::Decode(_) | FrameError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_retired_bitmap_is_reused() {
        let mut src = source(&[png(8, 8, [1, 2, 3, 255]), png(8, 8, [4, 5, 6, 255])]);
        let first = src.load(0).unwrap();
        let second = src.load(1).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        src.retire(Some(first.clone()), &second);
        drop(first);
        let third = src.load(0).unwrap();
        assert_eq!(src.pool().stats().hits(), 1);
        assert_eq!(third.dimensions(), (8, 8));
    }

    #[test]
    fn test_retire_same_handle_not_pooled() {
        let mut src = source(&[png(2, 2, [0; 4])]);
        let a = src.load(0).unwrap();
        src.retire(Some(a.clone()), &a);
        assert!(src.pool().is_empty());
    }

    #[test]
    fn test_fs_store_counts_files() {
        let dir = std::env::temp_dir().join(format!("flipbook-fs-{}", std::process::id()));
        let frames = dir.join("frames");
        std::fs::create_dir_all(&frames).unwrap();
        for i in 0..3 {
            std::fs::write(frames.join(format!("f_{}.png", i)), png(1, 1, [0; 4])).unwrap();
        }

        let store = FsResourceStore::new(&dir);
        assert_eq!(store.count(Path::new("frames")).unwrap(), 3);
        assert!(store.count(Path::new("nope")).is_err());
        assert!(!store.read(Path::new("frames/f_2.png")).unwrap().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_pack_rgba_and_rgb_sources_agree() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([200, 100, 50, 255])));
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([200, 100, 50])));

        for format in [PixelFormat::Argb8888, PixelFormat::Rgb565, PixelFormat::Alpha8] {
            let len = byte_footprint(3, 2, format);
            let (mut a, mut b) = (vec![0u8; len], vec![0u8; len]);
            pack_into(&rgba, format, &mut a);
            pack_into(&rgb, format, &mut b);
            assert_eq!(a, b, "{:?}", format);
        }
    }
}
