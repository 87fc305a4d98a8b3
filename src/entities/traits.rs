//! Abstract traits for host collaborators.
//!
//! The flip-book core never touches a window, a filesystem or a codec
//! directly. Hosts plug these in; default implementations live in
//! `entities::loader` (filesystem store, `image` decoder).

use std::io;
use std::path::Path;

use glam::Affine2;

use super::frame::{Bitmap, BitmapHandle, FrameError};
use super::loader::DecodeOptions;

/// Asset storage: enumeration and byte access.
pub trait ResourceStore: Send + Sync {
    /// Number of resources contained in `folder`.
    fn count(&self, folder: &Path) -> io::Result<usize>;

    /// Raw bytes of the resource at `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Image decode facility.
pub trait FrameDecoder: Send + Sync {
    /// Decode `bytes` into the configured pixel format.
    ///
    /// When `reuse` is given the decoder may fill that bitmap in place and
    /// return it instead of allocating.
    fn decode(
        &self,
        bytes: &[u8],
        options: &DecodeOptions,
        reuse: Option<BitmapHandle>,
    ) -> Result<BitmapHandle, FrameError>;

    /// Decoded dimensions without decoding pixels, if the format allows it.
    /// Used to pick a pool candidate before the full decode.
    fn probe(&self, _bytes: &[u8], _options: &DecodeOptions) -> Option<(u32, u32)> {
        None
    }
}

/// Paint target for one draw pass.
pub trait Canvas {
    fn draw_bitmap(&mut self, bitmap: &Bitmap, transform: &Affine2);
}

/// Host redraw scheduling. Calls may come from any thread; the host coalesces.
pub trait RedrawRequester: Send + Sync {
    fn request_redraw(&self);
}

impl<F> RedrawRequester for F
where
    F: Fn() + Send + Sync,
{
    fn request_redraw(&self) {
        self()
    }
}
