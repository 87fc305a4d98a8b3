//! Entities module - frame data, sequences, decoding and host seams

pub mod frame;
pub mod loader;
pub mod sequence;
pub mod traits;
pub mod transform;

pub use frame::{Bitmap, BitmapHandle, FrameError, PixelFormat};
pub use loader::{DecodeOptions, FrameSource, FsResourceStore, ImageDecoder};
pub use sequence::AnimationSequence;
pub use traits::{Canvas, FrameDecoder, RedrawRequester, ResourceStore};
pub use transform::{ScaleMode, scale_transform};
