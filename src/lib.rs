//! flipbook - flip-book player for numbered still-image sequences
//!
//! Re-exports all modules for use by binary targets.

// Core engine (controller, clock, pool, renderer)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod view;

// Re-export commonly used types
pub use config::FlipbookConfig;
pub use core::player::{PlaybackController, PlaybackState};
pub use entities::{AnimationSequence, Bitmap, Canvas, FrameError, PixelFormat, ScaleMode};
pub use view::FlipbookView;
