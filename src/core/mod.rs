//! Playback engine - controller, clock, reuse pool, gestures, rendering
//!
//! Independent of any host UI: hosts talk to it through the traits in
//! `entities::traits`.

pub mod bitmap_pool;
pub mod clock;
pub mod gesture;
pub mod player;
pub mod renderer;

// Re-exports for convenience
pub use bitmap_pool::{BitmapReusePool, PoolStats, ReuseRule};
pub use clock::FrameClock;
pub use gesture::{GestureInputAdapter, GestureOutcome};
pub use player::{Direction, PlaybackController, PlaybackSettings, PlaybackSnapshot, PlaybackState};
pub use renderer::{FrameListener, FrameRenderer};
