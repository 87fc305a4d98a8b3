//! Draw pass: decode the current frame, place it, paint it, notify listeners.
//!
//! **Used by**: FlipbookView::draw (host draw callback)
//!
//! A draw pass:
//! 1. Clears the controller's pending-redraw flag and snapshots the session
//! 2. Decodes only when the frame index changed (or a reload was forced);
//!    repeated redraws of the same frame reuse the held bitmap
//! 3. Recomputes the scale transform when the bitmap, viewport or mode changed
//! 4. Paints, fires the frame listener with `(index, state)`, and ends a
//!    locate once its target has been reported
//!
//! Decode failures are logged and recorded; the previous bitmap stays on
//! screen and playback continues.

use std::sync::Arc;

use glam::Affine2;
use log::{debug, warn};

use super::player::{PlaybackController, PlaybackState};
use crate::entities::frame::{BitmapHandle, FrameError, PixelFormat};
use crate::entities::loader::FrameSource;
use crate::entities::traits::Canvas;
use crate::entities::transform::{scale_transform, ScaleMode};

/// Called once per rendered frame with the frame index and the playback
/// state observed for that frame
pub type FrameListener = Arc<dyn Fn(usize, PlaybackState) + Send + Sync>;

/// Result of [`FrameRenderer::render`], pending listener notification
#[must_use]
#[derive(Default)]
pub struct DrawPass {
    rendered: Option<usize>,
    state: Option<PlaybackState>,
    listener: Option<FrameListener>,
    locate_frame: Option<usize>,
}

impl DrawPass {
    /// Frame painted by this pass, if a new or unchanged frame was shown
    pub fn rendered(&self) -> Option<usize> {
        self.rendered
    }

    /// Fire the listener, then end a locate that reached its target.
    pub fn report(self, controller: &PlaybackController) -> Option<usize> {
        if let (Some(index), Some(state), Some(listener)) = (self.rendered, self.state, &self.listener) {
            listener(index, state);
        }
        if let Some(index) = self.locate_frame {
            controller.finish_locate(index);
        }
        self.rendered
    }
}

pub struct FrameRenderer {
    controller: Arc<PlaybackController>,
    source: FrameSource,
    scale_mode: ScaleMode,
    viewport: (u32, u32),
    current: Option<BitmapHandle>,
    shown_frame: Option<usize>,
    transform: Affine2,
    transform_dirty: bool,
    force_reload: bool,
    listener: Option<FrameListener>,
    last_error: Option<FrameError>,
    failures: u64,
    frames_drawn: u64,
}

impl FrameRenderer {
    pub fn new(controller: Arc<PlaybackController>, source: FrameSource, scale_mode: ScaleMode) -> Self {
        Self {
            controller,
            source,
            scale_mode,
            viewport: (0, 0),
            current: None,
            shown_frame: None,
            transform: Affine2::IDENTITY,
            transform_dirty: true,
            force_reload: false,
            listener: None,
            last_error: None,
            failures: 0,
            frames_drawn: 0,
        }
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn scale_mode(&self) -> ScaleMode {
        self.scale_mode
    }

    pub fn set_scale_mode(&mut self, mode: ScaleMode) {
        if self.scale_mode != mode {
            self.scale_mode = mode;
            self.transform_dirty = true;
            self.controller.request_redraw();
        }
    }

    /// Decode target format; takes effect on the next draw
    pub fn set_pixel_format(&mut self, format: PixelFormat) {
        if self.source.options().format != format {
            self.source.set_pixel_format(format);
            self.force_reload = true;
            self.controller.request_redraw();
        }
    }

    pub fn set_sample_size(&mut self, sample_size: u32) {
        self.source.set_sample_size(sample_size);
        self.force_reload = true;
        self.controller.request_redraw();
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if self.viewport != (width, height) {
            self.viewport = (width, height);
            self.transform_dirty = true;
        }
    }

    pub fn set_listener(&mut self, listener: Option<FrameListener>) {
        self.listener = listener;
    }

    pub fn current_bitmap(&self) -> Option<&BitmapHandle> {
        self.current.as_ref()
    }

    pub fn transform(&self) -> Affine2 {
        self.transform
    }

    /// Most recent decode failure, kept for diagnostics
    pub fn last_error(&self) -> Option<&FrameError> {
        self.last_error.as_ref()
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Run one draw pass and report it. Returns the frame index passed to the listener, if any.
    pub fn draw(&mut self, canvas: &mut dyn Canvas) -> Option<usize> {
        let pass = self.render(canvas);
        pass.report(&self.controller)
    }

    /// Paint without notifying. The returned pass must be reported with
    /// [`DrawPass::report`] once the caller no longer holds the renderer,
    /// so the listener may call back into the owner.
    pub fn render(&mut self, canvas: &mut dyn Canvas) -> DrawPass {
        self.controller.take_redraw_request();
        if self.controller.frame_count() == 0 {
            return DrawPass::default();
        }
        let snap = self.controller.snapshot();
        let index = snap.current_frame;

        let mut rendered = self.shown_frame == Some(index) && self.current.is_some();
        if self.force_reload || !rendered {
            self.force_reload = false;
            rendered = self.load(index);
        }

        if self.transform_dirty
            && let Some(bitmap) = &self.current
        {
            self.transform = scale_transform(bitmap.dimensions(), self.viewport, self.scale_mode);
            self.transform_dirty = false;
        }

        if let Some(bitmap) = &self.current {
            canvas.draw_bitmap(bitmap, &self.transform);
        }
        if rendered {
            self.frames_drawn += 1;
        }

        DrawPass {
            rendered: rendered.then_some(index),
            state: Some(snap.state),
            listener: if rendered { self.listener.clone() } else { None },
            // A failed target frame still ends the locate, otherwise the session would wedge
            locate_frame: (snap.state == PlaybackState::Locating).then_some(index),
        }
    }

    fn load(&mut self, index: usize) -> bool {
        match self.source.load(index) {
            Ok(bitmap) => {
                let previous = self.current.replace(Arc::clone(&bitmap));
                self.source.retire(previous, &bitmap);
                self.shown_frame = Some(index);
                self.transform_dirty = true;
                true
            }
            Err(e) => {
                warn!("Frame {} not rendered: {}", index, e);
                self.failures += 1;
                self.last_error = Some(e);
                false
            }
        }
    }

    /// Release the held bitmap without pooling it (teardown)
    pub fn release(&mut self) {
        if let Some(bitmap) = self.current.take() {
            bitmap.release();
            debug!("Released current bitmap");
        }
        self.shown_frame = None;
        self.source.release();
    }
}
