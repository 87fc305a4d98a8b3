//! FlipbookView - host-facing aggregate of one animation surface.
//!
//! Wires the controller, clock, renderer and gesture adapter together the
//! same way for every host. The host supplies resource access, decoding and a
//! redraw hook, then forwards size, draw, scroll and tap events.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::FlipbookConfig;
use crate::core::bitmap_pool::{BitmapReusePool, PoolStats};
use crate::core::clock::FrameClock;
use crate::core::gesture::{GestureInputAdapter, GestureOutcome};
use crate::core::player::{PlaybackController, PlaybackSnapshot, PlaybackState};
use crate::core::renderer::FrameRenderer;
use crate::entities::frame::PixelFormat;
use crate::entities::loader::FrameSource;
use crate::entities::sequence::AnimationSequence;
use crate::entities::traits::{Canvas, FrameDecoder, RedrawRequester, ResourceStore};
use crate::entities::transform::ScaleMode;

pub struct FlipbookView {
    controller: Arc<PlaybackController>,
    clock: FrameClock,
    renderer: Mutex<FrameRenderer>,
    gesture: Mutex<GestureInputAdapter>,
    pool: Arc<BitmapReusePool>,
    recycled: AtomicBool,
}

impl FlipbookView {
    /// Build a view from `config` and start its clock.
    pub fn new(
        config: &FlipbookConfig,
        store: Arc<dyn ResourceStore>,
        decoder: Arc<dyn FrameDecoder>,
        redraw: Arc<dyn RedrawRequester>,
    ) -> Result<Self> {
        config.validate()?;

        let sequence = match config.frame_count {
            Some(count) => AnimationSequence::new(config.template.clone(), count),
            None => AnimationSequence::discover(config.template.clone(), store.as_ref()),
        };
        if sequence.is_empty() {
            warn!("No frames for {}", sequence.template());
        }

        let pool = Arc::new(BitmapReusePool::new(config.reuse_rule));
        let controller = Arc::new(PlaybackController::new(
            sequence.frame_count(),
            config.playback_settings(),
            redraw,
        ));

        let mut source = FrameSource::new(sequence, store, decoder, Arc::clone(&pool));
        source.set_pixel_format(config.pixel_format);
        source.set_sample_size(config.sample_size);
        let renderer = FrameRenderer::new(Arc::clone(&controller), source, config.scale_mode);

        let clock = FrameClock::spawn(Arc::clone(&controller)).context("Failed to start frame clock")?;
        info!("FlipbookView ready: {:?}", controller.snapshot());

        // First frame is drawn as soon as the host honors this
        controller.request_redraw();

        Ok(Self {
            controller,
            clock,
            renderer: Mutex::new(renderer),
            gesture: Mutex::new(GestureInputAdapter::new(config.speed_threshold())),
            pool,
            recycled: AtomicBool::new(false),
        })
    }

    fn renderer(&self) -> MutexGuard<'_, FrameRenderer> {
        self.renderer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn gesture(&self) -> MutexGuard<'_, GestureInputAdapter> {
        self.gesture.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.controller
    }

    // === Transport ===

    pub fn play(&self, extra_delay: Duration) {
        self.controller.play(extra_delay);
    }

    pub fn pause(&self) {
        self.controller.pause();
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    pub fn play_to_frame(&self, target: usize, extra_delay: Duration) {
        self.controller.play_to_frame(target, extra_delay);
    }

    pub fn set_current_frame(&self, index: usize) {
        self.controller.set_current_frame(index);
    }

    pub fn set_repeat(&self, repeat: bool) {
        self.controller.set_repeat(repeat);
    }

    pub fn set_frame_duration(&self, duration: Duration) {
        self.controller.set_frame_duration(duration);
    }

    pub fn set_gesture_scrub_enabled(&self, enabled: bool) {
        self.controller.set_gesture_scrub_enabled(enabled);
    }

    pub fn set_play_enabled(&self, enabled: bool) {
        self.controller.set_play_enabled(enabled);
    }

    pub fn set_speed_threshold(&self, threshold: Duration) {
        self.gesture().set_speed_threshold(threshold);
    }

    // === Rendering options ===

    pub fn set_scale_mode(&self, mode: ScaleMode) {
        self.renderer().set_scale_mode(mode);
    }

    pub fn set_pixel_format(&self, format: PixelFormat) {
        self.renderer().set_pixel_format(format);
    }

    pub fn set_sample_size(&self, sample_size: u32) {
        self.renderer().set_sample_size(sample_size);
    }

    /// Install the frame-changed callback, replacing any previous one
    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(usize, PlaybackState) + Send + Sync + 'static,
    {
        self.renderer().set_listener(Some(Arc::new(listener)));
    }

    pub fn clear_listener(&self) {
        self.renderer().set_listener(None);
    }

    // === Host events ===

    pub fn on_size_changed(&self, width: u32, height: u32) {
        debug!("Viewport {}x{}", width, height);
        self.renderer().set_viewport(width, height);
        self.controller.request_redraw();
    }

    /// Draw pass, called by the host in response to a redraw request.
    ///
    /// The listener runs after the renderer lock is released and may call
    /// back into the view, including `recycle()`.
    pub fn draw(&self, canvas: &mut dyn Canvas) -> Option<usize> {
        if self.is_recycled() {
            return None;
        }
        let pass = self.renderer().render(canvas);
        pass.report(&self.controller)
    }

    /// Drag sample. Returns whether the host should consider it consumed.
    pub fn on_scroll(&self, dx: f32, dy: f32) -> bool {
        if self.is_recycled() || !self.controller.accepts_gestures() {
            return false;
        }
        match self.gesture().on_drag(dx, dy) {
            GestureOutcome::Step(direction) => self.controller.apply_gesture_delta(direction),
            outcome => outcome.handled(),
        }
    }

    /// Start of a new drag; the debounce timer restarts
    pub fn on_drag_start(&self) {
        self.gesture().reset();
    }

    /// Tap toggles play and pause
    pub fn on_single_tap(&self) {
        if self.controller.is_playing() {
            self.controller.pause();
        } else {
            self.controller.play(Duration::ZERO);
        }
    }

    // === Queries ===

    pub fn is_playing(&self) -> bool {
        self.controller.is_playing()
    }

    pub fn current_frame(&self) -> usize {
        self.controller.current_frame()
    }

    pub fn frame_count(&self) -> usize {
        self.controller.frame_count()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.controller.snapshot()
    }

    pub fn pool_stats(&self) -> &PoolStats {
        self.pool.stats()
    }

    /// (frames drawn, decode failures)
    pub fn render_stats(&self) -> (u64, u64) {
        let r = self.renderer();
        (r.frames_drawn(), r.failures())
    }

    pub fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::Acquire)
    }

    /// Stop the clock and free decoded pixels. Idempotent.
    pub fn recycle(&self) {
        if self.recycled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.controller.pause();
        self.clock.shutdown();
        self.renderer().release();
        self.pool.clear();
        info!("FlipbookView recycled");
    }
}

impl Drop for FlipbookView {
    fn drop(&mut self) {
        self.recycle();
    }
}

impl std::fmt::Debug for FlipbookView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlipbookView")
            .field("controller", &self.controller)
            .field("clock", &self.clock)
            .field("recycled", &self.is_recycled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::player::Direction;
    use crate::entities::frame::Bitmap;
    use crate::entities::loader::ImageDecoder;
    use crate::entities::loader::tests::{MemStore, png};
    use crossbeam_channel::{Receiver, unbounded};
    use glam::Affine2;

    #[derive(Default)]
    struct CountingCanvas(usize);

    impl Canvas for CountingCanvas {
        fn draw_bitmap(&mut self, _bitmap: &Bitmap, _transform: &Affine2) {
            self.0 += 1;
        }
    }

    fn frames(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| png(4, 4, [i as u8 * 20, 0, 0, 255])).collect()
    }

    fn view(n: usize, config: FlipbookConfig) -> (FlipbookView, Receiver<()>) {
        let (tx, rx) = unbounded();
        let store = MemStore::with_frames(&config.template, &frames(n));
        let v = FlipbookView::new(
            &config,
            Arc::new(store),
            Arc::new(ImageDecoder),
            Arc::new(move || {
                let _ = tx.send(());
            }),
        )
        .unwrap();
        (v, rx)
    }

    fn paused(n: usize) -> FlipbookConfig {
        FlipbookConfig {
            template: "anim/f_%d.png".into(),
            frame_count: Some(n),
            auto_play: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_requests_first_draw() {
        let (v, rx) = view(3, paused(3));
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        let mut canvas = CountingCanvas::default();
        assert_eq!(v.draw(&mut canvas), Some(0));
        assert_eq!(canvas.0, 1);
        assert!(!v.is_playing());
    }

    #[test]
    fn test_discovered_frame_count() {
        let config = FlipbookConfig {
            frame_count: None,
            ..paused(0)
        };
        let (v, _rx) = view(5, config);
        assert_eq!(v.frame_count(), 5);
    }

    #[test]
    fn test_scroll_steps_frames() {
        let (v, _rx) = view(4, paused(4));
        v.set_speed_threshold(Duration::ZERO);
        assert!(v.on_scroll(-10.0, 0.0));
        assert_eq!(v.current_frame(), 1);
        assert!(v.on_scroll(10.0, 0.0));
        assert_eq!(v.current_frame(), 0);
        // Vertical drags go to the host
        assert!(!v.on_scroll(0.0, 10.0));
        assert_eq!(v.current_frame(), 0);
    }

    #[test]
    fn test_scroll_disabled() {
        let (v, _rx) = view(4, paused(4));
        v.set_gesture_scrub_enabled(false);
        assert!(!v.on_scroll(-10.0, 0.0));
        assert_eq!(v.current_frame(), 0);
    }

    #[test]
    fn test_tap_toggles() {
        let (v, _rx) = view(4, paused(4));
        v.on_single_tap();
        assert!(v.is_playing());
        v.on_single_tap();
        assert!(!v.is_playing());
    }

    #[test]
    fn test_clock_drives_redraws() {
        let config = FlipbookConfig {
            auto_play: true,
            frame_duration_ms: 5,
            ..paused(6)
        };
        let (v, rx) = view(6, config);
        let mut canvas = CountingCanvas::default();
        let mut seen = Vec::new();
        while seen.len() < 4 {
            rx.recv_timeout(Duration::from_secs(2)).expect("redraw");
            if let Some(i) = v.draw(&mut canvas)
                && seen.last() != Some(&i)
            {
                seen.push(i);
            }
        }
        assert!(v.is_playing());
        assert_eq!(v.snapshot().direction, Direction::Advancing);
        assert!(v.pool_stats().hits() > 0);
    }

    #[test]
    fn test_listener_sees_locate_target() {
        let (v, rx) = view(8, paused(8));
        let (ltx, lrx) = unbounded();
        v.set_listener(move |i, s| {
            let _ = ltx.send((i, s));
        });
        v.set_frame_duration(Duration::from_millis(2));
        let mut canvas = CountingCanvas::default();
        v.draw(&mut canvas);
        v.play_to_frame(3, Duration::ZERO);

        let mut last = (0, PlaybackState::Paused);
        while last.0 != 3 {
            rx.recv_timeout(Duration::from_secs(2)).expect("redraw");
            v.draw(&mut canvas);
            while let Ok(event) = lrx.try_recv() {
                last = event;
            }
        }
        assert_eq!(last.1, PlaybackState::Locating);
        assert_eq!(v.snapshot().state, PlaybackState::Paused);
    }

    #[test]
    fn test_recycle_idempotent() {
        let (v, _rx) = view(3, paused(3));
        let mut canvas = CountingCanvas::default();
        v.draw(&mut canvas);
        v.recycle();
        v.recycle();
        assert!(v.is_recycled());
        assert_eq!(v.draw(&mut canvas), None);
        assert!(!v.on_scroll(-10.0, 0.0));
    }

    #[test]
    fn test_listener_can_reenter_and_recycle() {
        let (v, _rx) = view(3, paused(3));
        let v = Arc::new(v);
        let weak = Arc::downgrade(&v);
        v.set_listener(move |_, _| {
            if let Some(v) = weak.upgrade() {
                v.set_scale_mode(ScaleMode::Center);
                v.recycle();
            }
        });

        let (done_tx, done_rx) = unbounded();
        let drawer = Arc::clone(&v);
        let handle = std::thread::spawn(move || {
            let mut canvas = CountingCanvas::default();
            let drawn = drawer.draw(&mut canvas);
            let _ = done_tx.send(drawn);
        });
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(2)), Ok(Some(0)));
        handle.join().unwrap();
        assert!(v.is_recycled());
    }

    #[test]
    fn test_scroll_refused_at_one_shot_boundary() {
        let config = FlipbookConfig {
            repeat: false,
            ..paused(3)
        };
        let (v, _rx) = view(3, config);
        v.set_speed_threshold(Duration::ZERO);
        assert!(!v.on_scroll(10.0, 0.0));
        assert_eq!(v.current_frame(), 0);
        assert!(v.on_scroll(-10.0, 0.0));
        assert_eq!(v.current_frame(), 1);
    }
}
