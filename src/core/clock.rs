//! Background frame clock driving the playback controller.
//!
//! One named thread per view. Each iteration:
//! 1. Block on the controller's condition variable until it can advance
//!    (Playing, or Locating away from the target) - no polling while idle
//! 2. Wait a pending one-shot extra delay, if any
//! 3. Wait the frame duration
//! 4. `advance_one_tick()` - the controller decides how to move and requests a redraw
//!
//! A play or locate accepted during steps 2-3 abandons the wait and replans
//! from step 1, so its own extra delay comes before the next advance.
//!
//! Shutdown is terminal: the thread exits, and a new clock must be created
//! to resume ticking. Waits are interrupted promptly on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, trace, warn};

use super::player::{Pace, PlaybackController};

/// Pacing thread for one PlaybackController
pub struct FrameClock {
    controller: Arc<PlaybackController>,
    handle: Mutex<Option<thread::JoinHandle<()>>>, // Thread handle for proper shutdown
    shutdown: Arc<AtomicBool>,                     // Shutdown signal
}

impl FrameClock {
    /// Create a clock without starting it
    pub fn new(controller: Arc<PlaybackController>) -> Self {
        Self {
            controller,
            handle: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create and start a clock
    pub fn spawn(controller: Arc<PlaybackController>) -> std::io::Result<Self> {
        let clock = Self::new(controller);
        clock.start()?;
        Ok(clock)
    }

    /// Start the clock thread. No-op when already running or shut down.
    pub fn start(&self) -> std::io::Result<()> {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() || self.is_shut_down() {
            return Ok(());
        }

        let controller = Arc::clone(&self.controller);
        let shutdown = Arc::clone(&self.shutdown);
        *handle = Some(
            thread::Builder::new()
                .name("flipbook-clock".into())
                .spawn(move || run(&controller, &shutdown))?,
        );
        trace!("FrameClock started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop ticking permanently and join the thread. Idempotent; safe if never started.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.controller.wake();

        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            // Joining ourselves would deadlock (shutdown from a redraw callback on the clock thread)
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("FrameClock thread panicked");
            }
            debug!("FrameClock stopped");
        }
    }
}

fn run(controller: &PlaybackController, shutdown: &AtomicBool) {
    trace!("FrameClock loop entered");
    while let Some(plan) = controller.wait_for_work(shutdown) {
        if let Some(extra) = plan.extra_delay {
            trace!("FrameClock extra delay {}ms", extra.as_millis());
            match controller.pace(extra, plan.generation, shutdown) {
                Pace::Elapsed => {}
                Pace::Restarted => continue,
                Pace::Shutdown => break,
            }
        }
        match controller.pace(plan.frame_duration, plan.generation, shutdown) {
            Pace::Elapsed => {
                controller.advance_one_tick();
            }
            // Replan so a newly requested extra delay is honored before the next advance
            Pace::Restarted => trace!("FrameClock wait restarted"),
            Pace::Shutdown => break,
        }
    }
    trace!("FrameClock loop exited");
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameClock")
            .field("running", &self.is_running())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::player::{PlaybackSettings, PlaybackState};
    use crate::entities::traits::RedrawRequester;
    use crossbeam_channel::{unbounded, Receiver};
    use std::time::{Duration, Instant};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    struct ChannelRedraw(crossbeam_channel::Sender<()>);

    impl RedrawRequester for ChannelRedraw {
        fn request_redraw(&self) {
            let _ = self.0.send(());
        }
    }

    fn setup(count: usize, settings: PlaybackSettings) -> (Arc<PlaybackController>, Receiver<()>) {
        let (tx, rx) = unbounded();
        let c = Arc::new(PlaybackController::new(count, settings, Arc::new(ChannelRedraw(tx))));
        (c, rx)
    }

    /// Wait for a redraw request and acknowledge it like a renderer would
    fn next_frame(c: &PlaybackController, rx: &Receiver<()>) -> Option<usize> {
        rx.recv_timeout(Duration::from_secs(2)).ok()?;
        c.take_redraw_request();
        Some(c.current_frame())
    }

    #[test]
    fn test_clock_advances_while_playing() {
        let settings = PlaybackSettings { frame_duration: ms(5), ..Default::default() };
        let (c, rx) = setup(4, settings);
        let clock = FrameClock::spawn(Arc::clone(&c)).unwrap();

        assert!(next_frame(&c, &rx).is_some());
        assert!(next_frame(&c, &rx).is_some());
        clock.shutdown();
        assert!(!clock.is_running());
    }

    #[test]
    fn test_clock_idle_while_paused() {
        let settings = PlaybackSettings { frame_duration: ms(2), auto_play: false, ..Default::default() };
        let (c, rx) = setup(4, settings);
        let clock = FrameClock::spawn(Arc::clone(&c)).unwrap();

        assert!(rx.recv_timeout(ms(50)).is_err());
        assert_eq!(c.current_frame(), 0);

        c.play(Duration::ZERO);
        assert_eq!(next_frame(&c, &rx), Some(1));
        clock.shutdown();
    }

    #[test]
    fn test_clock_locates_and_stops_moving() {
        let settings = PlaybackSettings { frame_duration: ms(2), auto_play: false, ..Default::default() };
        let (c, rx) = setup(10, settings);
        let clock = FrameClock::spawn(Arc::clone(&c)).unwrap();

        c.play_to_frame(3, Duration::ZERO);
        let mut seen = Vec::new();
        while seen.last() != Some(&3) {
            seen.push(next_frame(&c, &rx).expect("clock stalled"));
        }
        // At the target: no further ticks move the index
        assert!(rx.recv_timeout(ms(40)).is_err());
        assert_eq!(c.state(), PlaybackState::Locating);
        assert_eq!(c.current_frame(), 3);
        clock.shutdown();
    }

    #[test]
    fn test_shutdown_interrupts_long_wait() {
        let settings = PlaybackSettings { frame_duration: Duration::from_secs(30), ..Default::default() };
        let (c, _rx) = setup(4, settings);
        let clock = FrameClock::spawn(Arc::clone(&c)).unwrap();
        std::thread::sleep(ms(10));

        let started = Instant::now();
        clock.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(c.current_frame(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent_and_terminal() {
        let (c, _rx) = setup(4, PlaybackSettings::default());
        let clock = FrameClock::new(Arc::clone(&c));
        clock.shutdown();
        clock.shutdown();
        clock.start().unwrap();
        assert!(!clock.is_running());
        assert!(clock.is_shut_down());
    }

    #[test]
    fn test_extra_delay_applies_once() {
        let settings = PlaybackSettings { frame_duration: ms(2), auto_play: false, ..Default::default() };
        let (c, rx) = setup(4, settings);
        let clock = FrameClock::spawn(Arc::clone(&c)).unwrap();

        let started = Instant::now();
        c.play(ms(60));
        next_frame(&c, &rx).unwrap();
        assert!(started.elapsed() >= ms(60));
        clock.shutdown();
    }

    #[test]
    fn test_replay_during_frame_wait_honors_new_delay() {
        let settings = PlaybackSettings { frame_duration: ms(100), ..Default::default() };
        let (c, rx) = setup(4, settings);
        let clock = FrameClock::spawn(Arc::clone(&c)).unwrap();
        std::thread::sleep(ms(20));

        c.pause();
        let replayed = Instant::now();
        c.play(ms(300));
        assert_eq!(next_frame(&c, &rx), Some(1));
        assert!(replayed.elapsed() >= ms(300), "advanced after {:?}", replayed.elapsed());
        clock.shutdown();
    }
}
