//! Playback state machine for flip-book sequences
//!
//! **Architecture**: PlaybackController owns the playback session behind a
//! mutex. Foreground calls (play/pause/locate/gestures) and the FrameClock
//! thread both go through it; every transition notifies a condition variable
//! so the clock can sleep while there is nothing to advance.
//!
//! **Used by**: FrameClock (`advance_one_tick`), FrameRenderer (snapshot,
//! `finish_locate`), FlipbookView (public controls), GestureInputAdapter output
//!
//! # States
//!
//! - **Playing**: advance one frame per tick in the travel direction, wrapping
//!   when repeat is on, stopping at the boundary frame when it is off
//! - **Paused**: no movement
//! - **Locating**: travel to a target frame along the shorter cyclic path,
//!   then return to Paused once the frame has been rendered
//!
//! # Redraw Coalescing
//!
//! Index changes call `request_redraw()`. Only the first request after a draw
//! pass reaches the host; the renderer clears the flag when it starts drawing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::entities::traits::RedrawRequester;

/// Frame duration used when none is configured
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    Playing,
    Paused,
    Locating,
}

impl PlaybackState {
    /// Playing or Locating
    pub fn is_active(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Locating)
    }
}

/// Direction of travel through the index space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Advancing,
    Retreating,
}

impl Direction {
    /// Next index one step in this direction, wrapping within `[0, count)`
    pub fn step(self, index: usize, count: usize) -> usize {
        match self {
            Direction::Advancing => (index + 1) % count,
            Direction::Retreating => {
                if index == 0 {
                    count - 1
                } else {
                    index - 1
                }
            }
        }
    }

    /// Boundary frame where non-repeating travel stops
    pub fn terminal(self, count: usize) -> usize {
        match self {
            Direction::Advancing => count.saturating_sub(1),
            Direction::Retreating => 0,
        }
    }
}

/// Shorter cyclic path from `current` to `target`; advancing wins ties.
pub fn shortest_direction(current: usize, target: usize, count: usize) -> Direction {
    if count == 0 {
        return Direction::Advancing;
    }
    let forward = (target + count - current) % count;
    let backward = (current + count - target) % count;
    if forward <= backward {
        Direction::Advancing
    } else {
        Direction::Retreating
    }
}

/// Initial controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    pub auto_play: bool,
    pub repeat: bool,
    pub frame_duration: Duration,
    pub play_enabled: bool,
    pub gesture_enabled: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            auto_play: true,
            repeat: true,
            frame_duration: DEFAULT_FRAME_DURATION,
            play_enabled: true,
            gesture_enabled: true,
        }
    }
}

/// Mutable playback session, always accessed under the controller mutex
#[derive(Debug, Clone)]
struct PlaybackSession {
    state: PlaybackState,
    current: usize,
    target: Option<usize>,
    repeat: bool,
    direction: Direction,
    extra_delay: Option<Duration>,
    frame_duration: Duration,
    play_enabled: bool,
    gesture_enabled: bool,
    /// Bumped by every accepted play/locate; restarts the clock's current wait
    generation: u64,
}

/// Consistent view of the session at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub current_frame: usize,
    pub target_frame: Option<usize>,
    pub repeat: bool,
    pub direction: Direction,
    pub frame_duration: Duration,
}

/// Work handed to the clock for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TickPlan {
    pub extra_delay: Option<Duration>,
    pub frame_duration: Duration,
    /// Session generation the plan was taken under
    pub generation: u64,
}

/// How a clock wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pace {
    Elapsed,
    /// A newer play/locate arrived; the tick must be replanned
    Restarted,
    Shutdown,
}

pub struct PlaybackController {
    session: Mutex<PlaybackSession>,
    changed: Condvar,
    frame_count: usize,
    redraw: Arc<dyn RedrawRequester>,
    redraw_pending: AtomicBool,
}

impl PlaybackController {
    pub fn new(
        frame_count: usize,
        settings: PlaybackSettings,
        redraw: Arc<dyn RedrawRequester>,
    ) -> Self {
        let frame_duration = if settings.frame_duration.is_zero() {
            DEFAULT_FRAME_DURATION
        } else {
            settings.frame_duration
        };
        let state = if settings.auto_play && settings.play_enabled {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        };
        info!(
            "PlaybackController: {} frames, {:?}, {}ms/frame, repeat={}",
            frame_count,
            state,
            frame_duration.as_millis(),
            settings.repeat
        );

        Self {
            session: Mutex::new(PlaybackSession {
                state,
                current: 0,
                target: None,
                repeat: settings.repeat,
                direction: Direction::Advancing,
                extra_delay: None,
                frame_duration,
                play_enabled: settings.play_enabled,
                gesture_enabled: settings.gesture_enabled,
                generation: 0,
            }),
            changed: Condvar::new(),
            frame_count,
            redraw,
            redraw_pending: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate the session and wake the clock
    fn update<R>(&self, f: impl FnOnce(&mut PlaybackSession) -> R) -> R {
        let r = f(&mut self.lock());
        self.changed.notify_all();
        r
    }

    // === Redraw coalescing ===

    /// Ask the host for a draw pass unless one is already pending
    pub fn request_redraw(&self) {
        if !self.redraw_pending.swap(true, Ordering::AcqRel) {
            self.redraw.request_redraw();
        }
    }

    /// Clear the pending flag; returns whether a redraw had been requested
    pub fn take_redraw_request(&self) -> bool {
        self.redraw_pending.swap(false, Ordering::AcqRel)
    }

    // === Queries ===

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn current_frame(&self) -> usize {
        self.lock().current
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }

    /// Playing or Locating
    pub fn is_playing(&self) -> bool {
        self.lock().state.is_active()
    }

    pub fn repeat(&self) -> bool {
        self.lock().repeat
    }

    pub fn frame_duration(&self) -> Duration {
        self.lock().frame_duration
    }

    /// Whether a drag gesture would currently be applied
    pub fn accepts_gestures(&self) -> bool {
        let s = self.lock();
        s.gesture_enabled && s.play_enabled && !s.state.is_active()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let s = self.lock();
        PlaybackSnapshot {
            state: s.state,
            current_frame: s.current,
            target_frame: s.target,
            repeat: s.repeat,
            direction: s.direction,
            frame_duration: s.frame_duration,
        }
    }

    // === Settings ===

    pub fn set_repeat(&self, repeat: bool) {
        self.update(|s| s.repeat = repeat);
    }

    /// Zero durations are ignored
    pub fn set_frame_duration(&self, duration: Duration) {
        if duration.is_zero() {
            debug!("Ignoring zero frame duration");
            return;
        }
        self.update(|s| s.frame_duration = duration);
    }

    pub fn set_gesture_scrub_enabled(&self, enabled: bool) {
        self.update(|s| s.gesture_enabled = enabled);
    }

    pub fn set_play_enabled(&self, enabled: bool) {
        self.update(|s| s.play_enabled = enabled);
    }

    // === Transport ===

    /// Start playing forward. `extra_delay` is waited once before the next advance.
    ///
    /// Restarts from frame 0 when a non-repeating sequence sits on its last frame.
    pub fn play(&self, extra_delay: Duration) {
        let count = self.frame_count;
        self.update(|s| {
            if !s.play_enabled || s.state.is_active() {
                return;
            }
            s.direction = Direction::Advancing;
            if !s.repeat && s.current == Direction::Advancing.terminal(count) {
                s.current = 0;
            }
            s.target = None;
            s.state = PlaybackState::Playing;
            s.extra_delay = (!extra_delay.is_zero()).then_some(extra_delay);
            s.generation += 1;
            trace!("Playback started at frame {}", s.current);
        });
    }

    /// Idempotent
    pub fn pause(&self) {
        let mut s = self.lock();
        if s.state == PlaybackState::Paused {
            return;
        }
        s.state = PlaybackState::Paused;
        s.target = None;
        drop(s);
        self.changed.notify_all();
        trace!("Playback paused");
    }

    /// Pause and rewind to frame 0
    pub fn stop(&self) {
        self.update(|s| {
            s.state = PlaybackState::Paused;
            s.current = 0;
            s.target = None;
        });
        trace!("Playback stopped");
        self.request_redraw();
    }

    /// Travel to `target` along the shorter cyclic path, then pause there.
    ///
    /// Ignored when out of range or already playing/locating.
    pub fn play_to_frame(&self, target: usize, extra_delay: Duration) {
        if target >= self.frame_count {
            return;
        }
        let count = self.frame_count;
        let redraw_now = self.update(|s| {
            if s.state.is_active() {
                return false;
            }
            s.target = Some(target);
            s.state = PlaybackState::Locating;
            if s.current == target {
                return true;
            }
            s.direction = shortest_direction(s.current, target, count);
            s.repeat = true;
            s.extra_delay = (!extra_delay.is_zero()).then_some(extra_delay);
            s.generation += 1;
            debug!(
                "Locating {} -> {} ({:?})",
                s.current, target, s.direction
            );
            false
        });
        // Already there: render once so listeners see the Locating frame
        if redraw_now {
            self.request_redraw();
        }
    }

    /// Jump directly; ignored when out of range or unchanged. Play state is kept.
    pub fn set_current_frame(&self, index: usize) {
        if index >= self.frame_count {
            return;
        }
        let moved = self.update(|s| {
            if s.current == index {
                return false;
            }
            s.current = index;
            true
        });
        if moved {
            self.request_redraw();
        }
    }

    /// One clock tick. Returns the new index when the frame moved.
    pub fn advance_one_tick(&self) -> Option<usize> {
        let count = self.frame_count;
        if count == 0 {
            return None;
        }
        let mut s = self.lock();
        let moved = match s.state {
            PlaybackState::Paused => None,
            PlaybackState::Locating => match s.target {
                Some(target) if target != s.current => {
                    s.current = s.direction.step(s.current, count);
                    Some(s.current)
                }
                _ => None,
            },
            PlaybackState::Playing => {
                if !s.repeat && s.current == s.direction.terminal(count) {
                    s.state = PlaybackState::Paused;
                    trace!("Reached frame {} without repeat, pausing", s.current);
                    None
                } else {
                    s.current = s.direction.step(s.current, count);
                    Some(s.current)
                }
            }
        };
        drop(s);
        self.changed.notify_all();

        if let Some(index) = moved {
            trace!("Tick -> frame {}", index);
            self.request_redraw();
        }
        moved
    }

    /// Manual one-step move from a drag gesture. Returns true when the frame moved.
    ///
    /// Ignored while playing/locating or when gestures or playback are disabled.
    pub fn apply_gesture_delta(&self, direction: Direction) -> bool {
        let count = self.frame_count;
        if count == 0 {
            return false;
        }
        let moved = self.update(|s| {
            if !s.gesture_enabled || !s.play_enabled || s.state.is_active() {
                return false;
            }
            if !s.repeat && s.current == direction.terminal(count) {
                return false;
            }
            s.current = direction.step(s.current, count);
            true
        });
        if moved {
            self.request_redraw();
        }
        moved
    }

    /// End a locate once `index` (the target) has been rendered and reported.
    pub fn finish_locate(&self, index: usize) -> bool {
        let mut s = self.lock();
        if s.state != PlaybackState::Locating || s.target != Some(index) || s.current != index {
            return false;
        }
        s.state = PlaybackState::Paused;
        s.target = None;
        drop(s);
        self.changed.notify_all();
        debug!("Located frame {}", index);
        true
    }

    // === Clock support ===

    /// Block until the session can advance or `shutdown` is set.
    ///
    /// Takes the pending extra delay. Returns None on shutdown.
    pub(crate) fn wait_for_work(&self, shutdown: &AtomicBool) -> Option<TickPlan> {
        let count = self.frame_count;
        let mut s = self.lock();
        loop {
            if shutdown.load(Ordering::Acquire) {
                return None;
            }
            let can_advance = count > 0
                && match s.state {
                    PlaybackState::Playing => true,
                    PlaybackState::Locating => s.target.is_some_and(|t| t != s.current),
                    PlaybackState::Paused => false,
                };
            if can_advance {
                return Some(TickPlan {
                    extra_delay: s.extra_delay.take(),
                    frame_duration: s.frame_duration,
                    generation: s.generation,
                });
            }
            s = self.changed.wait(s).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Sleep for `duration` on behalf of the tick planned at `generation`.
    ///
    /// Cut short by shutdown, or by a play/locate accepted after the plan was taken.
    pub(crate) fn pace(&self, duration: Duration, generation: u64, shutdown: &AtomicBool) -> Pace {
        let s = self.lock();
        let (s, _) = self
            .changed
            .wait_timeout_while(s, duration, |s| {
                !shutdown.load(Ordering::Acquire) && s.generation == generation
            })
            .unwrap_or_else(|e| e.into_inner());
        if shutdown.load(Ordering::Acquire) {
            Pace::Shutdown
        } else if s.generation != generation {
            Pace::Restarted
        } else {
            Pace::Elapsed
        }
    }

    /// Wake every waiter (used after setting a shutdown flag)
    pub(crate) fn wake(&self) {
        let _guard = self.lock();
        self.changed.notify_all();
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("frame_count", &self.frame_count)
            .field("session", &self.snapshot())
            .finish()
    }
}
