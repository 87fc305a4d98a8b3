//! Drag-to-scrub input adapter.
//!
//! Turns drag-distance samples into one-frame direction requests:
//! - Mostly vertical samples (`|dy| > 2|dx|`) are left to the host as scrolling
//! - Samples closer than `speed_threshold` to the last accepted one are
//!   swallowed (reported handled, no frame change)
//! - `dx < 0` (finger moving left) steps forward, `dx > 0` steps backward
//!
//! The adapter never touches frame indices; the controller applies
//! repeat and boundary rules.

use std::time::{Duration, Instant};

use log::trace;

use super::player::Direction;

/// Default minimum spacing between accepted samples
pub const DEFAULT_SPEED_THRESHOLD: Duration = Duration::from_millis(30);

/// Result of feeding one drag sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// Not a horizontal scrub; let the host handle it
    Ignored,
    /// Scrub too fast; consumed without a frame change
    Debounced,
    /// Request one step in this direction
    Step(Direction),
}

impl GestureOutcome {
    /// Whether the host should treat the sample as consumed
    pub fn handled(self) -> bool {
        !matches!(self, GestureOutcome::Ignored)
    }
}

#[derive(Debug, Clone)]
pub struct GestureInputAdapter {
    speed_threshold: Duration,
    /// Time of the last accepted sample
    last_accepted: Option<Instant>,
}

impl Default for GestureInputAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED_THRESHOLD)
    }
}

impl GestureInputAdapter {
    pub fn new(speed_threshold: Duration) -> Self {
        Self {
            speed_threshold,
            last_accepted: None,
        }
    }

    pub fn speed_threshold(&self) -> Duration {
        self.speed_threshold
    }

    pub fn set_speed_threshold(&mut self, threshold: Duration) {
        self.speed_threshold = threshold;
    }

    /// Feed a sample received now
    pub fn on_drag(&mut self, dx: f32, dy: f32) -> GestureOutcome {
        self.on_drag_at(dx, dy, Instant::now())
    }

    /// Feed a sample received at `now`
    pub fn on_drag_at(&mut self, dx: f32, dy: f32, now: Instant) -> GestureOutcome {
        if dy.abs() > dx.abs() * 2.0 {
            return GestureOutcome::Ignored;
        }

        if let Some(last) = self.last_accepted
            && now.saturating_duration_since(last) < self.speed_threshold
        {
            return GestureOutcome::Debounced;
        }
        self.last_accepted = Some(now);

        let direction = if dx < 0.0 {
            Direction::Advancing
        } else {
            Direction::Retreating
        };
        trace!("Drag dx={:.1} dy={:.1} -> {:?}", dx, dy, direction);
        GestureOutcome::Step(direction)
    }

    /// Forget the debounce timer (e.g. at the start of a new drag)
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_vertical_sample_rejected() {
        let mut g = GestureInputAdapter::default();
        let outcome = g.on_drag(2.0, 10.0);
        assert_eq!(outcome, GestureOutcome::Ignored);
        assert!(!outcome.handled());
    }

    #[test]
    fn test_direction_mapping() {
        let mut g = GestureInputAdapter::new(Duration::ZERO);
        assert_eq!(g.on_drag(-5.0, 0.0), GestureOutcome::Step(Direction::Advancing));
        assert_eq!(g.on_drag(5.0, 1.0), GestureOutcome::Step(Direction::Retreating));
    }

    #[test]
    fn test_debounce_keeps_first() {
        let mut g = GestureInputAdapter::new(ms(30));
        let t0 = Instant::now();
        assert_eq!(g.on_drag_at(-4.0, 0.0, t0), GestureOutcome::Step(Direction::Advancing));

        let early = g.on_drag_at(-4.0, 0.0, t0 + ms(10));
        assert_eq!(early, GestureOutcome::Debounced);
        assert!(early.handled());

        // Timer measured from the last accepted sample, not the debounced one
        assert!(matches!(g.on_drag_at(-4.0, 0.0, t0 + ms(30)), GestureOutcome::Step(_)));
    }

    #[test]
    fn test_rejected_sample_does_not_touch_timer() {
        let mut g = GestureInputAdapter::new(ms(30));
        let t0 = Instant::now();
        assert_eq!(g.on_drag_at(0.0, 9.0, t0), GestureOutcome::Ignored);
        assert!(matches!(g.on_drag_at(-1.0, 0.0, t0 + ms(1)), GestureOutcome::Step(_)));
    }

    #[test]
    fn test_reset_clears_timer() {
        let mut g = GestureInputAdapter::new(ms(1000));
        let t0 = Instant::now();
        g.on_drag_at(1.0, 0.0, t0);
        g.reset();
        assert!(matches!(g.on_drag_at(1.0, 0.0, t0 + ms(1)), GestureOutcome::Step(_)));
    }
}
