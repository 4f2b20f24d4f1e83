//! Fixed-rate delta scheduler.
//!
//! Pan motion is summed into two accumulators (pointer move and scroll) and
//! drained at most once per tick. Taps and long-presses skip accumulation and
//! go out immediately.

use crate::{command::CommandMessage, config::FlushPolicy, gesture::GestureEvent};

/// Running sum of positional deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Delta {
    pub dx: f64,
    pub dy: f64,
}

impl Delta {
    #[must_use]
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }

    /// Whether this delta may be flushed under `policy`.
    #[must_use]
    pub fn is_ready(&self, policy: FlushPolicy) -> bool {
        match policy {
            FlushPolicy::BothAxes => self.dx != 0.0 && self.dy != 0.0,
            FlushPolicy::AnyAxis => !self.is_zero(),
        }
    }

    fn add(&mut self, dx: f64, dy: f64) {
        self.dx += dx;
        self.dy += dy;
    }
}

/// Accumulates pan deltas and flushes them as commands.
#[derive(Debug, Clone, Default)]
pub struct DeltaScheduler {
    move_delta: Delta,
    scroll_delta: Delta,
    policy: FlushPolicy,
}

impl DeltaScheduler {
    #[must_use]
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Pending single-finger motion.
    #[must_use]
    pub const fn move_delta(&self) -> Delta {
        self.move_delta
    }

    /// Pending two-finger motion.
    #[must_use]
    pub const fn scroll_delta(&self) -> Delta {
        self.scroll_delta
    }

    /// Fold a gesture into the accumulators.
    ///
    /// Returns a command that must be sent right away (tap and long-press).
    pub fn accumulate(&mut self, event: &GestureEvent) -> Option<CommandMessage> {
        match *event {
            GestureEvent::Tap => Some(CommandMessage::Click),
            GestureEvent::LongPress => Some(CommandMessage::LongPress),
            GestureEvent::PanMove { dx, dy, finger_count: 2 } => {
                self.scroll_delta.add(dx, dy);
                None
            }
            GestureEvent::PanMove { dx, dy, .. } => {
                self.move_delta.add(dx, dy);
                None
            }
            GestureEvent::PanStart { .. } | GestureEvent::PanEnd => None,
        }
    }

    /// Drain at most one accumulator. Move wins over scroll.
    ///
    /// An accumulator that is not ready under the flush policy keeps its
    /// value for the next tick.
    pub fn tick(&mut self) -> Option<CommandMessage> {
        if self.move_delta.is_ready(self.policy) {
            let Delta { dx, dy } = std::mem::take(&mut self.move_delta);
            return Some(CommandMessage::Move { dx, dy });
        }
        if self.scroll_delta.is_ready(self.policy) {
            let Delta { dx, dy } = std::mem::take(&mut self.scroll_delta);
            return Some(CommandMessage::Scroll { dx, dy });
        }
        None
    }
}
