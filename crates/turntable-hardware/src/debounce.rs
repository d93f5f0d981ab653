//! Debounce state machines for the physical controls.
//!
//! Each machine is fed raw sampled levels (plus a millisecond timestamp
//! where timing matters) and yields at most one discrete event per
//! transition. The polling loops in `reactor` drive them against real pins;
//! tests drive them with synthetic level sequences.

use crate::pins::Level;

/// Minimum hold before an encoder button press counts as deliberate.
pub const SHORT_PRESS_MIN_MS: u64 = 100;
/// Holds at or beyond this are no longer a "short" press.
pub const SHORT_PRESS_MAX_MS: u64 = 500;
/// No motor encoder transition for this long while driven means a stall.
pub const STALL_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchTransition {
    Closed,
    Open,
}

/// Transition-only tracker for a binary input (hinge, push button).
/// Steady state never fires.
#[derive(Debug)]
pub struct SwitchTracker {
    was_closed: bool,
}

impl SwitchTracker {
    pub fn new(initially_closed: bool) -> Self {
        Self {
            was_closed: initially_closed,
        }
    }

    pub fn on_sample(&mut self, closed: bool) -> Option<SwitchTransition> {
        if closed == self.was_closed {
            return None;
        }
        self.was_closed = closed;
        Some(if closed {
            SwitchTransition::Closed
        } else {
            SwitchTransition::Open
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderEvent {
    /// Rotation with the button up. +1 clockwise, -1 anticlockwise.
    FreeRotate(i8),
    /// First rotation edge while the button is held; latched until release.
    DownRotate(i8),
    /// Short isolated press with no rotation during the hold.
    ShortPress,
}

/// Rotary encoder with integrated push button.
///
/// Rotation and short-press are mutually exclusive outcomes of one
/// button-down episode: whichever the user does first wins the hold.
#[derive(Debug)]
pub struct EncoderTracker {
    last_clock: Level,
    button_was_down: bool,
    ignore_until_button_up: bool,
    rotated_during_hold: bool,
    pressed_at_ms: Option<u64>,
}

impl EncoderTracker {
    pub fn new(initial_clock: Level, button_initially_down: bool) -> Self {
        Self {
            last_clock: initial_clock,
            button_was_down: button_initially_down,
            ignore_until_button_up: false,
            rotated_during_hold: false,
            pressed_at_ms: None,
        }
    }

    pub fn on_sample(
        &mut self,
        clock: Level,
        data: Level,
        button_down: bool,
        now_ms: u64,
    ) -> Vec<EncoderEvent> {
        let mut events = Vec::new();

        if !button_down {
            self.ignore_until_button_up = false;
        }

        // the press transition lands before edge classification: a clock
        // edge arriving in the same sample is rotation during this hold
        if button_down && !self.button_was_down {
            self.pressed_at_ms = Some(now_ms);
            self.rotated_during_hold = false;
        }

        if clock != self.last_clock {
            // dt matching clk on the active edge means clockwise
            let direction = if data == clock { 1 } else { -1 };
            if button_down {
                if !self.ignore_until_button_up {
                    self.ignore_until_button_up = true;
                    self.rotated_during_hold = true;
                    events.push(EncoderEvent::DownRotate(direction));
                }
            } else {
                events.push(EncoderEvent::FreeRotate(direction));
            }
        }

        if !button_down && self.button_was_down {
            if let Some(pressed_at) = self.pressed_at_ms.take() {
                let held = now_ms.saturating_sub(pressed_at);
                if !self.rotated_during_hold
                    && (SHORT_PRESS_MIN_MS..SHORT_PRESS_MAX_MS).contains(&held)
                {
                    events.push(EncoderEvent::ShortPress);
                }
            }
            self.rotated_during_hold = false;
        }

        self.button_was_down = button_down;
        self.last_clock = clock;
        events
    }
}

/// Watches the motor-mounted encoder channel while the motor is commanded
/// on. Fires at most once per arming; the next motor start re-arms it.
#[derive(Debug)]
pub struct StallDetector {
    armed: bool,
    last_level: Level,
    last_transition_ms: u64,
    timeout_ms: u64,
}

impl StallDetector {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            armed: false,
            last_level: Level::Low,
            last_transition_ms: 0,
            timeout_ms,
        }
    }

    pub fn arm(&mut self, level: Level, now_ms: u64) {
        self.armed = true;
        self.last_level = level;
        self.last_transition_ms = now_ms;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Returns true exactly once when the stall timeout elapses; the
    /// detector then disarms itself.
    pub fn on_sample(&mut self, level: Level, now_ms: u64) -> bool {
        if !self.armed {
            return false;
        }
        if level != self.last_level {
            self.last_level = level;
            self.last_transition_ms = now_ms;
            return false;
        }
        if now_ms.saturating_sub(self.last_transition_ms) > self.timeout_ms {
            self.armed = false;
            return true;
        }
        false
    }
}
