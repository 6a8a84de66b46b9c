//! Per-session countdown: `Stopped -> Running -> Expired`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerState {
    Stopped,
    Running,
    Expired,
}

/// Result of a single one-second tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The timer is not running; nothing changed.
    Idle,
    Ticked { remaining: u32 },
    /// This tick reached zero.
    Expired,
}

/// Countdown clock measured in whole seconds.
///
/// `remaining` never increases and never goes below zero. Once `Expired` the
/// countdown cannot be restarted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    duration: u32,
    remaining: u32,
    state: TimerState,
}

impl Countdown {
    #[must_use]
    pub fn new(duration: u32) -> Self {
        Self::resume(duration, duration)
    }

    /// Rebuild a countdown from persisted remaining time, clamped to `duration`.
    #[must_use]
    pub fn resume(duration: u32, remaining: u32) -> Self {
        let remaining = remaining.min(duration);
        let state = if remaining == 0 {
            TimerState::Expired
        } else {
            TimerState::Stopped
        };
        Self {
            duration,
            remaining,
            state,
        }
    }

    #[must_use]
    pub fn duration(&self) -> u32 {
        self.duration
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Seconds consumed so far.
    #[must_use]
    pub fn elapsed(&self) -> u32 {
        self.duration - self.remaining
    }

    #[must_use]
    pub fn state(&self) -> TimerState {
        self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.state == TimerState::Expired
    }

    /// Start ticking. Returns false unless the countdown was `Stopped`.
    pub fn start(&mut self) -> bool {
        if self.state == TimerState::Stopped {
            self.state = TimerState::Running;
            true
        } else {
            false
        }
    }

    /// Halt a running countdown without expiring it.
    pub fn stop(&mut self) {
        if self.state == TimerState::Running {
            self.state = TimerState::Stopped;
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.state != TimerState::Running {
            return TickOutcome::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = TimerState::Expired;
            TickOutcome::Expired
        } else {
            TickOutcome::Ticked {
                remaining: self.remaining,
            }
        }
    }
}
