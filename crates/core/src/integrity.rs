//! Classification of raw environment signals into integrity violations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::ViolationReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A key press with its modifier state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPress {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl KeyPress {
    #[must_use]
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            meta: false,
            shift: false,
        }
    }

    #[must_use]
    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    #[must_use]
    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    #[must_use]
    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// Devtools, view-source, print, save and reload shortcuts.
    ///
    /// Ctrl and Cmd are treated alike and letters match case-insensitively.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        if self.key.eq_ignore_ascii_case("F12") {
            return true;
        }
        if !(self.ctrl || self.meta) {
            return false;
        }
        let key = self.key.to_ascii_uppercase();
        let devtools = self.shift && matches!(key.as_str(), "I" | "C");
        devtools || matches!(key.as_str(), "U" | "P" | "S" | "R")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKeyError(String);

impl fmt::Display for ParseKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid key combination: {}", self.0)
    }
}

impl std::error::Error for ParseKeyError {}

impl FromStr for KeyPress {
    type Err = ParseKeyError;

    /// Parses combinations such as `F12`, `ctrl+shift+i` or `cmd+u`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut press = KeyPress::plain("");
        let mut key = None;
        for part in s.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => press.ctrl = true,
                "cmd" | "meta" | "super" => press.meta = true,
                "shift" => press.shift = true,
                "" => return Err(ParseKeyError(s.to_string())),
                _ if key.is_none() => key = Some(part.to_string()),
                _ => return Err(ParseKeyError(s.to_string())),
            }
        }
        press.key = key.ok_or_else(|| ParseKeyError(s.to_string()))?;
        Ok(press)
    }
}

/// Raw observation reported by the host environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentSignal {
    FullscreenChanged { fullscreen: bool },
    VisibilityChanged { hidden: bool },
    WindowBlurred,
    Resized { viewport: Dimensions, screen: Dimensions },
    KeyDown(KeyPress),
    /// Browser back/forward.
    NavigationAttempt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalVerdict {
    Ignore,
    Violation(ViolationReason),
    /// Hard block: re-push the history entry and notify; never counted.
    BlockNavigation,
}

/// Maps signals to verdicts for one level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrityMonitor {
    viewport_ratio: f64,
}

impl IntegrityMonitor {
    #[must_use]
    pub fn new(viewport_ratio: f64) -> Self {
        Self { viewport_ratio }
    }

    /// Classify a signal. Focus, visibility, fullscreen and resize signals only
    /// count while proctoring is active; shortcuts and navigation always apply.
    #[must_use]
    pub fn classify(&self, signal: &EnvironmentSignal, proctoring_active: bool) -> SignalVerdict {
        match signal {
            EnvironmentSignal::FullscreenChanged { fullscreen: false } if proctoring_active => {
                SignalVerdict::Violation(ViolationReason::FullscreenExit)
            }
            EnvironmentSignal::VisibilityChanged { hidden: true } if proctoring_active => {
                SignalVerdict::Violation(ViolationReason::TabSwitch)
            }
            EnvironmentSignal::WindowBlurred if proctoring_active => {
                SignalVerdict::Violation(ViolationReason::FocusLost)
            }
            EnvironmentSignal::Resized { viewport, screen }
                if proctoring_active && self.is_shrunk(*viewport, *screen) =>
            {
                SignalVerdict::Violation(ViolationReason::WindowResize)
            }
            EnvironmentSignal::KeyDown(press) if press.is_forbidden() => {
                SignalVerdict::Violation(ViolationReason::SuspiciousKey)
            }
            EnvironmentSignal::NavigationAttempt => SignalVerdict::BlockNavigation,
            _ => SignalVerdict::Ignore,
        }
    }

    fn is_shrunk(&self, viewport: Dimensions, screen: Dimensions) -> bool {
        // Unknown screen size never counts as a shrink.
        let axis = |view: u32, full: u32| {
            full > 0 && f64::from(view) / f64::from(full) < self.viewport_ratio
        };
        axis(viewport.width, screen.width) || axis(viewport.height, screen.height)
    }
}
