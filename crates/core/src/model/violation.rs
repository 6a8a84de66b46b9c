use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named cause of an integrity violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationReason {
    FullscreenExit,
    TabSwitch,
    FocusLost,
    WindowResize,
    SuspiciousKey,
}

impl ViolationReason {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::FullscreenExit => "Fullscreen exit",
            Self::TabSwitch => "Tab switch",
            Self::FocusLost => "Focus lost",
            Self::WindowResize => "Window resize",
            Self::SuspiciousKey => "Suspicious key activity",
        }
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-session violation bookkeeping. The count never decreases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationState {
    count: u32,
    last_event_at: Option<DateTime<Utc>>,
    warning_visible: bool,
    forced_submission_pending: bool,
}

impl ViolationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.last_event_at
    }

    #[must_use]
    pub fn warning_visible(&self) -> bool {
        self.warning_visible
    }

    #[must_use]
    pub fn forced_submission_pending(&self) -> bool {
        self.forced_submission_pending
    }

    pub(crate) fn accept(&mut self, at: DateTime<Utc>) -> u32 {
        self.last_event_at = Some(at);
        self.count = self.count.saturating_add(1);
        self.count
    }

    pub(crate) fn set_warning_visible(&mut self, visible: bool) {
        self.warning_visible = visible;
    }

    pub(crate) fn mark_forced_submission(&mut self) {
        self.warning_visible = false;
        self.forced_submission_pending = true;
    }
}
