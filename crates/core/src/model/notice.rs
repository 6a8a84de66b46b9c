use std::fmt;

use crate::model::{Level, ViolationReason};

/// User-visible messages raised by a level screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Dismissible; dismissal re-requests fullscreen.
    Warning { count: u32 },
    /// Non-dismissible; a forced submission follows.
    ViolationDetected { reason: ViolationReason },
    NavigationBlocked,
    NoQuestions { level: Level },
    LoadFailed,
    SubmissionFailed,
}

impl Notice {
    #[must_use]
    pub fn is_dismissible(&self) -> bool {
        !matches!(
            self,
            Self::ViolationDetected { .. } | Self::NoQuestions { .. } | Self::LoadFailed
        )
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Warning { .. } => {
                "Don't leave fullscreen or switch tabs again, or your quiz will end.".to_string()
            }
            Self::ViolationDetected { reason } => {
                format!("{reason} detected multiple times. Quiz will be submitted.")
            }
            Self::NavigationBlocked => "You cannot go back during the quiz!".to_string(),
            Self::NoQuestions { level } => format!("No questions available for Level {level}."),
            Self::LoadFailed => "Failed to load questions.".to_string(),
            Self::SubmissionFailed => "Failed to submit score.".to_string(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
