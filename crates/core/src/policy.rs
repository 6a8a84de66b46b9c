use std::time::Duration;

use thiserror::Error;

use crate::model::Level;

pub const DEFAULT_DURATION_SECS: u32 = 300;
pub const DEFAULT_SUBSET_SIZE: usize = 8;
pub const DEFAULT_VIOLATION_THRESHOLD: u32 = 3;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);
pub const DEFAULT_FORCED_SUBMIT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_VIEWPORT_RATIO: f64 = 0.7;
pub const DEFAULT_SUBMISSION_ATTEMPTS: u32 = 1;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("level must be at least 1")]
    InvalidLevel,
    #[error("session duration must be at least one second")]
    ZeroDuration,
    #[error("question subset size must be at least 1")]
    ZeroSubset,
    #[error("violation threshold must be at least 1")]
    ZeroThreshold,
    #[error("submission attempts must be at least 1")]
    ZeroAttempts,
    #[error("viewport ratio must be within (0, 1], got {0}")]
    InvalidViewportRatio(f64),
}

/// Escalation and integrity knobs shared by every level.
#[derive(Debug, Clone, PartialEq)]
pub struct ProctorPolicy {
    violation_threshold: u32,
    debounce: Duration,
    forced_submit_delay: Duration,
    viewport_ratio: f64,
    submission_attempts: u32,
    retry_backoff: Duration,
}

impl Default for ProctorPolicy {
    fn default() -> Self {
        Self {
            violation_threshold: DEFAULT_VIOLATION_THRESHOLD,
            debounce: DEFAULT_DEBOUNCE,
            forced_submit_delay: DEFAULT_FORCED_SUBMIT_DELAY,
            viewport_ratio: DEFAULT_VIEWPORT_RATIO,
            submission_attempts: DEFAULT_SUBMISSION_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl ProctorPolicy {
    /// Accepted violations at which the session is force-submitted.
    #[must_use]
    pub fn violation_threshold(&self) -> u32 {
        self.violation_threshold
    }

    /// Window after an accepted violation during which further signals are dropped.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    #[must_use]
    pub fn forced_submit_delay(&self) -> Duration {
        self.forced_submit_delay
    }

    /// Minimum viewport/screen ratio on either axis before a resize counts.
    #[must_use]
    pub fn viewport_ratio(&self) -> f64 {
        self.viewport_ratio
    }

    #[must_use]
    pub fn submission_attempts(&self) -> u32 {
        self.submission_attempts
    }

    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }
}

/// Everything that distinguishes one level's controller from another.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelConfig {
    level: Level,
    duration_secs: u32,
    subset_size: usize,
    qualification_score: Option<u32>,
    policy: ProctorPolicy,
}

/// Unvalidated level configuration; `None` fields take defaults.
#[derive(Debug, Clone, Default)]
pub struct LevelConfigDraft {
    pub level: u8,
    pub duration_secs: Option<u32>,
    pub subset_size: Option<usize>,
    pub qualification_score: Option<u32>,
    pub violation_threshold: Option<u32>,
    pub debounce: Option<Duration>,
    pub forced_submit_delay: Option<Duration>,
    pub viewport_ratio: Option<f64>,
    pub submission_attempts: Option<u32>,
    pub retry_backoff: Option<Duration>,
}

impl LevelConfigDraft {
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Validate and fill defaults.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError` for a zero level, duration, subset, threshold or attempt
    /// count, or a viewport ratio outside `(0, 1]`.
    pub fn validate(self) -> Result<LevelConfig, PolicyError> {
        if self.level == 0 {
            return Err(PolicyError::InvalidLevel);
        }
        let level = Level::new(self.level);
        let duration_secs = self.duration_secs.unwrap_or(DEFAULT_DURATION_SECS);
        if duration_secs == 0 {
            return Err(PolicyError::ZeroDuration);
        }
        let subset_size = self.subset_size.unwrap_or(DEFAULT_SUBSET_SIZE);
        if subset_size == 0 {
            return Err(PolicyError::ZeroSubset);
        }
        let violation_threshold = self
            .violation_threshold
            .unwrap_or(DEFAULT_VIOLATION_THRESHOLD);
        if violation_threshold == 0 {
            return Err(PolicyError::ZeroThreshold);
        }
        let submission_attempts = self
            .submission_attempts
            .unwrap_or(DEFAULT_SUBMISSION_ATTEMPTS);
        if submission_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        let viewport_ratio = self.viewport_ratio.unwrap_or(DEFAULT_VIEWPORT_RATIO);
        if !(viewport_ratio > 0.0 && viewport_ratio <= 1.0) {
            return Err(PolicyError::InvalidViewportRatio(viewport_ratio));
        }

        Ok(LevelConfig {
            level,
            duration_secs,
            subset_size,
            qualification_score: self
                .qualification_score
                .or_else(|| default_qualification(level)),
            policy: ProctorPolicy {
                violation_threshold,
                debounce: self.debounce.unwrap_or(DEFAULT_DEBOUNCE),
                forced_submit_delay: self
                    .forced_submit_delay
                    .unwrap_or(DEFAULT_FORCED_SUBMIT_DELAY),
                viewport_ratio,
                submission_attempts,
                retry_backoff: self.retry_backoff.unwrap_or(DEFAULT_RETRY_BACKOFF),
            },
        })
    }
}

fn default_qualification(level: Level) -> Option<u32> {
    match level.value() {
        1 => Some(4),
        2 | 3 => Some(6),
        _ => None,
    }
}

impl LevelConfig {
    /// Stock configuration for a level: five minutes, eight questions.
    #[must_use]
    pub fn for_level(level: Level) -> Self {
        Self {
            level,
            duration_secs: DEFAULT_DURATION_SECS,
            subset_size: DEFAULT_SUBSET_SIZE,
            qualification_score: default_qualification(level),
            policy: ProctorPolicy::default(),
        }
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    #[must_use]
    pub fn subset_size(&self) -> usize {
        self.subset_size
    }

    #[must_use]
    pub fn qualification_score(&self) -> Option<u32> {
        self.qualification_score
    }

    #[must_use]
    pub fn policy(&self) -> &ProctorPolicy {
        &self.policy
    }

    /// Levels without a qualification score never qualify.
    #[must_use]
    pub fn qualifies(&self, score: u32) -> bool {
        self.qualification_score.is_some_and(|min| score >= min)
    }
}
