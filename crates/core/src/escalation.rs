//! Violation escalation: debounce, count, warn, then force submission.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::{ViolationReason, ViolationState};
use crate::policy::ProctorPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// A forced submission is already pending; nothing more to do.
    Ignored,
    /// Within the debounce window of the previous accepted violation.
    Debounced,
    /// Below threshold: show the dismissible warning.
    Warning { count: u32, reason: ViolationReason },
    /// Threshold reached: show the violation notice and submit after `delay`.
    ForceSubmit {
        count: u32,
        reason: ViolationReason,
        delay: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationEscalation {
    threshold: u32,
    debounce: Duration,
    delay: Duration,
    state: ViolationState,
}

impl ViolationEscalation {
    #[must_use]
    pub fn new(policy: &ProctorPolicy) -> Self {
        Self {
            threshold: policy.violation_threshold(),
            debounce: policy.debounce(),
            delay: policy.forced_submit_delay(),
            state: ViolationState::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &ViolationState {
        &self.state
    }

    pub fn on_violation(&mut self, reason: ViolationReason, now: DateTime<Utc>) -> Escalation {
        if self.state.forced_submission_pending() {
            return Escalation::Ignored;
        }
        if let Some(last) = self.state.last_event_at() {
            let debounce_ms = i64::try_from(self.debounce.as_millis()).unwrap_or(i64::MAX);
            if (now - last).num_milliseconds() < debounce_ms {
                return Escalation::Debounced;
            }
        }

        let count = self.state.accept(now);
        if count >= self.threshold {
            self.state.mark_forced_submission();
            Escalation::ForceSubmit {
                count,
                reason,
                delay: self.delay,
            }
        } else {
            self.state.set_warning_visible(true);
            Escalation::Warning { count, reason }
        }
    }

    /// Hide the warning overlay. Returns true if one was showing.
    pub fn dismiss_warning(&mut self) -> bool {
        let was_visible = self.state.warning_visible();
        self.state.set_warning_visible(false);
        was_visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration as ChronoDuration;

    fn escalation() -> ViolationEscalation {
        ViolationEscalation::new(&ProctorPolicy::default())
    }

    #[test]
    fn signals_within_debounce_collapse() {
        let mut e = escalation();
        let t0 = fixed_now();
        assert!(matches!(
            e.on_violation(ViolationReason::FocusLost, t0),
            Escalation::Warning { count: 1, .. }
        ));
        assert_eq!(
            e.on_violation(ViolationReason::TabSwitch, t0 + ChronoDuration::milliseconds(1999)),
            Escalation::Debounced
        );
        assert_eq!(e.state().count(), 1);
    }

    #[test]
    fn debounce_window_is_measured_from_last_accepted_event() {
        let mut e = escalation();
        let t0 = fixed_now();
        e.on_violation(ViolationReason::TabSwitch, t0);
        e.on_violation(ViolationReason::TabSwitch, t0 + ChronoDuration::milliseconds(1500));
        let outcome =
            e.on_violation(ViolationReason::TabSwitch, t0 + ChronoDuration::milliseconds(2000));
        assert!(matches!(outcome, Escalation::Warning { count: 2, .. }));
    }

    #[test]
    fn two_violations_only_warn() {
        let mut e = escalation();
        let t0 = fixed_now();
        e.on_violation(ViolationReason::TabSwitch, t0);
        let second = e.on_violation(ViolationReason::TabSwitch, t0 + ChronoDuration::seconds(3));
        assert_eq!(
            second,
            Escalation::Warning {
                count: 2,
                reason: ViolationReason::TabSwitch
            }
        );
        assert!(e.state().warning_visible());
        assert!(!e.state().forced_submission_pending());
    }

    #[test]
    fn third_violation_forces_submission_once() {
        let mut e = escalation();
        let t0 = fixed_now();
        for i in 0..2 {
            e.on_violation(ViolationReason::TabSwitch, t0 + ChronoDuration::seconds(3 * i));
        }
        let third = e.on_violation(ViolationReason::TabSwitch, t0 + ChronoDuration::seconds(6));
        assert_eq!(
            third,
            Escalation::ForceSubmit {
                count: 3,
                reason: ViolationReason::TabSwitch,
                delay: Duration::from_secs(1)
            }
        );
        assert!(e.state().forced_submission_pending());
        assert!(!e.state().warning_visible());

        let fourth = e.on_violation(ViolationReason::FocusLost, t0 + ChronoDuration::seconds(9));
        assert_eq!(fourth, Escalation::Ignored);
        assert_eq!(e.state().count(), 3);
    }

    #[test]
    fn dismiss_hides_warning() {
        let mut e = escalation();
        e.on_violation(ViolationReason::FullscreenExit, fixed_now());
        assert!(e.dismiss_warning());
        assert!(!e.dismiss_warning());
        assert_eq!(e.state().count(), 1);
    }

    #[test]
    fn threshold_is_configurable() {
        let mut draft = crate::policy::LevelConfigDraft::new(2);
        draft.violation_threshold = Some(1);
        let config = draft.validate().unwrap();
        let mut e = ViolationEscalation::new(config.policy());
        assert!(matches!(
            e.on_violation(ViolationReason::WindowResize, fixed_now()),
            Escalation::ForceSubmit { count: 1, .. }
        ));
    }
}
