//! The unified level state machine: one quiz session, its countdown and its
//! proctoring state, parameterized by `LevelConfig`.

use std::time::Duration;

use chrono::{DateTime, Utc};

use escape_core::escalation::{Escalation, ViolationEscalation};
use escape_core::integrity::{EnvironmentSignal, IntegrityMonitor, SignalVerdict};
use escape_core::model::{
    Advance, AttemptId, Notice, PlayerIdentity, Question, QuizSession, ScoreSubmission,
    SessionKey, SessionSnapshot, SessionStateError, SnapshotError, SubmitTrigger,
    TerminalResult, ViolationState,
};
use escape_core::policy::LevelConfig;
use escape_core::timer::TickOutcome;

use super::progress::SessionView;

/// What an environment signal did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Ignored,
    NavigationBlocked,
    Escalated(Escalation),
}

impl SignalOutcome {
    /// Notice the host should show, if any.
    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::NavigationBlocked => Some(Notice::NavigationBlocked),
            Self::Escalated(Escalation::Warning { count, .. }) => {
                Some(Notice::Warning { count: *count })
            }
            Self::Escalated(Escalation::ForceSubmit { reason, .. }) => {
                Some(Notice::ViolationDetected { reason: *reason })
            }
            _ => None,
        }
    }

    /// Delay before the forced submission, when this outcome scheduled one.
    #[must_use]
    pub fn forced_submit_delay(&self) -> Option<Duration> {
        match self {
            Self::Escalated(Escalation::ForceSubmit { delay, .. }) => Some(*delay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProctorSession {
    attempt: AttemptId,
    config: LevelConfig,
    player: PlayerIdentity,
    quiz: QuizSession,
    escalation: ViolationEscalation,
    integrity: IntegrityMonitor,
    proctoring: bool,
    resumed: bool,
}

impl ProctorSession {
    /// Start over with a prepared question set.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Empty` if `questions` is empty.
    pub fn new(
        config: LevelConfig,
        player: PlayerIdentity,
        questions: Vec<Question>,
    ) -> Result<Self, SessionStateError> {
        let key = SessionKey::new(config.level(), player.student_id);
        let quiz = QuizSession::new(key, questions, config.duration_secs())?;
        Ok(Self::assemble(config, player, quiz, false))
    }

    /// Continue from a persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the snapshot is empty or already submitted.
    pub fn resume(
        config: LevelConfig,
        player: PlayerIdentity,
        snapshot: SessionSnapshot,
    ) -> Result<Self, SnapshotError> {
        let key = SessionKey::new(config.level(), player.student_id);
        let quiz = snapshot.restore(key, config.duration_secs())?;
        Ok(Self::assemble(config, player, quiz, true))
    }

    fn assemble(
        config: LevelConfig,
        player: PlayerIdentity,
        quiz: QuizSession,
        resumed: bool,
    ) -> Self {
        let escalation = ViolationEscalation::new(config.policy());
        let integrity = IntegrityMonitor::new(config.policy().viewport_ratio());
        Self {
            attempt: AttemptId::generate(),
            config,
            player,
            quiz,
            escalation,
            integrity,
            proctoring: false,
            resumed,
        }
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt
    }

    #[must_use]
    pub fn key(&self) -> SessionKey {
        self.quiz.key()
    }

    #[must_use]
    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    #[must_use]
    pub fn player(&self) -> &PlayerIdentity {
        &self.player
    }

    #[must_use]
    pub fn quiz(&self) -> &QuizSession {
        &self.quiz
    }

    #[must_use]
    pub fn violations(&self) -> &ViolationState {
        self.escalation.state()
    }

    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    #[must_use]
    pub fn is_proctoring(&self) -> bool {
        self.proctoring
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.quiz.is_submitted()
    }

    /// True when the countdown already hit zero, e.g. a snapshot saved at `time: 0`.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.quiz.countdown().is_expired()
    }

    /// The player entered the proctored environment: arm the monitor and start the
    /// countdown. Returns true if the timer started with this call.
    pub fn acknowledge_proctoring(&mut self) -> bool {
        if self.quiz.is_submitted() {
            return false;
        }
        self.proctoring = true;
        self.quiz.start_timer()
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.quiz.tick()
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` if the session is terminal or the choice is invalid.
    pub fn select(&mut self, choice: usize) -> Result<(), SessionStateError> {
        self.quiz.select(choice)
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::Unanswered` if the current question has no answer.
    pub fn next(&mut self) -> Result<Advance, SessionStateError> {
        self.quiz.advance()
    }

    pub fn on_signal(&mut self, signal: &EnvironmentSignal, now: DateTime<Utc>) -> SignalOutcome {
        if self.quiz.is_submitted() {
            return SignalOutcome::Ignored;
        }
        match self.integrity.classify(signal, self.proctoring) {
            SignalVerdict::Ignore => SignalOutcome::Ignored,
            SignalVerdict::BlockNavigation => SignalOutcome::NavigationBlocked,
            SignalVerdict::Violation(reason) => {
                SignalOutcome::Escalated(self.escalation.on_violation(reason, now))
            }
        }
    }

    /// Hide the warning overlay. Returns true if one was showing.
    pub fn dismiss_warning(&mut self) -> bool {
        self.escalation.dismiss_warning()
    }

    /// Check-and-set the terminal flag and build the score payload.
    ///
    /// Returns `Ok(None)` if the session was already submitted. A player-initiated
    /// submission requires every question from the current index onward answered;
    /// forced ones do not. Gaps behind the current index can only come from a
    /// normalized snapshot, are unreachable, and score as incorrect.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Unanswered` for an incomplete player submission.
    pub fn begin_submission(
        &mut self,
        trigger: SubmitTrigger,
    ) -> Result<Option<ScoreSubmission>, SessionStateError> {
        if self.quiz.is_submitted() {
            return Ok(None);
        }
        if !trigger.is_forced() {
            let current = self.quiz.current_index();
            if let Some(offset) = self.quiz.selected_answers()[current..]
                .iter()
                .position(Option::is_none)
            {
                return Err(SessionStateError::Unanswered {
                    index: current + offset,
                });
            }
        }
        self.quiz.mark_submitted();
        Ok(Some(self.submission()))
    }

    fn submission(&self) -> ScoreSubmission {
        ScoreSubmission {
            student_id: self.player.student_id,
            level: self.config.level(),
            score: self.quiz.score(),
            time_taken: self.quiz.time_taken(),
            total_questions: u32::try_from(self.quiz.total_questions()).unwrap_or(u32::MAX),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::capture(&self.quiz)
    }

    /// Payload handed to the results display.
    #[must_use]
    pub fn terminal_result(&self) -> TerminalResult {
        let submission = self.submission();
        TerminalResult {
            student_id: submission.student_id,
            name: self.player.name.clone(),
            college: self.player.college.clone(),
            level: submission.level,
            score: submission.score,
            total: submission.total_questions,
            time_taken: submission.time_taken,
            qualified: self.config.qualifies(submission.score),
        }
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        let question = self.quiz.current_question();
        SessionView {
            level: self.config.level(),
            index: self.quiz.current_index(),
            total: self.quiz.total_questions(),
            question: question.text().to_string(),
            choices: question.choices().to_vec(),
            selected: self.quiz.current_answer(),
            answered: self.quiz.answered_count(),
            remaining_seconds: self.quiz.remaining_seconds(),
            violations: self.violations().count(),
            warning_visible: self.violations().warning_visible(),
            proctoring_active: self.proctoring,
            is_last_question: self.quiz.is_last_question(),
            submitted: self.quiz.is_submitted(),
        }
    }
}
