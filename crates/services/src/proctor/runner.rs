//! Tokio driver for one proctored level.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::Instrument;

use escape_core::integrity::EnvironmentSignal;
use escape_core::model::{Advance, Notice, SessionStateError, SubmitTrigger};
use escape_core::timer::TickOutcome;

use super::progress::SessionView;
use super::session::{ProctorSession, SignalOutcome};
use super::workflow::{ProctorLoopService, SubmissionOutcome};
use crate::monitor::EnvironmentMonitor;

const TICK: Duration = Duration::from_secs(1);

/// Player input forwarded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Accept the proctoring prompt; requests fullscreen and starts the countdown.
    Acknowledge,
    Select(usize),
    Next,
    DismissWarning,
    Submit,
    Quit,
}

/// Display updates for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Updated(SessionView),
    Tick { remaining: u32 },
    Notice(Notice),
    FullscreenRefused,
    Rejected(SessionStateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Submitted(SubmissionOutcome),
    /// The player left; the snapshot stays for reload recovery. Leaving while a
    /// forced submission is pending submits instead.
    Abandoned,
}

enum Step {
    Tick,
    ForcedDeadline,
    Signal(Option<EnvironmentSignal>),
    Command(Option<PlayerCommand>),
}

pub struct LevelRunner<M> {
    service: ProctorLoopService,
    monitor: M,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<M: EnvironmentMonitor> LevelRunner<M> {
    #[must_use]
    pub fn new(
        service: ProctorLoopService,
        monitor: M,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            service,
            monitor,
            events,
        }
    }

    /// Drive `session` until it is submitted or the player leaves. The monitor is
    /// detached on every exit path.
    pub async fn run(
        mut self,
        mut session: ProctorSession,
        commands: mpsc::Receiver<PlayerCommand>,
    ) -> RunOutcome {
        let span = tracing::info_span!(
            "level",
            attempt = %session.attempt_id(),
            student = %session.player().student_id,
            level = %session.config().level(),
        );
        async move {
            if let Err(err) = self.monitor.attach().await {
                tracing::warn!(error = %err, "monitor attach failed");
            }
            self.emit(SessionEvent::Updated(session.view()));

            let outcome = if session.is_expired() {
                tracing::info!("resumed with no time left");
                self.finish(&mut session, SubmitTrigger::Timeout).await
            } else {
                self.event_loop(&mut session, commands).await
            };
            self.monitor.detach().await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn event_loop(
        &mut self,
        session: &mut ProctorSession,
        mut commands: mpsc::Receiver<PlayerCommand>,
    ) -> RunOutcome {
        let mut ticker: Option<Interval> = None;
        let mut forced_at: Option<Instant> = None;
        let mut monitor_open = true;

        loop {
            let step = tokio::select! {
                () = next_tick(&mut ticker) => Step::Tick,
                () = deadline(forced_at) => Step::ForcedDeadline,
                signal = self.monitor.next_signal(), if monitor_open => Step::Signal(signal),
                command = commands.recv() => Step::Command(command),
            };

            match step {
                Step::Tick => match self.service.tick(session).await {
                    TickOutcome::Idle => {}
                    TickOutcome::Ticked { remaining } => {
                        self.emit(SessionEvent::Tick { remaining });
                    }
                    TickOutcome::Expired => {
                        self.emit(SessionEvent::Tick { remaining: 0 });
                        return self.finish(session, SubmitTrigger::Timeout).await;
                    }
                },
                Step::ForcedDeadline => {
                    return self.finish(session, SubmitTrigger::Violations).await;
                }
                Step::Signal(None) => {
                    tracing::debug!("monitor closed");
                    monitor_open = false;
                }
                Step::Signal(Some(signal)) => {
                    let outcome = self.service.handle_signal(session, &signal);
                    if outcome == SignalOutcome::NavigationBlocked {
                        self.monitor.suppress_navigation().await;
                    }
                    if let Some(notice) = outcome.notice() {
                        self.emit(SessionEvent::Notice(notice));
                    }
                    if let Some(delay) = outcome.forced_submit_delay() {
                        forced_at = Some(Instant::now() + delay);
                    }
                }
                Step::Command(None | Some(PlayerCommand::Quit)) => {
                    if forced_at.is_some() {
                        tracing::info!("player left during forced submission delay");
                        return self.finish(session, SubmitTrigger::Violations).await;
                    }
                    tracing::info!("level abandoned; snapshot kept");
                    return RunOutcome::Abandoned;
                }
                Step::Command(Some(command)) => {
                    if forced_at.is_some() {
                        continue;
                    }
                    if let Some(outcome) = self.on_command(session, command, &mut ticker).await {
                        return outcome;
                    }
                }
            }
        }
    }

    async fn on_command(
        &mut self,
        session: &mut ProctorSession,
        command: PlayerCommand,
        ticker: &mut Option<Interval>,
    ) -> Option<RunOutcome> {
        match command {
            PlayerCommand::Acknowledge => {
                if let Err(err) = self.monitor.request_fullscreen().await {
                    tracing::warn!(error = %err, "fullscreen request failed");
                    self.emit(SessionEvent::FullscreenRefused);
                    return None;
                }
                if self.service.acknowledge(session) {
                    let mut interval = time::interval_at(Instant::now() + TICK, TICK);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    *ticker = Some(interval);
                }
                self.emit(SessionEvent::Updated(session.view()));
            }
            PlayerCommand::Select(choice) => match self.service.select(session, choice).await {
                Ok(()) => self.emit(SessionEvent::Updated(session.view())),
                Err(err) => self.emit(SessionEvent::Rejected(err)),
            },
            PlayerCommand::Next => match self.service.next(session).await {
                Ok(Advance::Moved { .. }) => self.emit(SessionEvent::Updated(session.view())),
                Ok(Advance::Finished) => return self.submit_by_player(session).await,
                Err(err) => self.emit(SessionEvent::Rejected(err)),
            },
            PlayerCommand::Submit => return self.submit_by_player(session).await,
            PlayerCommand::DismissWarning => {
                if session.dismiss_warning() {
                    if let Err(err) = self.monitor.request_fullscreen().await {
                        tracing::warn!(error = %err, "fullscreen re-request failed");
                        self.emit(SessionEvent::FullscreenRefused);
                    }
                    self.emit(SessionEvent::Updated(session.view()));
                }
            }
            PlayerCommand::Quit => return Some(RunOutcome::Abandoned),
        }
        None
    }

    async fn submit_by_player(&mut self, session: &mut ProctorSession) -> Option<RunOutcome> {
        match self.service.submit(session, SubmitTrigger::Player).await {
            Ok(outcome) => Some(self.report(outcome)),
            Err(err) => {
                self.emit(SessionEvent::Rejected(err));
                None
            }
        }
    }

    async fn finish(&mut self, session: &mut ProctorSession, trigger: SubmitTrigger) -> RunOutcome {
        match self.service.submit(session, trigger).await {
            Ok(outcome) => self.report(outcome),
            // Forced triggers skip the completeness check.
            Err(err) => {
                tracing::warn!(error = %err, "forced submission rejected");
                RunOutcome::Submitted(SubmissionOutcome::AlreadySubmitted)
            }
        }
    }

    fn report(&self, outcome: SubmissionOutcome) -> RunOutcome {
        if let SubmissionOutcome::Failed { notice } = &outcome {
            self.emit(SessionEvent::Notice(notice.clone()));
        }
        RunOutcome::Submitted(outcome)
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("display gone");
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
