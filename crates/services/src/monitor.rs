//! Capability boundary between the proctored session and its host environment.
//!
//! The host (a browser shell, a terminal, a test) reports `EnvironmentSignal`s and
//! receives `HostCommand`s back; the runner only ever talks to `EnvironmentMonitor`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use escape_core::integrity::EnvironmentSignal;

use crate::error::MonitorError;

/// Requests the session makes of its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Enter (or re-enter) fullscreen.
    RequestFullscreen,
    /// Undo a back/forward navigation by re-pushing the current entry.
    RestoreHistory,
    /// Listeners are gone; the host may stop reporting.
    Detached,
}

#[async_trait]
pub trait EnvironmentMonitor: Send {
    /// Register listeners with the host.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Disconnected` if the host is gone.
    async fn attach(&mut self) -> Result<(), MonitorError>;

    /// # Errors
    ///
    /// Returns `MonitorError` if the host refused or is gone.
    async fn request_fullscreen(&mut self) -> Result<(), MonitorError>;

    async fn suppress_navigation(&mut self);

    /// Next signal from the host. `None` once the host stops reporting.
    ///
    /// Must be cancel-safe: it is polled inside `tokio::select!`.
    async fn next_signal(&mut self) -> Option<EnvironmentSignal>;

    /// Unregister listeners. Idempotent.
    async fn detach(&mut self);
}

/// Host side of a [`ChannelMonitor`].
#[derive(Debug)]
pub struct MonitorHandle {
    pub signals: mpsc::Sender<EnvironmentSignal>,
    pub commands: mpsc::UnboundedReceiver<HostCommand>,
}

/// Monitor backed by tokio channels, for hosts living in another task.
#[derive(Debug)]
pub struct ChannelMonitor {
    signals: mpsc::Receiver<EnvironmentSignal>,
    commands: mpsc::UnboundedSender<HostCommand>,
    attached: bool,
}

impl ChannelMonitor {
    #[must_use]
    pub fn pair(buffer: usize) -> (Self, MonitorHandle) {
        let (signal_tx, signal_rx) = mpsc::channel(buffer.max(1));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (
            Self {
                signals: signal_rx,
                commands: command_tx,
                attached: false,
            },
            MonitorHandle {
                signals: signal_tx,
                commands: command_rx,
            },
        )
    }

    fn send(&self, command: HostCommand) -> Result<(), MonitorError> {
        self.commands
            .send(command)
            .map_err(|_| MonitorError::Disconnected)
    }
}

#[async_trait]
impl EnvironmentMonitor for ChannelMonitor {
    async fn attach(&mut self) -> Result<(), MonitorError> {
        if self.commands.is_closed() {
            return Err(MonitorError::Disconnected);
        }
        self.attached = true;
        Ok(())
    }

    async fn request_fullscreen(&mut self) -> Result<(), MonitorError> {
        self.send(HostCommand::RequestFullscreen)
    }

    async fn suppress_navigation(&mut self) {
        if self.send(HostCommand::RestoreHistory).is_err() {
            tracing::debug!("host gone while restoring history");
        }
    }

    async fn next_signal(&mut self) -> Option<EnvironmentSignal> {
        if !self.attached {
            return std::future::pending().await;
        }
        self.signals.recv().await
    }

    async fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        self.signals.close();
        if let Err(err) = self.send(HostCommand::Detached) {
            tracing::debug!(error = %err, "host gone before detach");
        }
    }
}

/// Calls recorded by a [`ScriptedMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCall {
    Attach,
    RequestFullscreen,
    SuppressNavigation,
    Detach,
}

/// Fake monitor that replays a fixed script of signals and records every call.
///
/// Once the script is exhausted `next_signal` never resolves, like a quiet host.
#[derive(Debug, Clone, Default)]
pub struct ScriptedMonitor {
    script: VecDeque<EnvironmentSignal>,
    calls: Arc<Mutex<Vec<MonitorCall>>>,
    refuse_fullscreen: bool,
}

impl ScriptedMonitor {
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = EnvironmentSignal>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn refusing_fullscreen(mut self) -> Self {
        self.refuse_fullscreen = true;
        self
    }

    /// Shared view of the recorded calls; stays valid after the monitor moves.
    #[must_use]
    pub fn call_log(&self) -> Arc<Mutex<Vec<MonitorCall>>> {
        Arc::clone(&self.calls)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<MonitorCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: MonitorCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl EnvironmentMonitor for ScriptedMonitor {
    async fn attach(&mut self) -> Result<(), MonitorError> {
        self.record(MonitorCall::Attach);
        Ok(())
    }

    async fn request_fullscreen(&mut self) -> Result<(), MonitorError> {
        self.record(MonitorCall::RequestFullscreen);
        if self.refuse_fullscreen {
            Err(MonitorError::FullscreenRefused)
        } else {
            Ok(())
        }
    }

    async fn suppress_navigation(&mut self) {
        self.record(MonitorCall::SuppressNavigation);
    }

    async fn next_signal(&mut self) -> Option<EnvironmentSignal> {
        match self.script.pop_front() {
            Some(signal) => Some(signal),
            None => std::future::pending().await,
        }
    }

    async fn detach(&mut self) {
        self.record(MonitorCall::Detach);
    }
}
