#![forbid(unsafe_code)]

pub mod app_services;
pub mod backend;
pub mod error;
pub mod level_gate;
pub mod monitor;
pub mod proctor;

pub use escape_core::Clock;

pub use app_services::AppServices;
pub use backend::{BackendConfig, HttpBackend, InMemoryBackend, QuizBackend};
pub use error::{AppServicesError, BackendError, LoaderError, MonitorError, ProctorError};
pub use level_gate::{FINAL_LEVEL, LevelAccess, LevelGate, LevelProgress};
pub use monitor::{ChannelMonitor, EnvironmentMonitor, HostCommand, MonitorHandle, ScriptedMonitor};
pub use proctor::{
    LevelRunner, PlayerCommand, ProctorLoopService, ProctorSession, QuestionSetLoader,
    RunOutcome, SessionEvent, SessionView, SignalOutcome, SubmissionOutcome,
};
