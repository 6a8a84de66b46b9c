mod loader;
mod progress;
mod runner;
mod session;
mod shuffle;
mod workflow;

// Public API of the proctored level subsystem.
pub use crate::error::ProctorError;
pub use loader::{QuestionSetLoader, build_question_set};
pub use progress::SessionView;
pub use runner::{LevelRunner, PlayerCommand, RunOutcome, SessionEvent};
pub use session::{ProctorSession, SignalOutcome};
pub use shuffle::{shuffle_choices, shuffle_question_set};
pub use workflow::{ProctorLoopService, SubmissionOutcome};
