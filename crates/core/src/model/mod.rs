mod ids;
mod notice;
mod player;
mod question;
mod result;
mod session;
mod snapshot;
mod violation;

pub use ids::{AttemptId, Level, ParseIdError, QuestionId, StudentId};
pub use notice::Notice;
pub use player::PlayerIdentity;
pub use question::{Question, QuestionError, QuestionRecord};
pub use result::{ScoreSubmission, SubmitTrigger, TerminalResult};
pub use session::{Advance, QuizSession, SessionKey, SessionStateError};
pub use snapshot::{SessionSnapshot, SnapshotError};
pub use violation::{ViolationReason, ViolationState};
