use thiserror::Error;

use crate::model::{QuestionError, SessionStateError, SnapshotError};
use crate::policy::PolicyError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Level, QuizSession, SessionKey, StudentId};

    fn open_empty() -> Result<QuizSession, Error> {
        let key = SessionKey::new(Level::new(1), StudentId::new(1));
        Ok(QuizSession::new(key, Vec::new(), 300)?)
    }

    #[test]
    fn domain_errors_convert() {
        let err = open_empty().unwrap_err();
        assert!(matches!(err, Error::Session(SessionStateError::Empty)));
        assert_eq!(err.to_string(), "no questions available for session");
    }
}
