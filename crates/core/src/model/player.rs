use serde::{Deserialize, Serialize};

use crate::model::StudentId;

/// Who is playing, as established at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub student_id: StudentId,
    pub name: String,
    pub college: String,
}

impl PlayerIdentity {
    /// Blank display fields fall back to "Player" and "College".
    #[must_use]
    pub fn new(student_id: StudentId, name: impl Into<String>, college: impl Into<String>) -> Self {
        Self {
            student_id,
            name: non_blank_or(name.into(), "Player"),
            college: non_blank_or(college.into(), "College"),
        }
    }
}

fn non_blank_or(value: String, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_fall_back() {
        let p = PlayerIdentity::new(StudentId::new(1), "  ", "");
        assert_eq!(p.name, "Player");
        assert_eq!(p.college, "College");
    }
}
