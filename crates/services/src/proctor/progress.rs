use escape_core::model::Level;

/// Read-only picture of a level screen, for host rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub level: Level,
    pub index: usize,
    pub total: usize,
    pub question: String,
    pub choices: Vec<String>,
    pub selected: Option<usize>,
    pub answered: usize,
    pub remaining_seconds: u32,
    pub violations: u32,
    pub warning_visible: bool,
    pub proctoring_active: bool,
    pub is_last_question: bool,
    pub submitted: bool,
}

impl SessionView {
    /// Minutes and seconds as shown on the countdown, e.g. `4:05`.
    #[must_use]
    pub fn clock_label(&self) -> String {
        format!("{}:{:02}", self.remaining_seconds / 60, self.remaining_seconds % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_label_pads_seconds() {
        let view = SessionView {
            level: Level::new(2),
            index: 0,
            total: 8,
            question: "Q".into(),
            choices: Vec::new(),
            selected: None,
            answered: 0,
            remaining_seconds: 245,
            violations: 0,
            warning_visible: false,
            proctoring_active: true,
            is_last_question: false,
            submitted: false,
        };
        assert_eq!(view.clock_label(), "4:05");
    }
}
