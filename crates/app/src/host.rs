//! Line-based terminal host: parses player input and host signals, renders events.

use escape_core::integrity::{Dimensions, EnvironmentSignal, KeyPress};
use escape_core::model::{Level, TerminalResult};
use services::backend::PlayerScore;
use services::monitor::HostCommand;
use services::{LevelAccess, PlayerCommand, SessionEvent, SessionView};

/// Screen size reported alongside `:resize`.
pub const SCREEN: Dimensions = Dimensions {
    width: 1920,
    height: 1080,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostInput {
    Player(PlayerCommand),
    Signal(EnvironmentSignal),
    Help,
    Empty,
    Unknown(String),
}

pub fn parse_line(line: &str) -> HostInput {
    let line = line.trim();
    if line.is_empty() {
        return HostInput::Empty;
    }
    if let Some(signal) = line.strip_prefix(':') {
        return parse_signal(signal)
            .map_or_else(|| HostInput::Unknown(line.to_string()), HostInput::Signal);
    }
    match line.to_ascii_lowercase().as_str() {
        "start" => HostInput::Player(PlayerCommand::Acknowledge),
        "n" | "next" => HostInput::Player(PlayerCommand::Next),
        "s" | "submit" => HostInput::Player(PlayerCommand::Submit),
        "ok" => HostInput::Player(PlayerCommand::DismissWarning),
        "q" | "quit" => HostInput::Player(PlayerCommand::Quit),
        "?" | "help" => HostInput::Help,
        other => match other.parse::<usize>() {
            Ok(choice) if choice > 0 => HostInput::Player(PlayerCommand::Select(choice - 1)),
            _ => HostInput::Unknown(line.to_string()),
        },
    }
}

fn parse_signal(raw: &str) -> Option<EnvironmentSignal> {
    let mut parts = raw.split_whitespace();
    let signal = match parts.next()? {
        "tab" => EnvironmentSignal::VisibilityChanged { hidden: true },
        "blur" => EnvironmentSignal::WindowBlurred,
        "fs-exit" => EnvironmentSignal::FullscreenChanged { fullscreen: false },
        "back" => EnvironmentSignal::NavigationAttempt,
        "resize" => {
            let width = parts.next()?.parse().ok()?;
            let height = parts.next()?.parse().ok()?;
            EnvironmentSignal::Resized {
                viewport: Dimensions::new(width, height),
                screen: SCREEN,
            }
        }
        "key" => EnvironmentSignal::KeyDown(parts.next()?.parse::<KeyPress>().ok()?),
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(signal)
}

pub fn help_text() -> &'static str {
    "start: enter fullscreen and begin | 1-9: choose | n: next | s: submit | ok: dismiss warning | q: quit\n\
     host signals: :tab :blur :fs-exit :back :resize W H :key <combo>"
}

pub fn render_view(view: &SessionView) -> String {
    let mut out = format!(
        "Level {}  Question {}/{}  Time {}  Violations {}\n{}\n",
        view.level,
        view.index + 1,
        view.total,
        view.clock_label(),
        view.violations,
        view.question
    );
    for (i, choice) in view.choices.iter().enumerate() {
        let marker = if view.selected == Some(i) { '*' } else { ' ' };
        out.push_str(&format!(" {marker}{}. {choice}\n", i + 1));
    }
    if !view.proctoring_active {
        out.push_str("Type `start` to enter fullscreen and start the timer.\n");
    } else if view.is_last_question {
        out.push_str("Last question: `n` or `s` submits.\n");
    }
    out
}

pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Updated(view) => Some(render_view(view)),
        SessionEvent::Tick { remaining } if remaining % 30 == 0 || *remaining <= 10 => {
            Some(format!("[{}:{:02} left]", remaining / 60, remaining % 60))
        }
        SessionEvent::Tick { .. } => None,
        SessionEvent::Notice(notice) => {
            let hint = if notice.is_dismissible() { " (ok to dismiss)" } else { "" };
            Some(format!("!! {notice}{hint}"))
        }
        SessionEvent::FullscreenRefused => Some("!! Fullscreen was refused.".to_string()),
        SessionEvent::Rejected(err) => Some(format!("Not allowed: {err}")),
    }
}

pub fn render_host_command(command: HostCommand) -> &'static str {
    match command {
        HostCommand::RequestFullscreen => "[host] fullscreen on",
        HostCommand::RestoreHistory => "[host] history restored",
        HostCommand::Detached => "[host] proctoring off",
    }
}

pub fn render_result(result: &TerminalResult) -> String {
    let verdict = if result.qualified {
        "qualified for the next level"
    } else {
        "did not qualify"
    };
    format!(
        "{} ({}) scored {}/{} on Level {} in {}s: {verdict}.",
        result.name, result.college, result.score, result.total, result.level, result.time_taken
    )
}

/// Score card for a level played before.
pub fn render_score(level: Level, score: &PlayerScore) -> String {
    let total = score.total_questions;
    let wrong = total.saturating_sub(score.score);
    let percent = if total == 0 {
        0.0
    } else {
        f64::from(score.score) * 100.0 / f64::from(total)
    };
    format!(
        "Level {level}: {}/{total} correct, {wrong} wrong ({percent:.1}%) in {}:{:02}",
        score.score,
        score.time_taken / 60,
        score.time_taken % 60
    )
}

pub fn render_access(level: Level, access: &LevelAccess) -> String {
    match access {
        LevelAccess::Open { prior: Some(score) } => {
            format!("Level {level} is open. Last attempt: {}", render_score(level, score))
        }
        LevelAccess::Open { prior: None } => format!("Level {level} is open. Not played yet."),
        LevelAccess::Passed { score } => format!(
            "Level {level} is locked: already qualified. {}",
            render_score(level, score)
        ),
        LevelAccess::RequiresPrevious {
            previous,
            min_score: Some(min),
        } => format!("Level {level} is locked: requires Level {previous} score >= {min}."),
        LevelAccess::RequiresPrevious {
            previous,
            min_score: None,
        } => format!("Level {level} is locked: requires qualifying on Level {previous}."),
    }
}
