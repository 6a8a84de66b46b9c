mod host;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use escape_core::model::{Level, PlayerIdentity, StudentId};
use services::app_services::level_config;
use services::{
    AppServices, BackendConfig, ChannelMonitor, Clock, FINAL_LEVEL, HttpBackend, InMemoryBackend,
    LevelGate, LevelRunner, MonitorHandle, PlayerCommand, QuizBackend, RunOutcome, SessionEvent,
    SubmissionOutcome,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::host::HostInput;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    MissingIdentity,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingIdentity => {
                write!(f, "either --student-id or both --name and --college are required")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    Rules,
    Leaderboard,
    Login,
    Levels,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "play" => Some(Self::Play),
            "rules" => Some(Self::Rules),
            "leaderboard" => Some(Self::Leaderboard),
            "login" => Some(Self::Login),
            "levels" => Some(Self::Levels),
            _ => None,
        }
    }
}

struct Args {
    api_url: Option<String>,
    db_url: String,
    questions: Option<String>,
    student_id: Option<StudentId>,
    name: Option<String>,
    college: Option<String>,
    level: Level,
    duration_secs: Option<u32>,
    threshold: Option<u32>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app --                [play] [options]");
    eprintln!("  cargo run -p app -- rules          [--api <url>]");
    eprintln!("  cargo run -p app -- leaderboard    [--api <url>] [--level <n>]");
    eprintln!("  cargo run -p app -- login          --name <name> --college <college>");
    eprintln!("  cargo run -p app -- levels         --student-id <id>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --api <url>          backend base URL (default http://localhost:5050)");
    eprintln!("  --db <sqlite_url>    snapshot store (default sqlite://escape.sqlite3)");
    eprintln!("  --questions <file>   play offline from a JSON bank file");
    eprintln!("  --student-id <id>    play as an existing student");
    eprintln!("  --name, --college    register before playing");
    eprintln!("  --level <n>          level to play (default 1)");
    eprintln!("  --duration <secs>    override the level duration");
    eprintln!("  --threshold <n>      override the violation threshold");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ESCAPE_API_URL, ESCAPE_API_TIMEOUT_SECS, ESCAPE_DB_URL,");
    eprintln!("  ESCAPE_STUDENT_ID, ESCAPE_STUDENT_NAME, ESCAPE_COLLEGE, ESCAPE_LOG");
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            api_url: None,
            db_url: std::env::var("ESCAPE_DB_URL")
                .ok()
                .map_or_else(|| "sqlite://escape.sqlite3".into(), normalize_sqlite_url),
            questions: None,
            student_id: std::env::var("ESCAPE_STUDENT_ID")
                .ok()
                .and_then(|value| value.parse().ok()),
            name: std::env::var("ESCAPE_STUDENT_NAME").ok(),
            college: std::env::var("ESCAPE_COLLEGE").ok(),
            level: Level::new(1),
            duration_secs: None,
            threshold: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api" => parsed.api_url = Some(require_value(args, "--api")?),
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--questions" => parsed.questions = Some(require_value(args, "--questions")?),
                "--student-id" => {
                    let value = require_value(args, "--student-id")?;
                    parsed.student_id = Some(parse_number(value, "--student-id")?);
                }
                "--name" => parsed.name = Some(require_value(args, "--name")?),
                "--college" => parsed.college = Some(require_value(args, "--college")?),
                "--level" => {
                    let value = require_value(args, "--level")?;
                    parsed.level = parse_number(value, "--level")?;
                }
                "--duration" => {
                    let value = require_value(args, "--duration")?;
                    parsed.duration_secs = Some(parse_number(value, "--duration")?);
                }
                "--threshold" => {
                    let value = require_value(args, "--threshold")?;
                    parsed.threshold = Some(parse_number(value, "--threshold")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn backend(&self) -> Result<Arc<dyn QuizBackend>, Box<dyn std::error::Error>> {
        if let Some(path) = &self.questions {
            let raw = std::fs::read_to_string(path)?;
            return Ok(Arc::new(InMemoryBackend::from_banks_json(&raw)?));
        }
        let from_env = BackendConfig::from_env()?;
        let config = match &self.api_url {
            Some(url) => BackendConfig::new(url, from_env.timeout())?,
            None => from_env,
        };
        Ok(Arc::new(HttpBackend::new(config)?))
    }

    fn name_and_college(&self) -> Option<(&str, &str)> {
        Some((self.name.as_deref()?, self.college.as_deref()?))
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ESCAPE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // No subcommand means play.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Play,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Play,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let backend = parsed.backend()?;

    match cmd {
        Command::Rules => {
            for (i, rule) in backend.get_rules().await?.iter().enumerate() {
                println!("{}. {rule}", i + 1);
            }
            Ok(())
        }
        Command::Leaderboard => {
            let entries = backend.get_leaderboard(parsed.level).await?;
            println!("Level {} leaderboard", parsed.level);
            for (rank, entry) in entries.iter().enumerate() {
                println!(
                    "{:>3}. {:<20} {:<24} {:>2}/{:<2} {:>4}s",
                    rank + 1,
                    entry.name,
                    entry.college,
                    entry.score,
                    entry.total,
                    entry.time_taken
                );
            }
            Ok(())
        }
        Command::Login => {
            let (name, college) = parsed.name_and_college().ok_or(ArgsError::MissingIdentity)?;
            let login = backend.login(name, college).await?;
            println!("{}", serde_json::to_string_pretty(&login)?);
            Ok(())
        }
        Command::Levels => {
            let student_id = parsed.student_id.ok_or(ArgsError::MissingIdentity)?;
            let progress = LevelGate::new(backend).progress(student_id).await;
            for value in 1..=FINAL_LEVEL.value() {
                let level = Level::new(value);
                println!("{}", host::render_access(level, &progress.access(level)));
            }
            Ok(())
        }
        Command::Play => play(&parsed, backend).await,
    }
}

async fn play(args: &Args, backend: Arc<dyn QuizBackend>) -> Result<(), Box<dyn std::error::Error>> {
    let player = match (args.student_id, args.name_and_college()) {
        (Some(id), _) => PlayerIdentity::new(
            id,
            args.name.clone().unwrap_or_default(),
            args.college.clone().unwrap_or_default(),
        ),
        (None, Some((name, college))) => {
            let login = backend.login(name, college).await?;
            println!("Registered as student {}", login.student_id);
            PlayerIdentity::new(login.student_id, name, college)
        }
        (None, None) => return Err(ArgsError::MissingIdentity.into()),
    };

    if !backend
        .check_eligibility(player.student_id, args.level)
        .await?
    {
        println!("Not eligible for Level {} yet.", args.level);
        return Ok(());
    }

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(&args.db_url, backend, Clock::monotonic()).await?;

    let access = services
        .level_gate()
        .access(player.student_id, args.level)
        .await;
    println!("{}", host::render_access(args.level, &access));
    if !access.is_open() {
        return Ok(());
    }

    let config = level_config(args.level, args.duration_secs, args.threshold)?;
    let proctor_loop = services.proctor_loop();

    let session = match proctor_loop.open(config, player).await {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(error = %err, "level could not be opened");
            println!("{}", err.notice(args.level));
            return Ok(());
        }
    };
    if session.is_resumed() {
        println!("Resuming your saved progress.");
    }
    println!("{}", host::help_text());

    let (monitor, MonitorHandle { signals, commands: mut host_commands }) = ChannelMonitor::pair(32);
    let (events_tx, mut events) = mpsc::unbounded_channel::<SessionEvent>();
    let (commands_tx, commands_rx) = mpsc::channel::<PlayerCommand>(32);

    let display = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(line) = host::render_event(&event) {
                            println!("{line}");
                        }
                    }
                    None => break,
                },
                Some(command) = host_commands.recv() => {
                    println!("{}", host::render_host_command(command));
                }
            }
        }
    });

    spawn_stdin_reader(commands_tx, signals);

    let runner = LevelRunner::new(proctor_loop.as_ref().clone(), monitor, events_tx);
    let outcome = runner.run(session, commands_rx).await;
    // Let the display drain what the runner emitted.
    match tokio::time::timeout(Duration::from_millis(200), display).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "display task failed"),
        Err(_) => tracing::debug!("display still draining at exit"),
    }

    match outcome {
        RunOutcome::Submitted(SubmissionOutcome::Completed(result)) => {
            println!("{}", host::render_result(&result));
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        RunOutcome::Submitted(SubmissionOutcome::Failed { notice }) => println!("{notice}"),
        RunOutcome::Submitted(SubmissionOutcome::AlreadySubmitted) => {}
        RunOutcome::Abandoned => println!("Progress saved. Run again to resume."),
    }
    Ok(())
}

/// Read stdin on a plain thread so a pending read never blocks runtime shutdown.
fn spawn_stdin_reader(
    commands: mpsc::Sender<PlayerCommand>,
    signals: mpsc::Sender<escape_core::integrity::EnvironmentSignal>,
) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            let delivered = match host::parse_line(&line) {
                HostInput::Player(command) => commands.blocking_send(command).is_ok(),
                HostInput::Signal(signal) => signals.blocking_send(signal).is_ok(),
                HostInput::Help => {
                    println!("{}", host::help_text());
                    true
                }
                HostInput::Empty => true,
                HostInput::Unknown(raw) => {
                    println!("Unrecognized input: {raw}");
                    true
                }
            };
            if !delivered {
                break;
            }
        }
    });
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
