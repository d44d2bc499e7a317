use clap::{error::ErrorKind, Args, CommandFactory, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::{Path, PathBuf},
    time::Duration,
};
use typemark::{
    app::{App, AppAction, SessionFactory},
    app_dirs::AppDirs,
    clock::SystemClock,
    config::{AccuracyMode, ConfigStore, ExamConfig, FileConfigStore},
    error::{ConfigError, StoreError},
    logging::init_file_logging,
    results::{dashboard, export_csv, Identity, ResultId, ResultReader, ResultsDb, StoredResult},
    runtime::{
        CrosstermEventSource, EventSource, Runner, SessionEvent, ThreadPollScheduler,
        POLL_INTERVAL_MS,
    },
    score::{mark_chars, CharMark},
    session::Session,
    ui,
};

/// timed typing exams with word-level scoring and stored results
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    args_conflicts_with_subcommands = true,
    long_about = "Run a timed typing exam against a fixed passage. Results are scored by aligning typed words with the passage, stored per user, and can be reviewed or exported by the examiner."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,

    #[clap(flatten)]
    run: RunArgs,

    /// results database (defaults to the user state directory)
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// exam configuration file (defaults to the user config directory)
    #[clap(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// take the exam (same as running without a subcommand)
    Run(RunArgs),
    /// show or change the exam configuration
    Exam {
        #[clap(subcommand)]
        action: ExamCommand,
    },
    /// a user's recent results with averages
    History {
        #[clap(short, long)]
        user: String,
        /// write CSV to stdout instead of a table
        #[clap(long)]
        csv: bool,
    },
    /// averages across all users
    Summary,
    /// every stored result, newest first
    Results {
        #[clap(long)]
        csv: bool,
    },
    /// one stored result with its typed text
    Show {
        id: ResultId,
        #[clap(short, long)]
        user: String,
    },
}

#[derive(Subcommand, Debug)]
enum ExamCommand {
    Show,
    Set(ExamSetArgs),
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// who the result is recorded for
    #[clap(short, long)]
    user: Option<String>,

    /// use the passage in this file instead of the configured one
    #[clap(long)]
    text_file: Option<PathBuf>,

    /// exam length in seconds
    #[clap(short, long)]
    duration: Option<u64>,

    /// let the candidate correct mistakes with backspace
    #[clap(long)]
    allow_backspace: bool,
}

impl RunArgs {
    /// Overlay the command line on the stored exam.
    fn apply(&self, exam: ExamConfig) -> Result<ExamConfig, ConfigError> {
        let mut exam = match &self.text_file {
            Some(path) => exam.with_text_file(path)?,
            None => exam,
        };
        if let Some(duration) = self.duration {
            exam.duration_seconds = duration;
        }
        if self.allow_backspace {
            exam.allow_backspace = true;
        }
        exam.validate()?;
        Ok(exam)
    }
}

#[derive(Args, Debug, Clone, Default)]
struct ExamSetArgs {
    /// read the passage from this file
    #[clap(long)]
    text_file: Option<PathBuf>,

    #[clap(long)]
    duration: Option<u64>,

    #[clap(long)]
    allow_retake: Option<bool>,

    #[clap(long, value_enum)]
    accuracy_mode: Option<AccuracyMode>,

    #[clap(long)]
    allow_backspace: Option<bool>,
}

impl ExamSetArgs {
    fn apply(&self, exam: ExamConfig) -> Result<ExamConfig, ConfigError> {
        let mut exam = match &self.text_file {
            Some(path) => exam.with_text_file(path)?,
            None => exam,
        };
        if let Some(duration) = self.duration {
            exam.duration_seconds = duration;
        }
        if let Some(allow_retake) = self.allow_retake {
            exam.allow_retake = allow_retake;
        }
        if let Some(mode) = self.accuracy_mode {
            exam.accuracy_mode = mode;
        }
        if let Some(allow_backspace) = self.allow_backspace {
            exam.allow_backspace = allow_backspace;
        }
        exam.validate()?;
        Ok(exam)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let store = cli
        .config
        .as_ref()
        .map(FileConfigStore::with_path)
        .unwrap_or_default();
    let db = cli.db.as_deref();

    match cli.command {
        None => run_exam(&cli.run, &store, db),
        Some(Command::Run(args)) => run_exam(&args, &store, db),
        Some(Command::Exam { action }) => exam_command(action, &store),
        Some(Command::History { user, csv }) => history_command(&open_db(db)?, &user, csv),
        Some(Command::Summary) => summary_command(&open_db(db)?),
        Some(Command::Results { csv }) => results_command(&open_db(db)?, csv),
        Some(Command::Show { id, user }) => show_command(&open_db(db)?, &store, id, &user),
    }
}

fn open_db(path: Option<&Path>) -> Result<ResultsDb, StoreError> {
    match path {
        Some(path) => ResultsDb::open(path),
        None => ResultsDb::open_default(),
    }
}

fn run_exam(
    args: &RunArgs,
    store: &FileConfigStore,
    db: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let Some(username) = args.user.as_deref().filter(|u| !u.trim().is_empty()) else {
        let mut cmd = Cli::command();
        cmd.error(
            ErrorKind::MissingRequiredArgument,
            "--user <USER> is required to take the exam",
        )
        .exit();
    };

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    if let Some(path) = AppDirs::log_path() {
        init_file_logging(&path);
    }

    let exam = args.apply(store.load())?;
    let db = open_db(db)?;
    let user = db.ensure_user(username.trim())?;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let events = CrosstermEventSource::new();
    let poll_tx = events.sender();
    let new_session: SessionFactory = Box::new(move |exam: &ExamConfig| {
        Session::for_exam(
            exam,
            SystemClock,
            ThreadPollScheduler::new(poll_tx.clone(), Duration::from_millis(POLL_INTERVAL_MS)),
        )
    });
    let mut app = App::new(exam, new_session).with_sink(user, Box::new(db));
    let runner = Runner::new(events, Duration::from_millis(POLL_INTERVAL_MS));

    let outcome = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    outcome
}

fn start_tui<B: Backend, E: EventSource>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui::draw(app, f))?;

        match runner.step() {
            SessionEvent::Key(key) => {
                if app.on_key(key) == AppAction::Quit {
                    break;
                }
            }
            SessionEvent::Poll(id) => app.on_poll(id),
            SessionEvent::Resize | SessionEvent::Tick => {}
        }
    }

    Ok(())
}

fn exam_command(action: ExamCommand, store: &FileConfigStore) -> Result<(), Box<dyn Error>> {
    match action {
        ExamCommand::Show => {
            println!("# {}", store.path().display());
            println!("{}", serde_json::to_string_pretty(&store.load())?);
        }
        ExamCommand::Set(args) => {
            let exam = args.apply(store.load())?;
            store.save(&exam)?;
            println!("exam saved to {}", store.path().display());
        }
    }
    Ok(())
}

fn lookup_user(db: &ResultsDb, username: &str) -> Result<Option<Identity>, StoreError> {
    let user = db.find_user(username)?;
    if user.is_none() {
        println!("no results for {username}");
    }
    Ok(user)
}

fn history_command(db: &ResultsDb, username: &str, csv: bool) -> Result<(), Box<dyn Error>> {
    let Some(user) = lookup_user(db, username)? else {
        return Ok(());
    };
    let dash = dashboard(db, &user)?;

    if csv {
        export_csv(io::stdout(), &dash.history)?;
        return Ok(());
    }

    println!(
        "{}: {} sessions   avg {:.1} wpm   avg {:.1}% acc",
        user.username, dash.sessions, dash.average_wpm, dash.average_accuracy
    );
    dash.history.iter().for_each(print_result_row);
    Ok(())
}

fn summary_command(db: &ResultsDb) -> Result<(), Box<dyn Error>> {
    let summary = db.summary()?;
    println!(
        "{} tests   {} users   avg {:.1} wpm   avg {:.1}% acc",
        summary.total_tests, summary.unique_users, summary.avg_wpm, summary.avg_accuracy
    );
    for user in db.per_user_summary()? {
        println!(
            "{:<16} {:>4} tests {:>7.1} wpm {:>6.1}% acc",
            user.username, user.tests, user.avg_wpm, user.avg_accuracy
        );
    }
    Ok(())
}

fn results_command(db: &ResultsDb, csv: bool) -> Result<(), Box<dyn Error>> {
    let rows = db.all_results()?;
    if csv {
        export_csv(io::stdout(), &rows)?;
    } else {
        rows.iter().for_each(print_result_row);
    }
    Ok(())
}

fn show_command(
    db: &ResultsDb,
    store: &FileConfigStore,
    id: ResultId,
    username: &str,
) -> Result<(), Box<dyn Error>> {
    let Some(user) = lookup_user(db, username)? else {
        return Ok(());
    };
    let Some(result) = db.get_result(id, &user)? else {
        println!("result {id} not found for {username}");
        return Ok(());
    };

    let s = &result.score;
    print_result_row(&result);
    println!(
        "net {:.1} wpm   consistency {:.0}%   typos {}   characters {}/{}/{}/{}   words {}/{}",
        s.net_wpm,
        s.consistency_percent,
        s.typos,
        s.correct_chars,
        s.incorrect_chars,
        s.extra_chars,
        s.missed_chars,
        s.correct_words,
        s.total_words
    );
    println!();
    println!("{}", review_line(&store.load().text, &result.typed_text));
    Ok(())
}

fn print_result_row(r: &StoredResult) {
    println!(
        "{:>5}  {}  {:<16} {:>7.1} wpm {:>6.1}% acc {:>5}s",
        r.id,
        r.created_at.format("%Y-%m-%d %H:%M:%S"),
        r.username,
        r.score.wpm,
        r.score.accuracy_percent,
        r.score.elapsed_seconds
    );
}

/// Typed text checked against the configured passage; wrong characters are
/// bracketed.
fn review_line(reference: &str, typed: &str) -> String {
    mark_chars(reference, typed)
        .into_iter()
        .filter_map(|mark| match mark {
            CharMark::Correct(c) => Some(c.to_string()),
            CharMark::Incorrect { typed, .. } | CharMark::Extra(typed) => {
                Some(format!("[{typed}]"))
            }
            CharMark::Missed(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;
    use std::sync::mpsc;
    use tempfile::tempdir;
    use typemark::{clock::ManualClock, runtime::ManualScheduler, runtime::TestEventSource};

    #[test]
    fn test_cli_default_run() {
        let cli = Cli::parse_from(["typemark", "--user", "ada"]);

        assert!(cli.command.is_none());
        assert_eq!(cli.run.user.as_deref(), Some("ada"));
        assert_eq!(cli.run.duration, None);
        assert!(!cli.run.allow_backspace);
    }

    #[test]
    fn test_cli_run_overrides() {
        let cli = Cli::parse_from([
            "typemark",
            "-u",
            "ada",
            "--duration",
            "90",
            "--allow-backspace",
            "--text-file",
            "passage.txt",
            "--db",
            "x.db",
        ]);

        assert_eq!(cli.run.duration, Some(90));
        assert!(cli.run.allow_backspace);
        assert_eq!(cli.run.text_file, Some(PathBuf::from("passage.txt")));
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
    }

    #[test]
    fn test_cli_subcommands() {
        let cli = Cli::parse_from(["typemark", "history", "--user", "ada", "--csv"]);
        assert!(matches!(
            cli.command,
            Some(Command::History { ref user, csv: true }) if user == "ada"
        ));

        let cli = Cli::parse_from(["typemark", "show", "7", "--user", "ada", "--db", "r.db"]);
        assert!(matches!(cli.command, Some(Command::Show { id: 7, .. })));
        assert_eq!(cli.db, Some(PathBuf::from("r.db")));

        let cli = Cli::parse_from(["typemark", "summary"]);
        assert!(matches!(cli.command, Some(Command::Summary)));
    }

    #[test]
    fn test_cli_exam_set() {
        let cli = Cli::parse_from([
            "typemark",
            "exam",
            "set",
            "--duration",
            "300",
            "--allow-retake",
            "false",
            "--accuracy-mode",
            "words",
        ]);

        let Some(Command::Exam {
            action: ExamCommand::Set(args),
        }) = cli.command
        else {
            panic!("expected exam set");
        };
        assert_eq!(args.duration, Some(300));
        assert_eq!(args.allow_retake, Some(false));
        assert_eq!(args.accuracy_mode, Some(AccuracyMode::Words));
    }

    #[test]
    fn test_cli_run_flags_conflict_with_subcommand() {
        assert!(Cli::try_parse_from(["typemark", "--user", "ada", "summary"]).is_err());
    }

    #[test]
    fn test_run_args_apply() {
        let dir = tempdir().unwrap();
        let passage = dir.path().join("passage.txt");
        std::fs::write(&passage, "a short passage").unwrap();

        let args = RunArgs {
            user: Some("ada".into()),
            text_file: Some(passage),
            duration: Some(45),
            allow_backspace: true,
        };
        let exam = args.apply(ExamConfig::default()).unwrap();

        assert_eq!(exam.text, "a short passage");
        assert_eq!(exam.duration_seconds, 45);
        assert!(exam.allow_backspace);
        assert!(exam.allow_retake);
    }

    #[test]
    fn test_run_args_reject_zero_duration() {
        let args = RunArgs {
            duration: Some(0),
            ..RunArgs::default()
        };
        assert!(matches!(
            args.apply(ExamConfig::default()),
            Err(ConfigError::InvalidDuration(0))
        ));
    }

    #[test]
    fn test_exam_set_persists() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("exam.json"));
        let args = ExamSetArgs {
            duration: Some(120),
            allow_retake: Some(false),
            ..ExamSetArgs::default()
        };

        exam_command(ExamCommand::Set(args), &store).unwrap();

        let exam = store.load();
        assert_eq!(exam.duration_seconds, 120);
        assert!(!exam.allow_retake);
    }

    #[test]
    fn test_review_line_brackets_mistakes() {
        assert_eq!(review_line("cat", "cut"), "c[u]t");
        assert_eq!(review_line("cat", "ca"), "ca");
        assert_eq!(review_line("cat", "cats"), "cat[s]");
    }

    #[test]
    fn test_start_tui_quits_on_escape() {
        let clock = ManualClock::new();
        let scheduler = ManualScheduler::new();
        let mut app = App::new(
            ExamConfig {
                text: "hello".into(),
                ..ExamConfig::default()
            },
            Box::new(move |exam: &ExamConfig| {
                Session::for_exam(exam, clock.clone(), scheduler.clone())
            }),
        );

        let press = |code: KeyCode| SessionEvent::Key(KeyEvent::new(code, KeyModifiers::NONE));
        let (tx, rx) = mpsc::channel();
        for c in "he".chars() {
            tx.send(press(KeyCode::Char(c))).unwrap();
        }
        tx.send(press(KeyCode::Esc)).unwrap();
        let runner = Runner::new(TestEventSource::new(rx), Duration::from_millis(5));

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        start_tui(&mut terminal, &mut app, &runner).unwrap();

        assert_eq!(app.session.typed_text(), "he");
    }
}
