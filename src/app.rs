use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::warn;

use crate::config::ExamConfig;
use crate::error::SessionError;
use crate::results::{Identity, ResultId, ResultSink};
use crate::score::ScoreResult;
use crate::session::{Keystroke, PollOutcome, Session, SessionId, SessionState};

/// Chords with these held are shortcuts, never typed text.
const SHORTCUT_MODIFIERS: KeyModifiers = KeyModifiers::CONTROL
    .union(KeyModifiers::ALT)
    .union(KeyModifiers::SUPER)
    .union(KeyModifiers::META);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Typing,
    Results,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveStatus {
    /// no sink configured
    NotSaved,
    Saved(ResultId),
    /// the result is still shown; only persistence failed
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Continue,
    Quit,
}

/// Builds a fresh, idle session for the exam. Called once at startup and
/// again for every retake.
pub type SessionFactory = Box<dyn FnMut(&ExamConfig) -> Session + Send>;

pub struct App {
    pub exam: ExamConfig,
    pub session: Session,
    pub state: AppState,
    pub save_status: SaveStatus,
    /// short message for the operator, e.g. after an empty finish
    pub notice: Option<String>,
    user: Option<Identity>,
    sink: Option<Box<dyn ResultSink>>,
    new_session: SessionFactory,
}

impl App {
    pub fn new(exam: ExamConfig, mut new_session: SessionFactory) -> Self {
        let session = armed(new_session(&exam));

        Self {
            exam,
            session,
            state: AppState::Typing,
            save_status: SaveStatus::NotSaved,
            notice: None,
            user: None,
            sink: None,
            new_session,
        }
    }

    /// Persist every finished session for `user` through `sink`.
    pub fn with_sink(mut self, user: Identity, sink: Box<dyn ResultSink>) -> Self {
        self.user = Some(user);
        self.sink = Some(sink);
        self
    }

    pub fn user(&self) -> Option<&Identity> {
        self.user.as_ref()
    }

    pub fn result(&self) -> Option<&ScoreResult> {
        self.session.result()
    }

    pub fn can_retake(&self) -> bool {
        self.exam.allow_retake
    }

    /// Throw the finished session away and arm a new one.
    pub fn retake(&mut self) {
        self.session = armed((self.new_session)(&self.exam));
        self.state = AppState::Typing;
        self.save_status = SaveStatus::NotSaved;
        self.notice = None;
    }

    pub fn on_key(&mut self, key: KeyEvent) -> AppAction {
        if key.kind != KeyEventKind::Press {
            return AppAction::Continue;
        }
        if key.code == KeyCode::Esc
            || (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c'))
        {
            return AppAction::Quit;
        }

        match self.state {
            AppState::Typing => {
                let keystroke = match key.code {
                    KeyCode::Tab => {
                        self.finish();
                        return AppAction::Continue;
                    }
                    KeyCode::Enter => Keystroke::Char('\n'),
                    KeyCode::Char(_) if key.modifiers.intersects(SHORTCUT_MODIFIERS) => {
                        return AppAction::Continue;
                    }
                    KeyCode::Char(c) => Keystroke::Char(c),
                    KeyCode::Backspace => Keystroke::Backspace,
                    KeyCode::Delete
                    | KeyCode::Left
                    | KeyCode::Right
                    | KeyCode::Up
                    | KeyCode::Down
                    | KeyCode::Home
                    | KeyCode::End => Keystroke::Navigation,
                    _ => return AppAction::Continue,
                };
                self.notice = None;
                self.session.handle_key(keystroke);
            }
            AppState::Results => {
                if key.code == KeyCode::Char('r') && self.can_retake() {
                    self.retake();
                }
            }
        }

        AppAction::Continue
    }

    /// Polls from a previous session's task are dropped.
    pub fn on_poll(&mut self, id: SessionId) {
        if id != self.session.id() {
            return;
        }
        if let PollOutcome::Finished(result) = self.session.poll() {
            self.complete(result);
        }
    }

    /// Explicit finish requested by the operator.
    pub fn finish(&mut self) {
        match self.session.finish() {
            Ok(result) => self.complete(result),
            Err(SessionError::PrematureFinalize) => {
                self.notice = Some("nothing to score yet: start typing first".to_string());
            }
            Err(_) => {}
        }
    }

    fn complete(&mut self, result: ScoreResult) {
        self.state = AppState::Results;
        self.save_status = match (&self.user, self.sink.as_mut()) {
            (Some(user), Some(sink)) => {
                match sink.record(user, &result, &self.session.typed_text()) {
                    Ok(id) => SaveStatus::Saved(id),
                    Err(e) => {
                        warn!(error = %e, "result not saved");
                        SaveStatus::Failed(e.to_string())
                    }
                }
            }
            _ => SaveStatus::NotSaved,
        };
    }
}

/// Factory sessions start idle; a session that is already armed is kept as is.
fn armed(mut session: Session) -> Session {
    if let Err(e) = session.arm() {
        warn!(session = %session.id(), error = %e, "fresh session could not be armed");
    }
    debug_assert_eq!(session.state(), SessionState::Armed);
    session
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use crate::runtime::ManualScheduler;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct MemorySink {
        saved: Arc<Mutex<Vec<(String, ScoreResult, String)>>>,
        fail: bool,
    }

    impl ResultSink for MemorySink {
        fn record(
            &mut self,
            user: &Identity,
            score: &ScoreResult,
            typed_text: &str,
        ) -> Result<ResultId, StoreError> {
            if self.fail {
                return Err(StoreError::Io(std::io::Error::other("disk gone")));
            }
            let mut saved = self.saved.lock().unwrap();
            saved.push((user.username.clone(), score.clone(), typed_text.to_string()));
            Ok(saved.len() as ResultId)
        }
    }

    fn exam(text: &str, allow_retake: bool) -> ExamConfig {
        ExamConfig {
            text: text.to_string(),
            duration_seconds: 5,
            allow_retake,
            ..ExamConfig::default()
        }
    }

    fn app(exam: ExamConfig, clock: ManualClock) -> App {
        let scheduler = ManualScheduler::new();
        App::new(
            exam,
            Box::new(move |exam: &ExamConfig| {
                Session::for_exam(exam, clock.clone(), scheduler.clone())
            }),
        )
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ada() -> Identity {
        Identity {
            id: 1,
            username: "ada".into(),
        }
    }

    #[test]
    fn test_new_app_is_armed() {
        let app = app(exam("hi", true), ManualClock::new());
        assert_eq!(app.state, AppState::Typing);
        assert_eq!(app.session.state(), SessionState::Armed);
    }

    #[test]
    fn test_prearmed_factory_session_is_kept() {
        let clock = ManualClock::new();
        let app = App::new(
            exam("hi", true),
            Box::new(move |exam: &ExamConfig| {
                let mut session = Session::for_exam(exam, clock.clone(), ManualScheduler::new());
                session.arm().unwrap();
                session
            }),
        );
        assert_eq!(app.session.state(), SessionState::Armed);
    }

    #[test]
    fn test_escape_quits() {
        let mut app = app(exam("hi", true), ManualClock::new());
        assert_eq!(app.on_key(key(KeyCode::Esc)), AppAction::Quit);
        assert_eq!(
            app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            AppAction::Quit
        );
    }

    #[test]
    fn test_tab_before_typing_reports_nothing_to_score() {
        let mut app = app(exam("hi", true), ManualClock::new());
        app.on_key(key(KeyCode::Tab));

        assert_eq!(app.state, AppState::Typing);
        assert!(app.notice.is_some());
        assert!(app.result().is_none());
    }

    #[test]
    fn test_finish_saves_result() {
        let clock = ManualClock::new();
        let saved = Arc::new(Mutex::new(Vec::new()));
        let mut app = app(exam("hi there", true), clock.clone()).with_sink(
            ada(),
            Box::new(MemorySink {
                saved: saved.clone(),
                fail: false,
            }),
        );

        for c in "hi there".chars() {
            app.on_key(key(KeyCode::Char(c)));
        }
        clock.advance(Duration::from_secs(2));
        app.on_key(key(KeyCode::Tab));

        assert_eq!(app.state, AppState::Results);
        assert_eq!(app.save_status, SaveStatus::Saved(1));
        let saved = saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "ada");
        assert_eq!(saved[0].2, "hi there");
    }

    #[test]
    fn test_sink_failure_keeps_result() {
        let clock = ManualClock::new();
        let mut app = app(exam("hi", true), clock.clone()).with_sink(
            ada(),
            Box::new(MemorySink {
                saved: Arc::default(),
                fail: true,
            }),
        );

        app.on_key(key(KeyCode::Char('h')));
        clock.advance(Duration::from_secs(1));
        app.finish();

        assert_eq!(app.state, AppState::Results);
        assert!(matches!(app.save_status, SaveStatus::Failed(_)));
        assert!(app.result().is_some());
    }

    #[test]
    fn test_poll_timeout_moves_to_results() {
        let clock = ManualClock::new();
        let mut app = app(exam("hello world", true), clock.clone());
        app.on_key(key(KeyCode::Char('h')));

        let id = app.session.id();
        clock.advance(Duration::from_secs(5));
        app.on_poll(id);

        assert_eq!(app.state, AppState::Results);
        assert_eq!(app.result().unwrap().elapsed_seconds, 5);
    }

    #[test]
    fn test_stale_poll_is_ignored() {
        let clock = ManualClock::new();
        let mut app = app(exam("hi", true), clock.clone());
        app.on_key(key(KeyCode::Char('h')));
        let old = app.session.id();
        clock.advance(Duration::from_secs(1));
        app.finish();

        app.on_key(key(KeyCode::Char('r')));
        app.on_key(key(KeyCode::Char('h')));
        clock.advance(Duration::from_secs(10));
        app.on_poll(old);

        assert_eq!(app.state, AppState::Typing);
        assert_eq!(app.session.state(), SessionState::Running);
    }

    #[test]
    fn test_retake_creates_new_session() {
        let clock = ManualClock::new();
        let mut app = app(exam("hi", true), clock.clone());
        app.on_key(key(KeyCode::Char('h')));
        clock.advance(Duration::from_secs(1));
        app.finish();
        let first = app.session.id();

        app.on_key(key(KeyCode::Char('r')));

        assert_eq!(app.state, AppState::Typing);
        assert_ne!(app.session.id(), first);
        assert_eq!(app.session.state(), SessionState::Armed);
    }

    #[test]
    fn test_retake_blocked_by_exam() {
        let clock = ManualClock::new();
        let mut app = app(exam("hi", false), clock.clone());
        app.on_key(key(KeyCode::Char('h')));
        clock.advance(Duration::from_secs(1));
        app.finish();

        app.on_key(key(KeyCode::Char('r')));
        assert_eq!(app.state, AppState::Results);
    }

    #[test]
    fn test_arrow_keys_do_not_edit() {
        let mut app = app(exam("abc", true), ManualClock::new());
        app.on_key(key(KeyCode::Char('a')));
        app.on_key(key(KeyCode::Left));
        app.on_key(key(KeyCode::Backspace));
        app.on_key(key(KeyCode::Char('b')));

        assert_eq!(app.session.typed_text(), "ab");
    }

    #[test]
    fn test_modifier_chords_are_not_typed() {
        let mut app = app(exam("Abc", true), ManualClock::new());
        app.on_key(KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL));
        app.on_key(KeyEvent::new(KeyCode::Char('a'), KeyModifiers::ALT));
        assert_eq!(app.session.typed_text(), "");
        assert_eq!(app.session.state(), SessionState::Armed);

        app.on_key(KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT));
        assert_eq!(app.session.typed_text(), "A");
        assert_eq!(app.session.state(), SessionState::Running);
    }
}
