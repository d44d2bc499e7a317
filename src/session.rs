//! A single typing session: `Idle → Armed → Running → Finished`.
//!
//! Keystrokes and polls are the only mutators. The timer starts on the first
//! keystroke after arming, polls sample the live metrics once per whole
//! second, and the session is scored exactly once when it finishes. A
//! finished session is never resumed; a retake builds a new one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::ExamConfig;
use crate::error::SessionError;
use crate::runtime::{PollHandle, PollScheduler};
use crate::sampler::Sampler;
use crate::score::{score, ScoreResult};
use crate::time_series::{Sample, SampleSeries};
use crate::transcript::Transcript;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier, used to drop polls from stale sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    Idle,
    Armed,
    Running,
    Finished,
}

/// Exam settings a session needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub duration_seconds: u64,
    pub allow_backspace: bool,
}

impl From<&ExamConfig> for SessionPolicy {
    fn from(exam: &ExamConfig) -> Self {
        Self {
            duration_seconds: exam.duration_seconds,
            allow_backspace: exam.allow_backspace,
        }
    }
}

/// Key input as far as the session is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    Char(char),
    Backspace,
    /// keys that would move the cursor or delete forward; always suppressed
    Navigation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Accepted,
    Removed,
    /// the transcript is already as long as the reference
    Truncated,
    Suppressed,
    /// the session is not accepting input
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    NotRunning,
    Waiting,
    Sampled(Sample),
    Finished(ScoreResult),
}

pub struct Session {
    id: SessionId,
    reference: String,
    reference_chars: Vec<char>,
    policy: SessionPolicy,
    clock: Box<dyn Clock>,
    scheduler: Box<dyn PollScheduler>,
    state: SessionState,
    transcript: Transcript,
    sampler: Sampler,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    poll: Option<PollHandle>,
    result: Option<ScoreResult>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("transcript", &self.transcript.len())
            .field("samples", &self.sampler.series().len())
            .finish()
    }
}

impl Session {
    pub fn new(
        reference: impl Into<String>,
        policy: SessionPolicy,
        clock: impl Clock,
        scheduler: impl PollScheduler + 'static,
    ) -> Self {
        let reference = reference.into();
        let reference_chars: Vec<char> = reference.chars().collect();
        let transcript = Transcript::new(reference_chars.len(), policy.allow_backspace);

        Self {
            id: SessionId::next(),
            reference,
            reference_chars,
            policy,
            clock: Box::new(clock),
            scheduler: Box::new(scheduler),
            state: SessionState::Idle,
            transcript,
            sampler: Sampler::new(),
            started_at: None,
            finished_at: None,
            poll: None,
            result: None,
        }
    }

    pub fn for_exam(
        exam: &ExamConfig,
        clock: impl Clock,
        scheduler: impl PollScheduler + 'static,
    ) -> Self {
        Self::new(
            exam.text.clone(),
            SessionPolicy::from(exam),
            clock,
            scheduler,
        )
    }

    /// Ready the session for input. The timer starts on the first keystroke.
    pub fn arm(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Armed;
                debug!(session = %self.id, "armed");
                Ok(())
            }
            SessionState::Armed => Ok(()),
            SessionState::Running => Err(SessionError::NotArmable("running")),
            SessionState::Finished => Err(SessionError::NotArmable("finished")),
        }
    }

    fn start(&mut self) {
        self.started_at = Some(self.clock.now());
        self.poll = Some(self.scheduler.start(self.id));
        self.state = SessionState::Running;
        info!(
            session = %self.id,
            duration_secs = self.policy.duration_seconds,
            "timer started"
        );
    }

    /// Any key while armed starts the timer, even one that is then suppressed.
    pub fn handle_key(&mut self, key: Keystroke) -> KeyOutcome {
        match self.state {
            SessionState::Idle | SessionState::Finished => return KeyOutcome::Ignored,
            SessionState::Armed => self.start(),
            SessionState::Running => {}
        }

        match key {
            Keystroke::Char(c) => {
                if self.transcript.push(c) {
                    KeyOutcome::Accepted
                } else {
                    KeyOutcome::Truncated
                }
            }
            Keystroke::Backspace if self.transcript.allows_removal() => {
                match self.transcript.pop() {
                    Some(_) => KeyOutcome::Removed,
                    None => KeyOutcome::Suppressed,
                }
            }
            Keystroke::Backspace | Keystroke::Navigation => KeyOutcome::Suppressed,
        }
    }

    /// Types every character of `text` in order.
    pub fn type_text(&mut self, text: &str) -> Vec<KeyOutcome> {
        text.chars()
            .map(|c| self.handle_key(Keystroke::Char(c)))
            .collect()
    }

    /// Periodic check: finishes the session once the target duration is
    /// reached, otherwise samples live metrics on each new whole second.
    pub fn poll(&mut self) -> PollOutcome {
        if self.state != SessionState::Running {
            return PollOutcome::NotRunning;
        }

        let seconds = self.elapsed().as_secs();
        if seconds >= self.policy.duration_seconds {
            return match self.finish() {
                Ok(result) => PollOutcome::Finished(result),
                Err(_) => PollOutcome::NotRunning,
            };
        }

        match self
            .sampler
            .observe(seconds, &self.reference_chars, self.transcript.chars())
        {
            Some(sample) => PollOutcome::Sampled(sample),
            None => PollOutcome::Waiting,
        }
    }

    /// Stop the timer and score the session. Scoring happens once; a session
    /// whose timer never started produces nothing and stays where it is.
    pub fn finish(&mut self) -> Result<ScoreResult, SessionError> {
        match self.state {
            SessionState::Idle | SessionState::Armed => {
                debug!(session = %self.id, state = %self.state, "finish before timer start");
                return Err(SessionError::PrematureFinalize);
            }
            SessionState::Finished => return Err(SessionError::AlreadyFinished),
            SessionState::Running => {}
        }

        self.finished_at = Some(self.clock.now());
        if let Some(poll) = self.poll.take() {
            poll.cancel();
        }
        self.state = SessionState::Finished;

        let elapsed_seconds = self.elapsed().as_secs() as i64;
        let result = score(
            &self.reference,
            &self.transcript.as_string(),
            elapsed_seconds,
            self.sampler.series(),
        );

        info!(
            session = %self.id,
            elapsed_secs = result.elapsed_seconds,
            wpm = result.wpm,
            accuracy = result.accuracy_percent,
            "session finished"
        );

        self.result = Some(result.clone());
        Ok(result)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn reference_chars(&self) -> &[char] {
        &self.reference_chars
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn typed_text(&self) -> String {
        self.transcript.as_string()
    }

    pub fn series(&self) -> &SampleSeries {
        self.sampler.series()
    }

    pub fn result(&self) -> Option<&ScoreResult> {
        self.result.as_ref()
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn has_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(|p| !p.is_cancelled())
    }

    /// Time on the clock so far, frozen once finished.
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => self.clock.now().saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    pub fn seconds_remaining(&self) -> u64 {
        self.policy
            .duration_seconds
            .saturating_sub(self.elapsed().as_secs())
    }
}
