use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

use crate::session::SessionId;

/// How often a running session is polled. Finer than one second so that no
/// whole-second boundary is missed.
pub const POLL_INTERVAL_MS: u64 = 250;

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum SessionEvent {
    Key(KeyEvent),
    Resize,
    /// periodic poll for the session with this id
    Poll(SessionId),
    /// nothing arrived within the runner interval
    Tick,
}

/// Source of terminal events (keyboard, resize, polls)
pub trait EventSource {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError>;
}

/// Production event source using crossterm. The sender half is handed to
/// the poll scheduler so polls share the same queue as keystrokes.
pub struct CrosstermEventSource {
    tx: Sender<SessionEvent>,
    rx: Receiver<SessionEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let key_tx = tx.clone();

        std::thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if key_tx.send(SessionEvent::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::Resize(_, _)) => {
                    if key_tx.send(SessionEvent::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        });

        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<SessionEvent> {
        self.tx.clone()
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<SessionEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<SessionEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event at a time
pub struct Runner<E: EventSource> {
    event_source: E,
    interval: Duration,
}

impl<E: EventSource> Runner<E> {
    pub fn new(event_source: E, interval: Duration) -> Self {
        Self {
            event_source,
            interval,
        }
    }

    /// Blocks up to the interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> SessionEvent {
        match self.event_source.recv_timeout(self.interval) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                SessionEvent::Tick
            }
        }
    }
}

/// Handle to a running periodic poll task.
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct PollHandle {
    cancelled: Arc<AtomicBool>,
}

impl PollHandle {
    fn new() -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Self {
                cancelled: flag.clone(),
            },
            flag,
        )
    }

    /// Stops the task. Returns `true` only for the call that actually
    /// cancelled it; later calls are no-ops.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Starts the periodic poll for a session once its timer starts.
pub trait PollScheduler: Send {
    fn start(&mut self, session: SessionId) -> PollHandle;
}

/// Spawns a thread that sends `Poll(id)` every interval until cancelled.
pub struct ThreadPollScheduler {
    tx: Sender<SessionEvent>,
    interval: Duration,
}

impl ThreadPollScheduler {
    pub fn new(tx: Sender<SessionEvent>, interval: Duration) -> Self {
        Self { tx, interval }
    }
}

impl PollScheduler for ThreadPollScheduler {
    fn start(&mut self, session: SessionId) -> PollHandle {
        let (handle, cancelled) = PollHandle::new();
        let tx = self.tx.clone();
        let interval = self.interval;

        std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            if tx.send(SessionEvent::Poll(session)).is_err() {
                break;
            }
        });

        handle
    }
}

/// Scheduler that spawns nothing; the caller drives polls by hand. Keeps the
/// cancellation flags of every task it started for inspection.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    started: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> usize {
        self.started.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn active(&self) -> usize {
        self.started
            .lock()
            .map(|s| s.iter().filter(|f| !f.load(Ordering::SeqCst)).count())
            .unwrap_or(0)
    }
}

impl PollScheduler for ManualScheduler {
    fn start(&mut self, _session: SessionId) -> PollHandle {
        let (handle, flag) = PollHandle::new();
        if let Ok(mut started) = self.started.lock() {
            started.push(flag);
        }
        handle
    }
}
