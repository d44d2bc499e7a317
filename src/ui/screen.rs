use ratatui::Frame;

use crate::app::{App, AppState};

/// A UI Screen boundary: responsible for rendering one application state
pub trait Screen {
    fn render(&self, app: &App, f: &mut Frame);
}

/// Typing screen - prompt, timer and live progress
pub struct TypingScreen;

impl Screen for TypingScreen {
    fn render(&self, app: &App, f: &mut Frame) {
        f.render_widget(super::TypingView(app), f.area());
    }
}

/// Results screen - score, chart and review of the typed text
pub struct ResultsScreen;

impl Screen for ResultsScreen {
    fn render(&self, app: &App, f: &mut Frame) {
        f.render_widget(super::ResultsView(app), f.area());
    }
}

/// Helper to construct the appropriate screen for the current state
pub fn current_screen(state: &AppState) -> Box<dyn Screen> {
    match state {
        AppState::Typing => Box::new(TypingScreen),
        AppState::Results => Box::new(ResultsScreen),
    }
}
