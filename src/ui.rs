pub mod charting;
pub mod screen;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Axis, Chart, Dataset, GraphType, Paragraph, Widget, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthChar;

use crate::app::{App, SaveStatus};
use crate::score::{mark_chars, CharMark};
use crate::session::SessionState;
use charting::{compute_chart_bounds, format_label, scaled_error_points};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

/// Draw whichever screen matches the application state
pub fn draw(app: &App, f: &mut Frame) {
    screen::current_screen(&app.state).render(app, f);
}

/// `m:ss`
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn display_char(c: char) -> char {
    match c {
        '\n' => '↵',
        '\t' => '→',
        c => c,
    }
}

/// Merge runs of equally styled characters into spans.
fn push_styled(spans: &mut Vec<Span<'static>>, c: char, style: Style) {
    if let Some(last) = spans.last_mut() {
        if last.style == style {
            last.content.to_mut().push(c);
            return;
        }
    }
    spans.push(Span::styled(c.to_string(), style));
}

pub struct TypingView<'a>(pub &'a App);

impl Widget for TypingView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let app = self.0;
        let session = &app.session;

        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let green_bold_style = Style::default().patch(bold_style).fg(Color::Green);
        let red_bold_style = Style::default().patch(bold_style).fg(Color::Red);
        let dim_bold_style = Style::default()
            .patch(bold_style)
            .add_modifier(Modifier::DIM);
        let underlined_dim_bold_style = Style::default()
            .patch(dim_bold_style)
            .add_modifier(Modifier::UNDERLINED);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN.min(area.height / 4))
            .constraints([
                Constraint::Length(1), // header
                Constraint::Length(1), // padding
                Constraint::Min(1),    // prompt
                Constraint::Length(1), // notice
                Constraint::Length(1), // legend
            ])
            .split(area);

        let who = app
            .user()
            .map(|u| u.username.clone())
            .unwrap_or_else(|| "guest".to_string());
        let status = match session.state() {
            SessionState::Running => format!(
                "{}   time left {}   elapsed {}s",
                who,
                format_clock(session.seconds_remaining()),
                session.elapsed().as_secs()
            ),
            _ => format!(
                "{}   {} exam   start typing to begin",
                who,
                format_clock(session.policy().duration_seconds)
            ),
        };
        Paragraph::new(Span::styled(status, dim_bold_style))
            .alignment(Alignment::Center)
            .render(chunks[0], buf);

        let typed = session.transcript().chars();
        let mut spans = Vec::new();
        let mut cursor_width = 0usize;
        for (idx, &expected) in session.reference_chars().iter().enumerate() {
            let (c, style) = match typed.get(idx) {
                Some(&actual) if actual == expected => (display_char(expected), green_bold_style),
                Some(&' ') => ('·', red_bold_style),
                Some(&actual) => (display_char(actual), red_bold_style),
                None if idx == typed.len() => (display_char(expected), underlined_dim_bold_style),
                None => (display_char(expected), dim_bold_style),
            };
            if idx < typed.len() {
                cursor_width += c.width().unwrap_or(0);
            }
            push_styled(&mut spans, c, style);
        }

        // keep the cursor line in view for passages longer than the screen
        let prompt_area = chunks[2];
        let line_width = prompt_area.width.max(1) as usize;
        let cursor_line = (cursor_width / line_width) as u16;
        let scroll = cursor_line.saturating_sub(prompt_area.height / 2);

        Paragraph::new(Line::from(spans))
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .render(prompt_area, buf);

        if let Some(notice) = &app.notice {
            Paragraph::new(Span::styled(
                notice.clone(),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
        }

        Paragraph::new(Span::styled("(tab) finish / (esc)ape", italic_style))
            .render(chunks[4], buf);
    }
}

pub struct ResultsView<'a>(pub &'a App);

impl Widget for ResultsView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let app = self.0;
        let Some(result) = app.result() else {
            return;
        };
        let session = &app.session;

        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);
        let magenta_style = Style::default().fg(Color::Magenta);
        let red_style = Style::default().fg(Color::Red);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN.min(area.height / 4))
            .constraints([
                Constraint::Min(1),    // chart
                Constraint::Length(1), // headline stats
                Constraint::Length(1), // characters and time
                Constraint::Length(1), // save status
                Constraint::Length(4), // typed text review
                Constraint::Length(1), // legend
            ])
            .split(area);

        let series = session.series();
        let bounds = compute_chart_bounds(series, result.elapsed_seconds);
        let wpm_points = series.wpm_points();
        let error_points = scaled_error_points(series, &bounds);

        let datasets = vec![
            Dataset::default()
                .name("wpm")
                .marker(ratatui::symbols::Marker::Braille)
                .style(magenta_style)
                .graph_type(GraphType::Line)
                .data(&wpm_points),
            Dataset::default()
                .name("errors")
                .marker(ratatui::symbols::Marker::Dot)
                .style(red_style)
                .graph_type(GraphType::Line)
                .data(&error_points),
        ];

        Chart::new(datasets)
            .x_axis(
                Axis::default()
                    .title("seconds")
                    .bounds([0.0, bounds.seconds])
                    .labels(vec![
                        Span::styled("0", bold_style),
                        Span::styled(format_label(bounds.seconds), bold_style),
                    ]),
            )
            .y_axis(
                Axis::default()
                    .title("wpm")
                    .bounds([0.0, bounds.wpm])
                    .labels(vec![
                        Span::styled("0", bold_style),
                        Span::styled(format_label(bounds.wpm), bold_style),
                    ]),
            )
            .render(chunks[0], buf);

        Paragraph::new(Span::styled(
            format!(
                "{:.0} wpm   {:.0} net   {:.0}% acc   {:.0}% consistency   {} typos",
                result.wpm,
                result.net_wpm,
                result.accuracy_percent,
                result.consistency_percent,
                result.typos
            ),
            bold_style,
        ))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

        Paragraph::new(Span::raw(format!(
            "characters {}/{}/{}/{}   words {}/{}   time {}s   test: time {} · {}",
            result.correct_chars,
            result.incorrect_chars,
            result.extra_chars,
            result.missed_chars,
            result.correct_words,
            result.total_words,
            result.elapsed_seconds,
            app.exam.duration_seconds,
            app.exam.accuracy_mode,
        )))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

        let (save_text, save_style) = match &app.save_status {
            SaveStatus::Saved(id) => (
                format!("saved as result {id}"),
                Style::default().fg(Color::Green),
            ),
            SaveStatus::Failed(e) => (format!("not saved: {e}"), Style::default().fg(Color::Red)),
            SaveStatus::NotSaved => ("not saved".to_string(), italic_style),
        };
        Paragraph::new(Span::styled(save_text, save_style))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);

        let mut spans = Vec::new();
        for mark in mark_chars(session.reference(), &session.typed_text()) {
            match mark {
                CharMark::Correct(c) => push_styled(&mut spans, display_char(c), Style::default()),
                CharMark::Incorrect { typed, .. } | CharMark::Extra(typed) => {
                    push_styled(&mut spans, display_char(typed), red_style)
                }
                CharMark::Missed(_) => break,
            }
        }
        Paragraph::new(Line::from(spans))
            .wrap(Wrap { trim: false })
            .render(chunks[4], buf);

        let legend = if app.can_retake() {
            "(r)etake / (esc)ape"
        } else {
            "(esc)ape"
        };
        Paragraph::new(Span::styled(legend, italic_style)).render(chunks[5], buf);
    }
}
