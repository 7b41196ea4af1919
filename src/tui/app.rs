// src/tui/app.rs — Chat screen state, event loop, and rendering.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::backend::sse::SseChannel;
use crate::backend::{BackendClient, DocEntry};
use crate::infra::config::Config;
use crate::infra::errors::RaglineError;
use crate::session::{Role, SessionUpdate, StartOutcome, StreamSession};

use super::theme::Theme;

/// How long a notice stays on screen.
const NOTICE_TTL: Duration = Duration::from_millis(2200);

/// Results of background backend calls, delivered to the render loop.
enum UiEvent {
    Docs(Result<Vec<DocEntry>, RaglineError>),
}

// ── App state ────────────────────────────────────────────────────

struct App {
    session: StreamSession,
    backend: BackendClient,
    input: String,
    /// Lines scrolled up from the bottom of the transcript. 0 follows the
    /// stream.
    scroll_back: u16,
    docs: Vec<DocEntry>,
    backend_ok: Option<bool>,
    notice: Option<(String, Instant)>,
    ui_tx: UnboundedSender<UiEvent>,
    ui_rx: UnboundedReceiver<UiEvent>,
}

impl App {
    fn set_notice(&mut self, message: impl Into<String>) {
        self.notice = Some((message.into(), Instant::now()));
    }

    fn expire_notice(&mut self) {
        if let Some((_, since)) = &self.notice {
            if since.elapsed() >= NOTICE_TTL {
                self.notice = None;
            }
        }
    }

    fn submit(&mut self) {
        let question = std::mem::take(&mut self.input);
        match self.session.start(&question) {
            StartOutcome::Rejected => {
                // Empty after trimming: silently ignored
                self.input = question;
            }
            StartOutcome::Started { superseded } => {
                if superseded {
                    self.set_notice("New request");
                }
                self.scroll_back = 0;
            }
        }
    }

    fn stop_stream(&mut self) {
        if let Some(notice) = self.session.cancel("Stopped") {
            self.set_notice(notice);
        }
    }

    fn new_conversation(&mut self) {
        self.session.reset();
        self.scroll_back = 0;
        self.set_notice("New conversation");
    }

    fn toggle_device(&mut self) {
        let device = self.session.device().toggled();
        self.session.set_device(device);
        self.set_notice(format!("LLM: {}", device.as_str().to_uppercase()));
    }

    fn clear_sources(&mut self) {
        self.session.clear_citations();
        self.set_notice("Sources cleared");
    }

    /// Fetch the document list in the background; the result lands in the
    /// render loop via `ui_rx`. Success doubles as the connectivity probe.
    fn refresh_docs(&self) {
        let backend = self.backend.clone();
        let tx = self.ui_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(UiEvent::Docs(backend.docs().await));
        });
    }

    /// Drain pending stream signals and backend results.
    fn pump_events(&mut self) {
        while let Some(signal) = self.session.try_signal() {
            match self.session.apply(signal) {
                SessionUpdate::Finished { notice } => self.set_notice(notice),
                SessionUpdate::Failed { notice } => self.set_notice(notice),
                SessionUpdate::Token(_) | SessionUpdate::Sources | SessionUpdate::Stale => {}
            }
        }

        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Docs(Ok(docs)) => {
                    self.docs = docs;
                    self.backend_ok = Some(true);
                }
                UiEvent::Docs(Err(e)) => {
                    tracing::debug!("docs refresh failed: {e}");
                    self.docs.clear();
                    self.backend_ok = Some(false);
                }
            }
        }
    }
}

// ── Public entry point ───────────────────────────────────────────

/// Launch the chat screen. Blocks until the user quits (Ctrl-C, or Esc while
/// idle).
pub fn run_chat(config: &Config, backend: BackendClient) -> anyhow::Result<()> {
    let channel = Arc::new(SseChannel::new(&config.backend.base_url)?);
    let idle_timeout = config
        .chat
        .stream_idle_timeout_secs
        .map(Duration::from_secs);
    let session = StreamSession::new(channel, config.chat.device, idle_timeout);

    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let mut app = App {
        session,
        backend,
        input: String::new(),
        scroll_back: 0,
        docs: Vec::new(),
        backend_ok: None,
        notice: None,
        ui_tx,
        ui_rx,
    };
    app.refresh_docs();

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let term_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(term_backend)?;

    let result = run_event_loop(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> anyhow::Result<()> {
    loop {
        app.pump_events();
        app.expire_notice();

        terminal.draw(|f| render(f, app))?;

        // Short poll so streamed tokens render promptly
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        // Quit
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(());
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('n') => app.new_conversation(),
                KeyCode::Char('t') => app.toggle_device(),
                KeyCode::Char('r') => app.refresh_docs(),
                KeyCode::Char('l') => app.clear_sources(),
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Esc => {
                if app.session.is_active() {
                    app.stop_stream();
                } else {
                    return Ok(());
                }
            }
            KeyCode::Enter => app.submit(),
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Up => app.scroll_back = app.scroll_back.saturating_add(1),
            KeyCode::Down => app.scroll_back = app.scroll_back.saturating_sub(1),
            KeyCode::PageUp => app.scroll_back = app.scroll_back.saturating_add(10),
            KeyCode::PageDown => app.scroll_back = app.scroll_back.saturating_sub(10),
            KeyCode::Char(c) => app.input.push(c),
            _ => {}
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────

fn render(f: &mut Frame, app: &mut App) {
    let size = f.area();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Status header
            Constraint::Min(5),    // Transcript + side panel
            Constraint::Length(3), // Input
            Constraint::Length(1), // Footer / key hints
        ])
        .split(size);

    render_header(f, rows[0], app);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(30), Constraint::Length(36)])
        .split(rows[1]);

    render_transcript(f, columns[0], app);
    render_side_panel(f, columns[1], app);
    render_input(f, rows[2], app);
    render_footer(f, rows[3]);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let status = if app.session.is_active() {
        Span::styled("streaming...", Theme::warning())
    } else {
        Span::styled("ready", Theme::text_dim())
    };

    let mut spans = vec![
        Span::styled(" ragline ", Theme::header()),
        Span::styled("● ", Theme::badge(app.backend_ok)),
        Span::styled(app.backend.base_url().to_string(), Theme::text_dim()),
        Span::styled("  LLM: ", Theme::text_dim()),
        Span::styled(
            app.session.device().as_str().to_uppercase(),
            Theme::text(),
        ),
        Span::styled("  ", Theme::text_dim()),
        status,
    ];

    if let Some((notice, _)) = &app.notice {
        spans.push(Span::styled("  • ", Theme::text_dim()));
        spans.push(Span::styled(notice.clone(), Theme::notice()));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_transcript(f: &mut Frame, area: Rect, app: &mut App) {
    let block = Block::default()
        .title(Span::styled(" Chat ", Theme::header()))
        .borders(Borders::ALL)
        .border_style(Theme::border());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let log = app.session.conversation();
    if log.is_empty() {
        let hint = Paragraph::new(Line::from(Span::styled(
            "Ask a question about your documents.",
            Theme::text_dim(),
        )));
        f.render_widget(hint, inner);
        return;
    }

    let live = app.session.is_active();
    let mut lines: Vec<Line> = Vec::new();
    let count = log.messages().len();
    for (i, msg) in log.messages().iter().enumerate() {
        let (who, style) = match msg.role {
            Role::User => ("You", Theme::user()),
            Role::Assistant => ("Assistant", Theme::assistant()),
        };
        let stamp = msg.created_at.with_timezone(&chrono::Local).format("%H:%M");
        lines.push(Line::from(vec![
            Span::styled(who, style),
            Span::styled(format!(" • {stamp}"), Theme::meta()),
        ]));

        let is_live_tail = live && i + 1 == count && msg.role == Role::Assistant;
        let mut content_lines = msg.content.split('\n').peekable();
        while let Some(text) = content_lines.next() {
            let mut spans = vec![Span::styled(text.to_string(), Theme::text())];
            if is_live_tail && content_lines.peek().is_none() {
                spans.push(Span::styled("▌", Theme::warning()));
            }
            lines.push(Line::from(spans));
        }
        lines.push(Line::default());
    }

    // Follow the bottom unless the user scrolled back.
    let total = wrapped_height(&lines, inner.width);
    let max_back = total.saturating_sub(inner.height);
    app.scroll_back = app.scroll_back.min(max_back);
    let from_top = max_back - app.scroll_back;

    let transcript = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .scroll((from_top, 0));
    f.render_widget(transcript, inner);
}

/// Wrapped line count estimate for scroll math, matching Wrap { trim: false }
/// closely enough for display purposes.
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    if width == 0 {
        return 0;
    }
    lines
        .iter()
        .map(|line| {
            let w = line.width() as u16;
            if w == 0 {
                1
            } else {
                w.div_ceil(width)
            }
        })
        .sum()
}

fn render_side_panel(f: &mut Frame, area: Rect, app: &App) {
    let halves = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    render_sources(f, halves[0], app);
    render_docs(f, halves[1], app);
}

fn render_sources(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(Span::styled(" Sources ", Theme::header()))
        .borders(Borders::ALL)
        .border_style(Theme::border());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let citations = app.session.conversation().citations();
    let mut lines: Vec<Line> = Vec::new();

    if citations.is_empty() {
        lines.push(Line::from(Span::styled("No sources yet.", Theme::text_dim())));
        lines.push(Line::from(Span::styled(
            "Citations appear with the answer.",
            Theme::meta(),
        )));
    } else {
        for c in citations {
            let mut top = vec![Span::styled(c.source.clone(), Theme::text())];
            if let Some(page) = c.page {
                top.push(Span::styled(format!("  p.{page}"), Theme::text_dim()));
            }
            lines.push(Line::from(top));
            if let Some(excerpt) = &c.excerpt {
                lines.push(Line::from(Span::styled(excerpt.clone(), Theme::meta())));
            }
        }
    }

    let list = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
    f.render_widget(list, inner);
}

fn render_docs(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(Span::styled(" Documents ", Theme::header()))
        .borders(Borders::ALL)
        .border_style(Theme::border());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let mut lines: Vec<Line> = Vec::new();
    if app.docs.is_empty() {
        lines.push(Line::from(Span::styled("No documents", Theme::text_dim())));
        lines.push(Line::from(Span::styled("Upload + ingest", Theme::meta())));
    } else {
        for doc in &app.docs {
            let name_style = if doc.is_indexed() {
                Theme::text()
            } else {
                Theme::text_dim()
            };
            lines.push(Line::from(vec![
                Span::styled(doc.name.clone(), name_style),
                Span::styled(format!("  {}", doc.meta_label()), Theme::meta()),
            ]));
        }
    }

    f.render_widget(Paragraph::new(Text::from(lines)), inner);
}

fn render_input(f: &mut Frame, area: Rect, app: &App) {
    let border = if app.session.is_active() {
        Theme::border()
    } else {
        Theme::border_focus()
    };
    let block = Block::default()
        .title(Span::styled(
            format!(" Question ({}) ", app.input.chars().count()),
            Theme::text_dim(),
        ))
        .borders(Borders::ALL)
        .border_style(border);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let input = Paragraph::new(Line::from(vec![
        Span::styled(app.input.clone(), Theme::text()),
        Span::styled("_", Theme::text_dim()),
    ]));
    f.render_widget(input, inner);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let hints = Line::from(vec![
        Span::styled(" Enter", Theme::key_hint()),
        Span::styled(" send  ", Theme::key_desc()),
        Span::styled("Esc", Theme::key_hint()),
        Span::styled(" stop/quit  ", Theme::key_desc()),
        Span::styled("^N", Theme::key_hint()),
        Span::styled(" new chat  ", Theme::key_desc()),
        Span::styled("^T", Theme::key_hint()),
        Span::styled(" device  ", Theme::key_desc()),
        Span::styled("^R", Theme::key_hint()),
        Span::styled(" docs  ", Theme::key_desc()),
        Span::styled("^L", Theme::key_hint()),
        Span::styled(" clear sources  ", Theme::key_desc()),
        Span::styled("\u{2191}\u{2193}", Theme::key_hint()),
        Span::styled(" scroll", Theme::key_desc()),
    ]);
    f.render_widget(Paragraph::new(hints), area);
}
