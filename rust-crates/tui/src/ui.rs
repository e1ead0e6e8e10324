use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use random_winner_game::{
    game::{
        display_address,
        display_ether,
    },
    view::{
        ActionPanel,
        ViewState,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;

pub enum UserEvent {
    Quit,
    Redraw,
    Refresh,
    Connect { password: String },
    ConnectDeclined,
    JoinGame,
    StartGame { entry_fee: String, max_players: String },
    DismissAlert,
}

/// Static facts shown in the title bar.
#[derive(Clone, Debug)]
pub struct Header {
    pub network: String,
    pub contract: String,
    pub wallet: String,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    Password(String),
    StartForm(StartFormState),
    QuitModal,
}

#[derive(Clone, Debug, Default)]
struct StartFormState {
    entry_fee: String,
    max_players: String,
    focus: StartField,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum StartField {
    #[default]
    EntryFee,
    MaxPlayers,
}

pub type InputEventReceiver = EventStream;

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input stream closed")),
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, header: &Header, view: &ViewState) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        let res = render(&mut term, state, header, view);
        state.terminal = Some(term);
        res?;
    }
    Ok(())
}

fn render<B: Backend>(
    terminal: &mut Terminal<B>,
    state: &UiState,
    header: &Header,
    view: &ViewState,
) -> Result<()> {
    terminal.draw(|f| ui(f, state, header, view))?;
    Ok(())
}

/// Maps a terminal event to a user intent. While an alert is showing, the
/// only accepted input is its acknowledgement.
pub fn interpret_event(
    state: &mut UiState,
    view: &ViewState,
    event: Event,
) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(_, _) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    if view.alert.is_some() {
        return match key.code {
            KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ') => Some(UserEvent::DismissAlert),
            _ => None,
        };
    }

    match &mut state.mode {
        Mode::Password(buffer) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::ConnectDeclined)
            }
            KeyCode::Enter => {
                let password = std::mem::take(buffer);
                state.mode = Mode::Normal;
                Some(UserEvent::Connect { password })
            }
            KeyCode::Backspace => {
                buffer.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) => {
                buffer.push(c);
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::StartForm(form) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                form.focus = match form.focus {
                    StartField::EntryFee => StartField::MaxPlayers,
                    StartField::MaxPlayers => StartField::EntryFee,
                };
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let form = std::mem::take(form);
                state.mode = Mode::Normal;
                Some(UserEvent::StartGame {
                    entry_fee: form.entry_fee,
                    max_players: form.max_players,
                })
            }
            KeyCode::Backspace => {
                form.field_mut().pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) if form.accepts(c) => {
                form.field_mut().push(c);
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::QuitModal => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Normal => interpret_normal(state, view, key),
    }
}

fn interpret_normal(state: &mut UiState, view: &ViewState, key: KeyEvent) -> Option<UserEvent> {
    let panel = view.action_panel();
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('r') => Some(UserEvent::Refresh),
        KeyCode::Char('c') if panel == ActionPanel::Connect => {
            state.mode = Mode::Password(String::new());
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('j') if matches!(panel, ActionPanel::Join { .. }) => {
            Some(UserEvent::JoinGame)
        }
        KeyCode::Char('s') if panel == ActionPanel::StartForm => {
            state.mode = Mode::StartForm(StartFormState::default());
            Some(UserEvent::Redraw)
        }
        KeyCode::Enter => match panel {
            ActionPanel::Connect => {
                state.mode = Mode::Password(String::new());
                Some(UserEvent::Redraw)
            }
            ActionPanel::Join { .. } => Some(UserEvent::JoinGame),
            ActionPanel::StartForm => {
                state.mode = Mode::StartForm(StartFormState::default());
                Some(UserEvent::Redraw)
            }
            ActionPanel::Loading | ActionPanel::Resolving | ActionPanel::Idle => None,
        },
        _ => None,
    }
}

impl StartFormState {
    fn field_mut(&mut self) -> &mut String {
        match self.focus {
            StartField::EntryFee => &mut self.entry_fee,
            StartField::MaxPlayers => &mut self.max_players,
        }
    }

    fn accepts(&self, c: char) -> bool {
        match self.focus {
            StartField::EntryFee => c.is_ascii_digit() || c == '.' || c == '-',
            StartField::MaxPlayers => c.is_ascii_digit(),
        }
    }
}

fn ui(f: &mut Frame, state: &UiState, header: &Header, view: &ViewState) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Length(4), // description + game summary
            Constraint::Length(3), // action panel
            Constraint::Min(6),    // logs
            Constraint::Length(6), // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_title(f, chunks[0], header);
    draw_summary(f, chunks[1], view);
    draw_action_panel(f, chunks[2], view);
    draw_logs(f, chunks[3], view);
    draw_status(f, chunks[4], view);
    draw_help(f, chunks[5], view);
    draw_modals(f, state, view);
}

fn draw_title(f: &mut Frame, area: Rect, header: &Header) {
    let text = format!(
        "Network: {} | Contract: {} | Wallet: {}",
        header.network, header.contract, header.wallet
    );
    let widget = Paragraph::new(text).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Welcome to Random Winner Game"),
    );
    f.render_widget(widget, area);
}

fn draw_summary(f: &mut Frame, area: Rect, view: &ViewState) {
    let snap = view.snapshot();
    let account = match view.signer() {
        Some(address) if view.session.is_owner => format!("{} (owner)", display_address(&address)),
        Some(address) => display_address(&address),
        None => "not connected".to_string(),
    };
    let winner = snap
        .winner
        .map(|w| display_address(&w))
        .unwrap_or_else(|| "-".to_string());
    let updated = view
        .last_updated
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    let lines = vec![
        Line::from(
            "Its a lottery game where a winner is chosen at random and wins the entire lottery pool",
        ),
        Line::from(format!(
            "Account: {account} | Entry fee: {} ETH | Players: {} / {} | Last winner: {winner} | Updated: {updated}",
            display_ether(snap.entry_fee),
            snap.players.len(),
            snap.max_players,
        )),
    ];
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Game"));
    f.render_widget(widget, area);
}

fn draw_action_panel(f: &mut Frame, area: Rect, view: &ViewState) {
    let panel = view.action_panel();
    let (text, style) = match &panel {
        ActionPanel::Connect => (
            format!("[Enter] {}", panel.label()),
            Style::default().fg(Color::Cyan),
        ),
        ActionPanel::Loading => (panel.label(), Style::default().fg(Color::Yellow)),
        ActionPanel::Resolving => (panel.label(), Style::default().fg(Color::DarkGray)),
        ActionPanel::Join { .. } => (
            format!("[Enter] {}", panel.label()),
            Style::default().fg(Color::Green),
        ),
        ActionPanel::StartForm => (
            format!("[Enter] {} (set entry fee and max players)", panel.label()),
            Style::default().fg(Color::Green),
        ),
        ActionPanel::Idle => (
            "Waiting for the owner to start a game".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    };
    let widget = Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title("Action"));
    f.render_widget(widget, area);
}

fn draw_logs(f: &mut Frame, area: Rect, view: &ViewState) {
    let items: Vec<ListItem> = view
        .snapshot()
        .logs
        .iter()
        .map(|log| ListItem::new(log.as_str()))
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Log"));
    f.render_widget(list, area);
}

fn draw_status(f: &mut Frame, area: Rect, view: &ViewState) {
    let widget = if view.errors.is_empty() {
        let status = if view.status.trim().is_empty() {
            "Ready"
        } else {
            view.status.as_str()
        };
        Paragraph::new(status)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        // Newest first; the panel only has room for a few lines.
        let lines: Vec<Line> = std::iter::once(Line::from(view.status.clone()))
            .chain(view.errors.iter().rev().map(|e| Line::from(e.clone())))
            .collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, view: &ViewState) {
    let action = match view.action_panel() {
        ActionPanel::Connect => "c connect | ",
        ActionPanel::Join { .. } => "j join | ",
        ActionPanel::StartForm => "s start | ",
        _ => "",
    };
    let help = Paragraph::new(format!("Enter action | {action}r refresh | q/Esc quit"))
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, view: &ViewState) {
    match &state.mode {
        Mode::Password(buffer) => {
            let area = centered_rect(50, 20, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Unlock Wallet");
            let p = Paragraph::new(format!(
                "Password: {}\nEnter=connect Esc=cancel",
                "*".repeat(buffer.chars().count())
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::StartForm(form) => {
            let area = centered_rect(50, 30, f.area());
            let block = Block::default().borders(Borders::ALL).title("Start Game");
            let marker = |field: StartField| if form.focus == field { ">" } else { " " };
            let lines = vec![
                Line::from(format!(
                    "{} Entry Fee (ETH): {}",
                    marker(StartField::EntryFee),
                    form.entry_fee
                )),
                Line::from(format!(
                    "{} Max players: {}",
                    marker(StartField::MaxPlayers),
                    form.max_players
                )),
                Line::from(""),
                Line::from("Enter=start Tab=next field Esc=cancel"),
            ];
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit the game? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }

    // The alert is drawn last so it sits above any modal.
    if let Some(alert) = &view.alert {
        let area = centered_rect(50, 20, f.area());
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title("Alert");
        let p = Paragraph::new(format!("{alert}\n\nPress Enter to continue"))
            .wrap(Wrap { trim: false });
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
