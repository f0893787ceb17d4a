use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Row, Table, TableState};

use crate::harness::{HarnessStats, PeerRow};

const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

pub struct TuiState {
    log: VecDeque<(Level, String)>,
    scroll: usize,
    selected: usize,
    pending_kick: Option<usize>,
}

impl Default for TuiState {
    fn default() -> Self {
        Self::new()
    }
}

impl TuiState {
    pub fn new() -> Self {
        Self {
            log: VecDeque::new(),
            scroll: 0,
            selected: 0,
            pending_kick: None,
        }
    }

    fn push(&mut self, level: Level, message: String) {
        if self.log.len() >= MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back((level, message));
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message.into());
    }

    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.push(Level::Warn, message.into());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message.into());
    }

    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 5).min(self.log.len());
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(5);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }

    pub fn select_prev(&mut self, count: usize) {
        if count > 0 {
            self.selected = (self.selected + count - 1) % count;
        }
    }

    pub fn select_next(&mut self, count: usize) {
        if count > 0 {
            self.selected = (self.selected + 1) % count;
        }
    }

    pub fn request_kick(&mut self, count: usize) {
        if self.selected < count {
            self.pending_kick = Some(self.selected);
        }
    }

    pub fn take_pending_kick(&mut self) -> Option<usize> {
        self.pending_kick.take()
    }
}

pub fn render(frame: &mut Frame, state: &TuiState, stats: &HarnessStats, peers: &[PeerRow]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Length(peers.len() as u16 + 3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_network(frame, chunks[1], stats);
    render_peers(frame, chunks[2], state, peers);
    render_log(frame, chunks[3], state);
    render_help(frame, chunks[4]);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &HarnessStats) {
    let uptime = format_duration(stats.uptime_secs);
    let title = format!(" Tether Loopback - Uptime: {} ", uptime);

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Tick: {}  |  Host time: {:.0}ms  |  Peers: {} ({} confirmed)  |  Instances: {}",
        stats.tick,
        stats.sim_time_ms,
        stats.open_peers,
        stats.confirmed_peers,
        stats.instance_count
    );

    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(paragraph, area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &HarnessStats) {
    let block = Block::default()
        .title(" Host traffic ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let net = &stats.traffic;
    let sim = &stats.latency;
    let lines = vec![
        Line::from(vec![
            Span::styled("Messages: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{} sent / {} recv  ({}/s out, {}/s in)",
                    net.messages_sent,
                    net.messages_received,
                    net.outbound_per_sec,
                    net.inbound_per_sec
                ),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("Bytes: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{} sent / {} recv  ({}/s out)",
                    format_bytes(net.bytes_sent),
                    format_bytes(net.bytes_received),
                    format_bytes(net.outbound_bytes_per_sec)
                ),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("Simulated: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{:.0}ms (+/- {:.0}ms), {:.1}% loss, {} held",
                    sim.latency_ms,
                    sim.pdv_ms,
                    sim.loss * 100.0,
                    stats.delayed_frames
                ),
                Style::default().fg(if sim.loss > 0.05 {
                    Color::Red
                } else {
                    Color::White
                }),
            ),
        ]),
    ];

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

fn render_peers(frame: &mut Frame, area: Rect, state: &TuiState, peers: &[PeerRow]) {
    let block = Block::default()
        .title(" Peers ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let header = Row::new([
        "Alias", "Id", "NID", "Room", "Latency", "PDV", "Seen", "Sim delay", "Skew", "Destroyed",
    ])
    .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));

    let rows = peers.iter().map(|p| {
        Row::new([
            p.alias.clone(),
            p.id.clone(),
            p.nid.to_string(),
            if p.in_room { "yes" } else { "no" }.to_string(),
            format!("{:.1}ms", p.latency),
            format!("{:.1}ms", p.pdv),
            p.instances.to_string(),
            format!("{:.1}ms", p.sim_delay),
            format!("{:+.1}ms", p.time_diff),
            p.destroyed.to_string(),
        ])
    });

    let widths = [
        Constraint::Length(8),
        Constraint::Length(5),
        Constraint::Length(4),
        Constraint::Length(5),
        Constraint::Length(9),
        Constraint::Length(8),
        Constraint::Length(5),
        Constraint::Length(10),
        Constraint::Length(12),
        Constraint::Length(9),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(Style::default().bg(Color::DarkGray));

    let mut table_state = TableState::default();
    if !peers.is_empty() {
        table_state.select(Some(state.selected.min(peers.len() - 1)));
    }
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let visible = area.height.saturating_sub(2) as usize;
    let end = state.log.len().saturating_sub(state.scroll);
    let start = end.saturating_sub(visible);

    let items: Vec<ListItem> = state
        .log
        .range(start..end)
        .map(|(level, message)| {
            let color = match level {
                Level::Info => Color::White,
                Level::Warn => Color::Yellow,
                Level::Error => Color::Red,
            };
            ListItem::new(Line::from(Span::styled(
                message.as_str(),
                Style::default().fg(color),
            )))
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new(
        "q/ESC quit  |  Up/Down select peer  |  k kick  |  +/- latency  |  PgUp/PgDn/End scroll",
    )
    .block(block)
    .style(
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    );

    frame.render_widget(text, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
