mod config;
mod events;
mod harness;
mod lobby;
mod tui;
mod world;

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use config::LoopbackConfig;
use events::HarnessEvent;
use harness::Harness;
use tether::{LatencySimulation, SessionConfig};
use tui::TuiState;

const LATENCY_STEP_MS: f64 = 20.0;

#[derive(Parser)]
#[command(name = "tether-loopback")]
#[command(about = "Runs a host and several peers in one process over memory links")]
struct Args {
    #[arg(short, long, default_value_t = 3)]
    peers: usize,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 8)]
    sprites: usize,

    #[arg(long, default_value_t = 5.0, help = "Seconds between sprite respawns")]
    respawn: f64,

    #[arg(long, default_value_t = 30.0, help = "Host updates per second")]
    rate: f64,

    #[arg(long, default_value_t = 80.0, help = "Client buffering delay in ms")]
    delay: f64,

    #[arg(long, default_value_t = 0.0, help = "Simulated latency in ms")]
    latency: f64,

    #[arg(long, default_value_t = 0.0, help = "Simulated packet delay variation in ms")]
    pdv: f64,

    #[arg(long, default_value_t = 0.0, help = "Simulated unreliable loss (0-100)")]
    loss: f64,

    #[arg(long, help = "Stop after this many seconds")]
    duration: Option<u64>,

    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = LoopbackConfig {
        peers: args.peers,
        tick_rate: args.tick_rate,
        sprites: args.sprites,
        respawn_secs: args.respawn,
        session: SessionConfig {
            host_update_rate: args.rate,
            client_delay: args.delay,
            ..SessionConfig::default()
        },
        latency: LatencySimulation::new(args.latency, args.pdv, args.loss / 100.0),
    };
    let limit = args.duration.map(Duration::from_secs);

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        let mut harness = Harness::new(config)?;
        log::info!("Loopback started with {} peers", args.peers);
        harness.run(limit);
        log::info!("Loopback shutting down");
    } else {
        let mut harness = Harness::new(config)?;
        run_with_tui(&mut harness, limit)?;
    }

    Ok(())
}

fn run_with_tui(harness: &mut Harness, limit: Option<Duration>) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = harness.running();
    let started = std::time::Instant::now();
    let mut tui_state = TuiState::new();

    tui_state.log_info("Loopback started");

    while running.load(Ordering::SeqCst) {
        if limit.is_some_and(|l| started.elapsed() >= l) {
            break;
        }
        harness.tick_once();

        for event in harness.drain_events() {
            match event {
                HarnessEvent::PeerOpened { node, alias, nid } => {
                    tui_state.log_info(format!("[{}] {} open (nid {})", node, alias, nid));
                }
                HarnessEvent::PeerClosed {
                    node,
                    alias,
                    reason,
                } => {
                    tui_state.log_info(format!("[{}] {} closed: {}", node, alias, reason));
                }
                HarnessEvent::RoomLeft { node, reason } => {
                    tui_state.log_warn(format!("[{}] left room: {}", node, reason));
                }
                HarnessEvent::Confirmed { alias } => {
                    tui_state.log_info(format!("[host] confirmed {}", alias));
                }
                HarnessEvent::Signalling { node, text } => {
                    tui_state.log_warn(format!("[{}] signalling: {}", node, text));
                }
                HarnessEvent::Error {
                    node,
                    kind,
                    message,
                } => {
                    tui_state.log_error(format!("[{}] {:?}: {}", node, kind, message));
                }
            }
        }

        if let Some(index) = tui_state.take_pending_kick() {
            harness.kick_peer(index);
        }

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let count = harness.peer_rows().len();
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            running.store(false, Ordering::SeqCst);
                        }
                        KeyCode::PageUp => tui_state.scroll_up(),
                        KeyCode::PageDown => tui_state.scroll_down(),
                        KeyCode::End => tui_state.scroll_to_bottom(),
                        KeyCode::Up => tui_state.select_prev(count),
                        KeyCode::Down => tui_state.select_next(count),
                        KeyCode::Char('k') | KeyCode::Char('K') => tui_state.request_kick(count),
                        KeyCode::Char('+') | KeyCode::Char('-') => {
                            let mut sim = harness.latency();
                            let step = if key.code == KeyCode::Char('+') {
                                LATENCY_STEP_MS
                            } else {
                                -LATENCY_STEP_MS
                            };
                            sim.latency_ms = (sim.latency_ms + step).max(0.0);
                            harness.set_latency(sim);
                            tui_state.log_info(format!("Simulated latency {:.0}ms", sim.latency_ms));
                        }
                        _ => {}
                    }
                }
            }
        }

        let stats = harness.stats();
        let peers = harness.peer_rows();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats, &peers);
        })?;
    }

    tui_state.log_info("Shutting down...");
    harness.shutdown();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
