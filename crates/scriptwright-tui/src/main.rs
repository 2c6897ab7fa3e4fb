mod app;
mod driver;
mod handler;
mod tui;
mod ui;
mod view;

use anyhow::{Context, Result};
use app::App;
use scriptwright_core::{Config, Session};
use std::fs::{self, OpenOptions};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use view::{SessionView, WatchObserver};

const LOG_FILTER_ENV: &str = "SCRIPTWRIGHT_LOG";

/// Log to a file so the alternate screen is never written over
fn init_logging() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .context("Could not find cache directory")?
        .join("scriptwright");
    fs::create_dir_all(&dir).context("Failed to create log directory")?;
    let path = dir.join("scriptwright.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    match init_logging() {
        Ok(path) => info!(log = %path.display(), "scriptwright starting"),
        Err(e) => eprintln!("Logging disabled: {:#}", e),
    }

    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "could not load config; using defaults");
        Config::new()
    });
    let backend_label = format!("{}: {}", config.provider().display_name(), config.model());
    let backend = config.backend()?;

    // Without an interactive stdin there is no way to ask for a folder
    let interactive = std::io::stdin().is_terminal();
    let session = Session::new(backend, interactive);
    let (view_tx, view_rx) = watch::channel(SessionView::from_session(&session));
    let session = session.with_observer(WatchObserver::new(view_tx));

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let driver = driver::spawn(session, command_rx);
    let mut app = App::new(view_rx.borrow().clone(), command_tx, backend_label);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app, view_rx).await;
    tui::restore()?;

    // An in-flight AI request would otherwise keep the process alive
    driver.abort();
    info!("scriptwright exiting");
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, mut view_rx: watch::Receiver<SessionView>) -> Result<()> {
    let mut events = tui::EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            Some(event) = events.next() => handler::handle_event(app, event),
            Ok(()) = view_rx.changed() => {
                let view = view_rx.borrow_and_update().clone();
                app.update_view(view);
            }
            else => break,
        }
    }
    Ok(())
}
