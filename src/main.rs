use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use agentive::app::App;
use agentive::config::Config;
use agentive::handler;
use agentive::tui::{self, EventHandler};
use agentive::ui;

/// Log to a file; the terminal belongs to the TUI. The guard must stay alive
/// so buffered lines are flushed on exit.
fn init_logging() -> Result<WorkerGuard> {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("agentive");
    std::fs::create_dir_all(&dir)?;

    let file = tracing_appender::rolling::never(&dir, "agentive.log");
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("agentive=info")),
        )
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_logging()?;

    let config = Config::load()?;
    info!(backend = %config.backend_url, "starting agentive");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut app = App::new(&config);
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
