use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use mindmate_core::audio::{default_player_command, default_recorder_command};
use mindmate_core::{ChatClient, ChatMode, CommandMicrophone, CommandPlayer, Config, MindMateApi, Session};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod handler;
mod tui;
mod ui;
mod view;

use app::App;
use view::ChannelView;

#[derive(Parser)]
#[command(name = "mindmate")]
#[command(about = "Chat with MindMate from the terminal, by keyboard or voice")]
struct Cli {
    /// Backend URL (defaults to $MINDMATE_SERVER_URL, then the config file)
    #[arg(short, long)]
    server: Option<String>,

    /// Conversation mode to start in
    #[arg(short, long, value_parser = parse_mode)]
    mode: Option<ChatMode>,

    /// Ignore the saved session and start a new one
    #[arg(long)]
    new_session: bool,

    /// Where to write logs
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn parse_mode(s: &str) -> Result<ChatMode, String> {
    ChatMode::from_str(s).ok_or_else(|| format!("unknown mode `{s}` (expected mental_health or study_buddy)"))
}

fn default_log_path() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("mindmate"))
        .unwrap_or_else(std::env::temp_dir)
        .join("mindmate.log")
}

/// Logs go to a file; the terminal belongs to the UI
fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_ansi(false).with_writer(Mutex::new(file)))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    Ok(())
}

async fn open_session(api: &MindMateApi, config: &Config) -> Session {
    match api.open_session().await {
        Ok(session) => {
            if let Some(id) = &session.session_id {
                if config.session_for(api.base_url()).as_ref() != Some(id) {
                    if let Err(e) = Config::save_session_id(api.base_url(), id) {
                        tracing::warn!(error = %e, "could not save session id");
                    }
                }
            }
            session
        }
        Err(e) => {
            // Bootstrap will report the failure in the conversation
            tracing::warn!(error = %e, url = api.base_url(), "could not open session");
            Session::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config; a broken file is reported once logging is up
    let loaded = Config::load();
    let config = loaded.as_ref().cloned().unwrap_or_else(|_| Config::new());

    let log_path = cli
        .log_file
        .clone()
        .or_else(|| config.log_file.clone())
        .unwrap_or_else(default_log_path);
    init_logging(&log_path)?;
    if let Err(e) = &loaded {
        tracing::warn!(error = %e, "could not load config, using defaults");
    }

    let server_url = cli
        .server
        .clone()
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| config.resolved_server_url());
    let mode = cli.mode.unwrap_or_else(|| config.resolved_mode());
    tracing::info!(%server_url, mode = mode.as_str(), "starting");

    let session_id = if cli.new_session { None } else { config.session_for(&server_url) };
    let api = Arc::new(MindMateApi::with_session(&server_url, session_id));
    let session = open_session(&api, &config).await;

    let microphone = CommandMicrophone::new(
        config.recorder_command.clone().unwrap_or_else(default_recorder_command),
    );
    let player = CommandPlayer::new(
        config.player_command.clone().unwrap_or_else(default_player_command),
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let client = ChatClient::new(
        api,
        Arc::new(ChannelView::new(events.sender())),
        Arc::new(microphone),
        Arc::new(player),
        mode,
    );
    let mut app = App::new(mode, server_url);

    {
        let client = client.clone();
        let history = session.history;
        tokio::spawn(async move { client.bootstrap(&history).await });
    }

    let result = run(&mut terminal, &mut app, &client, &mut events).await;

    tui::restore()?;
    tracing::info!("exiting");
    result
}

async fn run(
    terminal: &mut tui::Tui,
    app: &mut App,
    client: &ChatClient,
    events: &mut tui::EventHandler,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, client, event),
            None => break,
        }
    }
    Ok(())
}
