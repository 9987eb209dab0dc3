use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use lars_core::{available_models, build_client, Backend, ChatMode, ChatSession, Config, Conversation, ModeKind, Provider};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "lars")]
#[command(about = "Terminal chat with Chatbot Lars")]
#[command(version)]
struct Cli {
    /// Chat variant: scripted, open or gated
    #[arg(long)]
    mode: Option<String>,

    /// AI provider: gemini, ollama, claude or openai
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use (saved as the default for next time)
    #[arg(short, long)]
    model: Option<String>,

    /// Passphrase for gated mode (overrides LARS_SECRET and the config file)
    #[arg(long)]
    secret: Option<String>,

    /// Print the models available for the provider and exit
    #[arg(long)]
    list_models: bool,

    /// Log file (defaults to lars.log in the config directory)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli)?;

    let mut config = Config::load()?;
    if let Some(secret) = cli.secret.clone() {
        config.secret = Some(secret);
    }
    if let Some(provider) = &cli.provider {
        config.provider = Some(provider.clone());
    }

    if cli.list_models {
        return list_models(&config).await;
    }

    let explicit_mode = cli
        .mode
        .as_deref()
        .map(|m| m.parse::<ModeKind>().map_err(|e| anyhow!(e)))
        .transpose()?;
    let mode = config.resolve_mode(explicit_mode)?;

    let backend = match mode {
        ChatMode::Scripted => None,
        ChatMode::Open | ChatMode::Gated { .. } => {
            let provider = config.provider()?;
            let model = match &cli.model {
                Some(model) => {
                    if let Err(e) = Config::save_default_model(model) {
                        tracing::warn!(error = %e, "could not save default model");
                    }
                    model.clone()
                }
                None => config.model_for(provider),
            };
            Some(build_backend(provider, &model, &config)?)
        }
    };

    info!(mode = ?mode, "starting Chatbot Lars");

    let session = ChatSession::new(Conversation::new(mode), backend);
    let mut app = App::new(session);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    tui::restore()?;

    info!("Chatbot Lars stopped");
    result
}

fn build_backend(provider: Provider, model: &str, config: &Config) -> Result<Backend> {
    let client = build_client(provider, config).with_context(|| {
        match provider.api_key_env() {
            Some(var) => format!("set {} or add the key to {}", var, config_location()),
            None => format!("could not create the {} client", provider.display_name()),
        }
    })?;
    info!(provider = %provider, model, "using completion backend");
    Ok(Backend::new(client, model))
}

async fn list_models(config: &Config) -> Result<()> {
    let provider = config.provider()?;
    let models = available_models(provider, config)
        .await
        .with_context(|| format!("listing {} models", provider.display_name()))?;

    println!("{} models:", provider.display_name());
    if models.is_empty() {
        println!("  (none found)");
    }
    for model in models {
        println!("  {}", model);
    }
    Ok(())
}

fn config_location() -> String {
    Config::config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "the config file".to_string())
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await,
            None => break,
        }
    }

    Ok(())
}

/// Log to a file; the terminal belongs to the UI
fn init_logging(cli: &Cli) -> Result<WorkerGuard> {
    let path = match &cli.log_file {
        Some(path) => path.clone(),
        None => Config::log_path()?,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("log file path has no file name: {}", path.display()))?;

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(&dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .init();

    Ok(guard)
}
