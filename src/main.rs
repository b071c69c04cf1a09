use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bharatnyay::app::App;
use bharatnyay::tui::{self, EventHandler, Tui};
use bharatnyay::{handler, ui};
use bharatnyay::{CompletionPipeline, CompletionTransport, Config, Conversation, Message, OpenAIClient};

#[derive(Parser)]
#[command(name = "bharatnyay")]
#[command(version, about = "Chat about Indian law and the Constitution of India")]
struct Cli {
    /// Completion endpoint URL (overrides config and environment)
    #[arg(long, global = true)]
    endpoint: Option<String>,
    /// Model identifier sent with each request
    #[arg(long, global = true)]
    model: Option<String>,
    /// Where to write logs while the TUI is running
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the reply
    Ask {
        /// Your question
        question: String,
    },
    /// Show the resolved configuration
    Config {
        /// Write the config file with current file values (or defaults)
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env next to the binary's working directory, like the web build's env file
    dotenvy::dotenv().ok();

    // The TUI owns the terminal, so its logs go to a file
    match cli.command {
        None => init_file_logging(cli.log_file.clone())?,
        Some(_) => init_stderr_logging(),
    }

    let mut config = Config::load();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }

    match cli.command {
        None => run_tui(config).await?,
        Some(Commands::Ask { question }) => ask(config, &question).await?,
        Some(Commands::Config { init }) => show_config(&config, init)?,
    }

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bharatnyay=info"))
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn init_file_logging(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not determine cache directory"))?
            .join("bharatnyay")
            .join("bharatnyay.log"),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::options().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn build_pipeline(config: &Config) -> Result<CompletionPipeline<OpenAIClient>> {
    if config.api_key.is_none() {
        warn!("no API key configured; set OPENAI_API_KEY or add api_key to the config file");
    }
    let client = OpenAIClient::new(config)?;
    Ok(CompletionPipeline::new(client, config))
}

async fn run_tui(config: Config) -> Result<()> {
    let pipeline = build_pipeline(&config)?;
    info!(model = %config.model, endpoint = %config.endpoint, "starting chat");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(pipeline, &config.model, events.sender());

    let result = event_loop(&mut terminal, &mut events, &mut app).await;
    tui::restore()?;
    result
}

async fn event_loop<T: CompletionTransport + 'static>(
    terminal: &mut Tui,
    events: &mut EventHandler,
    app: &mut App<T>,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
    }
    Ok(())
}

async fn ask(config: Config, question: &str) -> Result<()> {
    let pipeline = build_pipeline(&config)?;

    let mut conversation = Conversation::new();
    conversation.push(Message::user(question));

    let reply = pipeline.run(&conversation.snapshot()).await;
    info!(outcome = ?reply.outcome, attempts = reply.attempts, "reply ready");
    println!("{}", reply.into_message().text);

    Ok(())
}

fn show_config(config: &Config, init: bool) -> Result<()> {
    if init {
        // Only file values are persisted; env credentials stay out of the file
        let on_disk = Config::load_from(&Config::get_config_path()?)?;
        let path = on_disk.save()?;
        println!("Wrote {}", path.display());
    }

    println!("Config file:      {}", Config::get_config_path()?.display());
    println!("Endpoint:         {}", config.endpoint);
    println!("Model:            {}", config.model);
    println!("API key:          {}", config.masked_api_key());
    println!("Max attempts:     {}", config.max_attempts);
    println!("Retry delay:      {}s", config.retry_delay_secs);
    println!("Request timeout:  {}s", config.request_timeout_secs);

    Ok(())
}
