//! `BetNudge` Bot - Main Entry Point
//!
//! A Telegram bot that logs into a betting provider through a headless
//! browser and reports the account balance.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use teloxide::Bot;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use betnudge_bot::commands::CommandHandler;
use betnudge_bot::config::{BotSettings, ProviderConfig, TelegramConfig};
use betnudge_bot::session::{ChromiumEngine, ReaperMessage, SessionReaper, SessionRegistry};
use betnudge_bot::store::{CredentialStore, MemoryCredentialStore, MongoCredentialStore};
use betnudge_bot::telegram::{MessageChannel, RedactionScheduler, TelegramChannel, run_dispatcher};
use betnudge_bot::workflow::{CredentialValidator, WorkerPool};

/// Telegram bot that checks betting account balances through a headless browser.
#[derive(Parser, Debug)]
#[command(name = "betnudge_bot")]
#[command(about = "Log into a betting provider from Telegram and report the balance")]
#[command(version)]
struct Args {
    /// Path to the provider JSON configuration file.
    #[arg(short, long, default_value = "provider.json")]
    provider: String,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Generate an example provider configuration file and exit.
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Handle example config generation
    if args.generate_config {
        return generate_example_config();
    }

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let settings = BotSettings::from_env_with_defaults();

    let provider = ProviderConfig::load_or_default(&args.provider)
        .context("Failed to load provider configuration")?;
    provider
        .validate()
        .context("Provider configuration validation failed")?;

    info!(
        "Provider: {} ({}), max concurrent scrapes: {}",
        provider.name, provider.login_url, settings.max_concurrent_scrapes
    );

    let store = connect_store(&settings).await;

    // Browser sessions
    let engine = ChromiumEngine::new(settings.browser.clone());
    match engine.resolve_executable() {
        Some(path) => info!("Using browser executable: {}", path.display()),
        None => warn!("No browser executable found on PATH; launches will rely on auto-detection"),
    }
    let registry = Arc::new(SessionRegistry::new(engine));

    let (reaper_tx, reaper_rx) = mpsc::channel::<ReaperMessage>(8);
    let reaper_handle = settings.session_idle_timeout().map(|max_idle| {
        let reaper = SessionReaper::new(Arc::clone(&registry), max_idle);
        tokio::spawn(async move {
            reaper.run(reaper_rx).await;
        })
    });
    if reaper_handle.is_none() {
        info!("Idle session eviction disabled");
    }

    // Telegram
    let bot = Bot::new(tg_config.bot_token.clone());
    let channel = Arc::new(TelegramChannel::new(bot.clone()));
    let redactions = Arc::new(RedactionScheduler::new(
        Arc::clone(&channel) as Arc<dyn MessageChannel>
    ));

    let pool = Arc::new(WorkerPool::new(settings.max_concurrent_scrapes));
    let validator = Arc::new(CredentialValidator::new(Arc::clone(&registry), provider));
    let handler = Arc::new(CommandHandler::new(
        validator,
        Arc::clone(&pool),
        store,
        Arc::clone(&redactions),
        settings.redaction_delay(),
    ));

    info!("Bot is running. Use Ctrl+C to stop.");
    let dispatched = run_dispatcher(bot, &tg_config, handler, channel).await;

    // Cleanup
    info!("Shutting down...");
    if let Some(handle) = reaper_handle {
        let _ = reaper_tx.send(ReaperMessage::Shutdown).await;
        let _ = handle.await;
    }
    pool.shutdown();
    if !redactions.shutdown(settings.shutdown_grace()).await {
        warn!("Some password messages could not be deleted before exit");
    }

    let released = registry.release_all(settings.shutdown_grace()).await;
    info!("Released {} browser session(s)", released);

    dispatched.context("Telegram update listener failed")
}

/// Picks MongoDB when configured and reachable, the in-memory store otherwise.
async fn connect_store(settings: &BotSettings) -> Arc<dyn CredentialStore> {
    let Some(uri) = &settings.mongo_uri else {
        warn!("MONGO_URI not set; credentials are kept in memory only");
        return Arc::new(MemoryCredentialStore::new());
    };

    match MongoCredentialStore::connect(uri).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("{}; credentials are kept in memory only", e);
            Arc::new(MemoryCredentialStore::new())
        }
    }
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Generates an example provider configuration file.
fn generate_example_config() -> Result<()> {
    let example = ProviderConfig::example();
    example.save_to_file("provider.example.json")?;

    println!("✓ Example configuration written to: provider.example.json");
    println!("\nTo use this bot:");
    println!("1. Copy provider.example.json to provider.json");
    println!("2. Adjust the login URL and selectors if the provider site changes");
    println!("3. Create a .env file with TELEGRAM_BOT_TOKEN (and MONGO_URI)");
    println!("4. Run: betnudge_bot");

    Ok(())
}
