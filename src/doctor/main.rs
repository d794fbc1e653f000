//! Standalone diagnostics for the browser side of the bot.
//!
//! Checks a provider configuration file, reports which browser executable
//! would be launched and, with `--launch`, opens the provider's login page
//! to confirm the login form can be found.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use betnudge_bot::config::{BotSettings, ProviderConfig};
use betnudge_bot::session::{ChromiumEngine, SessionRegistry, UserIdentity};
use betnudge_bot::workflow::CredentialValidator;

/// Identity used for the diagnostic session; never a real chat user.
const DOCTOR_IDENTITY: UserIdentity = UserIdentity(0);

/// Browser and provider diagnostics.
#[derive(Parser, Debug)]
#[command(name = "browser_doctor")]
#[command(about = "Checks the provider configuration and the headless browser setup")]
#[command(version)]
struct Args {
    /// Path to the provider JSON configuration file.
    #[arg(short, long, default_value = "provider.json")]
    provider: String,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Launch a browser and open the login page.
    #[arg(long)]
    launch: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let Some(provider) = check_provider(&args.provider) else {
        return ExitCode::FAILURE;
    };

    let settings = BotSettings::from_env_with_defaults();
    let engine = ChromiumEngine::new(settings.browser.clone());

    println!("\nBrowser:");
    match engine.resolve_executable() {
        Some(path) => println!("  Executable: {}", path.display()),
        None => println!("  ⚠ No executable found on PATH (set CHROME_PATH)"),
    }
    println!("  Headless:   {}", settings.browser.headless);
    println!("  No sandbox: {}", settings.browser.no_sandbox);

    if !args.launch {
        return ExitCode::SUCCESS;
    }

    probe_login_page(engine, provider).await
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

fn check_provider(path: &str) -> Option<ProviderConfig> {
    println!("Validating: {path}");

    let config = match ProviderConfig::load_or_default(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {e}");
            return None;
        }
    };

    println!("  Provider:  {}", config.name);
    println!("  Login URL: {}", config.login_url);

    let problems = config.validate_all();
    if problems.is_empty() {
        println!("✓ Provider configuration is valid");
        Some(config)
    } else {
        for problem in &problems {
            println!("  ✗ Error: {problem}");
        }
        println!("✗ Validation failed: {} error(s)", problems.len());
        None
    }
}

async fn probe_login_page(engine: ChromiumEngine, provider: ProviderConfig) -> ExitCode {
    println!("\nLaunching browser...");
    let registry = Arc::new(SessionRegistry::new(engine));
    let validator = CredentialValidator::new(Arc::clone(&registry), provider);

    let result = validator.probe(DOCTOR_IDENTITY).await;
    registry.release(DOCTOR_IDENTITY).await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("✗ {e}");
            return ExitCode::FAILURE;
        }
    };

    let mark = |ok: bool| if ok { "✓" } else { "✗" };
    println!("  {} Login page loaded", mark(report.page_loaded));
    println!("  {} Phone field", mark(report.phone_field));
    println!("  {} Password field", mark(report.password_field));
    println!("  {} Submit button", mark(report.submit_button));

    if report.is_healthy() {
        println!("✓ Login form found");
        ExitCode::SUCCESS
    } else {
        println!("✗ Login form incomplete; check the selectors in the provider file");
        ExitCode::FAILURE
    }
}
