//! guruh-bot process entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Open the persistent store and the Bot API transport
//!   6. Build the responder
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Run comms channels until shutdown
//!   9. Cancel token + join

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use guruh_bot::config;
use guruh_bot::error::AppError;
use guruh_bot::logger;
use guruh_bot::subsystems::comms::{self, Transport, bot_api::BotApiClient};
use guruh_bot::subsystems::memory::PersistentStore;
use guruh_bot::subsystems::responder::Responder;
use guruh_bot::subsystems::responder::activation::AdminAllowList;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level)?;

    info!(
        bot_name = %config.bot_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let token = config.bot_token.clone().ok_or_else(|| {
        AppError::Config("TELEGRAM_BOT_TOKEN (or API_TOKEN) is not set".to_string())
    })?;

    let store = PersistentStore::open(&config.store, &config.work_dir)?;

    let transport: Arc<dyn Transport> = Arc::new(BotApiClient::new(
        &config.comms.api_base_url,
        &token,
        config.comms.outbound_timeout,
    )?);

    let admins = AdminAllowList::new(&config.admin_ids);
    if admins.is_unrestricted() {
        warn!("ADMIN_IDS is empty; every sender may run admin commands");
    } else {
        info!(admins = admins.len(), "admin allow-list loaded");
    }

    let responder = Arc::new(Responder::new(
        store,
        transport,
        &config.responder,
        admins,
        config.comms.outbound_timeout,
    ));

    // Ctrl-C cancels the shared token; every channel watches it.
    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    let comms = comms::start(&config, responder, shutdown.clone());
    let result = comms.join().await;

    // Channels may exit on their own error; make sure nothing keeps running.
    shutdown.cancel();

    info!("shutdown complete");
    result
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: guruh-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -c, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                println!();
                println!("Environment:");
                println!("  TELEGRAM_BOT_TOKEN         Bot API token (required)");
                println!("  ADMIN_IDS                  Comma-separated admin user ids");
                std::process::exit(0);
            }
            "-c" | "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -c/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (per-event routing, skipped reactions)
    //   -vvvv+  → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
