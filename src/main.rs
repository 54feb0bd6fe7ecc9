//! ErgoBot - Entry Point
//!
//! Modes:
//! - Default: Telegram bot and dashboard
//! - --bot-only: Telegram bot only
//! - --dashboard-only: dashboard only (manual sends still use the bot token)

use ergobot::{
    Config, DashboardConfig, DashboardServer, OpenAiClient, Pipeline, Store, TelegramTransport,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let bot_only = args.iter().any(|a| a == "--bot-only");
    let dashboard_only = args.iter().any(|a| a == "--dashboard-only");
    let json_logs = args.iter().any(|a| a == "--json-logs");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("ErgoBot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: ergobot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --bot-only         Run only the Telegram bot");
        println!("  --dashboard-only   Run only the dashboard");
        println!("  --json-logs        Log as JSON to stderr");
        println!("  --help, -h         Show this help");
        println!();
        println!("Environment variables:");
        println!("  TELEGRAM_BOT_TOKEN          Telegram bot token (required)");
        println!("  OPENAI_API_KEY              Chat completion API key");
        println!("  OPENAI_BASE_URL             API base URL (default: https://api.openai.com/v1)");
        println!("  ERGOBOT_MODEL               Model name (default: gpt-4o)");
        println!("  ERGOBOT_DB_PATH             SQLite database path");
        println!("  ERGOBOT_SCORER              heuristic | llm (default: heuristic)");
        println!("  ERGOBOT_TIME_OFFSET_HOURS   Clock offset for quiet hours (default: 0)");
        println!("  ERGOBOT_POLICY_FILE         TOML file with fact keys and scorer keywords");
        println!("  DASHBOARD_BIND_ADDR         Dashboard address (default: 127.0.0.1)");
        println!("  DASHBOARD_PORT              Dashboard port (default: 5000)");
        return Ok(());
    }

    if bot_only && dashboard_only {
        anyhow::bail!("--bot-only and --dashboard-only are mutually exclusive");
    }

    // Setup logging
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("ErgoBot v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return Err(e);
        }
    };

    let store = Store::open(&config.db_path)?
        .with_default_quiet_hours(config.default_quiet_start, config.default_quiet_end);
    let store = Arc::new(Mutex::new(store));

    let model = OpenAiClient::from_config(&config);
    if !model.is_available() {
        warn!("OPENAI_API_KEY not set - every stage will answer with its fallback");
    }
    info!("Chat model: {}", model.model());

    let transport = TelegramTransport::new(&config.telegram_token);
    let bot = transport.bot().clone();
    let pipeline = Arc::new(Pipeline::from_config(
        &config,
        store,
        Arc::new(model),
        Arc::new(transport),
    ));

    if bot_only {
        return ergobot::telegram::run_bot(bot, pipeline).await;
    }

    let dashboard = DashboardServer::new(DashboardConfig::from_env(), pipeline.clone());
    if dashboard_only {
        return dashboard.run().await;
    }

    tokio::select! {
        result = ergobot::telegram::run_bot(bot, pipeline) => {
            result?;
            info!("Bot stopped");
        }
        result = dashboard.run() => {
            result?;
            info!("Dashboard stopped");
        }
    }

    Ok(())
}
