//! Charging scenario runner
//!
//! # Usage
//!
//! ```bash
//! charger scenario.json [--config charger.toml] [--dump]
//! ```
//!
//! # Environment Variables
//!
//! * `CHARGER_LOCK_TIMEOUT_MS` - Lock wait in milliseconds (default: 5000)
//! * `CHARGER_ROUNDING_DECIMALS` - Decimals kept on debit costs (default: 10)
//! * `CHARGER_ROUNDING_METHOD` - `*up`, `*middle` or `*down` (default: `*middle`)
//! * `CHARGER_MIN_PREFIX_MATCH` - Shortest destination prefix tried (default: 1)
//! * `CHARGER_MAX_CALL_DURATION_SECS` - Longest request window (default: 10800)
//! * `CHARGER_DEFAULT_UNIT_RATING_SUBJECT` - Subject for unit balances without one (default: `*zero1s`)
//! * `CHARGER_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! * `CHARGER_LOG_FORMAT` - `pretty` or `json` (default: pretty)

use anyhow::{bail, Context};
use interface_cli::{AppConfig, LogFormat, Scenario, ScenarioRunner};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct Args {
    scenario: String,
    config: Option<String>,
    dump: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut scenario = None;
    let mut config = None;
    let mut dump = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next().context("--config needs a path")?),
            "--dump" => dump = true,
            _ if scenario.is_none() => scenario = Some(arg),
            other => bail!("unexpected argument {other}"),
        }
    }
    let Some(scenario) = scenario else {
        bail!("usage: charger <scenario.json> [--config <file>] [--dump]");
    };
    Ok(Args { scenario, config, dump })
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = parse_args()?;
    let config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.log_level, config.log_format);

    let charging = config.charging().context("invalid engine configuration")?;
    tracing::info!(
        scenario = %args.scenario,
        lock_timeout_ms = charging.lock_timeout_ms,
        "Starting charging scenario"
    );

    let json = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading {}", args.scenario))?;
    let runner = ScenarioRunner::new(Scenario::from_json(&json)?, charging)?;

    let outcomes = runner.run();
    for outcome in &outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }
    if args.dump {
        println!("{}", serde_json::to_string_pretty(&runner.snapshot())?);
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    tracing::info!(requests = outcomes.len(), failed, "Scenario complete");
    Ok(())
}

/// Initializes the tracing subscriber, `RUST_LOG` taking precedence over
/// the configured level
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}
