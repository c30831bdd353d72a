mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mt5bot_core::*;
use mt5bot_data::{table, MemoryJournal, PgOrderJournal};
use mt5bot_engine::connector::parse_rates_date;
use mt5bot_engine::{Connector, RatesStart, RequestParams, StrategyRunner};
use mt5bot_strategies::CoinFlipStrategy;
use mt5bot_terminal::{BridgeTerminal, SimulatedTerminal};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "mt5bot")]
#[command(about = "MetaTrader 5 trading scaffold: market data, trade requests, order history")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to ./mt5bot.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Database URL; overrides the [postgresql] section
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Also write warnings and errors to a daily rotating file in DIR
    #[arg(long, value_name = "DIR")]
    log_file: Option<PathBuf>,

    /// Use the in-memory simulated terminal instead of the socket bridge
    #[arg(long)]
    simulated: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print account information
    Account,

    /// List symbols known to the terminal
    Symbols {
        /// Group filter, e.g. "*USD*,!*JPY*"
        #[arg(short, long)]
        group: Option<String>,
    },

    /// Symbol specifications as CSV
    Info {
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Latest ticks as CSV
    Ticks {
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Bars as CSV
    Rates {
        symbol: String,

        /// Timeframe, e.g. M5, H1, D1
        #[arg(short, long, default_value = "D1")]
        timeframe: String,

        /// Bar index, or a date like "2024-01-31 00:00:00 UTC"
        #[arg(short, long, default_value = "0")]
        start: String,

        #[arg(short = 'n', long, default_value = "270")]
        count: usize,

        /// End date; turns a date start into a range
        #[arg(short, long)]
        end: Option<String>,
    },

    /// Working orders as CSV
    Orders(FilterArgs),

    /// Open positions as CSV
    Positions(FilterArgs),

    /// Build a request and check it without sending
    Check(RequestArgs),

    /// Build a request and send it
    Send(RequestArgs),

    /// Run the coin-flip traders until Ctrl-C
    Run {
        /// Symbols to trade (overrides the [runner] section)
        #[arg(short, long, num_args = 1..)]
        symbols: Vec<String>,

        #[arg(long)]
        max_trades: Option<usize>,

        #[arg(long)]
        delay_ms: Option<u64>,

        #[arg(long)]
        entry_probability: Option<f64>,
    },

    /// Order history database
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Run migrations and seed the return code table
    Init,

    /// Most recent journaled orders as CSV
    History {
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Args)]
struct FilterArgs {
    #[arg(short, long)]
    symbol: Option<String>,

    #[arg(short, long)]
    group: Option<String>,

    #[arg(short, long)]
    ticket: Option<u64>,
}

impl From<FilterArgs> for OrderFilter {
    fn from(args: FilterArgs) -> Self {
        OrderFilter {
            symbol: args.symbol,
            group: args.group,
            ticket: args.ticket,
        }
    }
}

#[derive(Args)]
struct RequestArgs {
    #[arg(short, long, default_value = "EURUSD")]
    symbol: String,

    #[arg(short, long, default_value = "0.01")]
    volume: Decimal,

    /// buy or sell
    #[arg(long, default_value = "buy")]
    side: Side,

    /// Market execution (price 0, RETURN filling)
    #[arg(long)]
    market: bool,

    #[arg(long, default_value = "100")]
    sl_points: u32,

    #[arg(long, default_value = "100")]
    tp_points: u32,

    #[arg(long, default_value = "123456")]
    magic: u64,

    #[arg(long, default_value = "mt5bot")]
    comment: String,

    /// Log every field of the check result
    #[arg(long)]
    verbose: bool,
}

impl RequestArgs {
    fn params(&self) -> RequestParams {
        RequestParams {
            symbol: self.symbol.clone(),
            volume: self.volume,
            order_type: OrderType::from(self.side),
            market: self.market,
            sl_points: self.sl_points,
            tp_points: self.tp_points,
            magic: self.magic,
            comment: self.comment.clone(),
            ..Default::default()
        }
    }
}

/// File name prefix of the rotating log; the date is appended.
const LOG_FILE_PREFIX: &str = "mt5bot.log";

/// Warnings and errors, appended to `DIR/mt5bot.log.YYYY-MM-DD`. Lines are
/// flushed when the guard drops.
fn file_layer<S>(dir: &Path) -> Result<(impl tracing_subscriber::Layer<S>, WorkerGuard), InitError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::WARN);
    Ok((layer, guard))
}

fn init_tracing(level: &str, json: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Tables go to stdout, logs to stderr.
    let stderr = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };
    let (file, guard) = match log_dir {
        Some(dir) => {
            let (layer, guard) = file_layer(dir)
                .with_context(|| format!("Failed to open log directory {}", dir.display()))?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(&cli.log_level, cli.log_json, cli.log_file.as_deref())?;

    let config_path = config::config_path(cli.config.as_deref());
    let app = match &config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let database_url = config::database_url(cli.database_url.as_deref(), config_path.as_deref())?;

    let command = match cli.command {
        Commands::Db { command } => {
            let url = database_url.context(
                "No database configured: pass --database-url or add a [postgresql] section",
            )?;
            return run_db(&command, &url).await;
        }
        other => other,
    };

    let journal: Arc<dyn OrderJournal> = match &database_url {
        Some(url) => Arc::new(PgOrderJournal::open(url).await?),
        None => {
            info!("No database configured, journaling orders in memory");
            Arc::new(MemoryJournal::new())
        }
    };
    let terminal: Arc<dyn Terminal> = if cli.simulated {
        info!("Using the simulated terminal");
        Arc::new(SimulatedTerminal::demo())
    } else {
        info!(address = %app.terminal.address(), "Using the terminal bridge");
        Arc::new(BridgeTerminal::new(app.terminal.clone()))
    };
    let connector = Arc::new(Connector::connect(terminal, Some(journal)).await?);

    let outcome = run_command(command, &app, Arc::clone(&connector)).await;
    if connector.terminal().is_connected() {
        if let Err(e) = connector.shutdown().await {
            warn!(error = %e, "Shutdown failed");
        }
    }
    outcome
}

async fn run_command(command: Commands, app: &AppConfig, connector: Arc<Connector>) -> Result<()> {
    match command {
        Commands::Account => {
            let account = connector.refresh_account().await?;
            print_json(&account)?;
            connector.balance();
        }
        Commands::Symbols { group } => {
            let symbols = connector.terminal().symbols_get(group.as_deref()).await?;
            info!(total = connector.symbols_total().await?, listed = symbols.len(), "Symbols");
            for symbol in symbols {
                println!("{}", symbol.name);
            }
        }
        Commands::Info { symbols } => {
            let rows = connector.symbol_info(&symbols).await?;
            table::write_csv(&rows, std::io::stdout())?;
        }
        Commands::Ticks { symbols } => {
            let rows = connector.tick_info(&symbols).await?;
            table::write_csv(&rows, std::io::stdout())?;
        }
        Commands::Rates {
            symbol,
            timeframe,
            start,
            count,
            end,
        } => {
            let timeframe: Timeframe = timeframe.parse().map_err(anyhow::Error::msg)?;
            let start: RatesStart = start.parse()?;
            let end = end.as_deref().map(parse_rates_date).transpose()?;
            let rows = connector.rates(&symbol, start, timeframe, count, end).await?;
            table::write_csv(&rows, std::io::stdout())?;
        }
        Commands::Orders(filter) => {
            info!(total = connector.orders_count().await?, "Working orders");
            let rows = connector.orders(&filter.into()).await?;
            table::write_csv(&rows, std::io::stdout())?;
        }
        Commands::Positions(filter) => {
            info!(total = connector.open_trades_count().await?, "Open positions");
            let rows = connector.open_trades(&filter.into()).await?;
            table::write_csv(&rows, std::io::stdout())?;
        }
        Commands::Check(args) => {
            let request = connector.make_request(&args.params()).await?;
            let result = connector.check_request(&request, args.verbose).await?;
            print_json(&result)?;
        }
        Commands::Send(args) => {
            let request = connector.make_request(&args.params()).await?;
            if args.verbose {
                connector.check_request(&request, true).await?;
            }
            let result = connector.send_command(&request).await?;
            print_json(&result)?;
        }
        Commands::Run {
            symbols,
            max_trades,
            delay_ms,
            entry_probability,
        } => {
            let mut runner_config = app.runner.clone();
            if !symbols.is_empty() {
                runner_config.symbols = symbols;
            }
            if let Some(max_trades) = max_trades {
                runner_config.max_trades = max_trades;
            }
            if let Some(delay_ms) = delay_ms {
                runner_config.delay_ms = delay_ms;
            }
            let mut strategy_config = app.strategy.clone();
            if let Some(p) = entry_probability {
                strategy_config.entry_probability = p;
            }

            let strategy = Arc::new(CoinFlipStrategy::new(strategy_config));
            let mut runner = StrategyRunner::new(runner_config, connector, strategy);
            runner.run().await?;
            info!(runner = %runner.name(), "Running, press Ctrl-C to stop");

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Stopping");
            let reports = runner.stop().await;
            print_json(&reports)?;
        }
        Commands::Db { .. } => anyhow::bail!("Database commands do not use the terminal"),
    }
    Ok(())
}

async fn run_db(command: &DbCommands, url: &str) -> Result<()> {
    let journal = PgOrderJournal::open(url).await?;
    match command {
        DbCommands::Init => {
            println!("Database ready");
        }
        DbCommands::History { limit } => {
            let rows = journal.recent_orders(*limit).await?;
            table::write_csv(&rows, std::io::stdout())?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_keeps_warnings() {
        let dir = std::env::temp_dir().join(format!("mt5bot-logs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let (layer, guard) = file_layer(&dir).unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            info!("routine");
            warn!("server busy");
        });
        drop(guard);

        let logs: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
            })
            .collect();
        assert_eq!(logs.len(), 1);
        let contents = std::fs::read_to_string(&logs[0]).unwrap();
        assert!(contents.contains("server busy"));
        assert!(!contents.contains("routine"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
