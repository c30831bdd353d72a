use crate::codes::*;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Terminal Trait
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the trading terminal.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("Not connected to the terminal")]
    NotConnected,
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),
    #[error("Terminal did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Terminal error {code}: {message}")]
    Terminal { code: i32, message: String },
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("No tick available for {0}")]
    NoTick(String),
}

/// The trading terminal API.
///
/// Every call mirrors one terminal function. Lookups for unknown symbols
/// return `Ok(None)` rather than an error, the way the terminal does.
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Establish the connection and log in.
    async fn connect(&self) -> Result<(), TerminalError>;

    /// Close the connection.
    async fn shutdown(&self) -> Result<(), TerminalError>;

    fn is_connected(&self) -> bool;

    async fn account_info(&self) -> Result<Option<AccountInfo>, TerminalError>;

    /// Number of symbols known to the terminal.
    async fn symbols_total(&self) -> Result<usize, TerminalError>;

    /// All symbols, optionally restricted by a group expression.
    async fn symbols_get(&self, group: Option<&str>) -> Result<Vec<SymbolInfo>, TerminalError>;

    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>, TerminalError>;

    /// Show (`enable = true`) or hide a symbol in Market Watch.
    async fn symbol_select(&self, symbol: &str, enable: bool) -> Result<bool, TerminalError>;

    async fn symbol_info_tick(&self, symbol: &str) -> Result<Option<Tick>, TerminalError>;

    /// `count` bars starting `start_pos` bars back from the current one.
    async fn copy_rates_from_pos(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_pos: usize,
        count: usize,
    ) -> Result<Vec<Rate>, TerminalError>;

    /// `count` bars ending at `date_from`.
    async fn copy_rates_from(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<Rate>, TerminalError>;

    /// All bars between `date_from` and `date_to`, inclusive.
    async fn copy_rates_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Result<Vec<Rate>, TerminalError>;

    /// Validate a request and compute its margin impact without sending it.
    async fn order_check(&self, request: &TradeRequest) -> Result<CheckResult, TerminalError>;

    async fn order_send(&self, request: &TradeRequest) -> Result<TradeResult, TerminalError>;

    /// Number of working (pending) orders.
    async fn orders_total(&self) -> Result<usize, TerminalError>;

    async fn orders_get(&self, filter: &OrderFilter) -> Result<Vec<OrderInfo>, TerminalError>;

    /// Number of open positions.
    async fn positions_total(&self) -> Result<usize, TerminalError>;

    async fn positions_get(&self, filter: &OrderFilter) -> Result<Vec<PositionInfo>, TerminalError>;
}

// ---------------------------------------------------------------------------
// Order Journal Trait
// ---------------------------------------------------------------------------

/// Errors from the order journal.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Persists executed orders and resolves return codes.
#[async_trait]
pub trait OrderJournal: Send + Sync {
    /// Append an executed order to the history.
    async fn save_order(&self, record: &OrderRecord) -> Result<(), StoreError>;

    /// Look up a trade server return code.
    async fn return_code(&self, id: u32) -> Result<Option<ReturnCode>, StoreError>;
}

// ---------------------------------------------------------------------------
// Strategy Trait
// ---------------------------------------------------------------------------

/// Decides, per symbol and quote, whether to open a trade and on which side.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Unique identifier for this strategy.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Called with the latest quote for `symbol`. `Some(side)` opens a trade.
    async fn on_quote(&self, symbol: &str, quote: &Quote) -> Option<Side>;
}
