use chrono::{DateTime, Utc};
use mt5bot_core::*;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A request with the id the bridge echoes back in its reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub body: OutboundMessage,
}

/// A reply carrying the id of the request it answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(flatten)]
    pub body: InboundMessage,
}

/// Messages sent from the Rust client TO the MetaTrader bridge EA.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Attach to the terminal, optionally logging into a specific account.
    #[serde(rename = "initialize")]
    Initialize {
        login: Option<u64>,
        password: Option<String>,
        server: Option<String>,
    },
    #[serde(rename = "shutdown")]
    Shutdown,
    #[serde(rename = "account_info")]
    AccountInfo,
    #[serde(rename = "symbols_total")]
    SymbolsTotal,
    #[serde(rename = "symbols_get")]
    SymbolsGet { group: Option<String> },
    #[serde(rename = "symbol_info")]
    SymbolInfo { symbol: String },
    #[serde(rename = "symbol_select")]
    SymbolSelect { symbol: String, enable: bool },
    #[serde(rename = "symbol_info_tick")]
    SymbolInfoTick { symbol: String },
    /// Timeframes travel as the terminal's numeric constants.
    #[serde(rename = "copy_rates_from_pos")]
    CopyRatesFromPos {
        symbol: String,
        timeframe: i32,
        start_pos: usize,
        count: usize,
    },
    #[serde(rename = "copy_rates_from")]
    CopyRatesFrom {
        symbol: String,
        timeframe: i32,
        date_from: DateTime<Utc>,
        count: usize,
    },
    #[serde(rename = "copy_rates_range")]
    CopyRatesRange {
        symbol: String,
        timeframe: i32,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    },
    #[serde(rename = "order_check")]
    OrderCheck { request: TradeRequest },
    #[serde(rename = "order_send")]
    OrderSend { request: TradeRequest },
    #[serde(rename = "orders_total")]
    OrdersTotal,
    #[serde(rename = "orders_get")]
    OrdersGet { filter: OrderFilter },
    #[serde(rename = "positions_total")]
    PositionsTotal,
    #[serde(rename = "positions_get")]
    PositionsGet { filter: OrderFilter },
}

/// Messages received FROM the MetaTrader bridge EA.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// Reply to `Initialize`.
    #[serde(rename = "initialized")]
    Initialized { version: String },
    /// Reply to `Shutdown`.
    #[serde(rename = "ack")]
    Ack,
    #[serde(rename = "account")]
    Account { account: Option<AccountInfo> },
    /// Reply to any of the `*_total` requests.
    #[serde(rename = "count")]
    Count { total: usize },
    #[serde(rename = "symbols")]
    Symbols { symbols: Vec<SymbolInfo> },
    #[serde(rename = "symbol")]
    Symbol { info: Option<SymbolInfo> },
    #[serde(rename = "selected")]
    Selected { ok: bool },
    #[serde(rename = "tick")]
    Tick { tick: Option<Tick> },
    #[serde(rename = "rates")]
    Rates { rates: Vec<Rate> },
    #[serde(rename = "check_result")]
    CheckResult { result: CheckResult },
    #[serde(rename = "trade_result")]
    TradeResult { result: TradeResult },
    #[serde(rename = "orders")]
    Orders { orders: Vec<OrderInfo> },
    #[serde(rename = "positions")]
    Positions { positions: Vec<PositionInfo> },
    /// The terminal call failed; `code` is the terminal's last error.
    #[serde(rename = "error")]
    Error { code: i32, message: String },
}

impl InboundMessage {
    /// Short name used in protocol error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Initialized { .. } => "initialized",
            InboundMessage::Ack => "ack",
            InboundMessage::Account { .. } => "account",
            InboundMessage::Count { .. } => "count",
            InboundMessage::Symbols { .. } => "symbols",
            InboundMessage::Symbol { .. } => "symbol",
            InboundMessage::Selected { .. } => "selected",
            InboundMessage::Tick { .. } => "tick",
            InboundMessage::Rates { .. } => "rates",
            InboundMessage::CheckResult { .. } => "check_result",
            InboundMessage::TradeResult { .. } => "trade_result",
            InboundMessage::Orders { .. } => "orders",
            InboundMessage::Positions { .. } => "positions",
            InboundMessage::Error { .. } => "error",
        }
    }
}

/// Frame a message with a 4-byte length prefix (big-endian).
pub fn frame_message(msg: &[u8]) -> Vec<u8> {
    let len = msg.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(msg);
    framed
}

/// Serialize and write one framed message.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), TerminalError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(msg)
        .map_err(|e| TerminalError::Protocol(format!("Serialization error: {}", e)))?;
    writer
        .write_all(&frame_message(&json))
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Write error: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Write error: {}", e)))
}

/// Read and deserialize one framed message.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, TerminalError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    // Read 4-byte length prefix
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Read error: {}", e)))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TerminalError::Protocol(format!(
            "Frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_LEN
        )));
    }

    // Read message body
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Read error: {}", e)))?;

    serde_json::from_slice(&body)
        .map_err(|e| TerminalError::Protocol(format!("Deserialization error: {}", e)))
}
