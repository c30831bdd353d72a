use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mt5bot_core::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::protocol::*;

/// Configuration for connecting to the MetaTrader 5 bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Host address (e.g. "127.0.0.1").
    pub host: String,
    /// Port the bridge EA is listening on.
    pub port: u16,
    /// How long to wait for each reply, in seconds.
    pub request_timeout_secs: u64,
    /// Trading account to log into. `None` keeps the terminal's current account.
    pub login: Option<u64>,
    pub password: Option<String>,
    pub server: Option<String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5556,
            request_timeout_secs: 10,
            login: None,
            password: None,
            server: None,
        }
    }
}

impl TerminalConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// MetaTrader 5 terminal reached through a socket bridge.
///
/// An MQL5 EA running inside MT5 answers length-prefixed JSON requests, one
/// per terminal API call. Requests are serialized: the stream lock is held
/// from write to matching reply.
pub struct BridgeTerminal {
    config: TerminalConfig,
    stream: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
    next_id: AtomicU64,
}

impl BridgeTerminal {
    pub fn new(config: TerminalConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    /// Send a request and wait for its reply.
    async fn call(&self, body: OutboundMessage) -> Result<InboundMessage, TerminalError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TerminalError::NotConnected)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request { id, body };
        let timeout = self.config.request_timeout();

        let exchange = async {
            write_frame(&mut *stream, &request).await?;
            loop {
                let response: Response = read_frame(&mut *stream).await?;
                if response.id == id {
                    return Ok::<_, TerminalError>(response.body);
                }
                // A reply to a request that timed out earlier
                warn!(expected = id, got = response.id, "Discarding stale bridge reply");
            }
        };

        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TerminalError::Timeout(timeout)),
        };

        // After a timeout or a bad frame the stream may sit mid-reply, so
        // nothing read from it afterwards can be trusted.
        match &result {
            Err(e @ TerminalError::ConnectionFailed(_))
            | Err(e @ TerminalError::Timeout(_))
            | Err(e @ TerminalError::Protocol(_)) => {
                warn!(error = %e, "Bridge connection lost");
                *guard = None;
                self.connected.store(false, Ordering::SeqCst);
            }
            _ => {}
        }

        match result? {
            InboundMessage::Error { code, message } => Err(TerminalError::Terminal { code, message }),
            body => Ok(body),
        }
    }

    fn unexpected(expected: &str, got: &InboundMessage) -> TerminalError {
        TerminalError::Protocol(format!("Expected '{}' reply, got '{}'", expected, got.kind()))
    }

    async fn call_count(&self, body: OutboundMessage) -> Result<usize, TerminalError> {
        match self.call(body).await? {
            InboundMessage::Count { total } => Ok(total),
            other => Err(Self::unexpected("count", &other)),
        }
    }

    async fn call_rates(&self, body: OutboundMessage) -> Result<Vec<Rate>, TerminalError> {
        match self.call(body).await? {
            InboundMessage::Rates { rates } => Ok(rates),
            other => Err(Self::unexpected("rates", &other)),
        }
    }
}

#[async_trait]
impl Terminal for BridgeTerminal {
    async fn connect(&self) -> Result<(), TerminalError> {
        let addr = self.config.address();
        info!("Connecting to MetaTrader bridge at {}", addr);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| TerminalError::ConnectionFailed(format!("TCP connect failed: {}", e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TerminalError::ConnectionFailed(format!("Socket setup failed: {}", e)))?;
        *self.stream.lock().await = Some(stream);

        let init = OutboundMessage::Initialize {
            login: self.config.login,
            password: self.config.password.clone(),
            server: self.config.server.clone(),
        };
        match self.call(init).await {
            Ok(InboundMessage::Initialized { version }) => {
                info!("Connected to MetaTrader bridge v{}", version);
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            Ok(other) => {
                *self.stream.lock().await = None;
                Err(TerminalError::ConnectionFailed(format!(
                    "Unexpected initial message '{}'",
                    other.kind()
                )))
            }
            Err(TerminalError::Terminal { code, message }) => {
                *self.stream.lock().await = None;
                Err(TerminalError::AuthorizationFailed(format!("{} (code {})", message, code)))
            }
            Err(e) => {
                *self.stream.lock().await = None;
                Err(e)
            }
        }
    }

    async fn shutdown(&self) -> Result<(), TerminalError> {
        if self.is_connected() {
            if let Err(e) = self.call(OutboundMessage::Shutdown).await {
                debug!("Bridge shutdown request failed: {}", e);
            }
        }
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("Disconnected from MetaTrader bridge");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn account_info(&self) -> Result<Option<AccountInfo>, TerminalError> {
        match self.call(OutboundMessage::AccountInfo).await? {
            InboundMessage::Account { account } => Ok(account),
            other => Err(Self::unexpected("account", &other)),
        }
    }

    async fn symbols_total(&self) -> Result<usize, TerminalError> {
        self.call_count(OutboundMessage::SymbolsTotal).await
    }

    async fn symbols_get(&self, group: Option<&str>) -> Result<Vec<SymbolInfo>, TerminalError> {
        let msg = OutboundMessage::SymbolsGet {
            group: group.map(str::to_string),
        };
        match self.call(msg).await? {
            InboundMessage::Symbols { symbols } => Ok(symbols),
            other => Err(Self::unexpected("symbols", &other)),
        }
    }

    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>, TerminalError> {
        let msg = OutboundMessage::SymbolInfo {
            symbol: symbol.to_string(),
        };
        match self.call(msg).await? {
            InboundMessage::Symbol { info } => Ok(info),
            other => Err(Self::unexpected("symbol", &other)),
        }
    }

    async fn symbol_select(&self, symbol: &str, enable: bool) -> Result<bool, TerminalError> {
        let msg = OutboundMessage::SymbolSelect {
            symbol: symbol.to_string(),
            enable,
        };
        match self.call(msg).await? {
            InboundMessage::Selected { ok } => Ok(ok),
            other => Err(Self::unexpected("selected", &other)),
        }
    }

    async fn symbol_info_tick(&self, symbol: &str) -> Result<Option<Tick>, TerminalError> {
        let msg = OutboundMessage::SymbolInfoTick {
            symbol: symbol.to_string(),
        };
        match self.call(msg).await? {
            InboundMessage::Tick { tick } => Ok(tick),
            other => Err(Self::unexpected("tick", &other)),
        }
    }

    async fn copy_rates_from_pos(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_pos: usize,
        count: usize,
    ) -> Result<Vec<Rate>, TerminalError> {
        self.call_rates(OutboundMessage::CopyRatesFromPos {
            symbol: symbol.to_string(),
            timeframe: timeframe.code(),
            start_pos,
            count,
        })
        .await
    }

    async fn copy_rates_from(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<Rate>, TerminalError> {
        self.call_rates(OutboundMessage::CopyRatesFrom {
            symbol: symbol.to_string(),
            timeframe: timeframe.code(),
            date_from,
            count,
        })
        .await
    }

    async fn copy_rates_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Result<Vec<Rate>, TerminalError> {
        self.call_rates(OutboundMessage::CopyRatesRange {
            symbol: symbol.to_string(),
            timeframe: timeframe.code(),
            date_from,
            date_to,
        })
        .await
    }

    async fn order_check(&self, request: &TradeRequest) -> Result<CheckResult, TerminalError> {
        let msg = OutboundMessage::OrderCheck {
            request: request.clone(),
        };
        match self.call(msg).await? {
            InboundMessage::CheckResult { result } => Ok(result),
            other => Err(Self::unexpected("check_result", &other)),
        }
    }

    async fn order_send(&self, request: &TradeRequest) -> Result<TradeResult, TerminalError> {
        let msg = OutboundMessage::OrderSend {
            request: request.clone(),
        };
        match self.call(msg).await? {
            InboundMessage::TradeResult { result } => Ok(result),
            other => Err(Self::unexpected("trade_result", &other)),
        }
    }

    async fn orders_total(&self) -> Result<usize, TerminalError> {
        self.call_count(OutboundMessage::OrdersTotal).await
    }

    async fn orders_get(&self, filter: &OrderFilter) -> Result<Vec<OrderInfo>, TerminalError> {
        let msg = OutboundMessage::OrdersGet {
            filter: filter.clone(),
        };
        match self.call(msg).await? {
            InboundMessage::Orders { orders } => Ok(orders),
            other => Err(Self::unexpected("orders", &other)),
        }
    }

    async fn positions_total(&self) -> Result<usize, TerminalError> {
        self.call_count(OutboundMessage::PositionsTotal).await
    }

    async fn positions_get(&self, filter: &OrderFilter) -> Result<Vec<PositionInfo>, TerminalError> {
        let msg = OutboundMessage::PositionsGet {
            filter: filter.clone(),
        };
        match self.call(msg).await? {
            InboundMessage::Positions { positions } => Ok(positions),
            other => Err(Self::unexpected("positions", &other)),
        }
    }
}
