//! High-level wrapper over a [`Terminal`].
//!
//! The connector owns the login state, keeps track of the symbols it has
//! put into Market Watch, builds trade requests from a handful of
//! parameters, and journals every order the trade server accepts.

use chrono::{DateTime, NaiveDateTime, Utc};
use mt5bot_core::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Date format accepted for rate windows.
pub const RATES_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Terminal(#[from] TerminalError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Unable to select symbols: {}", .0.join(", "))]
    SymbolsNotSelected(Vec<String>),
    #[error("Order rejected by the trade server ({retcode} {constant}): {description}")]
    OrderRejected {
        retcode: u32,
        constant: String,
        description: String,
    },
    #[error("Start '{0}' is neither a bar index nor a date like '2024-01-31 00:00:00 UTC'")]
    InvalidRatesStart(String),
    #[error("Order type {0:?} has no buy or sell side")]
    UnsupportedOrderType(OrderType),
}

/// Where a rates window begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatesStart {
    /// Bars back from the current bar.
    Index(usize),
    Date(DateTime<Utc>),
}

impl FromStr for RatesStart {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return Ok(RatesStart::Index(index));
        }
        parse_rates_date(s).map(RatesStart::Date)
    }
}

/// Parse a `"%Y-%m-%d %H:%M:%S UTC"` timestamp.
pub fn parse_rates_date(s: &str) -> Result<DateTime<Utc>, ConnectorError> {
    NaiveDateTime::parse_from_str(s.trim(), RATES_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ConnectorError::InvalidRatesStart(s.to_string()))
}

/// Inputs to [`Connector::make_request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestParams {
    pub action: TradeAction,
    pub symbol: String,
    pub volume: Decimal,
    pub order_type: OrderType,
    /// Market execution: price 0 and RETURN filling.
    pub market: bool,
    /// Stop-loss distance in points; zero leaves the stop unset.
    pub sl_points: u32,
    pub tp_points: u32,
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            action: TradeAction::Deal,
            symbol: "EURUSD".to_string(),
            volume: Decimal::new(1, 2),
            order_type: OrderType::Buy,
            market: false,
            sl_points: 100,
            tp_points: 100,
            deviation: 10,
            magic: 123456,
            comment: "mt5bot".to_string(),
        }
    }
}

pub struct Connector {
    terminal: Arc<dyn Terminal>,
    journal: Option<Arc<dyn OrderJournal>>,
    account: Mutex<AccountInfo>,
    /// Symbols this connector has put into Market Watch.
    selected: Mutex<Vec<String>>,
}

impl Connector {
    /// Connect and log in. Without account info the terminal is shut down
    /// and the login is reported as failed.
    pub async fn connect(
        terminal: Arc<dyn Terminal>,
        journal: Option<Arc<dyn OrderJournal>>,
    ) -> Result<Self, ConnectorError> {
        terminal.connect().await?;
        info!("Connected to terminal");

        let account = match terminal.account_info().await? {
            Some(account) => account,
            None => {
                error!("Server authorization failed, shutting the terminal down");
                if let Err(e) = terminal.shutdown().await {
                    warn!(error = %e, "Terminal shutdown failed");
                }
                return Err(TerminalError::AuthorizationFailed(
                    "terminal reported no account".to_string(),
                )
                .into());
            }
        };

        let symbols = terminal.symbols_total().await?;
        info!(
            login = account.login,
            server = %account.server,
            symbols,
            "Logged in"
        );

        Ok(Self {
            terminal,
            journal,
            account: Mutex::new(account),
            selected: Mutex::new(Vec::new()),
        })
    }

    pub fn terminal(&self) -> &Arc<dyn Terminal> {
        &self.terminal
    }

    fn account_guard(&self) -> MutexGuard<'_, AccountInfo> {
        self.account.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn selected_guard(&self) -> MutexGuard<'_, Vec<String>> {
        self.selected.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Account snapshot taken at login or on the last refresh.
    pub fn account(&self) -> AccountInfo {
        self.account_guard().clone()
    }

    pub async fn refresh_account(&self) -> Result<AccountInfo, ConnectorError> {
        let account = self.terminal.account_info().await?.ok_or_else(|| {
            TerminalError::AuthorizationFailed("terminal reported no account".to_string())
        })?;
        *self.account_guard() = account.clone();
        Ok(account)
    }

    pub fn balance(&self) -> Decimal {
        let account = self.account_guard();
        info!(
            balance = %account.balance,
            equity = %account.equity,
            currency = %account.currency,
            "Account balance {} {}, equity {} {}",
            account.balance,
            account.currency,
            account.equity,
            account.currency
        );
        account.balance
    }

    pub async fn symbols_total(&self) -> Result<usize, ConnectorError> {
        Ok(self.terminal.symbols_total().await?)
    }

    /// Symbols selected so far, in selection order.
    pub fn selected(&self) -> Vec<String> {
        self.selected_guard().clone()
    }

    /// Add symbols to Market Watch. True iff every requested symbol is
    /// selected afterwards.
    pub async fn select_symbols(&self, symbols: &[String]) -> Result<bool, ConnectorError> {
        let pending: Vec<String> = {
            let selected = self.selected_guard();
            let mut pending: Vec<String> = Vec::new();
            for symbol in symbols {
                if !selected.contains(symbol) && !pending.contains(symbol) {
                    pending.push(symbol.clone());
                }
            }
            pending
        };

        let mut all_selected = true;
        for symbol in pending {
            if self.terminal.symbol_select(&symbol, true).await? {
                let mut selected = self.selected_guard();
                if !selected.contains(&symbol) {
                    selected.push(symbol);
                }
            } else {
                warn!(%symbol, "Failed to select symbol");
                all_selected = false;
            }
        }
        Ok(all_selected)
    }

    fn missing(&self, symbols: &[String]) -> Vec<String> {
        let selected = self.selected_guard();
        symbols
            .iter()
            .filter(|s| !selected.contains(s))
            .cloned()
            .collect()
    }

    /// Full specification of each symbol, selecting them first.
    pub async fn symbol_info(&self, symbols: &[String]) -> Result<Vec<SymbolInfo>, ConnectorError> {
        if !self.select_symbols(symbols).await? {
            warn!("Unable to get info from unselected symbols");
            return Err(ConnectorError::SymbolsNotSelected(self.missing(symbols)));
        }
        let mut rows = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(info) = self.terminal.symbol_info(symbol).await? {
                rows.push(info);
            }
        }
        Ok(rows)
    }

    /// Build a trade request priced off the current quote.
    ///
    /// Buys price at the ask with the stop below and the target above;
    /// sells price at the bid with both mirrored.
    pub async fn make_request(&self, params: &RequestParams) -> Result<TradeRequest, ConnectorError> {
        let symbol = params.symbol.as_str();
        let info = self
            .terminal
            .symbol_info(symbol)
            .await?
            .ok_or_else(|| TerminalError::SymbolNotFound(symbol.to_string()))?;

        // Ask the terminal even for symbols selected earlier: they may have
        // been hidden since.
        if !info.visible {
            debug!(%symbol, "Symbol not visible, selecting it");
            if !self.terminal.symbol_select(symbol, true).await? {
                warn!(%symbol, "Failed to select symbol");
                return Err(ConnectorError::SymbolsNotSelected(vec![symbol.to_string()]));
            }
            let mut selected = self.selected_guard();
            if !selected.iter().any(|s| s == symbol) {
                selected.push(symbol.to_string());
            }
        }

        let side = params
            .order_type
            .side()
            .ok_or(ConnectorError::UnsupportedOrderType(params.order_type))?;
        let tick = self
            .terminal
            .symbol_info_tick(symbol)
            .await?
            .ok_or_else(|| TerminalError::NoTick(symbol.to_string()))?;

        let price = tick.price_for(side);
        let sl_offset = info.point * Decimal::from(params.sl_points);
        let tp_offset = info.point * Decimal::from(params.tp_points);
        let (sl, tp) = match side {
            Side::Buy => (price - sl_offset, price + tp_offset),
            Side::Sell => (price + sl_offset, price - tp_offset),
        };
        let stop = |level: Decimal, points: u32| {
            if points == 0 {
                Decimal::ZERO
            } else {
                level.round_dp(info.digits)
            }
        };

        let mut request = TradeRequest {
            action: params.action,
            symbol: symbol.to_string(),
            volume: params.volume,
            order_type: params.order_type,
            price,
            sl: stop(sl, params.sl_points),
            tp: stop(tp, params.tp_points),
            deviation: params.deviation,
            magic: params.magic,
            comment: params.comment.clone(),
            type_time: OrderTime::Gtc,
            type_filling: OrderFilling::Fok,
            order: None,
            position: None,
        };
        if params.market {
            request.price = Decimal::ZERO;
            request.type_filling = OrderFilling::Return;
        }
        Ok(request)
    }

    /// Ask the trade server whether a request would be accepted.
    pub async fn check_request(
        &self,
        request: &TradeRequest,
        verbose: bool,
    ) -> Result<CheckResult, ConnectorError> {
        let result = self.terminal.order_check(request).await?;
        if result.is_valid() {
            info!(symbol = %request.symbol, "Request valid");
        } else {
            let code = self.describe_retcode(result.retcode).await;
            warn!(
                retcode = result.retcode,
                constant = %code.constant,
                "Request issue: {}",
                code.description
            );
        }

        if verbose {
            info!(
                retcode = result.retcode,
                balance = %result.balance,
                equity = %result.equity,
                profit = %result.profit,
                margin = %result.margin,
                margin_free = %result.margin_free,
                margin_level = %result.margin_level,
                comment = %result.comment,
                "Check result"
            );
            log_request(&result.request);
        }
        Ok(result)
    }

    /// Send a request. Accepted orders are journaled; anything else comes
    /// back as `OrderRejected`.
    pub async fn send_command(&self, request: &TradeRequest) -> Result<TradeResult, ConnectorError> {
        let result = self.terminal.order_send(request).await?;

        if !result.is_success() {
            debug!(?result, "Order result");
            let code = self.describe_retcode(result.retcode).await;
            warn!(
                retcode = result.retcode,
                symbol = %request.symbol,
                "Order issue: {}",
                code.description
            );
            log_request(&result.request);
            return Err(ConnectorError::OrderRejected {
                retcode: code.id,
                constant: code.constant,
                description: code.description,
            });
        }

        info!(
            order = result.order,
            deal = result.deal,
            symbol = %request.symbol,
            volume = %result.volume,
            price = %result.price,
            "Command executed"
        );

        if let Some(journal) = &self.journal {
            let record = OrderRecord::from_result(&result, Utc::now());
            if let Err(e) = journal.save_order(&record).await {
                error!(order = result.order, error = %e, "Failed to journal order");
            }
        }
        Ok(result)
    }

    /// Constant and description for a return code: the journal's table
    /// first, then the built-in one.
    pub async fn describe_retcode(&self, retcode: u32) -> ReturnCode {
        if let Some(journal) = &self.journal {
            match journal.return_code(retcode).await {
                Ok(Some(code)) => return code,
                Ok(None) => {}
                Err(e) => warn!(retcode, error = %e, "Return code lookup failed"),
            }
        }
        ReturnCode::builtin(retcode).unwrap_or_else(|| ReturnCode::unknown(retcode))
    }

    pub async fn orders_count(&self) -> Result<usize, ConnectorError> {
        Ok(self.terminal.orders_total().await?)
    }

    pub async fn orders(&self, filter: &OrderFilter) -> Result<Vec<OrderInfo>, ConnectorError> {
        let orders = self.terminal.orders_get(filter).await?;
        if orders.is_empty() {
            debug!(?filter, "No orders found");
        }
        Ok(orders)
    }

    pub async fn open_trades_count(&self) -> Result<usize, ConnectorError> {
        Ok(self.terminal.positions_total().await?)
    }

    pub async fn open_trades(&self, filter: &OrderFilter) -> Result<Vec<PositionInfo>, ConnectorError> {
        Ok(self.terminal.positions_get(filter).await?)
    }

    /// Bars for a symbol.
    ///
    /// An index start returns `count` bars back from that bar. A date start
    /// returns the range up to `end` when given, otherwise `count` bars
    /// from the date.
    pub async fn rates(
        &self,
        symbol: &str,
        start: RatesStart,
        timeframe: Timeframe,
        count: usize,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Rate>, ConnectorError> {
        let rates = match (start, end) {
            (RatesStart::Index(pos), _) => {
                self.terminal
                    .copy_rates_from_pos(symbol, timeframe, pos, count)
                    .await?
            }
            (RatesStart::Date(from), Some(to)) => {
                self.terminal
                    .copy_rates_range(symbol, timeframe, from, to)
                    .await?
            }
            (RatesStart::Date(from), None) => {
                self.terminal
                    .copy_rates_from(symbol, timeframe, from, count)
                    .await?
            }
        };
        debug!(%symbol, %timeframe, bars = rates.len(), "Rates loaded");
        Ok(rates)
    }

    /// Latest tick for each symbol that has one.
    pub async fn tick_info(&self, symbols: &[String]) -> Result<Vec<Tick>, ConnectorError> {
        let mut ticks = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.terminal.symbol_info_tick(symbol).await? {
                Some(tick) => ticks.push(tick),
                None => debug!(%symbol, "No tick"),
            }
        }
        Ok(ticks)
    }

    pub async fn shutdown(&self) -> Result<(), ConnectorError> {
        self.terminal.shutdown().await?;
        info!("Terminal connection closed");
        Ok(())
    }
}

fn log_request(request: &TradeRequest) {
    info!(
        action = ?request.action,
        symbol = %request.symbol,
        volume = %request.volume,
        order_type = ?request.order_type,
        price = %request.price,
        sl = %request.sl,
        tp = %request.tp,
        deviation = request.deviation,
        magic = request.magic,
        comment = %request.comment,
        type_time = ?request.type_time,
        type_filling = ?request.type_filling,
        "Trade request"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mt5bot_data::MemoryJournal;
    use mt5bot_terminal::{SimulatedTerminal, SimulatedTerminalConfig};
    use rust_decimal_macros::dec;

    async fn connector() -> (Connector, Arc<MemoryJournal>) {
        let journal = Arc::new(MemoryJournal::new());
        let connector = Connector::connect(Arc::new(SimulatedTerminal::demo()), Some(journal.clone()))
            .await
            .unwrap();
        (connector, journal)
    }

    struct FailingJournal;

    #[async_trait]
    impl OrderJournal for FailingJournal {
        async fn save_order(&self, _record: &OrderRecord) -> Result<(), StoreError> {
            Err(StoreError::Database("connection refused".to_string()))
        }

        async fn return_code(&self, _id: u32) -> Result<Option<ReturnCode>, StoreError> {
            Err(StoreError::Database("connection refused".to_string()))
        }
    }

    fn names(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unauthorized_login_shuts_down() {
        let terminal = Arc::new(SimulatedTerminal::new(SimulatedTerminalConfig {
            authorized: false,
            ..Default::default()
        }));
        let result = Connector::connect(terminal.clone(), None).await;
        assert!(matches!(
            result,
            Err(ConnectorError::Terminal(TerminalError::AuthorizationFailed(_)))
        ));
        assert!(!terminal.is_connected());
    }

    #[tokio::test]
    async fn test_balance_from_login_snapshot() {
        let (conn, _) = connector().await;
        assert_eq!(conn.balance(), dec!(10000));
        assert_eq!(conn.account().currency, "USD");
        assert_eq!(conn.symbols_total().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_select_symbols_never_duplicates() {
        let (conn, _) = connector().await;
        assert!(conn
            .select_symbols(&names(&["EURUSD", "EURUSD", "GBPUSD"]))
            .await
            .unwrap());
        assert!(conn.select_symbols(&names(&["GBPUSD"])).await.unwrap());
        assert_eq!(conn.selected(), names(&["EURUSD", "GBPUSD"]));

        assert!(!conn.select_symbols(&names(&["EURUSD", "NOPE"])).await.unwrap());
        assert_eq!(conn.selected(), names(&["EURUSD", "GBPUSD"]));
    }

    #[tokio::test]
    async fn test_symbol_info_requires_selection() {
        let (conn, _) = connector().await;
        let rows = conn.symbol_info(&names(&["EURUSD", "USDJPY"])).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].digits, 3);

        match conn.symbol_info(&names(&["EURUSD", "NOPE"])).await {
            Err(ConnectorError::SymbolsNotSelected(missing)) => assert_eq!(missing, names(&["NOPE"])),
            other => panic!("unexpected {:?}", other.map(|r| r.len())),
        }
    }

    #[tokio::test]
    async fn test_buy_request_prices_off_ask() {
        let (conn, _) = connector().await;
        let request = conn.make_request(&RequestParams::default()).await.unwrap();
        assert_eq!(request.price, dec!(1.08512));
        assert_eq!(request.sl, dec!(1.08412));
        assert_eq!(request.tp, dec!(1.08612));
        assert_eq!(request.deviation, 10);
        assert_eq!(request.type_time, OrderTime::Gtc);
        assert_eq!(request.type_filling, OrderFilling::Fok);
        // Hidden symbols are selected on the way.
        assert_eq!(conn.selected(), names(&["EURUSD"]));
    }

    #[tokio::test]
    async fn test_request_reselects_hidden_symbol() {
        let (conn, _) = connector().await;
        assert!(conn.select_symbols(&names(&["EURUSD"])).await.unwrap());
        conn.terminal().symbol_select("EURUSD", false).await.unwrap();

        conn.make_request(&RequestParams::default()).await.unwrap();
        let info = conn.terminal().symbol_info("EURUSD").await.unwrap().unwrap();
        assert!(info.visible);
        assert_eq!(conn.selected(), names(&["EURUSD"]));
    }

    #[tokio::test]
    async fn test_sell_request_mirrors_stops() {
        let (conn, _) = connector().await;
        let params = RequestParams {
            order_type: OrderType::Sell,
            sl_points: 50,
            tp_points: 0,
            ..Default::default()
        };
        let request = conn.make_request(&params).await.unwrap();
        assert_eq!(request.price, dec!(1.08500));
        assert_eq!(request.sl, dec!(1.08550));
        assert_eq!(request.tp, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_market_request() {
        let (conn, _) = connector().await;
        let params = RequestParams {
            market: true,
            ..Default::default()
        };
        let request = conn.make_request(&params).await.unwrap();
        assert_eq!(request.price, Decimal::ZERO);
        assert_eq!(request.type_filling, OrderFilling::Return);
        assert_eq!(request.sl, dec!(1.08412));
    }

    #[tokio::test]
    async fn test_unknown_symbol_request() {
        let (conn, _) = connector().await;
        let params = RequestParams {
            symbol: "NOPE".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            conn.make_request(&params).await,
            Err(ConnectorError::Terminal(TerminalError::SymbolNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_check_request() {
        let (conn, _) = connector().await;
        let request = conn.make_request(&RequestParams::default()).await.unwrap();
        let result = conn.check_request(&request, true).await.unwrap();
        assert!(result.is_valid());
        assert!(result.margin > Decimal::ZERO);

        let bad = TradeRequest {
            volume: dec!(0.001),
            ..request
        };
        let result = conn.check_request(&bad, false).await.unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_INVALID_VOLUME);
    }

    #[tokio::test]
    async fn test_send_command_journals_symbol() {
        let (conn, journal) = connector().await;
        let params = RequestParams {
            symbol: "GBPUSD".to_string(),
            ..Default::default()
        };
        let request = conn.make_request(&params).await.unwrap();
        let result = conn.send_command(&request).await.unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_DONE);

        let records = journal.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "GBPUSD");
        assert_eq!(records[0].order_id, result.order);
        assert_eq!(conn.open_trades_count().await.unwrap(), 1);
        assert_eq!(conn.open_trades(&OrderFilter::symbol("EURUSD")).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_journal_failure_keeps_executed_order() {
        let conn = Connector::connect(Arc::new(SimulatedTerminal::demo()), Some(Arc::new(FailingJournal)))
            .await
            .unwrap();
        let request = conn.make_request(&RequestParams::default()).await.unwrap();
        let result = conn.send_command(&request).await.unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_DONE);
        assert_eq!(conn.open_trades_count().await.unwrap(), 1);
        // Lookup failures fall back to the built-in table.
        assert_eq!(
            conn.describe_retcode(TRADE_RETCODE_NO_MONEY).await.constant,
            "TRADE_RETCODE_NO_MONEY"
        );
    }

    #[tokio::test]
    async fn test_rejected_order_is_described() {
        let (conn, journal) = connector().await;
        let mut request = conn.make_request(&RequestParams::default()).await.unwrap();
        request.volume = dec!(500);
        match conn.send_command(&request).await {
            Err(ConnectorError::OrderRejected { retcode, constant, .. }) => {
                assert_eq!(retcode, TRADE_RETCODE_INVALID_VOLUME);
                assert_eq!(constant, "TRADE_RETCODE_INVALID_VOLUME");
            }
            other => panic!("unexpected {:?}", other.map(|r| r.retcode)),
        }
        assert!(journal.records().is_empty());
    }

    #[tokio::test]
    async fn test_describe_unknown_retcode() {
        let (conn, _) = connector().await;
        assert_eq!(conn.describe_retcode(1).await.constant, "UNKNOWN");
        assert_eq!(
            conn.describe_retcode(TRADE_RETCODE_NO_MONEY).await.constant,
            "TRADE_RETCODE_NO_MONEY"
        );
    }

    #[tokio::test]
    async fn test_pending_orders_are_counted() {
        let (conn, _) = connector().await;
        let params = RequestParams {
            action: TradeAction::Pending,
            order_type: OrderType::BuyLimit,
            ..Default::default()
        };
        let mut request = conn.make_request(&params).await.unwrap();
        request.price = dec!(1.08000);
        request.sl = dec!(1.07900);
        request.tp = dec!(1.08100);
        let result = conn.send_command(&request).await.unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_PLACED);
        assert_eq!(conn.orders_count().await.unwrap(), 1);
        let orders = conn.orders(&OrderFilter::symbol("EURUSD")).await.unwrap();
        assert_eq!(orders[0].ticket, result.order);
    }

    #[test]
    fn test_rates_start_parsing() {
        assert_eq!("0".parse::<RatesStart>().unwrap(), RatesStart::Index(0));
        match "2024-01-31 12:00:00 UTC".parse::<RatesStart>().unwrap() {
            RatesStart::Date(date) => assert_eq!(date.to_rfc3339(), "2024-01-31T12:00:00+00:00"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            "yesterday".parse::<RatesStart>(),
            Err(ConnectorError::InvalidRatesStart(_))
        ));
    }

    #[tokio::test]
    async fn test_rates_windows() {
        let (conn, _) = connector().await;
        let last = conn
            .rates("EURUSD", RatesStart::Index(0), Timeframe::D1, 10, None)
            .await
            .unwrap();
        assert_eq!(last.len(), 10);

        let newest = last[9].time;
        let from = last[5].time;
        let range = conn
            .rates("EURUSD", RatesStart::Date(from), Timeframe::D1, 270, Some(newest))
            .await
            .unwrap();
        assert_eq!(range.len(), 5);

        let counted = conn
            .rates("EURUSD", RatesStart::Date(newest), Timeframe::D1, 3, None)
            .await
            .unwrap();
        assert_eq!(counted.len(), 3);
        assert_eq!(counted[2].time, newest);
    }

    #[tokio::test]
    async fn test_tick_info_skips_unknown() {
        let (conn, _) = connector().await;
        let ticks = conn.tick_info(&names(&["EURUSD", "NOPE"])).await.unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].bid, dec!(1.08500));
    }

    #[tokio::test]
    async fn test_shutdown() {
        let (conn, _) = connector().await;
        conn.shutdown().await.unwrap();
        assert!(!conn.terminal().is_connected());
    }
}
