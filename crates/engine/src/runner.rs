//! Multi-symbol strategy runner.
//!
//! One updater task keeps a shared [`MarketDataTable`] fresh; one trader
//! task per symbol reads the latest quote from it, asks the strategy, and
//! places orders through the shared [`Connector`]. The table lock is never
//! held across terminal calls.

use crate::connector::{Connector, ConnectorError, RequestParams};
use mt5bot_core::{OrderFilter, OrderType, Side, Strategy};
use mt5bot_data::{MarketDataTable, MarketFeed};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runner settings (the `[runner]` config section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub name: String,
    pub symbols: Vec<String>,
    /// Open positions per symbol, counted by magic number.
    pub max_trades: usize,
    /// Pause between iterations of every task.
    pub delay_ms: u64,
    pub volume: Decimal,
    pub sl_points: u32,
    pub tp_points: u32,
    pub magic: u64,
    pub comment: String,
    pub market: bool,
    /// Quotes kept per symbol in the market-data table.
    pub max_rows: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: "CoinFlip_Traders".to_string(),
            symbols: vec!["EURUSD".to_string()],
            max_trades: 1,
            delay_ms: 10,
            volume: Decimal::new(1, 2),
            sl_points: 100,
            tp_points: 100,
            magic: 123456,
            comment: "mt5bot".to_string(),
            market: false,
            max_rows: 1_000,
        }
    }
}

impl RunnerConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    fn request_for(&self, symbol: &str, side: Side) -> RequestParams {
        RequestParams {
            symbol: symbol.to_string(),
            volume: self.volume,
            order_type: OrderType::from(side),
            market: self.market,
            sl_points: self.sl_points,
            tp_points: self.tp_points,
            magic: self.magic,
            comment: self.comment.clone(),
            ..Default::default()
        }
    }
}

/// What one trader did before it was stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraderReport {
    pub symbol: String,
    /// Orders accepted by the trade server.
    pub sent: usize,
    pub rejected: usize,
    /// Terminal or request-building failures.
    pub errors: usize,
}

pub struct StrategyRunner {
    config: RunnerConfig,
    connector: Arc<Connector>,
    strategy: Arc<dyn Strategy>,
    table: Arc<Mutex<MarketDataTable>>,
    stop_tx: watch::Sender<bool>,
    updater: Option<JoinHandle<()>>,
    traders: Vec<(String, JoinHandle<TraderReport>)>,
}

impl StrategyRunner {
    pub fn new(config: RunnerConfig, connector: Arc<Connector>, strategy: Arc<dyn Strategy>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let table = MarketDataTable::with_max_rows(config.max_rows);
        Self {
            config,
            connector,
            strategy,
            table: Arc::new(Mutex::new(table)),
            stop_tx,
            updater: None,
            traders: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn table(&self) -> Arc<Mutex<MarketDataTable>> {
        Arc::clone(&self.table)
    }

    pub fn is_running(&self) -> bool {
        self.updater.is_some()
    }

    /// Select the symbols and start the updater and one trader per symbol.
    pub async fn run(&mut self) -> Result<(), ConnectorError> {
        if self.is_running() {
            warn!(runner = %self.config.name, "Already running");
            return Ok(());
        }

        let mut symbols: Vec<String> = Vec::with_capacity(self.config.symbols.len());
        for symbol in &self.config.symbols {
            if !symbols.contains(symbol) {
                symbols.push(symbol.clone());
            }
        }
        if !self.connector.select_symbols(&symbols).await? {
            let selected = self.connector.selected();
            let missing = symbols
                .iter()
                .filter(|s| !selected.contains(s))
                .cloned()
                .collect();
            return Err(ConnectorError::SymbolsNotSelected(missing));
        }
        self.stop_tx.send_replace(false);

        self.updater = Some(tokio::spawn(update_loop(
            Arc::clone(&self.connector),
            symbols.clone(),
            Arc::clone(&self.table),
            self.config.delay(),
            self.stop_tx.subscribe(),
        )));

        for symbol in symbols {
            let trader = Trader {
                symbol: symbol.clone(),
                config: self.config.clone(),
                connector: Arc::clone(&self.connector),
                strategy: Arc::clone(&self.strategy),
                table: Arc::clone(&self.table),
            };
            let handle = tokio::spawn(trader.run(self.stop_tx.subscribe()));
            info!(runner = %self.config.name, %symbol, "Trader started");
            self.traders.push((symbol, handle));
        }
        Ok(())
    }

    /// Signal every task to stop, wait for them, and close the terminal.
    pub async fn stop(mut self) -> Vec<TraderReport> {
        self.stop_tx.send_replace(true);

        if let Some(updater) = self.updater.take() {
            if let Err(e) = updater.await {
                warn!(error = %e, "Updater task failed");
            }
        }

        let mut reports = Vec::with_capacity(self.traders.len());
        for (symbol, handle) in self.traders.drain(..) {
            match handle.await {
                Ok(report) => {
                    info!(
                        %symbol,
                        sent = report.sent,
                        rejected = report.rejected,
                        errors = report.errors,
                        "Trader stopped"
                    );
                    reports.push(report);
                }
                Err(e) => {
                    warn!(%symbol, error = %e, "Trader task failed");
                    reports.push(TraderReport {
                        symbol,
                        ..Default::default()
                    });
                }
            }
        }

        if let Err(e) = self.connector.shutdown().await {
            warn!(error = %e, "Connector shutdown failed");
        }
        reports
    }
}

/// Sleep for `delay` unless a stop arrives first. False once stopped.
async fn pause(delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        changed = stop.changed() => {
            if changed.is_err() {
                return false;
            }
        }
    }
    !stopped(stop)
}

fn stopped(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

async fn update_loop(
    connector: Arc<Connector>,
    symbols: Vec<String>,
    table: Arc<Mutex<MarketDataTable>>,
    delay: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut feed = MarketFeed::new();
    while !stopped(&stop) {
        match connector.tick_info(&symbols).await {
            Ok(ticks) => {
                for tick in &ticks {
                    feed.push_tick(tick);
                }
                let added = table.lock().await.ingest(&mut feed);
                debug!(added, "Market data updated");
            }
            Err(e) => warn!(error = %e, "Market data update failed"),
        }
        if !pause(delay, &mut stop).await {
            break;
        }
    }
    debug!("Updater stopped");
}

struct Trader {
    symbol: String,
    config: RunnerConfig,
    connector: Arc<Connector>,
    strategy: Arc<dyn Strategy>,
    table: Arc<Mutex<MarketDataTable>>,
}

impl Trader {
    async fn run(self, mut stop: watch::Receiver<bool>) -> TraderReport {
        let mut report = TraderReport {
            symbol: self.symbol.clone(),
            ..Default::default()
        };
        while !stopped(&stop) {
            self.step(&mut report).await;
            if !pause(self.config.delay(), &mut stop).await {
                break;
            }
        }
        report
    }

    async fn step(&self, report: &mut TraderReport) {
        let Some(quote) = self.table.lock().await.latest(&self.symbol) else {
            return;
        };

        let open = match self
            .connector
            .open_trades(&OrderFilter::symbol(&self.symbol))
            .await
        {
            Ok(positions) => positions
                .iter()
                .filter(|p| p.magic == self.config.magic)
                .count(),
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Position lookup failed");
                report.errors += 1;
                return;
            }
        };
        if open >= self.config.max_trades {
            return;
        }

        let Some(side) = self.strategy.on_quote(&self.symbol, &quote).await else {
            return;
        };
        debug!(symbol = %self.symbol, ?side, strategy = self.strategy.id(), "Entry signal");

        let params = self.config.request_for(&self.symbol, side);
        let outcome = match self.connector.make_request(&params).await {
            Ok(request) => self.connector.send_command(&request).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(_) => report.sent += 1,
            Err(ConnectorError::OrderRejected { .. }) => report.rejected += 1,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Order failed");
                report.errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mt5bot_core::{Quote, Terminal};
    use mt5bot_data::MemoryJournal;
    use mt5bot_terminal::SimulatedTerminal;
    use rust_decimal_macros::dec;

    struct AlwaysBuy;

    #[async_trait]
    impl Strategy for AlwaysBuy {
        fn id(&self) -> &str {
            "always_buy"
        }
        fn name(&self) -> &str {
            "Always Buy"
        }
        async fn on_quote(&self, _symbol: &str, _quote: &Quote) -> Option<Side> {
            Some(Side::Buy)
        }
    }

    struct Never;

    #[async_trait]
    impl Strategy for Never {
        fn id(&self) -> &str {
            "never"
        }
        fn name(&self) -> &str {
            "Never"
        }
        async fn on_quote(&self, _symbol: &str, _quote: &Quote) -> Option<Side> {
            None
        }
    }

    fn config(symbols: &[&str]) -> RunnerConfig {
        RunnerConfig {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            delay_ms: 5,
            ..Default::default()
        }
    }

    async fn setup() -> (Arc<SimulatedTerminal>, Arc<MemoryJournal>, Arc<Connector>) {
        let terminal = Arc::new(SimulatedTerminal::demo());
        let journal = Arc::new(MemoryJournal::new());
        let connector = Connector::connect(terminal.clone(), Some(journal.clone()))
            .await
            .unwrap();
        (terminal, journal, Arc::new(connector))
    }

    #[tokio::test]
    async fn test_traders_respect_max_trades() {
        let (terminal, journal, connector) = setup().await;
        let mut runner = StrategyRunner::new(config(&["EURUSD", "GBPUSD"]), connector, Arc::new(AlwaysBuy));
        runner.run().await.unwrap();
        assert!(runner.is_running());
        tokio::time::sleep(Duration::from_millis(150)).await;

        let positions = terminal.positions_get(&OrderFilter::default()).await.unwrap();
        assert_eq!(positions.len(), 2);
        assert!(positions.iter().all(|p| p.magic == 123456 && p.volume == dec!(0.01)));

        let reports = runner.stop().await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.sent == 1 && r.rejected == 0));
        assert_eq!(journal.records().len(), 2);
        assert!(!terminal.is_connected());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_trader_per_symbol() {
        let (terminal, _journal, connector) = setup().await;
        let mut runner = StrategyRunner::new(
            config(&["EURUSD", "EURUSD", "GBPUSD", "EURUSD"]),
            connector,
            Arc::new(AlwaysBuy),
        );
        runner.run().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let eurusd = terminal.positions_get(&OrderFilter::symbol("EURUSD")).await.unwrap();
        assert_eq!(eurusd.len(), 1);

        let reports = runner.stop().await;
        let symbols: Vec<&str> = reports.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["EURUSD", "GBPUSD"]);
    }

    #[tokio::test]
    async fn test_updater_fills_table() {
        let (_terminal, _journal, connector) = setup().await;
        let mut runner = StrategyRunner::new(config(&["EURUSD", "USDJPY"]), connector, Arc::new(Never));
        runner.run().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let table = runner.table();
            let table = table.lock().await;
            assert_eq!(table.symbols(), vec!["EURUSD", "USDJPY"]);
            let quote = table.latest("EURUSD").unwrap();
            assert_eq!(quote.buy, dec!(1.08512));
            assert_eq!(quote.sell, dec!(1.08500));
        }
        let reports = runner.stop().await;
        assert!(reports.iter().all(|r| r.sent == 0));
    }

    #[tokio::test]
    async fn test_rejections_are_counted() {
        let (terminal, _journal, connector) = setup().await;
        terminal.set_trade_allowed(false);
        let mut runner = StrategyRunner::new(config(&["EURUSD"]), connector, Arc::new(AlwaysBuy));
        runner.run().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let reports = runner.stop().await;
        assert_eq!(reports[0].sent, 0);
        assert!(reports[0].rejected > 0);
    }

    #[tokio::test]
    async fn test_unknown_symbol_fails_to_start() {
        let (_terminal, _journal, connector) = setup().await;
        let mut runner = StrategyRunner::new(config(&["EURUSD", "NOPE"]), connector, Arc::new(AlwaysBuy));
        match runner.run().await {
            Err(ConnectorError::SymbolsNotSelected(missing)) => assert_eq!(missing, vec!["NOPE".to_string()]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!runner.is_running());
    }

    #[test]
    fn test_request_for_sell() {
        let params = RunnerConfig::default().request_for("GBPUSD", Side::Sell);
        assert_eq!(params.order_type, OrderType::Sell);
        assert_eq!(params.symbol, "GBPUSD");
        assert_eq!(params.magic, 123456);
    }
}
