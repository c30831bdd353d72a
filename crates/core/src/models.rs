use crate::codes::*;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Trading account snapshot as reported by the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: u64,
    pub trade_mode: i32,
    pub leverage: u32,
    pub limit_orders: u32,
    pub margin_so_mode: i32,
    pub trade_allowed: bool,
    pub trade_expert: bool,
    pub margin_mode: i32,
    pub currency_digits: u32,
    pub fifo_close: bool,
    pub balance: Decimal,
    pub credit: Decimal,
    pub profit: Decimal,
    pub equity: Decimal,
    pub margin: Decimal,
    pub margin_free: Decimal,
    pub margin_level: Decimal,
    pub margin_so_call: Decimal,
    pub margin_so_so: Decimal,
    pub margin_initial: Decimal,
    pub margin_maintenance: Decimal,
    pub assets: Decimal,
    pub liabilities: Decimal,
    pub commission_blocked: Decimal,
    pub name: String,
    pub server: String,
    pub currency: String,
    pub company: String,
}

impl AccountInfo {
    /// A fresh demo account with the given balance and no exposure.
    pub fn demo(login: u64, balance: Decimal, currency: &str) -> Self {
        Self {
            login,
            trade_mode: 0,
            leverage: 100,
            limit_orders: 200,
            margin_so_mode: 0,
            trade_allowed: true,
            trade_expert: true,
            margin_mode: 2,
            currency_digits: 2,
            fifo_close: false,
            balance,
            credit: Decimal::ZERO,
            profit: Decimal::ZERO,
            equity: balance,
            margin: Decimal::ZERO,
            margin_free: balance,
            margin_level: Decimal::ZERO,
            margin_so_call: Decimal::new(50, 0),
            margin_so_so: Decimal::new(30, 0),
            margin_initial: Decimal::ZERO,
            margin_maintenance: Decimal::ZERO,
            assets: Decimal::ZERO,
            liabilities: Decimal::ZERO,
            commission_blocked: Decimal::ZERO,
            name: "Demo".to_string(),
            server: "Simulated".to_string(),
            currency: currency.to_string(),
            company: "mt5bot".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Symbols & Market Data
// ---------------------------------------------------------------------------

/// Symbol specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub description: String,
    pub path: String,
    /// Shown in Market Watch.
    pub visible: bool,
    pub select: bool,
    /// Price precision.
    pub digits: u32,
    /// Smallest price change.
    pub point: Decimal,
    /// Spread in points.
    pub spread: i32,
    pub trade_contract_size: Decimal,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub volume_step: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub currency_base: String,
    pub currency_profit: String,
}

/// A single bid/ask quote snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub time: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: Decimal,
    pub flags: u32,
}

impl Tick {
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// The executable price for the given side: ask to buy, bid to sell.
    pub fn price_for(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }
}

/// A single OHLC bar as returned by the `copy_rates_*` calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub tick_volume: u64,
    pub spread: i32,
    pub real_volume: u64,
}

/// Latest executable prices for one symbol in the market-data table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub time: DateTime<Utc>,
    pub buy: Decimal,
    pub sell: Decimal,
}

impl From<&Tick> for Quote {
    fn from(tick: &Tick) -> Self {
        Self {
            time: tick.time,
            buy: tick.ask,
            sell: tick.bid,
        }
    }
}

// ---------------------------------------------------------------------------
// Trade requests & results
// ---------------------------------------------------------------------------

/// A structured order submitted to the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub action: TradeAction,
    pub symbol: String,
    pub volume: Decimal,
    pub order_type: OrderType,
    /// Zero for market execution.
    pub price: Decimal,
    pub sl: Decimal,
    pub tp: Decimal,
    /// Maximum acceptable deviation from the requested price, in points.
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
    pub type_time: OrderTime,
    pub type_filling: OrderFilling,
    /// Pending order ticket (modify / remove).
    #[serde(default)]
    pub order: Option<u64>,
    /// Position ticket (close / SL-TP edits).
    #[serde(default)]
    pub position: Option<u64>,
}

/// Result of `order_check`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub retcode: u32,
    pub balance: Decimal,
    pub equity: Decimal,
    pub profit: Decimal,
    pub margin: Decimal,
    pub margin_free: Decimal,
    pub margin_level: Decimal,
    pub comment: String,
    pub request: TradeRequest,
}

impl CheckResult {
    pub fn is_valid(&self) -> bool {
        self.retcode == CHECK_RETCODE_OK
    }
}

/// Result of `order_send`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub retcode: u32,
    /// Deal ticket, zero if no deal was made.
    pub deal: u64,
    /// Order ticket, zero if no order was placed.
    pub order: u64,
    pub volume: Decimal,
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub comment: String,
    pub request_id: u32,
    pub retcode_external: i32,
    pub request: TradeRequest,
}

impl TradeResult {
    pub fn is_success(&self) -> bool {
        self.retcode == TRADE_RETCODE_DONE || self.retcode == TRADE_RETCODE_PLACED
    }
}

/// A working (pending) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    pub ticket: u64,
    pub time_setup: DateTime<Utc>,
    pub order_type: OrderType,
    pub magic: u64,
    pub volume_initial: Decimal,
    pub volume_current: Decimal,
    pub price_open: Decimal,
    pub sl: Decimal,
    pub tp: Decimal,
    pub price_current: Decimal,
    pub symbol: String,
    pub comment: String,
}

/// An open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub ticket: u64,
    pub time: DateTime<Utc>,
    pub side: Side,
    pub magic: u64,
    pub volume: Decimal,
    pub price_open: Decimal,
    pub sl: Decimal,
    pub tp: Decimal,
    pub price_current: Decimal,
    pub profit: Decimal,
    pub symbol: String,
    pub comment: String,
}

/// Selection criteria for `orders_get` / `positions_get`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub symbol: Option<String>,
    /// Group pattern, e.g. `"*GBP*"` or `"*,!*USD*"`.
    pub group: Option<String>,
    pub ticket: Option<u64>,
}

impl OrderFilter {
    pub fn symbol(symbol: &str) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, symbol: &str, ticket: u64) -> bool {
        if let Some(ref s) = self.symbol {
            if s != symbol {
                return false;
            }
        }
        if let Some(ref group) = self.group {
            if !group_matches(group, symbol) {
                return false;
            }
        }
        if let Some(t) = self.ticket {
            if t != ticket {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Order history
// ---------------------------------------------------------------------------

/// A row of the `order_history` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: u64,
    pub deal_id: u64,
    pub timestamp: DateTime<Utc>,
    pub retcode: u32,
    pub symbol: String,
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume: Decimal,
    pub action: TradeAction,
    pub order_type: OrderType,
    pub sl: Decimal,
    pub tp: Decimal,
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
    pub type_time: OrderTime,
    pub type_filling: OrderFilling,
}

impl OrderRecord {
    pub fn from_result(result: &TradeResult, timestamp: DateTime<Utc>) -> Self {
        let req = &result.request;
        Self {
            order_id: result.order,
            deal_id: result.deal,
            timestamp,
            retcode: result.retcode,
            symbol: req.symbol.clone(),
            price: result.price,
            bid: result.bid,
            ask: result.ask,
            volume: result.volume,
            action: req.action,
            order_type: req.order_type,
            sl: req.sl,
            tp: req.tp,
            deviation: req.deviation,
            magic: req.magic,
            comment: req.comment.clone(),
            type_time: req.type_time,
            type_filling: req.type_filling,
        }
    }
}

// ---------------------------------------------------------------------------
// Symbol groups
// ---------------------------------------------------------------------------

/// Match a symbol against a terminal group expression.
///
/// Comma-separated patterns; `*` matches any run of characters; a leading
/// `!` excludes. Patterns are applied left to right, the last match wins.
pub fn group_matches(group: &str, symbol: &str) -> bool {
    let mut selected = false;
    for pattern in group.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pattern.strip_prefix('!') {
            Some(excluded) => {
                if wildcard_match(excluded, symbol) {
                    selected = false;
                }
            }
            None => {
                if wildcard_match(pattern, symbol) {
                    selected = true;
                }
            }
        }
    }
    selected
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && p[pi] != '*' && p[pi].eq_ignore_ascii_case(&t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            pi += 1;
            mark = ti;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> TradeRequest {
        TradeRequest {
            action: TradeAction::Deal,
            symbol: "GBPUSD".to_string(),
            volume: dec!(0.10),
            order_type: OrderType::Sell,
            price: dec!(1.25010),
            sl: dec!(1.25110),
            tp: dec!(1.24910),
            deviation: 10,
            magic: 7,
            comment: "test".to_string(),
            type_time: OrderTime::Gtc,
            type_filling: OrderFilling::Fok,
            order: None,
            position: None,
        }
    }

    #[test]
    fn test_group_matching() {
        assert!(group_matches("*", "EURUSD"));
        assert!(group_matches("*GBP*", "EURGBP"));
        assert!(!group_matches("*GBP*", "EURUSD"));
        assert!(!group_matches("*,!*USD*,!*EUR*", "EURGBP"));
        assert!(group_matches("*,!*USD*,!*EUR*", "GBPJPY"));
        assert!(group_matches("EUR*", "eurusd"));
        // Later inclusion overrides an earlier exclusion
        assert!(group_matches("*,!*USD*,EURUSD", "EURUSD"));
        assert!(!group_matches("", "EURUSD"));
    }

    #[test]
    fn test_filter_matching() {
        let filter = OrderFilter {
            group: Some("*GBP*".to_string()),
            ticket: Some(5),
            ..Default::default()
        };
        assert!(filter.matches("GBPUSD", 5));
        assert!(!filter.matches("GBPUSD", 6));
        assert!(!filter.matches("EURUSD", 5));
        assert!(OrderFilter::default().matches("XAUUSD", 1));
        assert!(!OrderFilter::symbol("EURUSD").matches("GBPUSD", 1));
    }

    #[test]
    fn test_trade_result_success() {
        let mut result = TradeResult {
            retcode: TRADE_RETCODE_DONE,
            deal: 11,
            order: 12,
            volume: dec!(0.10),
            price: dec!(1.25010),
            bid: dec!(1.25010),
            ask: dec!(1.25020),
            comment: "Request executed".to_string(),
            request_id: 1,
            retcode_external: 0,
            request: request(),
        };
        assert!(result.is_success());
        result.retcode = TRADE_RETCODE_NO_MONEY;
        assert!(!result.is_success());
    }

    #[test]
    fn test_order_record_mirrors_request() {
        let result = TradeResult {
            retcode: TRADE_RETCODE_DONE,
            deal: 11,
            order: 12,
            volume: dec!(0.10),
            price: dec!(1.25010),
            bid: dec!(1.25010),
            ask: dec!(1.25020),
            comment: String::new(),
            request_id: 1,
            retcode_external: 0,
            request: request(),
        };
        let record = OrderRecord::from_result(&result, Utc::now());
        assert_eq!(record.order_id, 12);
        assert_eq!(record.symbol, "GBPUSD");
        assert_eq!(record.order_type, OrderType::Sell);
        assert_eq!(record.sl, dec!(1.25110));
        assert_eq!(record.magic, 7);
    }

    #[test]
    fn test_tick_prices() {
        let tick = Tick {
            symbol: "EURUSD".to_string(),
            time: Utc::now(),
            bid: dec!(1.10000),
            ask: dec!(1.10020),
            last: Decimal::ZERO,
            volume: Decimal::ZERO,
            flags: 0,
        };
        assert_eq!(tick.spread(), dec!(0.00020));
        assert_eq!(tick.price_for(Side::Buy), dec!(1.10020));
        let quote = Quote::from(&tick);
        assert_eq!(quote.sell, dec!(1.10000));
    }
}
