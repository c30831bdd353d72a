use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Trade server return codes
// ---------------------------------------------------------------------------

/// `order_check` reports a valid request with retcode 0.
pub const CHECK_RETCODE_OK: u32 = 0;
/// Order placed (pending orders).
pub const TRADE_RETCODE_PLACED: u32 = 10008;
/// Request completed.
pub const TRADE_RETCODE_DONE: u32 = 10009;
pub const TRADE_RETCODE_INVALID: u32 = 10013;
pub const TRADE_RETCODE_INVALID_VOLUME: u32 = 10014;
pub const TRADE_RETCODE_INVALID_PRICE: u32 = 10015;
pub const TRADE_RETCODE_INVALID_STOPS: u32 = 10016;
pub const TRADE_RETCODE_TRADE_DISABLED: u32 = 10017;
pub const TRADE_RETCODE_NO_MONEY: u32 = 10019;
pub const TRADE_RETCODE_PRICE_CHANGED: u32 = 10020;
pub const TRADE_RETCODE_PRICE_OFF: u32 = 10021;
pub const TRADE_RETCODE_INVALID_FILL: u32 = 10030;
pub const TRADE_RETCODE_CONNECTION: u32 = 10031;
pub const TRADE_RETCODE_INVALID_ORDER: u32 = 10035;
pub const TRADE_RETCODE_POSITION_CLOSED: u32 = 10036;
pub const TRADE_RETCODE_INVALID_CLOSE_VOLUME: u32 = 10038;

const BUILTIN_RETURN_CODES: &[(u32, &str, &str)] = &[
    (10004, "TRADE_RETCODE_REQUOTE", "Requote"),
    (10006, "TRADE_RETCODE_REJECT", "Request rejected"),
    (10007, "TRADE_RETCODE_CANCEL", "Request canceled by trader"),
    (10008, "TRADE_RETCODE_PLACED", "Order placed"),
    (10009, "TRADE_RETCODE_DONE", "Request completed"),
    (10010, "TRADE_RETCODE_DONE_PARTIAL", "Only part of the request was completed"),
    (10011, "TRADE_RETCODE_ERROR", "Request processing error"),
    (10012, "TRADE_RETCODE_TIMEOUT", "Request canceled by timeout"),
    (10013, "TRADE_RETCODE_INVALID", "Invalid request"),
    (10014, "TRADE_RETCODE_INVALID_VOLUME", "Invalid volume in the request"),
    (10015, "TRADE_RETCODE_INVALID_PRICE", "Invalid price in the request"),
    (10016, "TRADE_RETCODE_INVALID_STOPS", "Invalid stops in the request"),
    (10017, "TRADE_RETCODE_TRADE_DISABLED", "Trade is disabled"),
    (10018, "TRADE_RETCODE_MARKET_CLOSED", "Market is closed"),
    (10019, "TRADE_RETCODE_NO_MONEY", "There is not enough money to complete the request"),
    (10020, "TRADE_RETCODE_PRICE_CHANGED", "Prices changed"),
    (10021, "TRADE_RETCODE_PRICE_OFF", "There are no quotes to process the request"),
    (10022, "TRADE_RETCODE_INVALID_EXPIRATION", "Invalid order expiration date in the request"),
    (10023, "TRADE_RETCODE_ORDER_CHANGED", "Order state changed"),
    (10024, "TRADE_RETCODE_TOO_MANY_REQUESTS", "Too frequent requests"),
    (10025, "TRADE_RETCODE_NO_CHANGES", "No changes in request"),
    (10026, "TRADE_RETCODE_SERVER_DISABLES_AT", "Autotrading disabled by server"),
    (10027, "TRADE_RETCODE_CLIENT_DISABLES_AT", "Autotrading disabled by client terminal"),
    (10028, "TRADE_RETCODE_LOCKED", "Request locked for processing"),
    (10029, "TRADE_RETCODE_FROZEN", "Order or position frozen"),
    (10030, "TRADE_RETCODE_INVALID_FILL", "Invalid order filling type"),
    (10031, "TRADE_RETCODE_CONNECTION", "No connection with the trade server"),
    (10032, "TRADE_RETCODE_ONLY_REAL", "Operation is allowed only for live accounts"),
    (10033, "TRADE_RETCODE_LIMIT_ORDERS", "The number of pending orders has reached the limit"),
    (10034, "TRADE_RETCODE_LIMIT_VOLUME", "The volume of orders and positions for the symbol has reached the limit"),
    (10035, "TRADE_RETCODE_INVALID_ORDER", "Incorrect or prohibited order type"),
    (10036, "TRADE_RETCODE_POSITION_CLOSED", "Position with the specified identifier has already been closed"),
    (10038, "TRADE_RETCODE_INVALID_CLOSE_VOLUME", "A close volume exceeds the current position volume"),
    (10039, "TRADE_RETCODE_CLOSE_ORDER_EXIST", "A close order already exists for a specified position"),
    (10040, "TRADE_RETCODE_LIMIT_POSITIONS", "The number of open positions has reached the limit"),
    (10041, "TRADE_RETCODE_REJECT_CANCEL", "The pending order activation request is rejected, the order is canceled"),
    (10042, "TRADE_RETCODE_LONG_ONLY", "Only long positions are allowed for the symbol"),
    (10043, "TRADE_RETCODE_SHORT_ONLY", "Only short positions are allowed for the symbol"),
    (10044, "TRADE_RETCODE_CLOSE_ONLY", "Only position closing is allowed for the symbol"),
    (10045, "TRADE_RETCODE_FIFO_CLOSE", "Position closing is allowed only by FIFO rule"),
    (10046, "TRADE_RETCODE_HEDGE_PROHIBITED", "Opposite positions on a single symbol are disabled"),
];

/// A row of the `mt5_return_codes` lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnCode {
    pub id: u32,
    pub constant: String,
    pub description: String,
}

impl ReturnCode {
    /// Look up a code in the built-in table of trade server return codes.
    pub fn builtin(id: u32) -> Option<Self> {
        BUILTIN_RETURN_CODES
            .iter()
            .find(|(code, _, _)| *code == id)
            .map(|(code, constant, description)| Self {
                id: *code,
                constant: constant.to_string(),
                description: description.to_string(),
            })
    }

    /// All built-in return codes, in ascending order.
    pub fn builtin_table() -> Vec<Self> {
        BUILTIN_RETURN_CODES
            .iter()
            .map(|(code, constant, description)| Self {
                id: *code,
                constant: constant.to_string(),
                description: description.to_string(),
            })
            .collect()
    }

    /// Placeholder for codes neither the database nor the built-in table knows.
    pub fn unknown(id: u32) -> Self {
        Self {
            id,
            constant: "UNKNOWN".to_string(),
            description: format!("Unknown return code {}", id),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade request enums
// ---------------------------------------------------------------------------

/// `TRADE_ACTION_*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    /// Immediate market execution.
    Deal,
    /// Place a pending order.
    Pending,
    /// Modify stop loss / take profit of an open position.
    Sltp,
    /// Modify a pending order.
    Modify,
    /// Delete a pending order.
    Remove,
    /// Close a position by an opposite one.
    CloseBy,
}

impl TradeAction {
    pub fn code(&self) -> i32 {
        match self {
            TradeAction::Deal => 1,
            TradeAction::Pending => 5,
            TradeAction::Sltp => 6,
            TradeAction::Modify => 7,
            TradeAction::Remove => 8,
            TradeAction::CloseBy => 10,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(TradeAction::Deal),
            5 => Some(TradeAction::Pending),
            6 => Some(TradeAction::Sltp),
            7 => Some(TradeAction::Modify),
            8 => Some(TradeAction::Remove),
            10 => Some(TradeAction::CloseBy),
            _ => None,
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" | "long" => Ok(Side::Buy),
            "sell" | "short" => Ok(Side::Sell),
            other => Err(format!("unknown side '{}'", other)),
        }
    }
}

/// `ORDER_TYPE_*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Buy,
    Sell,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
    BuyStopLimit,
    SellStopLimit,
    CloseBy,
}

impl OrderType {
    pub fn code(&self) -> i32 {
        match self {
            OrderType::Buy => 0,
            OrderType::Sell => 1,
            OrderType::BuyLimit => 2,
            OrderType::SellLimit => 3,
            OrderType::BuyStop => 4,
            OrderType::SellStop => 5,
            OrderType::BuyStopLimit => 6,
            OrderType::SellStopLimit => 7,
            OrderType::CloseBy => 8,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(OrderType::Buy),
            1 => Some(OrderType::Sell),
            2 => Some(OrderType::BuyLimit),
            3 => Some(OrderType::SellLimit),
            4 => Some(OrderType::BuyStop),
            5 => Some(OrderType::SellStop),
            6 => Some(OrderType::BuyStopLimit),
            7 => Some(OrderType::SellStopLimit),
            8 => Some(OrderType::CloseBy),
            _ => None,
        }
    }

    /// The market side this order type trades on, if any.
    pub fn side(&self) -> Option<Side> {
        match self {
            OrderType::Buy | OrderType::BuyLimit | OrderType::BuyStop | OrderType::BuyStopLimit => {
                Some(Side::Buy)
            }
            OrderType::Sell
            | OrderType::SellLimit
            | OrderType::SellStop
            | OrderType::SellStopLimit => Some(Side::Sell),
            OrderType::CloseBy => None,
        }
    }

    pub fn is_market(&self) -> bool {
        matches!(self, OrderType::Buy | OrderType::Sell)
    }
}

impl From<Side> for OrderType {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => OrderType::Buy,
            Side::Sell => OrderType::Sell,
        }
    }
}

/// `ORDER_FILLING_*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderFilling {
    /// Fill or kill.
    Fok,
    /// Immediate or cancel.
    Ioc,
    /// Partial fills leave the remainder working.
    Return,
}

impl OrderFilling {
    pub fn code(&self) -> i32 {
        match self {
            OrderFilling::Fok => 0,
            OrderFilling::Ioc => 1,
            OrderFilling::Return => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(OrderFilling::Fok),
            1 => Some(OrderFilling::Ioc),
            2 => Some(OrderFilling::Return),
            _ => None,
        }
    }
}

/// `ORDER_TIME_*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTime {
    /// Good till cancelled.
    Gtc,
    Day,
    Specified,
    SpecifiedDay,
}

impl OrderTime {
    pub fn code(&self) -> i32 {
        match self {
            OrderTime::Gtc => 0,
            OrderTime::Day => 1,
            OrderTime::Specified => 2,
            OrderTime::SpecifiedDay => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(OrderTime::Gtc),
            1 => Some(OrderTime::Day),
            2 => Some(OrderTime::Specified),
            3 => Some(OrderTime::SpecifiedDay),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Timeframe
// ---------------------------------------------------------------------------

/// `TIMEFRAME_*` bar periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M2,
    M3,
    M4,
    M5,
    M6,
    M10,
    M12,
    M15,
    M20,
    M30,
    H1,
    H2,
    H3,
    H4,
    H6,
    H8,
    H12,
    D1,
    W1,
    MN1,
}

const TIMEFRAMES: &[(Timeframe, &str, i32)] = &[
    (Timeframe::M1, "M1", 1),
    (Timeframe::M2, "M2", 2),
    (Timeframe::M3, "M3", 3),
    (Timeframe::M4, "M4", 4),
    (Timeframe::M5, "M5", 5),
    (Timeframe::M6, "M6", 6),
    (Timeframe::M10, "M10", 10),
    (Timeframe::M12, "M12", 12),
    (Timeframe::M15, "M15", 15),
    (Timeframe::M20, "M20", 20),
    (Timeframe::M30, "M30", 30),
    (Timeframe::H1, "H1", 16385),
    (Timeframe::H2, "H2", 16386),
    (Timeframe::H3, "H3", 16387),
    (Timeframe::H4, "H4", 16388),
    (Timeframe::H6, "H6", 16390),
    (Timeframe::H8, "H8", 16392),
    (Timeframe::H12, "H12", 16396),
    (Timeframe::D1, "D1", 16408),
    (Timeframe::W1, "W1", 32769),
    (Timeframe::MN1, "MN1", 49153),
];

impl Timeframe {
    /// The terminal's numeric constant for this timeframe.
    pub fn code(&self) -> i32 {
        TIMEFRAMES
            .iter()
            .find(|(tf, _, _)| tf == self)
            .map(|(_, _, code)| *code)
            .unwrap_or_default()
    }

    pub fn from_code(code: i32) -> Option<Self> {
        TIMEFRAMES
            .iter()
            .find(|(_, _, c)| *c == code)
            .map(|(tf, _, _)| *tf)
    }

    /// Nominal bar length in seconds. Months count as 30 days.
    pub fn seconds(&self) -> i64 {
        let code = self.code();
        match self {
            Timeframe::D1 => 86_400,
            Timeframe::W1 => 7 * 86_400,
            Timeframe::MN1 => 30 * 86_400,
            _ if code >= 16385 => i64::from(code - 16384) * 3600,
            _ => i64::from(code) * 60,
        }
    }

    fn short_name(&self) -> &'static str {
        TIMEFRAMES
            .iter()
            .find(|(tf, _, _)| tf == self)
            .map(|(_, name, _)| *name)
            .unwrap_or("D1")
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TIMEFRAME_{}", self.short_name())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    /// Accepts `TIMEFRAME_D1` or just `D1` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("TIMEFRAME_").unwrap_or(&upper);
        TIMEFRAMES
            .iter()
            .find(|(_, n, _)| *n == name)
            .map(|(tf, _, _)| *tf)
            .ok_or_else(|| format!("unknown timeframe '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_return_code_lookup() {
        let done = ReturnCode::builtin(TRADE_RETCODE_DONE).unwrap();
        assert_eq!(done.constant, "TRADE_RETCODE_DONE");
        assert_eq!(done.description, "Request completed");
        assert!(ReturnCode::builtin(10037).is_none());
        assert_eq!(ReturnCode::unknown(42).constant, "UNKNOWN");
    }

    #[test]
    fn test_builtin_table_is_sorted_and_unique() {
        let table = ReturnCode::builtin_table();
        assert!(table.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!("TIMEFRAME_D1".parse::<Timeframe>().unwrap(), Timeframe::D1);
        assert_eq!("h4".parse::<Timeframe>().unwrap(), Timeframe::H4);
        assert!("TIMEFRAME_H5".parse::<Timeframe>().is_err());
        assert_eq!(Timeframe::H4.code(), 16388);
        assert_eq!(Timeframe::from_code(16408), Some(Timeframe::D1));
        assert_eq!(Timeframe::MN1.to_string(), "TIMEFRAME_MN1");
    }

    #[test]
    fn test_timeframe_seconds() {
        assert_eq!(Timeframe::M15.seconds(), 900);
        assert_eq!(Timeframe::H4.seconds(), 4 * 3600);
        assert_eq!(Timeframe::D1.seconds(), 86_400);
    }

    #[test]
    fn test_order_type_side() {
        assert_eq!(OrderType::SellStop.side(), Some(Side::Sell));
        assert_eq!(OrderType::CloseBy.side(), None);
        assert_eq!(OrderType::from(Side::Buy), OrderType::Buy);
        assert_eq!(OrderType::from_code(OrderType::BuyLimit.code()), Some(OrderType::BuyLimit));
    }
}
