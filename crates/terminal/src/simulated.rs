use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mt5bot_core::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Configuration for the simulated terminal.
#[derive(Debug, Clone)]
pub struct SimulatedTerminalConfig {
    pub login: u64,
    /// Starting account balance.
    pub initial_balance: Decimal,
    pub currency: String,
    pub leverage: u32,
    /// When false the terminal connects but reports no account, like a
    /// terminal whose login was rejected.
    pub authorized: bool,
}

impl Default for SimulatedTerminalConfig {
    fn default() -> Self {
        Self {
            login: 1_000_001,
            initial_balance: Decimal::new(10_000, 0),
            currency: "USD".to_string(),
            leverage: 100,
            authorized: true,
        }
    }
}

/// A five-digit (or three-digit for JPY crosses) forex symbol specification.
pub fn forex_symbol(name: &str, digits: u32) -> SymbolInfo {
    SymbolInfo {
        name: name.to_string(),
        description: format!("{} spot", name),
        path: format!("Forex\\{}", name),
        visible: false,
        select: false,
        digits,
        point: Decimal::new(1, digits),
        spread: 0,
        trade_contract_size: Decimal::new(100_000, 0),
        volume_min: Decimal::new(1, 2),
        volume_max: Decimal::new(100, 0),
        volume_step: Decimal::new(1, 2),
        bid: Decimal::ZERO,
        ask: Decimal::ZERO,
        currency_base: name.chars().take(3).collect(),
        currency_profit: name.chars().skip(3).take(3).collect(),
    }
}

struct State {
    connected: bool,
    account: AccountInfo,
    symbols: BTreeMap<String, SymbolInfo>,
    ticks: HashMap<String, Tick>,
    rates: HashMap<(String, Timeframe), Vec<Rate>>,
    orders: Vec<OrderInfo>,
    positions: Vec<PositionInfo>,
    next_ticket: u64,
    next_request_id: u32,
}

/// Outcome of validating a trade request against the current state.
enum Validation {
    Ok { price: Decimal, margin: Decimal },
    Rejected { retcode: u32 },
}

/// An in-memory trading terminal.
///
/// Market deals fill at the current ask (buy) or bid (sell). Pending orders
/// trigger when a tick crosses their price. Profit is computed in the
/// symbol's profit currency and booked 1:1 into the account currency.
pub struct SimulatedTerminal {
    config: SimulatedTerminalConfig,
    state: Mutex<State>,
}

impl SimulatedTerminal {
    pub fn new(config: SimulatedTerminalConfig) -> Self {
        let account = AccountInfo {
            leverage: config.leverage,
            ..AccountInfo::demo(config.login, config.initial_balance, &config.currency)
        };
        Self {
            config,
            state: Mutex::new(State {
                connected: false,
                account,
                symbols: BTreeMap::new(),
                ticks: HashMap::new(),
                rates: HashMap::new(),
                orders: Vec::new(),
                positions: Vec::new(),
                next_ticket: 1,
                next_request_id: 1,
            }),
        }
    }

    /// A terminal preloaded with a few majors, quotes, and daily bars.
    pub fn demo() -> Self {
        let terminal = Self::new(SimulatedTerminalConfig::default());
        let majors = [
            ("EURUSD", 5, Decimal::new(108_500, 5)),
            ("GBPUSD", 5, Decimal::new(127_300, 5)),
            ("USDJPY", 3, Decimal::new(149_500, 3)),
            ("XAUUSD", 2, Decimal::new(265_000, 2)),
        ];
        let now = Utc::now();
        for (name, digits, mid) in majors {
            terminal.add_symbol(forex_symbol(name, digits));
            let point = Decimal::new(1, digits);
            terminal.set_tick(name, mid, mid + point * Decimal::from(12));
            terminal.set_rates(name, Timeframe::D1, synthetic_bars(mid, point, now, 300));
        }
        terminal
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register (or replace) a symbol.
    pub fn add_symbol(&self, info: SymbolInfo) {
        self.state().symbols.insert(info.name.clone(), info);
    }

    /// Set the current quote for a symbol, mark positions to market, and
    /// trigger pending orders the quote crosses.
    pub fn set_tick(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        let mut state = self.state();
        let Some(info) = state.symbols.get_mut(symbol) else {
            debug!(%symbol, "Ignoring tick for unknown symbol");
            return;
        };
        info.bid = bid;
        info.ask = ask;
        if !info.point.is_zero() {
            info.spread = ((ask - bid) / info.point).round().to_i32().unwrap_or(i32::MAX);
        }
        let tick = Tick {
            symbol: symbol.to_string(),
            time: Utc::now(),
            bid,
            ask,
            last: Decimal::ZERO,
            volume: Decimal::ZERO,
            flags: 0,
        };
        state.ticks.insert(symbol.to_string(), tick);
        trigger_pending_orders(&mut state, symbol, bid, ask);
        mark_to_market(&mut state);
    }

    /// Replace the bar history for a symbol and timeframe (chronological).
    pub fn set_rates(&self, symbol: &str, timeframe: Timeframe, mut rates: Vec<Rate>) {
        rates.sort_by_key(|r| r.time);
        self.state().rates.insert((symbol.to_string(), timeframe), rates);
    }

    /// Allow or forbid trading on the account.
    pub fn set_trade_allowed(&self, allowed: bool) {
        self.state().account.trade_allowed = allowed;
    }

    fn ensure_connected(state: &State) -> Result<(), TerminalError> {
        if state.connected {
            Ok(())
        } else {
            Err(TerminalError::NotConnected)
        }
    }

    fn validate(&self, state: &State, req: &TradeRequest) -> Validation {
        let reject = |retcode| Validation::Rejected { retcode };

        let Some(info) = state.symbols.get(&req.symbol) else {
            return reject(TRADE_RETCODE_INVALID);
        };
        if !info.select {
            return reject(TRADE_RETCODE_INVALID);
        }
        if !state.account.trade_allowed {
            return reject(TRADE_RETCODE_TRADE_DISABLED);
        }
        let Some(tick) = state.ticks.get(&req.symbol) else {
            return reject(TRADE_RETCODE_PRICE_OFF);
        };

        match req.action {
            TradeAction::Remove | TradeAction::Modify => {
                return match req.order.and_then(|t| state.orders.iter().find(|o| o.ticket == t)) {
                    Some(order) => Validation::Ok {
                        price: order.price_open,
                        margin: Decimal::ZERO,
                    },
                    None => reject(TRADE_RETCODE_INVALID),
                };
            }
            TradeAction::Sltp => {
                let Some(pos) = req
                    .position
                    .and_then(|t| state.positions.iter().find(|p| p.ticket == t))
                else {
                    return reject(TRADE_RETCODE_POSITION_CLOSED);
                };
                if !stops_valid(pos.side, pos.price_current, req.sl, req.tp) {
                    return reject(TRADE_RETCODE_INVALID_STOPS);
                }
                return Validation::Ok {
                    price: pos.price_current,
                    margin: Decimal::ZERO,
                };
            }
            TradeAction::CloseBy => return reject(TRADE_RETCODE_INVALID_ORDER),
            TradeAction::Deal | TradeAction::Pending => {}
        }

        let Some(side) = req.order_type.side() else {
            return reject(TRADE_RETCODE_INVALID_ORDER);
        };
        let is_deal = req.action == TradeAction::Deal;
        if is_deal != req.order_type.is_market() {
            return reject(TRADE_RETCODE_INVALID_ORDER);
        }

        if req.volume < info.volume_min
            || req.volume > info.volume_max
            || (!info.volume_step.is_zero()
                && !((req.volume - info.volume_min) % info.volume_step).is_zero())
        {
            return reject(TRADE_RETCODE_INVALID_VOLUME);
        }

        let market_price = tick.price_for(side);
        let price = if is_deal {
            if !req.price.is_zero() {
                let max_slip = info.point * Decimal::from(req.deviation);
                if (req.price - market_price).abs() > max_slip {
                    return reject(TRADE_RETCODE_PRICE_CHANGED);
                }
            }
            market_price
        } else {
            if req.price <= Decimal::ZERO {
                return reject(TRADE_RETCODE_INVALID_PRICE);
            }
            req.price
        };

        // Closing an existing position by an opposite deal
        if let Some(ticket) = req.position {
            return match state.positions.iter().find(|p| p.ticket == ticket) {
                Some(pos) if pos.side != side && req.volume <= pos.volume => Validation::Ok {
                    price,
                    margin: Decimal::ZERO,
                },
                Some(_) => reject(TRADE_RETCODE_INVALID_CLOSE_VOLUME),
                None => reject(TRADE_RETCODE_POSITION_CLOSED),
            };
        }

        if !stops_valid(side, price, req.sl, req.tp) {
            return reject(TRADE_RETCODE_INVALID_STOPS);
        }

        let margin = required_margin(info, req.volume, price, state.account.leverage);
        if is_deal && margin > state.account.margin_free {
            return reject(TRADE_RETCODE_NO_MONEY);
        }

        Validation::Ok { price, margin }
    }

    fn take_ticket(state: &mut State) -> u64 {
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        ticket
    }

    fn execute(state: &mut State, req: &TradeRequest, price: Decimal) -> (u32, u64, u64) {
        let now = Utc::now();
        match req.action {
            TradeAction::Deal => {
                let order = Self::take_ticket(state);
                let deal = Self::take_ticket(state);
                match req.position {
                    Some(ticket) => close_position(state, ticket, req.volume, price),
                    None => {
                        let side = req.order_type.side().unwrap_or(Side::Buy);
                        state.positions.push(PositionInfo {
                            ticket: order,
                            time: now,
                            side,
                            magic: req.magic,
                            volume: req.volume,
                            price_open: price,
                            sl: req.sl,
                            tp: req.tp,
                            price_current: price,
                            profit: Decimal::ZERO,
                            symbol: req.symbol.clone(),
                            comment: req.comment.clone(),
                        });
                    }
                }
                (TRADE_RETCODE_DONE, order, deal)
            }
            TradeAction::Pending => {
                let ticket = Self::take_ticket(state);
                let price_current = state
                    .ticks
                    .get(&req.symbol)
                    .map(|t| t.bid)
                    .unwrap_or_default();
                state.orders.push(OrderInfo {
                    ticket,
                    time_setup: now,
                    order_type: req.order_type,
                    magic: req.magic,
                    volume_initial: req.volume,
                    volume_current: req.volume,
                    price_open: req.price,
                    sl: req.sl,
                    tp: req.tp,
                    price_current,
                    symbol: req.symbol.clone(),
                    comment: req.comment.clone(),
                });
                (TRADE_RETCODE_PLACED, ticket, 0)
            }
            TradeAction::Remove => {
                let ticket = req.order.unwrap_or_default();
                state.orders.retain(|o| o.ticket != ticket);
                (TRADE_RETCODE_DONE, ticket, 0)
            }
            TradeAction::Modify => {
                let ticket = req.order.unwrap_or_default();
                if let Some(order) = state.orders.iter_mut().find(|o| o.ticket == ticket) {
                    if !req.price.is_zero() {
                        order.price_open = req.price;
                    }
                    order.sl = req.sl;
                    order.tp = req.tp;
                }
                (TRADE_RETCODE_DONE, ticket, 0)
            }
            TradeAction::Sltp => {
                let ticket = req.position.unwrap_or_default();
                if let Some(pos) = state.positions.iter_mut().find(|p| p.ticket == ticket) {
                    pos.sl = req.sl;
                    pos.tp = req.tp;
                }
                (TRADE_RETCODE_DONE, 0, 0)
            }
            TradeAction::CloseBy => (TRADE_RETCODE_INVALID_ORDER, 0, 0),
        }
    }
}

#[async_trait]
impl Terminal for SimulatedTerminal {
    async fn connect(&self) -> Result<(), TerminalError> {
        self.state().connected = true;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TerminalError> {
        self.state().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn account_info(&self) -> Result<Option<AccountInfo>, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        if !self.config.authorized {
            return Ok(None);
        }
        Ok(Some(state.account.clone()))
    }

    async fn symbols_total(&self) -> Result<usize, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        Ok(state.symbols.len())
    }

    async fn symbols_get(&self, group: Option<&str>) -> Result<Vec<SymbolInfo>, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        Ok(state
            .symbols
            .values()
            .filter(|s| group.map(|g| group_matches(g, &s.name)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        Ok(state.symbols.get(symbol).cloned())
    }

    async fn symbol_select(&self, symbol: &str, enable: bool) -> Result<bool, TerminalError> {
        let mut state = self.state();
        Self::ensure_connected(&state)?;
        match state.symbols.get_mut(symbol) {
            Some(info) => {
                info.select = enable;
                info.visible = enable;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn symbol_info_tick(&self, symbol: &str) -> Result<Option<Tick>, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        Ok(state.ticks.get(symbol).cloned())
    }

    async fn copy_rates_from_pos(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_pos: usize,
        count: usize,
    ) -> Result<Vec<Rate>, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        let rates = bars_for(&state, symbol, timeframe)?;
        let end = rates.len().saturating_sub(start_pos);
        let begin = end.saturating_sub(count);
        Ok(rates[begin..end].to_vec())
    }

    async fn copy_rates_from(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<Rate>, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        let rates = bars_for(&state, symbol, timeframe)?;
        let end = rates.partition_point(|r| r.time <= date_from);
        let begin = end.saturating_sub(count);
        Ok(rates[begin..end].to_vec())
    }

    async fn copy_rates_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Result<Vec<Rate>, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        let rates = bars_for(&state, symbol, timeframe)?;
        Ok(rates
            .iter()
            .filter(|r| r.time >= date_from && r.time <= date_to)
            .cloned()
            .collect())
    }

    async fn order_check(&self, request: &TradeRequest) -> Result<CheckResult, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        let account = &state.account;

        let (retcode, margin) = match self.validate(&state, request) {
            Validation::Ok { margin, .. } => (CHECK_RETCODE_OK, margin),
            Validation::Rejected { retcode } => (retcode, Decimal::ZERO),
        };
        let total_margin = account.margin + margin;
        let comment = if retcode == CHECK_RETCODE_OK {
            "Done".to_string()
        } else {
            ReturnCode::builtin(retcode)
                .map(|c| c.description)
                .unwrap_or_default()
        };

        Ok(CheckResult {
            retcode,
            balance: account.balance,
            equity: account.equity,
            profit: account.profit,
            margin: total_margin,
            margin_free: account.equity - total_margin,
            margin_level: margin_level(account.equity, total_margin),
            comment,
            request: request.clone(),
        })
    }

    async fn order_send(&self, request: &TradeRequest) -> Result<TradeResult, TerminalError> {
        let mut state = self.state();
        Self::ensure_connected(&state)?;

        let request_id = state.next_request_id;
        state.next_request_id += 1;
        let (bid, ask) = state
            .ticks
            .get(&request.symbol)
            .map(|t| (t.bid, t.ask))
            .unwrap_or_default();

        let mut result = TradeResult {
            retcode: 0,
            deal: 0,
            order: 0,
            volume: Decimal::ZERO,
            price: Decimal::ZERO,
            bid,
            ask,
            comment: String::new(),
            request_id,
            retcode_external: 0,
            request: request.clone(),
        };

        match self.validate(&state, request) {
            Validation::Rejected { retcode } => {
                result.retcode = retcode;
            }
            Validation::Ok { price, .. } => {
                let (retcode, order, deal) = Self::execute(&mut state, request, price);
                result.retcode = retcode;
                result.order = order;
                result.deal = deal;
                if request.action == TradeAction::Deal {
                    result.volume = request.volume;
                    result.price = price;
                }
                mark_to_market(&mut state);
            }
        }
        result.comment = ReturnCode::builtin(result.retcode)
            .map(|c| c.description)
            .unwrap_or_default();
        debug!(symbol = %request.symbol, retcode = result.retcode, "Simulated order_send");
        Ok(result)
    }

    async fn orders_total(&self) -> Result<usize, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        Ok(state.orders.len())
    }

    async fn orders_get(&self, filter: &OrderFilter) -> Result<Vec<OrderInfo>, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        Ok(state
            .orders
            .iter()
            .filter(|o| filter.matches(&o.symbol, o.ticket))
            .cloned()
            .collect())
    }

    async fn positions_total(&self) -> Result<usize, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        Ok(state.positions.len())
    }

    async fn positions_get(&self, filter: &OrderFilter) -> Result<Vec<PositionInfo>, TerminalError> {
        let state = self.state();
        Self::ensure_connected(&state)?;
        Ok(state
            .positions
            .iter()
            .filter(|p| filter.matches(&p.symbol, p.ticket))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn bars_for<'a>(
    state: &'a State,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<&'a [Rate], TerminalError> {
    if !state.symbols.contains_key(symbol) {
        return Err(TerminalError::SymbolNotFound(symbol.to_string()));
    }
    Ok(state
        .rates
        .get(&(symbol.to_string(), timeframe))
        .map(Vec::as_slice)
        .unwrap_or(&[]))
}

/// Stops must sit on the losing (sl) and winning (tp) side of `price`.
fn stops_valid(side: Side, price: Decimal, sl: Decimal, tp: Decimal) -> bool {
    let sl_ok = sl.is_zero()
        || match side {
            Side::Buy => sl < price,
            Side::Sell => sl > price,
        };
    let tp_ok = tp.is_zero()
        || match side {
            Side::Buy => tp > price,
            Side::Sell => tp < price,
        };
    sl_ok && tp_ok
}

fn required_margin(info: &SymbolInfo, volume: Decimal, price: Decimal, leverage: u32) -> Decimal {
    if leverage == 0 {
        return volume * info.trade_contract_size * price;
    }
    volume * info.trade_contract_size * price / Decimal::from(leverage)
}

fn margin_level(equity: Decimal, margin: Decimal) -> Decimal {
    if margin.is_zero() {
        Decimal::ZERO
    } else {
        (equity / margin * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

fn position_profit(pos: &PositionInfo, contract_size: Decimal) -> Decimal {
    let diff = match pos.side {
        Side::Buy => pos.price_current - pos.price_open,
        Side::Sell => pos.price_open - pos.price_current,
    };
    diff * pos.volume * contract_size
}

fn close_position(state: &mut State, ticket: u64, volume: Decimal, price: Decimal) {
    let Some(idx) = state.positions.iter().position(|p| p.ticket == ticket) else {
        return;
    };
    let contract_size = state
        .symbols
        .get(&state.positions[idx].symbol)
        .map(|s| s.trade_contract_size)
        .unwrap_or(Decimal::ONE);

    let pos = &mut state.positions[idx];
    pos.price_current = price;
    let closed = PositionInfo {
        volume,
        ..pos.clone()
    };
    let realized = position_profit(&closed, contract_size);
    if volume >= pos.volume {
        state.positions.remove(idx);
    } else {
        pos.volume -= volume;
    }
    state.account.balance += realized;
}

fn trigger_pending_orders(state: &mut State, symbol: &str, bid: Decimal, ask: Decimal) {
    let now = Utc::now();
    let mut triggered = Vec::new();
    state.orders.retain(|order| {
        if order.symbol != symbol {
            return true;
        }
        let hit = match order.order_type {
            OrderType::BuyLimit => ask <= order.price_open,
            OrderType::SellLimit => bid >= order.price_open,
            OrderType::BuyStop | OrderType::BuyStopLimit => ask >= order.price_open,
            OrderType::SellStop | OrderType::SellStopLimit => bid <= order.price_open,
            _ => false,
        };
        if hit {
            triggered.push(order.clone());
        }
        !hit
    });

    for order in triggered {
        debug!(ticket = order.ticket, %symbol, "Pending order triggered");
        state.positions.push(PositionInfo {
            ticket: order.ticket,
            time: now,
            side: order.order_type.side().unwrap_or(Side::Buy),
            magic: order.magic,
            volume: order.volume_current,
            price_open: order.price_open,
            sl: order.sl,
            tp: order.tp,
            price_current: order.price_open,
            profit: Decimal::ZERO,
            symbol: order.symbol,
            comment: order.comment,
        });
    }
}

fn mark_to_market(state: &mut State) {
    let mut margin = Decimal::ZERO;
    let mut profit = Decimal::ZERO;
    let leverage = state.account.leverage;

    for pos in state.positions.iter_mut() {
        let Some(info) = state.symbols.get(&pos.symbol) else {
            continue;
        };
        if let Some(tick) = state.ticks.get(&pos.symbol) {
            // Longs close on the bid, shorts on the ask
            pos.price_current = tick.price_for(pos.side.opposite());
        }
        pos.profit = position_profit(pos, info.trade_contract_size);
        profit += pos.profit;
        margin += required_margin(info, pos.volume, pos.price_open, leverage);
    }
    for order in state.orders.iter_mut() {
        if let Some(tick) = state.ticks.get(&order.symbol) {
            order.price_current = match order.order_type.side() {
                Some(Side::Sell) => tick.bid,
                _ => tick.ask,
            };
        }
    }

    let account = &mut state.account;
    account.profit = profit;
    account.equity = account.balance + profit;
    account.margin = margin;
    account.margin_free = account.equity - margin;
    account.margin_level = margin_level(account.equity, margin);
}

/// Deterministic oscillating daily bars ending at `end`.
fn synthetic_bars(mid: Decimal, point: Decimal, end: DateTime<Utc>, count: usize) -> Vec<Rate> {
    let day = end.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    (0..count)
        .map(|i| {
            let back = (count - 1 - i) as i64;
            let wave = Decimal::from((i % 20) as i64 - 10) * point * Decimal::from(15);
            let open = mid + wave;
            let close = open + point * Decimal::from(if i % 2 == 0 { 40 } else { -35 });
            let high = open.max(close) + point * Decimal::from(25);
            let low = open.min(close) - point * Decimal::from(25);
            Rate {
                time: day - Duration::days(back),
                open,
                high,
                low,
                close,
                tick_volume: 1_000 + (i as u64 % 7) * 100,
                spread: 12,
                real_volume: 0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn terminal() -> SimulatedTerminal {
        let terminal = SimulatedTerminal::new(SimulatedTerminalConfig::default());
        terminal.add_symbol(forex_symbol("EURUSD", 5));
        terminal.set_tick("EURUSD", dec!(1.10000), dec!(1.10010));
        terminal.connect().await.unwrap();
        terminal.symbol_select("EURUSD", true).await.unwrap();
        terminal
    }

    fn buy(volume: Decimal) -> TradeRequest {
        TradeRequest {
            action: TradeAction::Deal,
            symbol: "EURUSD".to_string(),
            volume,
            order_type: OrderType::Buy,
            price: dec!(1.10010),
            sl: dec!(1.09910),
            tp: dec!(1.10110),
            deviation: 10,
            magic: 42,
            comment: "test".to_string(),
            type_time: OrderTime::Gtc,
            type_filling: OrderFilling::Fok,
            order: None,
            position: None,
        }
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let terminal = SimulatedTerminal::new(SimulatedTerminalConfig::default());
        assert!(matches!(terminal.orders_total().await, Err(TerminalError::NotConnected)));
    }

    #[tokio::test]
    async fn test_market_buy_fills_at_ask() {
        let terminal = terminal().await;
        let result = terminal.order_send(&buy(dec!(0.10))).await.unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_DONE);
        assert_eq!(result.price, dec!(1.10010));
        assert!(result.order > 0 && result.deal > 0);

        let positions = terminal.positions_get(&OrderFilter::default()).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].side, Side::Buy);
        assert_eq!(positions[0].magic, 42);

        // Marked at the bid right away: the spread is the only loss
        let account = terminal.account_info().await.unwrap().unwrap();
        assert_eq!(account.profit, dec!(-1));
        assert_eq!(account.margin, dec!(110.010));
    }

    #[tokio::test]
    async fn test_check_rejects_bad_volume_and_stops() {
        let terminal = terminal().await;

        let check = terminal.order_check(&buy(dec!(0.015))).await.unwrap();
        assert_eq!(check.retcode, TRADE_RETCODE_INVALID_VOLUME);

        let mut bad_stops = buy(dec!(0.10));
        bad_stops.sl = dec!(1.20000);
        let check = terminal.order_check(&bad_stops).await.unwrap();
        assert_eq!(check.retcode, TRADE_RETCODE_INVALID_STOPS);
        assert_eq!(check.comment, "Invalid stops in the request");

        let check = terminal.order_check(&buy(dec!(0.10))).await.unwrap();
        assert!(check.is_valid());
        assert_eq!(terminal.positions_total().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_money() {
        let terminal = terminal().await;
        // 100 lots of EURUSD at 1:100 needs ~110k margin
        let result = terminal.order_send(&buy(dec!(100))).await.unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_NO_MONEY);
        assert_eq!(terminal.positions_total().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unselected_symbol_rejected() {
        let terminal = terminal().await;
        terminal.add_symbol(forex_symbol("GBPUSD", 5));
        terminal.set_tick("GBPUSD", dec!(1.27000), dec!(1.27010));
        let mut req = buy(dec!(0.10));
        req.symbol = "GBPUSD".to_string();
        req.price = Decimal::ZERO;
        req.sl = Decimal::ZERO;
        req.tp = Decimal::ZERO;
        let result = terminal.order_send(&req).await.unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_INVALID);
    }

    #[tokio::test]
    async fn test_price_moved_beyond_deviation() {
        let terminal = terminal().await;
        terminal.set_tick("EURUSD", dec!(1.10100), dec!(1.10110));
        let result = terminal.order_send(&buy(dec!(0.10))).await.unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_PRICE_CHANGED);
    }

    #[tokio::test]
    async fn test_pending_order_triggers_on_tick() {
        let terminal = terminal().await;
        let mut req = buy(dec!(0.10));
        req.action = TradeAction::Pending;
        req.order_type = OrderType::BuyLimit;
        req.price = dec!(1.09950);
        req.sl = dec!(1.09850);
        req.tp = Decimal::ZERO;
        let result = terminal.order_send(&req).await.unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_PLACED);
        assert_eq!(terminal.orders_total().await.unwrap(), 1);

        terminal.set_tick("EURUSD", dec!(1.09930), dec!(1.09940));
        assert_eq!(terminal.orders_total().await.unwrap(), 0);
        let positions = terminal.positions_get(&OrderFilter::symbol("EURUSD")).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].price_open, dec!(1.09950));
    }

    #[tokio::test]
    async fn test_close_position_books_profit() {
        let terminal = terminal().await;
        let opened = terminal.order_send(&buy(dec!(0.10))).await.unwrap();
        terminal.set_tick("EURUSD", dec!(1.10110), dec!(1.10120));

        let close = TradeRequest {
            order_type: OrderType::Sell,
            price: Decimal::ZERO,
            sl: Decimal::ZERO,
            tp: Decimal::ZERO,
            position: Some(opened.order),
            ..buy(dec!(0.10))
        };
        let result = terminal.order_send(&close).await.unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_DONE);
        assert_eq!(terminal.positions_total().await.unwrap(), 0);

        // (1.10110 - 1.10010) * 0.10 * 100000
        let account = terminal.account_info().await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(10010));
    }

    #[tokio::test]
    async fn test_rates_windows() {
        let terminal = terminal().await;
        let end = Utc::now();
        let bars = synthetic_bars(dec!(1.1), dec!(0.00001), end, 10);
        let last_time = bars[9].time;
        terminal.set_rates("EURUSD", Timeframe::D1, bars);

        let latest = terminal
            .copy_rates_from_pos("EURUSD", Timeframe::D1, 0, 3)
            .await
            .unwrap();
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[2].time, last_time);

        let older = terminal
            .copy_rates_from_pos("EURUSD", Timeframe::D1, 8, 5)
            .await
            .unwrap();
        assert_eq!(older.len(), 2);

        let from = terminal
            .copy_rates_from("EURUSD", Timeframe::D1, last_time - Duration::days(1), 4)
            .await
            .unwrap();
        assert_eq!(from.len(), 4);
        assert_eq!(from[3].time, last_time - Duration::days(1));

        let range = terminal
            .copy_rates_range("EURUSD", Timeframe::D1, last_time - Duration::days(2), last_time)
            .await
            .unwrap();
        assert_eq!(range.len(), 3);

        assert!(matches!(
            terminal.copy_rates_from_pos("NOPE", Timeframe::D1, 0, 1).await,
            Err(TerminalError::SymbolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_symbols_get_group() {
        let terminal = SimulatedTerminal::demo();
        terminal.connect().await.unwrap();
        let gbp = terminal.symbols_get(Some("*GBP*")).await.unwrap();
        assert_eq!(gbp.len(), 1);
        let no_usd = terminal.symbols_get(Some("*,!*USD*")).await.unwrap();
        assert!(no_usd.is_empty());
        assert_eq!(terminal.symbols_total().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_unauthorized_has_no_account() {
        let terminal = SimulatedTerminal::new(SimulatedTerminalConfig {
            authorized: false,
            ..Default::default()
        });
        terminal.connect().await.unwrap();
        assert!(terminal.account_info().await.unwrap().is_none());
    }
}
