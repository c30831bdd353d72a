//! Per-symbol market data flattened into a two-level table.
//!
//! Raw quotes accumulate in a [`MarketFeed`] as they arrive from the
//! terminal. [`MarketDataTable::ingest`] moves them into per-symbol
//! `BUY`/`SELL` columns and empties the feed.

use chrono::{DateTime, Utc};
use mt5bot_core::{Quote, Tick};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::Write;

/// A quote as delivered by a data source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawQuote {
    /// Separate buy (ask) and sell (bid) prices.
    Pair { buy: Decimal, sell: Decimal },
    /// One price used for both sides.
    Single(Decimal),
}

impl RawQuote {
    fn into_quote(self, time: DateTime<Utc>) -> Quote {
        match self {
            RawQuote::Pair { buy, sell } => Quote { time, buy, sell },
            RawQuote::Single(price) => Quote {
                time,
                buy: price,
                sell: price,
            },
        }
    }
}

/// Buffer of raw quotes waiting to be flattened.
#[derive(Debug, Default)]
pub struct MarketFeed {
    pending: BTreeMap<String, Vec<(DateTime<Utc>, RawQuote)>>,
}

impl MarketFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, symbol: &str, time: DateTime<Utc>, quote: RawQuote) {
        self.pending
            .entry(symbol.to_string())
            .or_default()
            .push((time, quote));
    }

    pub fn push_tick(&mut self, tick: &Tick) {
        self.push(
            &tick.symbol,
            tick.time,
            RawQuote::Pair {
                buy: tick.ask,
                sell: tick.bid,
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    fn drain(&mut self) -> BTreeMap<String, Vec<(DateTime<Utc>, RawQuote)>> {
        std::mem::take(&mut self.pending)
    }
}

/// Per-symbol `BUY`/`SELL` columns indexed by time.
#[derive(Debug, Default)]
pub struct MarketDataTable {
    columns: BTreeMap<String, VecDeque<Quote>>,
    max_rows: Option<usize>,
}

impl MarketDataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_rows` quotes per symbol, dropping the oldest.
    pub fn with_max_rows(max_rows: usize) -> Self {
        Self {
            columns: BTreeMap::new(),
            max_rows: Some(max_rows.max(1)),
        }
    }

    /// Flatten everything buffered in `feed` into the table and flush it.
    /// Returns the number of quotes added.
    pub fn ingest(&mut self, feed: &mut MarketFeed) -> usize {
        let mut added = 0;
        for (symbol, quotes) in feed.drain() {
            for (time, raw) in quotes {
                self.push(&symbol, raw.into_quote(time));
                added += 1;
            }
        }
        added
    }

    pub fn push(&mut self, symbol: &str, quote: Quote) {
        let column = self.columns.entry(symbol.to_string()).or_default();
        column.push_back(quote);
        if let Some(max) = self.max_rows {
            while column.len() > max {
                column.pop_front();
            }
        }
    }

    pub fn latest(&self, symbol: &str) -> Option<Quote> {
        self.columns.get(symbol).and_then(|c| c.back().copied())
    }

    pub fn column(&self, symbol: &str) -> Option<&VecDeque<Quote>> {
        self.columns.get(symbol)
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    /// Total number of quotes across all symbols.
    pub fn len(&self) -> usize {
        self.columns.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the table as CSV with a two-row header (symbol, then side).
    ///
    /// Rows are the union of all timestamps; a symbol without a quote at a
    /// given time leaves its cells empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);

        let mut top = vec!["time".to_string()];
        let mut sides = vec![String::new()];
        for symbol in self.columns.keys() {
            top.push(symbol.clone());
            top.push(symbol.clone());
            sides.push("BUY".to_string());
            sides.push("SELL".to_string());
        }
        out.write_record(&top)?;
        out.write_record(&sides)?;

        let times: BTreeSet<DateTime<Utc>> = self
            .columns
            .values()
            .flat_map(|c| c.iter().map(|q| q.time))
            .collect();

        for time in times {
            let mut record = vec![time.to_rfc3339()];
            for column in self.columns.values() {
                match column.iter().rev().find(|q| q.time == time) {
                    Some(q) => {
                        record.push(q.buy.to_string());
                        record.push(q.sell.to_string());
                    }
                    None => {
                        record.push(String::new());
                        record.push(String::new());
                    }
                }
            }
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_ingest_flushes_feed() {
        let mut feed = MarketFeed::new();
        feed.push(
            "EURUSD",
            at(0),
            RawQuote::Pair {
                buy: dec!(1.1001),
                sell: dec!(1.1000),
            },
        );
        feed.push("XAUUSD", at(0), RawQuote::Single(dec!(1950.5)));
        assert_eq!(feed.len(), 2);

        let mut table = MarketDataTable::new();
        assert_eq!(table.ingest(&mut feed), 2);
        assert!(feed.is_empty());

        let gold = table.latest("XAUUSD").unwrap();
        assert_eq!(gold.buy, dec!(1950.5));
        assert_eq!(gold.sell, dec!(1950.5));
        assert_eq!(table.symbols(), vec!["EURUSD", "XAUUSD"]);

        // A second ingest of an empty feed adds nothing.
        assert_eq!(table.ingest(&mut feed), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_push_tick_uses_ask_for_buy() {
        let tick = Tick {
            symbol: "EURUSD".to_string(),
            time: at(5),
            bid: dec!(1.1000),
            ask: dec!(1.1002),
            last: Decimal::ZERO,
            volume: Decimal::ZERO,
            flags: 0,
        };
        let mut feed = MarketFeed::new();
        feed.push_tick(&tick);
        let mut table = MarketDataTable::new();
        table.ingest(&mut feed);
        let quote = table.latest("EURUSD").unwrap();
        assert_eq!(quote.buy, dec!(1.1002));
        assert_eq!(quote.sell, dec!(1.1000));
    }

    #[test]
    fn test_row_cap_drops_oldest() {
        let mut table = MarketDataTable::with_max_rows(2);
        for i in 0..5 {
            table.push(
                "EURUSD",
                Quote {
                    time: at(i),
                    buy: Decimal::from(i),
                    sell: Decimal::from(i),
                },
            );
        }
        let column = table.column("EURUSD").unwrap();
        assert_eq!(column.len(), 2);
        assert_eq!(column.front().unwrap().time, at(3));
        assert_eq!(table.latest("EURUSD").unwrap().buy, dec!(4));
    }

    #[test]
    fn test_csv_has_two_header_rows() {
        let mut table = MarketDataTable::new();
        table.push(
            "EURUSD",
            Quote {
                time: at(0),
                buy: dec!(1.1001),
                sell: dec!(1.1000),
            },
        );
        table.push(
            "GBPUSD",
            Quote {
                time: at(1),
                buy: dec!(1.2701),
                sell: dec!(1.2700),
            },
        );

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,EURUSD,EURUSD,GBPUSD,GBPUSD");
        assert_eq!(lines[1], ",BUY,SELL,BUY,SELL");
        assert_eq!(lines.len(), 4);
        assert!(lines[2].ends_with("1.1001,1.1000,,"));
        assert!(lines[3].ends_with(",,1.2701,1.2700"));
    }
}
