use serde::Serialize;
use std::io::Write;

/// Write flat rows as CSV, header taken from the first row's field names.
///
/// Rows must not contain nested structs or sequences.
pub fn write_csv<T, W>(rows: &[T], writer: W) -> Result<usize, csv::Error>
where
    T: Serialize,
    W: Write,
{
    let mut out = csv::Writer::from_writer(writer);
    for row in rows {
        out.serialize(row)?;
    }
    out.flush()?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mt5bot_core::{Rate, Tick};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ticks_as_csv() {
        let ticks = vec![Tick {
            symbol: "EURUSD".to_string(),
            time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            bid: dec!(1.1000),
            ask: dec!(1.1002),
            last: Decimal::ZERO,
            volume: Decimal::ZERO,
            flags: 6,
        }];
        let mut buf = Vec::new();
        assert_eq!(write_csv(&ticks, &mut buf).unwrap(), 1);
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "symbol,time,bid,ask,last,volume,flags"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("EURUSD,"));
        assert!(row.ends_with(",1.1000,1.1002,0,0,6"));
    }

    #[test]
    fn test_empty_rows_write_nothing() {
        let rates: Vec<Rate> = Vec::new();
        let mut buf = Vec::new();
        assert_eq!(write_csv(&rates, &mut buf).unwrap(), 0);
        assert!(buf.is_empty());
    }
}
