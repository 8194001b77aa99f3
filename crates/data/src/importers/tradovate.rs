use models::{Broker, Direction, ParseResult, ParsedTrade, ValidationError};
use tracing::debug;
use utils::{find_column_value, has_column, infer_side, normalize_instrument, parse_timestamp_assume_utc, try_parse_number, Tz, RawRow};

use super::{is_unfilled_status, score_indicators};
use crate::csv_text::{read_table, CsvTable};
use crate::report::{FillCells, ParseSession};
use crate::{BrokerParser, ImportContext, Result};

const HEADER_INDICATORS: &[&str] = &[
    "boughtTimestamp",
    "soldTimestamp",
    "buyFillId",
    "sellFillId",
    "_priceFormat",
    "_tickSize",
    "filledQty",
    "B/S",
    "Fill Time",
    "Product Description",
    "decimalFillAvg",
];

const SYMBOL: &[&str] = &["symbol", "Contract", "Product"];
const SIDE: &[&str] = &["B/S", "Side", "Buy/Sell"];
const FILLED_QTY: &[&str] = &["filledQty", "Filled Qty", "Quantity", "qty"];
const AVG_PRICE: &[&str] = &["avgPrice", "Avg Fill Price", "decimalFillAvg", "Price"];
const FILL_TIME: &[&str] = &["Fill Time", "Timestamp", "Date"];

/// Tradovate exports come in two shapes: the Performance report (one row per
/// round trip, with separate bought/sold timestamps) and the Orders report
/// (one row per order, matched here with FIFO). Tradovate writes timestamps
/// without a zone; they are UTC.
pub struct TradovateParser {
    ctx: ImportContext,
}

impl TradovateParser {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }

    fn is_performance_export(headers: &[String]) -> bool {
        has_column(headers, &["boughtTimestamp"]) && has_column(headers, &["soldTimestamp"])
    }

    fn parse_performance(&self, table: &CsvTable, session: &mut ParseSession<'_>) {
        for row in &table.rows {
            session.row_seen();
            if let Some(trade) = self.performance_row(row, session) {
                session.push_trade(trade);
            }
        }
    }

    fn performance_row(&self, row: &RawRow, session: &mut ParseSession<'_>) -> Option<ParsedTrade> {
        let line = row.index;
        let Some(symbol) = find_column_value(row, SYMBOL) else {
            session.reject_row(ValidationError::error(line, "instrument", "", "Missing symbol"));
            return None;
        };

        let bought_raw = find_column_value(row, &["boughtTimestamp"]).unwrap_or("");
        let sold_raw = find_column_value(row, &["soldTimestamp"]).unwrap_or("");
        let (Some(bought), Some(sold)) = (parse_timestamp_assume_utc(bought_raw), parse_timestamp_assume_utc(sold_raw)) else {
            session.reject_row(
                ValidationError::error(line, "date", format!("{} / {}", bought_raw, sold_raw), "Bought/sold timestamp could not be parsed")
                    .with_suggestion("Expected e.g. 01/02/2024 14:30:05"),
            );
            return None;
        };

        let size = find_column_value(row, &["qty", "Quantity"])
            .and_then(try_parse_number)
            .map(f64::abs)
            .unwrap_or(0.0);
        let buy_price = find_column_value(row, &["buyPrice"]).and_then(try_parse_number).unwrap_or(0.0);
        let sell_price = find_column_value(row, &["sellPrice"]).and_then(try_parse_number).unwrap_or(0.0);
        if size <= 0.0 || buy_price <= 0.0 || sell_price <= 0.0 {
            session.issue(ValidationError::warning(line, "quantity", symbol, "Row has no quantity or price; skipped"));
            session.skip_row();
            return None;
        }

        // Bought first means the position was opened long.
        let (direction, entry_price, exit_price, entry_time, exit_time) = if bought <= sold {
            (Direction::Long, buy_price, sell_price, bought, sold)
        } else {
            (Direction::Short, sell_price, buy_price, sold, bought)
        };

        let instrument = normalize_instrument(symbol);
        let pnl = match find_column_value(row, &["pnl", "P&L", "Profit"]).and_then(try_parse_number) {
            Some(pnl) => pnl,
            None => {
                let multiplier = session.multiplier(line, &instrument);
                (sell_price - buy_price) * size * multiplier
            }
        };

        let mut notes = format!("Imported from {} (performance report", Broker::Tradovate.display_name());
        if let Some(duration) = find_column_value(row, &["duration"]) {
            notes.push_str(&format!(", held {}", duration));
        }
        notes.push(')');

        Some(ParsedTrade {
            date: Some(entry_time),
            exit_date: Some(exit_time),
            instrument,
            direction,
            entry_price,
            exit_price,
            size,
            pnl,
            stop_loss: None,
            take_profit: None,
            commission: None,
            notes,
            setup_name: None,
            source_row: line,
        })
    }

    fn parse_orders(&self, table: &CsvTable, session: &mut ParseSession<'_>) {
        for row in &table.rows {
            session.row_seen();
            if let Some(status) = find_column_value(row, &["Status"]) {
                if !status.to_lowercase().contains("filled") || is_unfilled_status(Some(status), &["cancel", "reject"]) {
                    debug!("Tradovate row {}: skipping status '{}'", row.index, status);
                    session.skip_row();
                    continue;
                }
            }

            let side_raw = find_column_value(row, SIDE).unwrap_or("");
            session.add_fill(
                row.index,
                FillCells {
                    time: find_column_value(row, FILL_TIME),
                    symbol: find_column_value(row, SYMBOL),
                    side: infer_side(side_raw),
                    side_raw,
                    quantity: find_column_value(row, FILLED_QTY),
                    price: find_column_value(row, AVG_PRICE),
                    commission: find_column_value(row, &["Commission", "Fees"]),
                },
                Tz::UTC,
            );
        }
    }
}

impl BrokerParser for TradovateParser {
    fn broker(&self) -> Broker {
        Broker::Tradovate
    }

    fn context(&self) -> &ImportContext {
        &self.ctx
    }

    fn detect(&self, content: &str, headers: &[String]) -> f64 {
        score_indicators(content, headers, HEADER_INDICATORS, &[])
    }

    fn parse(&self, content: &str) -> Result<ParseResult> {
        let table = read_table(content)?;
        let mut session = ParseSession::new(Broker::Tradovate, &self.ctx);
        if Self::is_performance_export(&table.headers) {
            debug!("Tradovate performance report with {} rows", table.rows.len());
            self.parse_performance(&table, &mut session);
        } else {
            debug!("Tradovate orders report with {} rows", table.rows.len());
            self.parse_orders(&table, &mut session);
        }
        Ok(session.finish())
    }
}
