use models::{Broker, Direction, ParseResult, ParsedTrade, ValidationError};
use tracing::debug;
use utils::{find_column_value, has_column, infer_side, normalize_instrument, parse_date, try_parse_number, RawRow};

use super::score_indicators;
use crate::csv_text::{read_table, CsvTable};
use crate::report::{FillCells, ParseSession};
use crate::{BrokerParser, ImportContext, Result};

const HEADER_INDICATORS: &[&str] = &[
    "Trade number",
    "Market pos.",
    "Entry name",
    "Exit name",
    "Cum. net profit",
    "MAE",
    "MFE",
    "ETD",
    "Bars",
    "E/X",
];

/// NinjaTrader grids: the Trade Performance "Trades" tab (already matched
/// round trips) and the "Executions" tab (fills, matched with FIFO).
pub struct NinjaTraderParser {
    ctx: ImportContext,
}

impl NinjaTraderParser {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }

    fn is_trades_grid(headers: &[String]) -> bool {
        has_column(headers, &["Market pos.", "Market position"])
            || (has_column(headers, &["Entry price"]) && has_column(headers, &["Exit price"]))
    }

    fn parse_trades(&self, table: &CsvTable, session: &mut ParseSession<'_>) {
        for row in &table.rows {
            session.row_seen();
            if let Some(trade) = self.trade_row(row, session) {
                session.push_trade(trade);
            }
        }
    }

    fn trade_row(&self, row: &RawRow, session: &mut ParseSession<'_>) -> Option<ParsedTrade> {
        let line = row.index;
        let Some(raw_instrument) = find_column_value(row, &["Instrument", "Symbol"]) else {
            session.reject_row(ValidationError::error(line, "instrument", "", "Missing instrument"));
            return None;
        };

        let zone = self.ctx.settings.timezone;
        let entry_raw = find_column_value(row, &["Entry time"]).unwrap_or("");
        let Some(entry_time) = parse_date(entry_raw, zone) else {
            session.reject_row(
                ValidationError::error(line, "date", entry_raw, "Entry time could not be parsed")
                    .with_suggestion("Expected e.g. 1/2/2024 9:30:00 AM"),
            );
            return None;
        };
        let exit_time = find_column_value(row, &["Exit time"]).and_then(|v| parse_date(v, zone));

        let direction = session.resolve_direction(line, find_column_value(row, &["Market pos.", "Market position"]));
        let instrument = normalize_instrument(raw_instrument);
        let size = find_column_value(row, &["Qty", "Quantity"])
            .and_then(try_parse_number)
            .map(f64::abs)
            .unwrap_or(0.0);
        let entry_price = find_column_value(row, &["Entry price"]).and_then(try_parse_number).unwrap_or(0.0);
        let exit_price = find_column_value(row, &["Exit price"]).and_then(try_parse_number).unwrap_or(0.0);

        let pnl = match find_column_value(row, &["Profit", "Net profit"]).and_then(try_parse_number) {
            Some(pnl) => pnl,
            None => {
                let sign = if direction == Direction::Short { -1.0 } else { 1.0 };
                (exit_price - entry_price) * sign * size * session.multiplier(line, &instrument)
            }
        };

        let mut notes = format!("Imported from {}", Broker::NinjaTrader.display_name());
        if let Some(number) = find_column_value(row, &["Trade number"]) {
            notes.push_str(&format!(" (trade #{}", number));
            if let (Some(entry), Some(exit)) = (
                find_column_value(row, &["Entry name"]),
                find_column_value(row, &["Exit name"]),
            ) {
                notes.push_str(&format!(", {} / {}", entry, exit));
            }
            notes.push(')');
        }

        Some(ParsedTrade {
            date: Some(entry_time),
            exit_date: exit_time,
            instrument,
            direction,
            entry_price,
            exit_price,
            size,
            pnl,
            stop_loss: None,
            take_profit: None,
            commission: find_column_value(row, &["Commission"]).and_then(try_parse_number).map(f64::abs),
            notes,
            setup_name: find_column_value(row, &["Strategy"]).map(str::to_string),
            source_row: line,
        })
    }

    fn parse_executions(&self, table: &CsvTable, session: &mut ParseSession<'_>) {
        for row in &table.rows {
            session.row_seen();
            let side_raw = find_column_value(row, &["Action", "Side"]).unwrap_or("");
            session.add_fill(
                row.index,
                FillCells {
                    time: find_column_value(row, &["Time", "Execution time"]),
                    symbol: find_column_value(row, &["Instrument"]),
                    side: infer_side(side_raw),
                    side_raw,
                    quantity: find_column_value(row, &["Quantity", "Qty"]),
                    price: find_column_value(row, &["Price"]),
                    commission: find_column_value(row, &["Commission"]),
                },
                self.ctx.settings.timezone,
            );
        }
    }
}

impl BrokerParser for NinjaTraderParser {
    fn broker(&self) -> Broker {
        Broker::NinjaTrader
    }

    fn context(&self) -> &ImportContext {
        &self.ctx
    }

    fn detect(&self, content: &str, headers: &[String]) -> f64 {
        score_indicators(content, headers, HEADER_INDICATORS, &[])
    }

    fn parse(&self, content: &str) -> Result<ParseResult> {
        let table = read_table(content)?;
        let mut session = ParseSession::new(Broker::NinjaTrader, &self.ctx);
        if Self::is_trades_grid(&table.headers) {
            self.parse_trades(&table, &mut session);
        } else {
            debug!("NinjaTrader executions grid with {} rows", table.rows.len());
            self.parse_executions(&table, &mut session);
        }
        Ok(session.finish())
    }
}
