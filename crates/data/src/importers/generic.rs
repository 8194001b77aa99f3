use std::collections::HashMap;

use models::{Broker, Direction, ParseResult, ParsedTrade, ValidationError};
use tracing::{debug, info};
use utils::{fuzzy_match_column, infer_side, normalize_instrument, parse_date, parse_number, try_parse_number, RawRow, TradeField, DEFAULT_MULTIPLIER};

use crate::csv_text::read_table;
use crate::detection::GENERIC_CONFIDENCE;
use crate::report::{FillCells, ParseSession};
use crate::{BrokerParser, ImportContext, Result};

/// Below this a header is left unmapped.
const MIN_COLUMN_CONFIDENCE: f64 = 0.5;

const UNKNOWN_INSTRUMENT: &str = "UNKNOWN";

/// Header name chosen for each trade field.
#[derive(Debug, Default)]
struct ColumnMap {
    columns: HashMap<TradeField, String>,
}

impl ColumnMap {
    /// Greedy assignment: strongest header/field pairs first, each header and
    /// each field used at most once.
    fn infer(headers: &[String]) -> Self {
        let mut candidates: Vec<(usize, TradeField, f64)> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| fuzzy_match_column(h).map(|m| (i, m.field, m.confidence)))
            .filter(|(_, _, conf)| *conf >= MIN_COLUMN_CONFIDENCE)
            .collect();
        // Stable: ties keep header order.
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut columns = HashMap::new();
        let mut used = vec![false; headers.len()];
        for (i, field, _) in candidates {
            if used[i] || columns.contains_key(&field) {
                continue;
            }
            used[i] = true;
            columns.insert(field, headers[i].clone());
        }
        Self { columns }
    }

    fn has(&self, field: TradeField) -> bool {
        self.columns.contains_key(&field)
    }

    fn cell<'r>(&self, row: &'r RawRow, field: TradeField) -> Option<&'r str> {
        let header = self.columns.get(&field)?;
        row.get(header).map(str::trim).filter(|v| !v.is_empty())
    }
}

/// Fallback for files no platform detector recognises. Columns are mapped by
/// name similarity; the file may hold either round trips (entry and exit
/// price per row) or fills (a price and a side per row).
pub struct GenericParser {
    ctx: ImportContext,
}

impl GenericParser {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }

    fn round_trip(&self, map: &ColumnMap, row: &RawRow, session: &mut ParseSession<'_>) -> ParsedTrade {
        let line = row.index;
        let zone = self.ctx.settings.timezone;
        let raw_instrument = map.cell(row, TradeField::Instrument);
        let instrument = raw_instrument
            .map(normalize_instrument)
            .unwrap_or_else(|| UNKNOWN_INSTRUMENT.to_string());
        let direction = session.resolve_direction(line, map.cell(row, TradeField::Direction));

        let number = |field| map.cell(row, field).and_then(try_parse_number);
        let entry_price = number(TradeField::EntryPrice).unwrap_or(0.0);
        let exit_price = number(TradeField::ExitPrice).unwrap_or(0.0);
        // No size column at all means one unit per row.
        let size = if map.has(TradeField::Size) {
            number(TradeField::Size).map(f64::abs).unwrap_or(0.0)
        } else {
            1.0
        };

        let pnl = if map.has(TradeField::Pnl) {
            map.cell(row, TradeField::Pnl).map(parse_number).unwrap_or(0.0)
        } else {
            let multiplier = if raw_instrument.is_some() {
                session.multiplier(line, &instrument)
            } else {
                DEFAULT_MULTIPLIER
            };
            let sign = if direction == Direction::Short { -1.0 } else { 1.0 };
            (exit_price - entry_price) * sign * size * multiplier
        };

        let mut notes = format!("Imported from {}", Broker::Generic.display_name());
        if let Some(user_notes) = map.cell(row, TradeField::Notes) {
            notes.push_str(" | ");
            notes.push_str(user_notes);
        }

        ParsedTrade {
            date: map.cell(row, TradeField::Date).and_then(|v| parse_date(v, zone)),
            exit_date: map.cell(row, TradeField::ExitDate).and_then(|v| parse_date(v, zone)),
            instrument,
            direction,
            entry_price,
            exit_price,
            size,
            pnl,
            stop_loss: number(TradeField::StopLoss),
            take_profit: number(TradeField::TakeProfit),
            commission: number(TradeField::Commission).map(f64::abs),
            notes,
            setup_name: map.cell(row, TradeField::SetupName).map(str::to_string),
            source_row: line,
        }
    }

    fn execution(&self, map: &ColumnMap, row: &RawRow, session: &mut ParseSession<'_>) {
        let side_raw = map.cell(row, TradeField::Direction).unwrap_or("");
        let quantity = if map.has(TradeField::Size) {
            map.cell(row, TradeField::Size)
        } else {
            Some("1")
        };
        session.add_fill(
            row.index,
            FillCells {
                time: map.cell(row, TradeField::Date),
                symbol: map.cell(row, TradeField::Instrument),
                side: infer_side(side_raw),
                side_raw,
                quantity,
                price: map.cell(row, TradeField::Price),
                commission: map.cell(row, TradeField::Commission),
            },
            self.ctx.settings.timezone,
        );
    }
}

impl BrokerParser for GenericParser {
    fn broker(&self) -> Broker {
        Broker::Generic
    }

    fn context(&self) -> &ImportContext {
        &self.ctx
    }

    fn detect(&self, _content: &str, _headers: &[String]) -> f64 {
        GENERIC_CONFIDENCE
    }

    fn parse(&self, content: &str) -> Result<ParseResult> {
        let table = read_table(content)?;
        let map = ColumnMap::infer(&table.headers);
        debug!("Generic column map: {:?}", map.columns);
        let mut session = ParseSession::new(Broker::Generic, &self.ctx);

        let round_trips = map.has(TradeField::EntryPrice) && map.has(TradeField::ExitPrice);
        let fills = map.has(TradeField::Price) && map.has(TradeField::Direction);
        if !round_trips && !fills {
            info!("Generic parser could not map headers {:?}", table.headers);
            session.reject_row(
                ValidationError::error(
                    table.header_line,
                    "headers",
                    table.headers.join(","),
                    "Could not find entry/exit price columns or a price and side column",
                )
                .with_suggestion("Rename columns to e.g. Date, Symbol, Side, Entry Price, Exit Price, Qty"),
            );
            return Ok(session.finish());
        }

        for row in &table.rows {
            session.row_seen();
            if round_trips {
                let trade = self.round_trip(&map, row, &mut session);
                session.push_trade(trade);
            } else {
                self.execution(&map, row, &mut session);
            }
        }
        Ok(session.finish())
    }
}
