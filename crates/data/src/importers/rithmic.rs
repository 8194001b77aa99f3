use models::{Broker, ParseResult, Side, ValidationError};
use tracing::debug;
use utils::{find_column_value, has_column, infer_side, try_parse_number, RawRow};

use super::{is_unfilled_status, score_indicators};
use crate::csv_text::read_table;
use crate::report::{FillCells, ParseSession};
use crate::{BrokerParser, ImportContext, Result};

const HEADER_INDICATORS: &[&str] = &[
    "Qty To Fill",
    "Qty Filled",
    "Avg Fill Price",
    "Order Number",
    "Update Time",
    "Create Time",
    "Buy Qty",
    "Sell Qty",
];
const CONTENT_INDICATORS: &[&str] = &["Completed Orders", "Order History"];

const UNFILLED: &[&str] = &["cancel", "reject", "expire", "pending", "open", "working"];
const SIDE: &[&str] = &["Buy/Sell", "B/S", "Side"];
const QUANTITY: &[&str] = &["Qty Filled", "Filled Qty", "Quantity", "Qty"];

/// R|Trader Pro order history. The export starts with a few title lines
/// before the real header row.
pub struct RithmicParser {
    ctx: ImportContext,
}

impl RithmicParser {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }

    /// Side and filled quantity from split `Buy Qty` / `Sell Qty` columns.
    /// Exactly one of them may be filled in.
    fn split_quantity(row: &RawRow) -> std::result::Result<Option<(Side, &str)>, ValidationError> {
        let filled = |col: &str| {
            find_column_value(row, &[col]).filter(|v| try_parse_number(v).is_some_and(|n| n != 0.0))
        };
        match (filled("Buy Qty"), filled("Sell Qty")) {
            (Some(q), None) => Ok(Some((Side::Buy, q))),
            (None, Some(q)) => Ok(Some((Side::Sell, q))),
            (Some(b), Some(s)) => Err(ValidationError::error(
                row.index,
                "quantity",
                format!("{} / {}", b, s),
                "Both Buy Qty and Sell Qty are set",
            )),
            (None, None) => Ok(None),
        }
    }
}

impl BrokerParser for RithmicParser {
    fn broker(&self) -> Broker {
        Broker::Rithmic
    }

    fn context(&self) -> &ImportContext {
        &self.ctx
    }

    fn detect(&self, content: &str, headers: &[String]) -> f64 {
        score_indicators(content, headers, HEADER_INDICATORS, CONTENT_INDICATORS)
    }

    fn parse(&self, content: &str) -> Result<ParseResult> {
        let table = read_table(content)?;
        let mut session = ParseSession::new(Broker::Rithmic, &self.ctx);
        let has_side_column = has_column(&table.headers, SIDE);
        debug!("Rithmic header at line {}, side column: {}", table.header_line, has_side_column);

        for row in &table.rows {
            session.row_seen();
            let status = find_column_value(row, &["Status"]);
            if is_unfilled_status(status, UNFILLED) {
                session.skip_row();
                continue;
            }

            let side_raw = find_column_value(row, SIDE).unwrap_or("");
            let (side, quantity) = if has_side_column {
                (infer_side(side_raw), find_column_value(row, QUANTITY))
            } else {
                match Self::split_quantity(row) {
                    Ok(Some((side, qty))) => (Some(side), Some(qty)),
                    Ok(None) => (None, None),
                    Err(issue) => {
                        session.reject_row(issue);
                        continue;
                    }
                }
            };

            session.add_fill(
                row.index,
                FillCells {
                    time: find_column_value(row, &["Update Time", "Fill Time", "Create Time"]),
                    symbol: find_column_value(row, &["Symbol", "Contract"]),
                    side,
                    side_raw,
                    quantity,
                    price: find_column_value(row, &["Avg Fill Price", "Fill Price", "Price"]),
                    commission: find_column_value(row, &["Commission", "Commission Fill Rate"]),
                },
                self.ctx.settings.timezone,
            );
        }

        Ok(session.finish())
    }
}
