use models::{Broker, ParseResult};
use tracing::debug;
use utils::{find_column_value, infer_side, Tz};

use super::{is_unfilled_status, score_indicators};
use crate::csv_text::read_table;
use crate::report::{FillCells, ParseSession};
use crate::{BrokerParser, ImportContext, Result};

const HEADER_INDICATORS: &[&str] = &["Placing Time", "Closing Time", "Fill Price", "Leverage", "Margin"];

const UNFILLED: &[&str] = &[
    "rejected", "cancelled", "canceled", "expired", "working", "pending", "inactive",
];

/// TradingView paper-trading order history.
pub struct TradingViewParser {
    ctx: ImportContext,
}

impl TradingViewParser {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }
}

impl BrokerParser for TradingViewParser {
    fn broker(&self) -> Broker {
        Broker::TradingView
    }

    fn context(&self) -> &ImportContext {
        &self.ctx
    }

    fn detect(&self, content: &str, headers: &[String]) -> f64 {
        score_indicators(content, headers, HEADER_INDICATORS, &[])
    }

    fn parse(&self, content: &str) -> Result<ParseResult> {
        let table = read_table(content)?;
        let mut session = ParseSession::new(Broker::TradingView, &self.ctx);

        for row in &table.rows {
            session.row_seen();
            let status = find_column_value(row, &["Status"]);
            if is_unfilled_status(status, UNFILLED) {
                debug!("TradingView row {}: skipping status {:?}", row.index, status);
                session.skip_row();
                continue;
            }

            let side_raw = find_column_value(row, &["Side"]).unwrap_or("");
            session.add_fill(
                row.index,
                FillCells {
                    // Closing Time is when the order filled.
                    time: find_column_value(row, &["Closing Time", "Fill Time", "Placing Time"]),
                    symbol: find_column_value(row, &["Symbol"]),
                    side: infer_side(side_raw),
                    side_raw,
                    quantity: find_column_value(row, &["Qty", "Quantity"]),
                    price: find_column_value(row, &["Fill Price", "Avg Fill Price"]),
                    commission: find_column_value(row, &["Commission"]),
                },
                Tz::UTC,
            );
        }

        Ok(session.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::extract_header_line;
    use models::Direction;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    const ORDERS: &str = "Symbol,Side,Type,Qty,Limit Price,Stop Price,Fill Price,Status,Commission,Leverage,Margin,Placing Time,Closing Time,Order ID
CME_MINI:ESH2024,Buy,Market,2,,,100,Filled,4.12,,,2024-01-02 14:30:00,2024-01-02 14:30:00,1
CME_MINI:ESH2024,Sell,Limit,3,105,,105,Filled,6.18,,,2024-01-02 14:35:00,2024-01-02 14:40:00,2
CME_MINI:ESH2024,Buy,Stop,1,,110,,Cancelled,,,,2024-01-02 14:41:00,2024-01-02 14:50:00,3
";

    fn parser() -> TradingViewParser {
        TradingViewParser::new(ImportContext::default())
    }

    #[test]
    fn test_detect() {
        assert!(parser().detect(ORDERS, &extract_header_line(ORDERS)) >= 0.95);
    }

    #[test]
    fn test_position_flip_leaves_dangling_short() {
        let r = parser().parse(ORDERS).unwrap();
        assert!(r.success);
        assert_eq!(r.trades.len(), 1);
        let t = &r.trades[0];
        assert_eq!(t.instrument, "ES");
        assert_eq!(t.direction, Direction::Long);
        assert!(approx(t.size, 2.0));
        assert!(approx(t.pnl, 500.0));
        assert!(approx(t.commission.unwrap(), 4.12 + 6.18 * 2.0 / 3.0));
        assert_eq!(t.date.unwrap().to_rfc3339(), "2024-01-02T14:30:00+00:00");

        assert_eq!(r.stats.skipped_rows, 1);
        let open = r.warnings.iter().find(|w| w.field == "quantity").unwrap();
        assert_eq!(open.row, 3);
        assert!(open.message.contains("ES"));
    }

    #[test]
    fn test_unknown_side_uses_default_direction_with_warning() {
        let csv = "Symbol,Side,Qty,Fill Price,Status,Placing Time,Closing Time
NQ1!,??,1,17000,Filled,2024-01-02 14:30:00,2024-01-02 14:30:00
NQ1!,Sell,1,17005,Filled,2024-01-02 14:31:00,2024-01-02 14:31:00
";
        let r = parser().parse(csv).unwrap();
        assert_eq!(r.trades.len(), 1);
        assert!(approx(r.trades[0].pnl, 100.0));
        assert!(r.warnings.iter().any(|w| w.field == "direction" && w.row == 2));
    }
}
