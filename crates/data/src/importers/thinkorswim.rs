use models::{Broker, ParseResult, Side};
use tracing::debug;
use utils::{find_column_value, infer_side, try_parse_number};

use super::score_indicators;
use crate::csv_text::{extract_section, read_table, read_table_at, CsvTable};
use crate::report::{FillCells, ParseSession};
use crate::{BrokerParser, ImportContext, Result};

const HEADER_INDICATORS: &[&str] = &["Exec Time", "Pos Effect", "Net Price", "Spread"];
const CONTENT_INDICATORS: &[&str] = &[
    "Account Trade History",
    "Account Statement for",
    "Profits and Losses",
    "Cash Balance",
];

const TRADE_HISTORY: &str = "Account Trade History";
const NEXT_SECTIONS: &[&str] = &[
    "Profits and Losses",
    "Account Order History",
    "Account Summary",
    "Equities",
    "Futures",
    "Options",
    "Forex",
];

/// thinkorswim Account Statement. Only the trade history section holds fills;
/// the rest of the statement is skipped.
pub struct ThinkorswimParser {
    ctx: ImportContext,
}

impl ThinkorswimParser {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }

    fn trade_history(content: &str) -> Result<CsvTable> {
        match extract_section(content, TRADE_HISTORY, NEXT_SECTIONS) {
            Some(section) => {
                debug!("thinkorswim trade history starts at line {}", section.line_offset + 1);
                read_table_at(&section.text, section.line_offset)
            }
            // A bare trade-history export without the statement around it.
            None => read_table(content),
        }
    }
}

impl BrokerParser for ThinkorswimParser {
    fn broker(&self) -> Broker {
        Broker::Thinkorswim
    }

    fn context(&self) -> &ImportContext {
        &self.ctx
    }

    fn detect(&self, content: &str, headers: &[String]) -> f64 {
        score_indicators(content, headers, HEADER_INDICATORS, CONTENT_INDICATORS)
    }

    fn parse(&self, content: &str) -> Result<ParseResult> {
        let table = Self::trade_history(content)?;
        let mut session = ParseSession::new(Broker::Thinkorswim, &self.ctx);

        // Spread legs after the first leave Exec Time blank.
        let mut last_exec_time: Option<&str> = None;
        for row in &table.rows {
            session.row_seen();
            let exec_time = match find_column_value(row, &["Exec Time", "Time"]) {
                Some(t) => {
                    last_exec_time = Some(t);
                    Some(t)
                }
                None => last_exec_time,
            };

            let qty = find_column_value(row, &["Qty", "Quantity"]);
            let side_raw = find_column_value(row, &["Side"]).unwrap_or("");
            let side = infer_side(side_raw).or_else(|| {
                qty.and_then(try_parse_number)
                    .filter(|q| *q != 0.0)
                    .map(|q| if q > 0.0 { Side::Buy } else { Side::Sell })
            });

            session.add_fill(
                row.index,
                FillCells {
                    time: exec_time,
                    symbol: find_column_value(row, &["Symbol"]),
                    side,
                    side_raw,
                    quantity: qty,
                    price: find_column_value(row, &["Price", "Net Price"]),
                    commission: find_column_value(row, &["Commissions & Fees", "Commission"]),
                },
                self.ctx.settings.timezone,
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

    const STATEMENT: &str = "Account Statement for 123456789 (margin) since 1/1/24 through 1/31/24

Cash Balance
DATE,TIME,TYPE,REF #,DESCRIPTION,Misc Fees,Commissions & Fees,AMOUNT,BALANCE
1/2/24,09:00:00,BAL,,Cash balance at the start of business day,,,,\"100,000.00\"

Account Trade History
,Exec Time,Spread,Side,Qty,Pos Effect,Symbol,Exp,Strike,Type,Price,Net Price,Order Type
,1/2/24 09:30:15,FUTURE,BUY,+3,TO OPEN,/ESH24,MAR 24,,FUTURE,100.00,100.00,MKT
,1/2/24 09:40:00,FUTURE,SELL,-1,TO CLOSE,/ESH24,MAR 24,,FUTURE,105.00,105.00,LMT
,1/2/24 09:45:00,FUTURE,SELL,-2,TO CLOSE,/ESH24,MAR 24,,FUTURE,110.00,110.00,LMT

Profits and Losses
Symbol,Description,P/L Open,P/L %,P/L Day
/ESH24,E-mini S&P 500,0.00,0.00%,1250.00
";

    fn parser() -> ThinkorswimParser {
        ThinkorswimParser::new(ImportContext::default())
    }

    #[test]
    fn test_detects_statement_from_content() {
        let headers = extract_header_line(STATEMENT);
        assert!(parser().detect(STATEMENT, &headers) >= 0.95);
        assert!(parser().detect("Date,Symbol,Price\n", &[]) < 0.2);
    }

    #[test]
    fn test_partial_close_from_trade_history_section() {
        let r = parser().parse(STATEMENT).unwrap();
        assert!(r.success, "{:?}", r.errors);
        assert_eq!(r.trades.len(), 1);
        let t = &r.trades[0];
        assert_eq!(t.instrument, "ES");
        assert_eq!(t.direction, Direction::Long);
        assert!(approx(t.size, 3.0));
        assert!(approx(t.exit_price, (105.0 + 220.0) / 3.0));
        assert!(approx(t.pnl, 1250.0));
        // row numbers point into the full statement
        assert_eq!(t.source_row, 9);
        assert_eq!(r.stats.total_rows, 3);
    }

    #[test]
    fn test_spread_legs_inherit_exec_time_and_side_from_qty() {
        let csv = ",Exec Time,Spread,Side,Qty,Pos Effect,Symbol,Price
,1/3/24 10:00:00,VERTICAL,,+1,TO OPEN,/NQH24,17000
,,VERTICAL,,-1,TO OPEN,/CLH24,70.00
,1/3/24 10:30:00,VERTICAL,,-1,TO CLOSE,/NQH24,17010
,,VERTICAL,,+1,TO CLOSE,/CLH24,69.50
";
        let r = parser().parse(csv).unwrap();
        assert!(r.errors.is_empty(), "{:?}", r.errors);
        assert_eq!(r.trades.len(), 2);
        let cl = r.trades.iter().find(|t| t.instrument == "CL").unwrap();
        assert_eq!(cl.direction, Direction::Short);
        assert!(approx(cl.pnl, 0.5 * 1000.0));
        let nq = r.trades.iter().find(|t| t.instrument == "NQ").unwrap();
        assert!(approx(nq.pnl, 10.0 * 20.0));
        assert_eq!(cl.date, nq.date);
    }
}
