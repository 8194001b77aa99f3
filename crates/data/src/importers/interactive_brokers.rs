use std::collections::HashMap;

use models::{Broker, ParseResult, Side};
use tracing::debug;
use utils::{find_column_value, infer_side, try_parse_number, RawRow};

use super::{is_total_row, score_indicators};
use crate::csv_text::{read_records, read_table};
use crate::report::{FillCells, ParseSession};
use crate::{BrokerParser, ImportContext, Result};

const HEADER_INDICATORS: &[&str] = &[
    "DataDiscriminator",
    "T. Price",
    "C. Price",
    "Comm/Fee",
    "MTM P/L",
    "Realized P/L",
    "Asset Category",
    "Proceeds",
    "IBCommission",
    "TradePrice",
];
const CONTENT_INDICATORS: &[&str] = &["Trades,Header", "Trades,Data"];

const TRADES_SECTION: &str = "Trades";
const INSTRUMENT_SECTION: &str = "Financial Instrument Information";

const SYMBOL: &[&str] = &["Symbol", "UnderlyingSymbol"];
const TIME: &[&str] = &["Date/Time", "DateTime", "TradeDate", "Date"];
const QUANTITY: &[&str] = &["Quantity", "Qty"];
const PRICE: &[&str] = &["T. Price", "TradePrice", "Price"];
const COMMISSION: &[&str] = &["Comm/Fee", "IBCommission", "Commission"];

/// Column layout announced by a section's `Header` row.
#[derive(Debug, Clone)]
struct SectionHeader {
    cols: Vec<String>,
}

impl SectionHeader {
    fn new(cols: &[String]) -> Self {
        Self {
            cols: cols.iter().map(|c| c.trim().to_string()).collect(),
        }
    }

    fn row(&self, line: usize, cells: &[String]) -> RawRow {
        RawRow::new(line, &self.cols, cells)
    }
}

/// Interactive Brokers activity statements (section-tagged CSV where every
/// line starts with `Section,Header|Data|SubTotal|Total`) and flat Flex
/// query / trade log exports.
pub struct InteractiveBrokersParser {
    ctx: ImportContext,
}

impl InteractiveBrokersParser {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }

    fn is_statement(content: &str) -> bool {
        content.contains("Trades,Header")
    }

    fn parse_statement(&self, content: &str, session: &mut ParseSession<'_>) -> Result<()> {
        let mut headers: HashMap<String, SectionHeader> = HashMap::new();

        for rec in read_records(content)? {
            if rec.cells.len() < 2 {
                continue;
            }
            let section = rec.cells[0].trim();
            let row_kind = rec.cells[1].trim();
            let cols = &rec.cells[2..];

            if row_kind == "Header" {
                headers.insert(section.to_string(), SectionHeader::new(cols));
                continue;
            }
            if row_kind != "Data" {
                continue;
            }
            let Some(header) = headers.get(section) else { continue };
            let row = header.row(rec.line, cols);

            match section {
                TRADES_SECTION => {
                    session.row_seen();
                    // ClosedLot and Adjustment lines repeat the order's quantity.
                    if let Some(disc) = find_column_value(&row, &["DataDiscriminator"]) {
                        if !matches!(disc, "Order" | "Execution") {
                            session.skip_row();
                            continue;
                        }
                    }
                    self.add_trade_row(&row, session);
                }
                INSTRUMENT_SECTION => {
                    if let (Some(symbol), Some(multiplier)) = (
                        find_column_value(&row, &["Symbol"]),
                        find_column_value(&row, &["Multiplier"]).and_then(try_parse_number),
                    ) {
                        debug!("IB multiplier {} for {}", multiplier, symbol);
                        session.set_multiplier(symbol, multiplier);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_flat(&self, content: &str, session: &mut ParseSession<'_>) -> Result<()> {
        let table = read_table(content)?;
        for row in &table.rows {
            if is_total_row(row.fields.first().map(|(_, v)| v.as_str())) {
                continue;
            }
            session.row_seen();
            if let (Some(symbol), Some(multiplier)) = (
                find_column_value(row, SYMBOL),
                find_column_value(row, &["Multiplier"]).and_then(try_parse_number),
            ) {
                session.set_multiplier(symbol, multiplier);
            }
            self.add_trade_row(row, session);
        }
        Ok(())
    }

    fn add_trade_row(&self, row: &RawRow, session: &mut ParseSession<'_>) {
        let quantity = find_column_value(row, QUANTITY);
        let side_raw = find_column_value(row, &["Buy/Sell", "Side"]).unwrap_or("");
        // Statements carry no side column; the quantity is signed instead.
        let side = infer_side(side_raw).or_else(|| {
            quantity
                .and_then(try_parse_number)
                .filter(|q| *q != 0.0)
                .map(|q| if q > 0.0 { Side::Buy } else { Side::Sell })
        });

        session.add_fill(
            row.index,
            FillCells {
                time: find_column_value(row, TIME),
                symbol: find_column_value(row, SYMBOL),
                side,
                side_raw,
                quantity,
                price: find_column_value(row, PRICE),
                commission: find_column_value(row, COMMISSION),
            },
            self.ctx.settings.timezone,
        );
    }
}

impl BrokerParser for InteractiveBrokersParser {
    fn broker(&self) -> Broker {
        Broker::InteractiveBrokers
    }

    fn context(&self) -> &ImportContext {
        &self.ctx
    }

    fn detect(&self, content: &str, headers: &[String]) -> f64 {
        score_indicators(content, headers, HEADER_INDICATORS, CONTENT_INDICATORS)
    }

    fn parse(&self, content: &str) -> Result<ParseResult> {
        let mut session = ParseSession::new(Broker::InteractiveBrokers, &self.ctx);
        if Self::is_statement(content) {
            self.parse_statement(content, &mut session)?;
        } else {
            self.parse_flat(content, &mut session)?;
        }
        Ok(session.finish())
    }
}
