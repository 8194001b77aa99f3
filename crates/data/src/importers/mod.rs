//! Platform parsers. Each one owns its detector indicators and the header
//! spellings its exports have used over time.

pub mod generic;
pub mod interactive_brokers;
pub mod ninjatrader;
pub mod rithmic;
pub mod thinkorswim;
pub mod tradingview;
pub mod tradovate;

pub use generic::GenericParser;
pub use interactive_brokers::InteractiveBrokersParser;
pub use ninjatrader::NinjaTraderParser;
pub use rithmic::RithmicParser;
pub use thinkorswim::ThinkorswimParser;
pub use tradingview::TradingViewParser;
pub use tradovate::TradovateParser;

use crate::detection::{confidence_from_matches, count_content_indicators, count_header_indicators};
use crate::{BrokerParser, ImportContext};

/// Every built-in parser, generic last.
pub fn default_parsers(ctx: &ImportContext) -> Vec<Box<dyn BrokerParser>> {
    vec![
        Box::new(TradovateParser::new(ctx.clone())),
        Box::new(ThinkorswimParser::new(ctx.clone())),
        Box::new(TradingViewParser::new(ctx.clone())),
        Box::new(InteractiveBrokersParser::new(ctx.clone())),
        Box::new(RithmicParser::new(ctx.clone())),
        Box::new(NinjaTraderParser::new(ctx.clone())),
        Box::new(GenericParser::new(ctx.clone())),
    ]
}

pub(crate) fn score_indicators(content: &str, headers: &[String], header_ind: &[&str], content_ind: &[&str]) -> f64 {
    let matches = count_header_indicators(headers, header_ind) + count_content_indicators(content, content_ind);
    confidence_from_matches(matches)
}

/// True when the status cell names a state that never produced a fill.
pub(crate) fn is_unfilled_status(status: Option<&str>, unfilled: &[&str]) -> bool {
    let Some(status) = status else { return false };
    let s = status.trim().to_lowercase();
    unfilled.iter().any(|u| s.contains(u))
}

/// Summary rows some exports interleave with data.
pub(crate) fn is_total_row(cell: Option<&str>) -> bool {
    cell.map(|c| c.trim().to_lowercase())
        .is_some_and(|c| c == "total" || c == "subtotal" || c.starts_with("total "))
}
