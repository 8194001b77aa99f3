pub mod convert;
pub mod csv_text;
pub mod detection;
pub mod fifo;
pub mod importers;
pub mod registry;
pub mod report;
pub mod validation;

use std::str::FromStr;
use std::sync::Arc;

use models::{Broker, ImportSettings, ParseResult, ParsedTrade, TradeInputRecord, ValidationError};
use thiserror::Error;
use utils::{ContractTable, InstrumentMetadata};

pub use registry::Registry;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("no header row found; the file appears to be empty")]
    EmptyInput,
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// Shared, read-only state every parser is built with.
#[derive(Clone)]
pub struct ImportContext {
    pub settings: ImportSettings,
    pub instruments: Arc<dyn InstrumentMetadata>,
}

impl ImportContext {
    pub fn new(settings: ImportSettings) -> Self {
        let instruments = Arc::new(ContractTable::with_overrides(&settings.contract_multipliers));
        Self { settings, instruments }
    }

    /// Replaces the built-in contract table with another metadata source.
    pub fn with_instruments(mut self, instruments: Arc<dyn InstrumentMetadata>) -> Self {
        self.instruments = instruments;
        self
    }
}

impl Default for ImportContext {
    fn default() -> Self {
        Self::new(ImportSettings::default())
    }
}

/// One platform's detector and parser.
pub trait BrokerParser: Send + Sync {
    fn broker(&self) -> Broker;

    fn context(&self) -> &ImportContext;

    /// Confidence in [0, 1] that `content` is this platform's export.
    fn detect(&self, content: &str, headers: &[String]) -> f64;

    /// Extracts trades. Row problems are collected in the result; only
    /// whole-file failures come back as `Err`.
    fn parse(&self, content: &str) -> Result<ParseResult>;

    fn validate(&self, trades: &[ParsedTrade]) -> Vec<ValidationError> {
        validation::validate_trades(trades)
    }

    fn convert_to_trade_input(&self, trade: &ParsedTrade, account_id: Option<&str>) -> TradeInputRecord {
        convert::to_trade_input(trade, self.broker(), account_id, self.context().settings.timezone)
    }
}

/// Which parser `parse_csv` should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokerSelection {
    #[default]
    Auto,
    Broker(Broker),
}

impl FromStr for BrokerSelection {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(BrokerSelection::Auto);
        }
        Broker::from_id(s)
            .map(BrokerSelection::Broker)
            .ok_or_else(|| ImportError::UnsupportedSource(s.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub broker: BrokerSelection,
    pub account_id: Option<String>,
    /// Skip the baseline trade validation; every parsed trade is then convertible.
    pub skip_validation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_selection_from_str() {
        assert_eq!("auto".parse::<BrokerSelection>().unwrap(), BrokerSelection::Auto);
        assert_eq!(
            "ninjatrader".parse::<BrokerSelection>().unwrap(),
            BrokerSelection::Broker(Broker::NinjaTrader)
        );
        let err = "etrade".parse::<BrokerSelection>().unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedSource(s) if s == "etrade"));
    }
}
