use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// Brokers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Broker {
	#[serde(rename = "tradovate")]
	Tradovate,
	#[serde(rename = "thinkorswim")]
	Thinkorswim,
	#[serde(rename = "tradingview")]
	TradingView,
	#[serde(rename = "interactive-brokers")]
	InteractiveBrokers,
	#[serde(rename = "rithmic")]
	Rithmic,
	#[serde(rename = "ninjatrader")]
	NinjaTrader,
	#[serde(rename = "generic")]
	Generic,
}

impl Broker {
	pub const ALL: [Broker; 7] = [
		Broker::Tradovate,
		Broker::Thinkorswim,
		Broker::TradingView,
		Broker::InteractiveBrokers,
		Broker::Rithmic,
		Broker::NinjaTrader,
		Broker::Generic,
	];

	pub fn id(&self) -> &'static str {
		match self {
			Broker::Tradovate => "tradovate",
			Broker::Thinkorswim => "thinkorswim",
			Broker::TradingView => "tradingview",
			Broker::InteractiveBrokers => "interactive-brokers",
			Broker::Rithmic => "rithmic",
			Broker::NinjaTrader => "ninjatrader",
			Broker::Generic => "generic",
		}
	}

	pub fn display_name(&self) -> &'static str {
		match self {
			Broker::Tradovate => "Tradovate",
			Broker::Thinkorswim => "thinkorswim",
			Broker::TradingView => "TradingView",
			Broker::InteractiveBrokers => "Interactive Brokers",
			Broker::Rithmic => "Rithmic",
			Broker::NinjaTrader => "NinjaTrader",
			Broker::Generic => "Generic CSV",
		}
	}

	/// Looks a broker up by its id, case-insensitively. `"ibkr"` is accepted as an alias.
	pub fn from_id(id: &str) -> Option<Broker> {
		let id = id.trim().to_lowercase();
		if id == "ibkr" {
			return Some(Broker::InteractiveBrokers);
		}
		Broker::ALL.into_iter().find(|b| b.id() == id)
	}
}

impl fmt::Display for Broker {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.id())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerInfo {
	pub id: String,
	pub display_name: String,
}

// Trade direction and fill side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
	#[default]
	Long,
	Short,
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Direction::Long => f.write_str("long"),
			Direction::Short => f.write_str("short"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
	Buy,
	Sell,
}

impl Side {
	/// Direction of a position opened by a fill on this side.
	pub fn opening_direction(self) -> Direction {
		match self {
			Side::Buy => Direction::Long,
			Side::Sell => Direction::Short,
		}
	}
}

impl From<Direction> for Side {
	fn from(direction: Direction) -> Self {
		match direction {
			Direction::Long => Side::Buy,
			Direction::Short => Side::Sell,
		}
	}
}

impl fmt::Display for Side {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Side::Buy => f.write_str("buy"),
			Side::Sell => f.write_str("sell"),
		}
	}
}

/// A single fill, as extracted from an order or execution log.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
	pub timestamp: DateTime<Utc>,
	/// Root symbol used to net fills across contract rolls.
	pub instrument: String,
	/// Symbol exactly as the platform printed it.
	pub raw_symbol: String,
	pub side: Side,
	pub price: f64,
	pub quantity: f64,
	pub commission: f64,
	pub source_row: usize,
}

/// One completed round trip, before conversion to the storage shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTrade {
	pub date: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exit_date: Option<DateTime<Utc>>,
	pub instrument: String,
	pub direction: Direction,
	pub entry_price: f64,
	pub exit_price: f64,
	pub size: f64,
	pub pnl: f64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop_loss: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub take_profit: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub commission: Option<f64>,
	#[serde(default)]
	pub notes: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub setup_name: Option<String>,
	/// Row the trade was built from; for FIFO trades the row of the opening fill.
	pub source_row: usize,
}

// Validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	Error,
	Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
	pub row: usize,
	pub field: String,
	pub value: String,
	pub message: String,
	pub severity: Severity,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub suggestion: Option<String>,
}

impl ValidationError {
	pub fn error(row: usize, field: &str, value: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			row,
			field: field.to_string(),
			value: value.into(),
			message: message.into(),
			severity: Severity::Error,
			suggestion: None,
		}
	}

	pub fn warning(row: usize, field: &str, value: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			severity: Severity::Warning,
			..Self::error(row, field, value, message)
		}
	}

	pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
		self.suggestion = Some(suggestion.into());
		self
	}

	pub fn is_error(&self) -> bool {
		self.severity == Severity::Error
	}
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "row {}: {} ({})", self.row, self.message, self.field)?;
		if let Some(s) = &self.suggestion {
			write!(f, " - {}", s)?;
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
	pub total_rows: usize,
	pub valid_trades: usize,
	pub skipped_rows: usize,
	pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
	pub success: bool,
	pub broker: Broker,
	pub trades: Vec<ParsedTrade>,
	pub errors: Vec<ValidationError>,
	pub warnings: Vec<ValidationError>,
	pub stats: ParseStats,
}

impl ParseResult {
	/// Rows that carry at least one error-severity entry.
	pub fn rows_with_errors(&self) -> Vec<usize> {
		let mut rows: Vec<usize> = self.errors.iter().filter(|e| e.is_error()).map(|e| e.row).collect();
		rows.sort_unstable();
		rows.dedup();
		rows
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionResult {
	pub broker: Broker,
	pub confidence: f64,
	pub reason: String,
}

// Output models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
	Win,
	Loss,
	Breakeven,
}

impl Outcome {
	pub fn from_pnl(pnl: f64) -> Self {
		if pnl > 0.0 {
			Outcome::Win
		} else if pnl < 0.0 {
			Outcome::Loss
		} else {
			Outcome::Breakeven
		}
	}
}

/// Record handed to the trade store for bulk insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeInputRecord {
	pub date: String,
	pub instrument: String,
	pub direction: Direction,
	pub entry_price: f64,
	pub exit_price: f64,
	pub stop_loss: f64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub take_profit: Option<f64>,
	pub size: f64,
	pub pnl: f64,
	pub outcome: Outcome,
	pub notes: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub setup_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub account_id: Option<String>,
}

// Settings models
fn default_true() -> bool {
	true
}

fn default_timezone() -> Tz {
	Tz::UTC
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportSettings {
	/// Direction assumed when a row's side cannot be inferred.
	#[serde(default)]
	pub default_direction: Direction,
	/// Root symbol -> dollars per point, layered over the built-in table.
	#[serde(default)]
	pub contract_multipliers: HashMap<String, f64>,
	#[serde(default = "default_true")]
	pub warn_on_default_multiplier: bool,
	#[serde(default)]
	pub account_id: Option<String>,
	/// IANA zone for timestamps that carry no offset, on platforms that
	/// export exchange or desk time. Trade dates are reported in it too.
	#[serde(default = "default_timezone")]
	pub timezone: Tz,
}

impl Default for ImportSettings {
	fn default() -> Self {
		Self {
			default_direction: Direction::Long,
			contract_multipliers: HashMap::new(),
			warn_on_default_multiplier: true,
			account_id: None,
			timezone: Tz::UTC,
		}
	}
}
