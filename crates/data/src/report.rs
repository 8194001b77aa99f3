use std::collections::{HashMap, HashSet};

use models::{Broker, Direction, Execution, ParseResult, ParseStats, ParsedTrade, Side, ValidationError};
use tracing::{debug, warn};
use utils::{find_duplicate_trades, normalize_instrument, try_parse_number, InstrumentMetadata, Tz};

use crate::fifo::FifoMatcher;
use crate::ImportContext;

/// Raw cells of one fill row, as pulled out by a platform parser.
#[derive(Debug, Clone, Default)]
pub struct FillCells<'r> {
    pub time: Option<&'r str>,
    pub symbol: Option<&'r str>,
    /// Side if the parser could tell; `None` applies the default-direction policy.
    pub side: Option<Side>,
    /// Whatever the side column said, for the warning message.
    pub side_raw: &'r str,
    pub quantity: Option<&'r str>,
    pub price: Option<&'r str>,
    pub commission: Option<&'r str>,
}

/// File-local multipliers (e.g. from a statement's instrument section)
/// layered over the configured provider.
struct LayeredMetadata<'a> {
    overrides: &'a HashMap<String, f64>,
    fallback: &'a dyn InstrumentMetadata,
}

impl InstrumentMetadata for LayeredMetadata<'_> {
    fn multiplier(&self, root: &str) -> Option<f64> {
        self.overrides
            .get(root)
            .copied()
            .or_else(|| self.fallback.multiplier(root))
    }
}

/// Collects rows, fills, trades and row-level issues while a file is parsed.
pub struct ParseSession<'a> {
    broker: Broker,
    ctx: &'a ImportContext,
    trades: Vec<ParsedTrade>,
    executions: Vec<Execution>,
    issues: Vec<ValidationError>,
    multiplier_overrides: HashMap<String, f64>,
    defaulted_roots: HashSet<String>,
    total_rows: usize,
    skipped_rows: usize,
}

impl<'a> ParseSession<'a> {
    pub fn new(broker: Broker, ctx: &'a ImportContext) -> Self {
        Self {
            broker,
            ctx,
            trades: Vec::new(),
            executions: Vec::new(),
            issues: Vec::new(),
            multiplier_overrides: HashMap::new(),
            defaulted_roots: HashSet::new(),
            total_rows: 0,
            skipped_rows: 0,
        }
    }

    pub fn row_seen(&mut self) {
        self.total_rows += 1;
    }

    pub fn skip_row(&mut self) {
        self.skipped_rows += 1;
    }

    pub fn issue(&mut self, issue: ValidationError) {
        self.issues.push(issue);
    }

    /// Records an error for the row and counts it as skipped.
    pub fn reject_row(&mut self, issue: ValidationError) {
        self.issues.push(issue);
        self.skipped_rows += 1;
    }

    pub fn push_trade(&mut self, trade: ParsedTrade) {
        self.trades.push(trade);
    }

    pub fn set_multiplier(&mut self, root: &str, multiplier: f64) {
        if multiplier.is_finite() && multiplier > 0.0 {
            self.multiplier_overrides.insert(normalize_instrument(root), multiplier);
        }
    }

    /// Multiplier for a root symbol, with file-local values first. Warns once
    /// per root when the default is used.
    pub fn multiplier(&mut self, row: usize, root: &str) -> f64 {
        let layered = LayeredMetadata {
            overrides: &self.multiplier_overrides,
            fallback: self.ctx.instruments.as_ref(),
        };
        match layered.multiplier(root) {
            Some(m) => m,
            None => {
                if self.ctx.settings.warn_on_default_multiplier && self.defaulted_roots.insert(root.to_string()) {
                    self.issues.push(ValidationError::warning(
                        row,
                        "instrument",
                        root,
                        format!("No contract multiplier known for {}; P&L is computed in raw price points", root),
                    ));
                }
                utils::DEFAULT_MULTIPLIER
            }
        }
    }

    /// Resolves a direction cell, falling back to the configured default with a warning.
    pub fn resolve_direction(&mut self, row: usize, raw: Option<&str>) -> Direction {
        let raw = raw.unwrap_or("");
        match utils::infer_direction(raw) {
            Some(d) => d,
            None => self.default_direction(row, raw),
        }
    }

    fn default_direction(&mut self, row: usize, raw: &str) -> Direction {
        let fallback = self.ctx.settings.default_direction;
        warn!(
            "{} row {}: side '{}' not recognised, assuming {}",
            self.broker, row, raw, fallback
        );
        self.issues.push(
            ValidationError::warning(
                row,
                "direction",
                raw,
                format!("Could not determine direction; assumed {}", fallback),
            )
            .with_suggestion("Check the side column; systematic defaults can flip P&L signs"),
        );
        fallback
    }

    /// Validates a fill row and queues it for FIFO matching. Returns whether
    /// the row produced a fill.
    pub fn add_fill(&mut self, row: usize, cells: FillCells<'_>, zone: Tz) -> bool {
        let Some(symbol) = cells.symbol.map(str::trim).filter(|s| !s.is_empty()) else {
            self.reject_row(ValidationError::error(row, "instrument", "", "Missing symbol"));
            return false;
        };

        let time_raw = cells.time.unwrap_or("");
        let Some(timestamp) = utils::parse_date(time_raw, zone) else {
            self.reject_row(
                ValidationError::error(row, "date", time_raw, "Fill time could not be parsed")
                    .with_suggestion("Fills without a time cannot be ordered for FIFO matching"),
            );
            return false;
        };

        let quantity = cells.quantity.and_then(try_parse_number).map(f64::abs).unwrap_or(0.0);
        if quantity <= 0.0 {
            self.issue(ValidationError::warning(
                row,
                "quantity",
                cells.quantity.unwrap_or(""),
                "Row has no filled quantity; skipped",
            ));
            self.skip_row();
            return false;
        }

        let price = cells.price.and_then(try_parse_number).unwrap_or(0.0);
        if price <= 0.0 {
            self.issue(ValidationError::warning(
                row,
                "price",
                cells.price.unwrap_or(""),
                "Row has no fill price; skipped",
            ));
            self.skip_row();
            return false;
        }

        let side = match cells.side {
            Some(s) => s,
            None => Side::from(self.default_direction(row, cells.side_raw)),
        };
        let commission = cells.commission.and_then(try_parse_number).map(f64::abs).unwrap_or(0.0);

        self.executions.push(Execution {
            timestamp,
            instrument: normalize_instrument(symbol),
            raw_symbol: symbol.to_string(),
            side,
            price,
            quantity,
            commission,
            source_row: row,
        });
        true
    }

    /// Runs FIFO matching over the collected fills and assembles the result.
    pub fn finish(self) -> ParseResult {
        let Self {
            broker,
            ctx,
            mut trades,
            executions,
            mut issues,
            multiplier_overrides,
            total_rows,
            skipped_rows,
            ..
        } = self;

        if !executions.is_empty() {
            let layered = LayeredMetadata {
                overrides: &multiplier_overrides,
                fallback: ctx.instruments.as_ref(),
            };
            let outcome = FifoMatcher::new(&layered, broker.display_name())
                .warn_on_default_multiplier(ctx.settings.warn_on_default_multiplier)
                .match_executions(executions);
            debug!(
                "{}: FIFO produced {} trades, {} open positions",
                broker,
                outcome.trades.len(),
                outcome.open_positions.len()
            );
            trades.extend(outcome.trades);
            issues.extend(outcome.warnings);
        }

        let duplicates = find_duplicate_trades(&trades);
        for dup in &duplicates {
            let trade = &trades[dup.index];
            let first = &trades[dup.first_index];
            issues.push(ValidationError::warning(
                trade.source_row,
                "trade",
                trade.instrument.clone(),
                format!("Possible duplicate of the trade from row {}", first.source_row),
            ));
        }

        let (errors, warnings): (Vec<_>, Vec<_>) = issues.into_iter().partition(|i| i.is_error());
        let mut result = ParseResult {
            success: true,
            broker,
            trades,
            errors,
            warnings,
            stats: ParseStats {
                total_rows,
                valid_trades: 0,
                skipped_rows,
                duplicates: duplicates.len(),
            },
        };
        refresh_stats(&mut result);
        result
    }
}

/// Adds validation output to a parse result and recomputes `success`/stats.
pub fn attach_validation(result: &mut ParseResult, issues: Vec<ValidationError>) {
    for issue in issues {
        if issue.is_error() {
            result.errors.push(issue);
        } else {
            result.warnings.push(issue);
        }
    }
    refresh_stats(result);
}

pub fn refresh_stats(result: &mut ParseResult) {
    let error_rows: HashSet<usize> = result.rows_with_errors().into_iter().collect();
    result.success = error_rows.is_empty();
    result.stats.valid_trades = result
        .trades
        .iter()
        .filter(|t| !error_rows.contains(&t.source_row))
        .count();
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{ImportSettings, Severity};

    fn cells<'r>(time: &'r str, symbol: &'r str, side: Option<Side>, qty: &'r str, price: &'r str) -> FillCells<'r> {
        FillCells {
            time: Some(time),
            symbol: Some(symbol),
            side,
            side_raw: "",
            quantity: Some(qty),
            price: Some(price),
            commission: None,
        }
    }

    #[test]
    fn test_add_fill_rejects_and_skips() {
        let ctx = ImportContext::default();
        let mut s = ParseSession::new(Broker::Tradovate, &ctx);
        assert!(!s.add_fill(2, cells("garbage", "ESH4", Some(Side::Buy), "1", "100"), Tz::UTC));
        assert!(!s.add_fill(3, cells("2024-01-02 10:00:00", "", Some(Side::Buy), "1", "100"), Tz::UTC));
        assert!(!s.add_fill(4, cells("2024-01-02 10:00:00", "ESH4", Some(Side::Buy), "0", "100"), Tz::UTC));
        assert!(!s.add_fill(5, cells("2024-01-02 10:00:00", "ESH4", Some(Side::Buy), "1", ""), Tz::UTC));
        let r = s.finish();
        assert_eq!(r.stats.skipped_rows, 4);
        assert_eq!(r.errors.len(), 2);
        assert_eq!(r.warnings.len(), 2);
        assert!(!r.success);
    }

    #[test]
    fn test_default_direction_policy_is_applied_and_flagged() {
        let ctx = ImportContext::new(ImportSettings {
            default_direction: Direction::Short,
            ..ImportSettings::default()
        });
        let mut s = ParseSession::new(Broker::Generic, &ctx);
        assert_eq!(s.resolve_direction(9, Some("???")), Direction::Short);
        assert_eq!(s.resolve_direction(10, Some("Buy")), Direction::Long);
        let r = s.finish();
        assert_eq!(r.warnings.len(), 1);
        assert_eq!(r.warnings[0].field, "direction");
        assert_eq!(r.warnings[0].severity, Severity::Warning);
        assert!(r.success);
    }

    #[test]
    fn test_finish_matches_fills_and_counts_duplicates() {
        let ctx = ImportContext::default();
        let mut s = ParseSession::new(Broker::Rithmic, &ctx);
        for _ in 0..2 {
            s.row_seen();
        }
        assert!(s.add_fill(2, cells("2024-01-02 10:00:00", "ESH4", Some(Side::Buy), "1", "100"), Tz::UTC));
        assert!(s.add_fill(3, cells("2024-01-02 10:05:00", "ESH4", Some(Side::Sell), "1", "102"), Tz::UTC));
        let r = s.finish();
        assert_eq!(r.trades.len(), 1);
        assert_eq!(r.trades[0].pnl, 100.0);
        assert!(r.trades[0].notes.starts_with("Imported from Rithmic"));
        assert_eq!(r.stats.total_rows, 2);
        assert_eq!(r.stats.valid_trades, 1);
        assert_eq!(r.stats.duplicates, 0);
    }

    #[test]
    fn test_file_local_multiplier_wins() {
        let ctx = ImportContext::default();
        let mut s = ParseSession::new(Broker::InteractiveBrokers, &ctx);
        s.set_multiplier("XYZ", 10.0);
        assert_eq!(s.multiplier(1, "XYZ"), 10.0);
        assert_eq!(s.multiplier(1, "ES"), 50.0);
        assert_eq!(s.multiplier(1, "QQQ"), 1.0);
        assert_eq!(s.multiplier(2, "QQQ"), 1.0);
        let r = s.finish();
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn test_attach_validation_flips_success() {
        let ctx = ImportContext::default();
        let mut s = ParseSession::new(Broker::Generic, &ctx);
        assert!(s.add_fill(2, cells("2024-01-02 10:00:00", "ES", Some(Side::Buy), "1", "100"), Tz::UTC));
        assert!(s.add_fill(3, cells("2024-01-02 10:05:00", "ES", Some(Side::Sell), "1", "101"), Tz::UTC));
        let mut r = s.finish();
        assert!(r.success);
        attach_validation(&mut r, vec![ValidationError::error(2, "size", "0", "bad")]);
        assert!(!r.success);
        assert_eq!(r.stats.valid_trades, 0);
    }
}
