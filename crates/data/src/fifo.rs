//! FIFO reconstruction of round-trip trades from raw fills.
//!
//! Fills are grouped by root symbol, ordered by `(timestamp, source_row)` and
//! matched against a per-instrument queue of open lots. A trade is emitted
//! each time the queue returns to flat; a position still open at the end of
//! the file produces a warning and no trade.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use models::{Direction, Execution, ParsedTrade, Side, ValidationError};
use tracing::{debug, warn};
use utils::{resolve_multiplier, InstrumentMetadata};

const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct OpenLot {
    side: Side,
    price: f64,
    quantity_remaining: f64,
}

/// Running totals for the position cycle currently open on one instrument.
#[derive(Debug, Clone)]
struct CycleAggregate {
    direction: Direction,
    entry_time: DateTime<Utc>,
    exit_time: DateTime<Utc>,
    total_qty: f64,
    entry_notional: f64,
    exit_notional: f64,
    pnl: f64,
    match_count: usize,
    commission: f64,
    symbols: BTreeSet<String>,
    first_row: usize,
}

impl CycleAggregate {
    fn start(exec: &Execution) -> Self {
        Self {
            direction: exec.side.opening_direction(),
            entry_time: exec.timestamp,
            exit_time: exec.timestamp,
            total_qty: 0.0,
            entry_notional: 0.0,
            exit_notional: 0.0,
            pnl: 0.0,
            match_count: 0,
            commission: 0.0,
            symbols: BTreeSet::new(),
            first_row: exec.source_row,
        }
    }

    fn add_fill_share(&mut self, exec: &Execution, qty: f64) {
        if exec.quantity > 0.0 {
            self.commission += exec.commission * qty / exec.quantity;
        }
        if !exec.raw_symbol.is_empty() {
            self.symbols.insert(exec.raw_symbol.clone());
        }
    }
}

/// A position the file never closed.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub instrument: String,
    pub side: Side,
    pub quantity: f64,
    pub first_row: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FifoOutcome {
    pub trades: Vec<ParsedTrade>,
    pub open_positions: Vec<OpenPosition>,
    pub warnings: Vec<ValidationError>,
}

/// Matches fills into trades, pricing P&L with a contract multiplier source
/// and tagging each trade with the platform it came from.
pub struct FifoMatcher<'a> {
    instruments: &'a dyn InstrumentMetadata,
    source: &'a str,
    warn_on_default_multiplier: bool,
}

impl<'a> FifoMatcher<'a> {
    pub fn new(instruments: &'a dyn InstrumentMetadata, source: &'a str) -> Self {
        Self {
            instruments,
            source,
            warn_on_default_multiplier: true,
        }
    }

    pub fn warn_on_default_multiplier(mut self, enabled: bool) -> Self {
        self.warn_on_default_multiplier = enabled;
        self
    }

    pub fn match_executions(&self, executions: Vec<Execution>) -> FifoOutcome {
        let mut by_instrument: BTreeMap<String, Vec<Execution>> = BTreeMap::new();
        for exec in executions {
            by_instrument.entry(exec.instrument.clone()).or_default().push(exec);
        }

        let mut outcome = FifoOutcome::default();
        for (instrument, execs) in by_instrument {
            debug!("FIFO matching {} fills for {}", execs.len(), instrument);
            self.match_instrument(&instrument, execs, &mut outcome);
        }

        outcome
            .trades
            .sort_by(|a, b| a.date.cmp(&b.date).then(a.source_row.cmp(&b.source_row)));
        outcome
    }

    fn match_instrument(&self, instrument: &str, mut execs: Vec<Execution>, outcome: &mut FifoOutcome) {
        execs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.source_row.cmp(&b.source_row)));

        let multiplier = resolve_multiplier(self.instruments, instrument);
        if multiplier.defaulted && self.warn_on_default_multiplier {
            if let Some(first) = execs.first() {
                warn!("No contract multiplier for {}; P&L stays in price points", instrument);
                outcome.warnings.push(
                    ValidationError::warning(
                        first.source_row,
                        "instrument",
                        instrument,
                        format!("No contract multiplier known for {}; P&L is computed in raw price points", instrument),
                    )
                    .with_suggestion("Add the symbol to contract_multipliers in settings.json"),
                );
            }
        }

        let mut queue: VecDeque<OpenLot> = VecDeque::new();
        let mut cycle: Option<CycleAggregate> = None;

        for exec in &execs {
            let mut remaining = exec.quantity;

            while remaining > QTY_EPSILON {
                let opens = queue.front().map_or(true, |lot| lot.side == exec.side);
                if opens {
                    let c = cycle.get_or_insert_with(|| CycleAggregate::start(exec));
                    c.add_fill_share(exec, remaining);
                    queue.push_back(OpenLot {
                        side: exec.side,
                        price: exec.price,
                        quantity_remaining: remaining,
                    });
                    remaining = 0.0;
                    continue;
                }

                let Some(lot) = queue.front_mut() else { break };
                let matched = remaining.min(lot.quantity_remaining);
                let delta = match lot.side {
                    Side::Buy => exec.price - lot.price,
                    Side::Sell => lot.price - exec.price,
                };

                if let Some(c) = cycle.as_mut() {
                    c.total_qty += matched;
                    c.entry_notional += lot.price * matched;
                    c.exit_notional += exec.price * matched;
                    c.pnl += delta * matched * multiplier.value;
                    c.exit_time = exec.timestamp;
                    c.match_count += 1;
                    c.add_fill_share(exec, matched);
                }

                lot.quantity_remaining -= matched;
                remaining -= matched;
                if lot.quantity_remaining <= QTY_EPSILON {
                    queue.pop_front();
                }

                // Flat: close out the cycle. Any remainder opens a fresh one on the next pass.
                if queue.is_empty() {
                    if let Some(done) = cycle.take() {
                        outcome.trades.push(self.finalize(instrument, done));
                    }
                }
            }
        }

        if let Some(front) = queue.front() {
            let quantity: f64 = queue.iter().map(|l| l.quantity_remaining).sum();
            let first_row = cycle.as_ref().map_or(0, |c| c.first_row);
            let direction = front.side.opening_direction();
            warn!("{} {} position of {} never closed; no trade emitted", instrument, direction, quantity);
            outcome.warnings.push(
                ValidationError::warning(
                    first_row,
                    "quantity",
                    format!("{}", quantity),
                    format!(
                        "Open {} position in {} of {} left unmatched at end of file; no trade created",
                        direction, instrument, quantity
                    ),
                )
                .with_suggestion("Export a date range that includes the closing fills"),
            );
            outcome.open_positions.push(OpenPosition {
                instrument: instrument.to_string(),
                side: front.side,
                quantity,
                first_row,
            });
        }
    }

    fn finalize(&self, instrument: &str, c: CycleAggregate) -> ParsedTrade {
        let held = (c.exit_time - c.entry_time).to_std().unwrap_or(Duration::ZERO);
        let symbols: Vec<&str> = c.symbols.iter().map(|s| s.as_str()).collect();
        let mut notes = format!(
            "Imported from {} (FIFO: {} matches, held {}",
            self.source,
            c.match_count,
            humantime::format_duration(held)
        );
        if !symbols.is_empty() {
            notes.push_str(&format!(", contracts {}", symbols.join(", ")));
        }
        notes.push(')');

        ParsedTrade {
            date: Some(c.entry_time),
            exit_date: Some(c.exit_time),
            instrument: instrument.to_string(),
            direction: c.direction,
            entry_price: c.entry_notional / c.total_qty,
            exit_price: c.exit_notional / c.total_qty,
            size: c.total_qty,
            pnl: c.pnl,
            stop_loss: None,
            take_profit: None,
            commission: (c.commission.abs() > QTY_EPSILON).then_some(c.commission),
            notes,
            setup_name: None,
            source_row: c.first_row,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use utils::ContractTable;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn exec(row: usize, t: i64, side: Side, qty: f64, price: f64) -> Execution {
        exec_on("ES", row, t, side, qty, price)
    }

    fn exec_on(instrument: &str, row: usize, t: i64, side: Side, qty: f64, price: f64) -> Execution {
        Execution {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap() + chrono::Duration::seconds(t),
            instrument: instrument.to_string(),
            raw_symbol: format!("{}H4", instrument),
            side,
            price,
            quantity: qty,
            commission: 0.0,
            source_row: row,
        }
    }

    fn run(execs: Vec<Execution>) -> FifoOutcome {
        let table = ContractTable::new();
        FifoMatcher::new(&table, "Test").match_executions(execs)
    }

    #[test]
    fn test_single_round_trip() {
        let out = run(vec![exec(1, 0, Side::Buy, 2.0, 100.0), exec(2, 1, Side::Sell, 2.0, 110.0)]);
        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!(t.direction, Direction::Long);
        assert!(approx(t.entry_price, 100.0));
        assert!(approx(t.exit_price, 110.0));
        assert!(approx(t.size, 2.0));
        assert!(approx(t.pnl, 1000.0));
        assert_eq!(t.source_row, 1);
        assert!(out.warnings.is_empty());
        assert!(t.notes.contains("Imported from Test"));
    }

    #[test]
    fn test_partial_close_emits_one_trade() {
        let out = run(vec![
            exec(1, 0, Side::Buy, 3.0, 100.0),
            exec(2, 1, Side::Sell, 1.0, 105.0),
            exec(3, 2, Side::Sell, 2.0, 110.0),
        ]);
        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert!(approx(t.size, 3.0));
        assert!(approx(t.entry_price, 100.0));
        assert!(approx(t.exit_price, (105.0 + 220.0) / 3.0));
        assert!(approx(t.pnl, 1250.0));
        assert_eq!(t.exit_date, Some(exec(3, 2, Side::Sell, 2.0, 110.0).timestamp));
    }

    #[test]
    fn test_flip_leaves_dangling_short() {
        let out = run(vec![exec(1, 0, Side::Buy, 2.0, 100.0), exec(2, 1, Side::Sell, 3.0, 105.0)]);
        assert_eq!(out.trades.len(), 1);
        assert!(approx(out.trades[0].size, 2.0));
        assert!(approx(out.trades[0].pnl, 500.0));
        assert_eq!(out.open_positions.len(), 1);
        assert_eq!(out.open_positions[0].side, Side::Sell);
        assert!(approx(out.open_positions[0].quantity, 1.0));
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].field, "quantity");
        assert_eq!(out.warnings[0].row, 2);
    }

    #[test]
    fn test_flip_then_close_gives_two_trades() {
        let out = run(vec![
            exec(1, 0, Side::Buy, 2.0, 100.0),
            exec(2, 1, Side::Sell, 3.0, 105.0),
            exec(3, 2, Side::Buy, 1.0, 101.0),
        ]);
        assert_eq!(out.trades.len(), 2);
        let short = &out.trades[1];
        assert_eq!(short.direction, Direction::Short);
        assert!(approx(short.size, 1.0));
        assert!(approx(short.pnl, 4.0 * 50.0));
        assert_eq!(short.source_row, 2);
        assert!(out.open_positions.is_empty());
    }

    #[test]
    fn test_short_scale_in() {
        let out = run(vec![
            exec(1, 0, Side::Sell, 1.0, 100.0),
            exec(2, 1, Side::Sell, 1.0, 102.0),
            exec(3, 2, Side::Buy, 2.0, 98.0),
        ]);
        let t = &out.trades[0];
        assert_eq!(t.direction, Direction::Short);
        assert!(approx(t.entry_price, 101.0));
        assert!(approx(t.pnl, (2.0 + 4.0) * 50.0));
        assert_eq!(t.notes.matches("matches").count(), 1);
    }

    #[test]
    fn test_quantity_is_conserved() {
        let execs = vec![
            exec(1, 0, Side::Buy, 3.0, 100.0),
            exec(2, 1, Side::Sell, 1.0, 101.0),
            exec(3, 2, Side::Sell, 4.0, 99.0),
            exec(4, 3, Side::Buy, 2.0, 98.0),
            exec(5, 4, Side::Sell, 2.5, 97.0),
            exec_on("NQ", 6, 0, Side::Buy, 1.0, 17000.0),
        ];
        let input: f64 = execs.iter().map(|e| e.quantity).sum();
        let out = run(execs);
        let matched: f64 = out.trades.iter().map(|t| t.size).sum();
        let open: f64 = out.open_positions.iter().map(|p| p.quantity).sum();
        // every matched unit consumed one opening and one closing unit
        assert!(approx(2.0 * matched + open, input));
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let execs = vec![
            exec(1, 0, Side::Buy, 1.0, 100.0),
            exec(2, 0, Side::Buy, 1.0, 101.0),
            exec(3, 5, Side::Sell, 1.0, 104.0),
            exec(4, 5, Side::Sell, 1.0, 103.0),
            exec(5, 9, Side::Sell, 1.0, 90.0),
            exec(6, 12, Side::Buy, 1.0, 91.0),
        ];
        let expected = run(execs.clone()).trades;

        let mut reversed = execs.clone();
        reversed.reverse();
        assert_eq!(run(reversed).trades, expected);

        let mut rotated = execs;
        rotated.rotate_left(3);
        assert_eq!(run(rotated).trades, expected);
    }

    #[test]
    fn test_unknown_multiplier_warns_and_uses_points() {
        let out = run(vec![
            exec_on("XYZ", 1, 0, Side::Buy, 10.0, 5.0),
            exec_on("XYZ", 2, 1, Side::Sell, 10.0, 6.0),
        ]);
        assert!(approx(out.trades[0].pnl, 10.0));
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].field, "instrument");

        let table = ContractTable::new();
        let quiet = FifoMatcher::new(&table, "Test")
            .warn_on_default_multiplier(false)
            .match_executions(vec![exec_on("XYZ", 1, 0, Side::Buy, 1.0, 5.0)]);
        assert_eq!(quiet.warnings.len(), 1, "only the open-position warning");
    }

    #[test]
    fn test_commission_is_prorated_across_cycles() {
        let mut open = exec(1, 0, Side::Buy, 2.0, 100.0);
        open.commission = 4.0;
        let mut flip = exec(2, 1, Side::Sell, 4.0, 101.0);
        flip.commission = 8.0;
        let mut close = exec(3, 2, Side::Buy, 2.0, 100.0);
        close.commission = 4.0;

        let out = run(vec![open, flip, close]);
        assert_eq!(out.trades.len(), 2);
        assert!(approx(out.trades[0].commission.unwrap(), 8.0));
        assert!(approx(out.trades[1].commission.unwrap(), 8.0));
    }
}
