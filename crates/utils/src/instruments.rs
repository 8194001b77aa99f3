use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Multiplier used when nothing is known about an instrument; P&L then stays in price points.
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

static CONTINUOUS_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+!$").expect("continuous suffix regex"));
static DASHED_EXPIRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+\d{1,2}-\d{2,4}$").expect("dashed expiry regex"));
static MONTH_CODE_EXPIRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z0-9]+?)[FGHJKMNQUVXZ](?:\d{1,2}|\d{4})$").expect("month code regex")
});

/// Dollars per full point, per root symbol.
const CONTRACT_MULTIPLIERS: &[(&str, f64)] = &[
    // equity index
    ("ES", 50.0),
    ("MES", 5.0),
    ("NQ", 20.0),
    ("MNQ", 2.0),
    ("YM", 5.0),
    ("MYM", 0.5),
    ("RTY", 50.0),
    ("M2K", 5.0),
    // energy
    ("CL", 1000.0),
    ("MCL", 100.0),
    ("QM", 500.0),
    ("NG", 10000.0),
    // metals
    ("GC", 100.0),
    ("MGC", 10.0),
    ("SI", 5000.0),
    ("SIL", 1000.0),
    ("HG", 25000.0),
    // rates
    ("ZB", 1000.0),
    ("ZN", 1000.0),
    ("ZF", 1000.0),
    ("ZT", 2000.0),
    ("UB", 1000.0),
    // fx
    ("6E", 125000.0),
    ("6J", 12500000.0),
    ("6B", 62500.0),
    ("6A", 100000.0),
    ("6C", 100000.0),
    // ags
    ("ZC", 50.0),
    ("ZS", 50.0),
    ("ZW", 50.0),
    ("HE", 400.0),
    ("LE", 400.0),
    // crypto
    ("BTC", 5.0),
    ("MBT", 0.1),
    ("ETH", 50.0),
    ("MET", 0.1),
];

/// Reduces a contract symbol to its root so fills net across rolls:
/// `"ESH24"`, `"/ESH4"`, `"CME_MINI:ESH2024"`, `"ES 12-24"` and `"ES1!"` all become `"ES"`.
///
/// Applied until nothing changes, so the result is a fixed point.
pub fn normalize_instrument(raw: &str) -> String {
    let mut s = raw.trim().to_uppercase();
    if let Some((_, tail)) = s.rsplit_once(':') {
        s = tail.trim().to_string();
    }
    s = s.trim_start_matches('/').to_string();
    s = CONTINUOUS_SUFFIX.replace(&s, "").to_string();

    loop {
        let next = if let Some(c) = DASHED_EXPIRY.captures(&s) {
            c[1].trim().to_string()
        } else if let Some(c) = MONTH_CODE_EXPIRY.captures(&s) {
            c[1].to_string()
        } else {
            break;
        };
        if next == s || next.is_empty() {
            break;
        }
        s = next;
    }
    s
}

/// Source of per-instrument contract metadata.
pub trait InstrumentMetadata: Send + Sync {
    /// Dollars per point for a root symbol, if known.
    fn multiplier(&self, root: &str) -> Option<f64>;
}

/// Built-in futures table with optional overrides layered on top.
#[derive(Debug, Clone, Default)]
pub struct ContractTable {
    overrides: HashMap<String, f64>,
}

impl ContractTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: &HashMap<String, f64>) -> Self {
        let overrides = overrides
            .iter()
            .filter(|(_, v)| v.is_finite() && **v > 0.0)
            .map(|(k, v)| (normalize_instrument(k), *v))
            .collect();
        Self { overrides }
    }
}

impl InstrumentMetadata for ContractTable {
    fn multiplier(&self, root: &str) -> Option<f64> {
        let root = root.trim().to_uppercase();
        if let Some(v) = self.overrides.get(&root) {
            return Some(*v);
        }
        CONTRACT_MULTIPLIERS
            .iter()
            .find(|(sym, _)| *sym == root)
            .map(|(_, v)| *v)
    }
}

/// Static-table multiplier; unknown symbols get [`DEFAULT_MULTIPLIER`].
pub fn get_contract_multiplier(instrument: &str) -> f64 {
    ContractTable::new()
        .multiplier(&normalize_instrument(instrument))
        .unwrap_or(DEFAULT_MULTIPLIER)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiplierLookup {
    pub value: f64,
    /// True when the provider had no entry and the default was used.
    pub defaulted: bool,
}

pub fn resolve_multiplier(provider: &dyn InstrumentMetadata, root: &str) -> MultiplierLookup {
    match provider.multiplier(root) {
        Some(value) => MultiplierLookup { value, defaulted: false },
        None => MultiplierLookup { value: DEFAULT_MULTIPLIER, defaulted: true },
    }
}
