use std::collections::HashMap;

use models::ParsedTrade;
use sha2::{Digest, Sha256};

/// Identity of a trade for duplicate detection: hash of
/// `instrument|date|entry_price|size`.
pub fn trade_fingerprint(trade: &ParsedTrade) -> String {
    let date = trade
        .date
        .map(|d| d.to_rfc3339())
        .unwrap_or_default();
    let key = format!(
        "{}|{}|{:.8}|{:.8}",
        trade.instrument.trim().to_uppercase(),
        date,
        trade.entry_price,
        trade.size
    );
    make_hash_id(&key)
}

pub fn make_hash_id(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let hash = hasher.finalize();
    hex::encode(hash)
}

/// A trade whose fingerprint was already seen earlier in the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateTrade {
    pub index: usize,
    pub first_index: usize,
}

/// Finds repeated trades without removing anything; the first occurrence
/// is never reported.
pub fn find_duplicate_trades(trades: &[ParsedTrade]) -> Vec<DuplicateTrade> {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut duplicates = Vec::new();

    for (index, trade) in trades.iter().enumerate() {
        let sig = trade_fingerprint(trade);
        match first_seen.get(&sig) {
            Some(&first_index) => duplicates.push(DuplicateTrade { index, first_index }),
            None => {
                first_seen.insert(sig, index);
            }
        }
    }

    duplicates
}
