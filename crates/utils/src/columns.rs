/// One CSV record keyed by header, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// 1-based record number in the source file.
    pub index: usize,
    pub fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(index: usize, headers: &[String], cells: &[String]) -> Self {
        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), cells.get(i).cloned().unwrap_or_default()))
            .collect();
        Self { index, fields }
    }

    /// Exact header lookup.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.trim().is_empty())
    }
}

/// Lowercases and drops whitespace, underscores and a leading BOM.
pub fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Returns the first non-empty value among the accepted header spellings,
/// trying `candidates` in order.
pub fn find_column_value<'a>(row: &'a RawRow, candidates: &[&str]) -> Option<&'a str> {
    for candidate in candidates {
        let wanted = normalize_header(candidate);
        for (header, value) in &row.fields {
            if normalize_header(header) == wanted && !value.trim().is_empty() {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Whether any header matches one of the spellings.
pub fn has_column(headers: &[String], candidates: &[&str]) -> bool {
    candidates.iter().any(|c| {
        let wanted = normalize_header(c);
        headers.iter().any(|h| normalize_header(h) == wanted)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TradeField {
    Date,
    ExitDate,
    Instrument,
    Direction,
    EntryPrice,
    ExitPrice,
    Price,
    Size,
    Pnl,
    StopLoss,
    TakeProfit,
    Commission,
    Notes,
    SetupName,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnMatch {
    pub field: TradeField,
    pub confidence: f64,
}

const FIELD_ALIASES: &[(TradeField, &[&str])] = &[
    (TradeField::Date, &["date", "datetime", "time", "entrytime", "entrydate", "opentime", "opendate", "tradedate", "timestamp", "filltime", "exectime"]),
    (TradeField::ExitDate, &["exittime", "exitdate", "closetime", "closedate", "closingtime"]),
    (TradeField::Instrument, &["instrument", "symbol", "ticker", "contract", "market", "product", "asset", "security"]),
    (TradeField::Direction, &["direction", "side", "action", "buysell", "bs", "longshort", "marketpos", "position", "tradetype"]),
    (TradeField::EntryPrice, &["entryprice", "entry", "openprice", "buyprice", "avgentry", "avgentryprice"]),
    (TradeField::ExitPrice, &["exitprice", "exit", "closeprice", "sellprice", "avgexit", "avgexitprice"]),
    (TradeField::Price, &["price", "fillprice", "avgprice", "avgfillprice", "executionprice", "tradeprice"]),
    (TradeField::Size, &["size", "qty", "quantity", "contracts", "shares", "lots", "volume", "filledqty"]),
    (TradeField::Pnl, &["pnl", "pl", "profit", "profitloss", "netpnl", "realizedpnl", "netprofit", "gainloss"]),
    (TradeField::StopLoss, &["stoploss", "stop", "sl", "stopprice"]),
    (TradeField::TakeProfit, &["takeprofit", "target", "tp", "profittarget", "limitprice"]),
    (TradeField::Commission, &["commission", "commissions", "fees", "fee", "commfee"]),
    (TradeField::Notes, &["notes", "note", "comment", "comments", "description", "memo"]),
    (TradeField::SetupName, &["setup", "setupname", "strategy", "playbook", "tag"]),
];

fn alnum_lower(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Scores a header against the known trade-field aliases.
///
/// An exact alias match scores 1.0. Otherwise, when one string contains the
/// other, the score is the shorter length over the longer one. Aliases shorter
/// than three characters only match exactly.
pub fn fuzzy_match_column(header: &str) -> Option<ColumnMatch> {
    let h = alnum_lower(header);
    if h.is_empty() {
        return None;
    }

    let mut best: Option<ColumnMatch> = None;
    for (field, aliases) in FIELD_ALIASES {
        for alias in aliases.iter() {
            let confidence = if h == *alias {
                1.0
            } else if alias.len() >= 3 && h.len() >= 3 && (h.contains(alias) || alias.contains(h.as_str())) {
                let (short, long) = if h.len() < alias.len() { (h.len(), alias.len()) } else { (alias.len(), h.len()) };
                short as f64 / long as f64
            } else {
                continue;
            };

            if best.map_or(true, |b| confidence > b.confidence) {
                best = Some(ColumnMatch { field: *field, confidence });
            }
        }
    }
    best
}
