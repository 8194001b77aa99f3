use utils::{normalize_header, try_parse_number};

use crate::csv_text::{unwrap_escaped_lines, HEADER_SCAN_LIMIT};

/// How much raw content detectors look at beyond the header row.
pub const CONTENT_SCAN_CHARS: usize = 3000;

/// Confidence the generic parser always reports; any platform detector that
/// recognises at least one of its indicators outranks it.
pub const GENERIC_CONFIDENCE: f64 = 0.2;

/// Words that show up in trade export headers, used to find the header row.
const HEADER_KEYWORDS: &[&str] = &[
    "date", "time", "symbol", "instrument", "contract", "price", "qty", "quantity", "side", "b/s",
    "buy", "sell", "pnl", "p/l", "profit", "entry", "exit", "trade", "account", "status",
    "commission", "fill", "order", "direction", "size", "market", "timestamp",
];

pub fn looks_like_header(cells: &[String]) -> bool {
    let mut keyword_cells = 0;
    let mut numeric_cells = 0;
    for cell in cells {
        let c = cell.trim().to_lowercase();
        if c.is_empty() {
            continue;
        }
        if try_parse_number(&c).is_some() && c.chars().any(|ch| ch.is_ascii_digit()) {
            numeric_cells += 1;
        } else if HEADER_KEYWORDS.iter().any(|k| c.contains(k)) {
            keyword_cells += 1;
        }
    }
    keyword_cells >= 2 && numeric_cells == 0
}

/// Best-guess header cells: the first of the leading lines that looks like a
/// header, otherwise the first non-empty line.
pub fn extract_header_line(content: &str) -> Vec<String> {
    let content = unwrap_escaped_lines(content);
    let mut first: Option<Vec<String>> = None;

    for line in content.lines().filter(|l| !l.trim().is_empty()).take(HEADER_SCAN_LIMIT) {
        let cells = split_line(line);
        if looks_like_header(&cells) {
            return cells;
        }
        if first.is_none() {
            first = Some(cells);
        }
    }
    first.unwrap_or_default()
}

fn split_line(line: &str) -> Vec<String> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    match rdr.records().next() {
        Some(Ok(rec)) => rec.iter().map(|c| c.to_string()).collect(),
        _ => line.split(',').map(|c| c.trim().trim_matches('"').to_string()).collect(),
    }
}

/// Leading slice of the content, cut on a char boundary.
pub fn content_window(content: &str) -> &str {
    match content.char_indices().nth(CONTENT_SCAN_CHARS) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

/// Counts indicators present among the headers. Short indicators must match
/// a header exactly; longer ones may appear inside a header.
pub fn count_header_indicators(headers: &[String], indicators: &[&str]) -> usize {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    indicators
        .iter()
        .filter(|ind| {
            let ind = normalize_header(ind);
            normalized
                .iter()
                .any(|h| *h == ind || (ind.len() >= 5 && h.contains(&ind)))
        })
        .count()
}

/// Counts indicator phrases found in the leading window of the raw content.
pub fn count_content_indicators(content: &str, indicators: &[&str]) -> usize {
    let window = content_window(content).to_lowercase();
    indicators
        .iter()
        .filter(|ind| window.contains(&ind.to_lowercase()))
        .count()
}

/// Maps a number of matched strong indicators to a confidence tier.
pub fn confidence_from_matches(matches: usize) -> f64 {
    match matches {
        0 => 0.1,
        1 => 0.35,
        2 => 0.7,
        3 => 0.85,
        _ => 0.95,
    }
}
