use std::borrow::Cow;

use utils::RawRow;

use crate::detection::looks_like_header;
use crate::{ImportError, Result};

/// How many leading records may be preamble before the header row.
pub const HEADER_SCAN_LIMIT: usize = 10;

/// A tokenized CSV file: the inferred header row and the data rows after it.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// 1-based line of the header row in the original content.
    pub header_line: usize,
}

/// One tokenized record plus the 1-based line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub line: usize,
    pub cells: Vec<String>,
}

impl Record {
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

/// Undoes the doubly-escaped export variant where every line is wrapped in
/// one outer quote pair and inner quotes are doubled:
/// `"Date,Symbol,""Net, Price"""` becomes `Date,Symbol,"Net, Price"`.
///
/// Only kicks in when the first non-empty line has that shape.
pub fn unwrap_escaped_lines(content: &str) -> Cow<'_, str> {
    let first = content.lines().find(|l| !l.trim().is_empty());
    if !first.is_some_and(is_wrapped_line) {
        return Cow::Borrowed(content);
    }

    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        if is_wrapped_line(line) {
            let t = line.trim();
            out.push_str(&t[1..t.len() - 1].replace("\"\"", "\""));
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    Cow::Owned(out)
}

fn is_wrapped_line(line: &str) -> bool {
    let t = line.trim();
    if t.len() < 2 || !t.starts_with('"') || !t.ends_with('"') {
        return false;
    }
    let inner = &t[1..t.len() - 1];
    inner.contains(',') && all_quotes_doubled(inner)
}

fn all_quotes_doubled(s: &str) -> bool {
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '"' && chars.next() != Some('"') {
            return false;
        }
    }
    true
}

/// Tokenizes the whole file. Ragged rows are allowed; cells are trimmed.
pub fn read_records(content: &str) -> Result<Vec<Record>> {
    let content = unwrap_escaped_lines(content);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for (ordinal, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let line = rec
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(ordinal + 1);
        let cells = rec
            .iter()
            .map(|c| c.trim_start_matches('\u{feff}').to_string())
            .collect();
        records.push(Record { line, cells });
    }
    Ok(records)
}

/// Reads a table whose header is the first record that looks like one
/// (within [`HEADER_SCAN_LIMIT`]), falling back to the first record.
pub fn read_table(content: &str) -> Result<CsvTable> {
    read_table_at(content, 0)
}

/// Like [`read_table`], but line numbers are shifted by `line_offset` so rows
/// of a sliced section still point at the original file.
pub fn read_table_at(content: &str, line_offset: usize) -> Result<CsvTable> {
    let records = read_records(content)?;
    let non_blank: Vec<&Record> = records.iter().filter(|r| !r.is_blank()).collect();
    if non_blank.is_empty() {
        return Err(ImportError::EmptyInput);
    }

    let header_pos = non_blank
        .iter()
        .take(HEADER_SCAN_LIMIT)
        .position(|r| looks_like_header(&r.cells))
        .unwrap_or(0);
    let header = non_blank[header_pos];
    let headers: Vec<String> = header.cells.iter().map(|h| h.trim().to_string()).collect();

    let rows = non_blank[header_pos + 1..]
        .iter()
        .map(|r| RawRow::new(r.line + line_offset, &headers, &r.cells))
        .collect();

    Ok(CsvTable {
        headers,
        rows,
        header_line: header.line + line_offset,
    })
}

/// A slice of a composite statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Header row plus data rows, as raw text.
    pub text: String,
    /// Number of lines before `text` in the original content.
    pub line_offset: usize,
}

fn bare(line: &str) -> &str {
    line.trim().trim_matches(|c| c == '"' || c == ',').trim()
}

/// Cuts one titled section out of a multi-section export. The section starts
/// on the line after the title and ends at the first blank line or at a line
/// starting with one of `end_titles`.
pub fn extract_section(content: &str, title: &str, end_titles: &[&str]) -> Option<Section> {
    let lines: Vec<&str> = content.lines().collect();
    let title_idx = lines
        .iter()
        .position(|l| bare(l).to_lowercase().starts_with(&title.to_lowercase()))?;

    let start = title_idx + 1;
    let mut end = lines.len();
    for (i, line) in lines.iter().enumerate().skip(start) {
        let b = bare(line);
        if b.is_empty() {
            // Tolerate blank lines between the title and its header.
            if i == start {
                continue;
            }
            end = i;
            break;
        }
        let lower = b.to_lowercase();
        if i > start && end_titles.iter().any(|t| lower.starts_with(&t.to_lowercase())) {
            end = i;
            break;
        }
    }

    let body: Vec<&str> = lines[start..end]
        .iter()
        .copied()
        .skip_while(|l| bare(l).is_empty())
        .collect();
    if body.is_empty() {
        return None;
    }
    let skipped = (end - start) - body.len();
    Some(Section {
        text: body.join("\n"),
        line_offset: start + skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_escaped_lines() {
        let content = "\"Date,Symbol,\"\"Net, Price\"\"\"\n\"2024-01-02,ES,\"\"1,000\"\"\"\n";
        let out = unwrap_escaped_lines(content);
        assert_eq!(out, "Date,Symbol,\"Net, Price\"\n2024-01-02,ES,\"1,000\"\n");
    }

    #[test]
    fn test_unwrap_leaves_normal_csv_alone() {
        let content = "\"Date\",\"Symbol\"\n\"2024-01-02\",\"ES\"\n";
        assert!(matches!(unwrap_escaped_lines(content), Cow::Borrowed(_)));
    }

    #[test]
    fn test_read_table_skips_preamble() {
        let content = "Completed Orders\nGenerated 2024-01-03\nAccount,Status,Buy/Sell,Qty Filled,Symbol,Avg Fill Price\nA1,Filled,B,1,ESH4,4750.25\n";
        let table = read_table(content).unwrap();
        assert_eq!(table.header_line, 3);
        assert_eq!(table.headers[2], "Buy/Sell");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].index, 4);
        assert_eq!(table.rows[0].get("Symbol"), Some("ESH4"));
    }

    #[test]
    fn test_read_table_empty_input_is_error() {
        assert!(matches!(read_table(""), Err(ImportError::EmptyInput)));
        assert!(matches!(read_table(" \n,,\n"), Err(ImportError::EmptyInput)));
    }

    #[test]
    fn test_read_table_pads_ragged_rows() {
        let table = read_table("Date,Symbol,Price\n2024-01-02,ES\n").unwrap();
        assert_eq!(table.rows[0].get("Price"), Some(""));
    }

    #[test]
    fn test_extract_section_by_title_and_blank_line() {
        let content = "Account Statement for 123\n\nCash Balance\nDATE,TIME,TYPE\n1/2/24,09:00:00,BAL\n\nAccount Trade History\n,Exec Time,Side,Qty,Symbol,Price\n,1/2/24 09:30:15,BUY,+1,/ESH24,4750.25\n\nProfits and Losses\n";
        let section = extract_section(content, "Account Trade History", &["Profits and Losses"]).unwrap();
        assert_eq!(section.line_offset, 7);
        assert!(section.text.starts_with(",Exec Time"));
        assert_eq!(section.text.lines().count(), 2);

        let table = read_table_at(&section.text, section.line_offset).unwrap();
        assert_eq!(table.header_line, 8);
        assert_eq!(table.rows[0].index, 9);
    }

    #[test]
    fn test_extract_section_stops_at_next_title() {
        let content = "Account Trade History\n,Exec Time,Side\n,1/2/24 09:30:15,BUY\nAccount Order History\n,Notes\n";
        let section = extract_section(content, "Account Trade History", &["Account Order History"]).unwrap();
        assert_eq!(section.text.lines().count(), 2);
        assert!(extract_section(content, "Forex", &[]).is_none());
    }
}
