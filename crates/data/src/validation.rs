use models::{ParsedTrade, ValidationError};

/// Baseline checks every platform's trades go through.
pub fn validate_trades(trades: &[ParsedTrade]) -> Vec<ValidationError> {
    let mut issues = Vec::new();

    for trade in trades {
        let row = trade.source_row;
        let instrument = trade.instrument.trim();

        if instrument.is_empty() || instrument.eq_ignore_ascii_case("unknown") {
            issues.push(
                ValidationError::error(row, "instrument", instrument, "Instrument is missing")
                    .with_suggestion("Make sure the symbol/instrument column is present and filled in"),
            );
        }

        if trade.date.is_none() {
            issues.push(
                ValidationError::error(row, "date", "", "Date could not be parsed")
                    .with_suggestion("Use a format like 2024-01-31 09:30:00 or 01/31/2024 09:30:00"),
            );
        }

        if !(trade.entry_price.is_finite() && trade.entry_price > 0.0) {
            issues.push(ValidationError::error(
                row,
                "entry_price",
                trade.entry_price.to_string(),
                "Entry price must be greater than 0",
            ));
        }

        if !(trade.size.is_finite() && trade.size > 0.0) {
            issues.push(
                ValidationError::error(row, "size", trade.size.to_string(), "Size must be greater than 0")
                    .with_suggestion("Check the quantity column"),
            );
        }

        if trade.exit_price == trade.entry_price {
            issues.push(ValidationError::warning(
                row,
                "exit_price",
                trade.exit_price.to_string(),
                "Exit price equals entry price; this will result in 0 P&L",
            ));
        }
    }

    issues
}
