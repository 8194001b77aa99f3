pub mod columns;
pub mod dates;
pub mod instruments;
pub mod trades;
pub mod values;

// Re-export commonly used items
pub use crate::columns::{find_column_value, fuzzy_match_column, has_column, normalize_header, ColumnMatch, RawRow, TradeField};
pub use crate::dates::{date_in_zone, parse_date, parse_timestamp_assume_utc};
pub use chrono_tz::Tz;
pub use crate::instruments::{
    get_contract_multiplier, normalize_instrument, resolve_multiplier, ContractTable, InstrumentMetadata,
    MultiplierLookup, DEFAULT_MULTIPLIER,
};
pub use crate::trades::{find_duplicate_trades, trade_fingerprint, DuplicateTrade};
pub use crate::values::{infer_direction, infer_side, parse_direction, parse_number, try_parse_number};
