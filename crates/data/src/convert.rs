use models::{Broker, Outcome, ParsedTrade, TradeInputRecord};
use utils::{date_in_zone, Tz};

/// Maps a parsed trade onto the record the trade store accepts.
///
/// Unknown stops default to the entry price (zero recorded risk) and the
/// outcome follows the sign of the P&L. `date` is the calendar day in `zone`.
pub fn to_trade_input(trade: &ParsedTrade, broker: Broker, account_id: Option<&str>, zone: Tz) -> TradeInputRecord {
    let date = trade
        .date
        .map(|d| date_in_zone(d, zone).format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    let mut notes = if trade.notes.trim().is_empty() {
        format!("Imported from {}", broker.display_name())
    } else {
        trade.notes.clone()
    };
    if let Some(commission) = trade.commission.filter(|c| *c != 0.0) {
        notes.push_str(&format!(" | commission {:.2}", commission));
    }

    TradeInputRecord {
        date,
        instrument: trade.instrument.clone(),
        direction: trade.direction,
        entry_price: trade.entry_price,
        exit_price: trade.exit_price,
        stop_loss: trade.stop_loss.unwrap_or(trade.entry_price),
        take_profit: trade.take_profit,
        size: trade.size,
        pnl: trade.pnl,
        outcome: Outcome::from_pnl(trade.pnl),
        notes,
        setup_name: trade.setup_name.clone(),
        account_id: account_id.map(|s| s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use models::Direction;

    fn trade(pnl: f64) -> ParsedTrade {
        ParsedTrade {
            date: Some(Utc.with_ymd_and_hms(2024, 3, 8, 15, 45, 0).unwrap()),
            exit_date: None,
            instrument: "NQ".to_string(),
            direction: Direction::Short,
            entry_price: 18000.0,
            exit_price: 17990.0,
            size: 1.0,
            pnl,
            stop_loss: None,
            take_profit: Some(17950.0),
            commission: Some(4.12),
            notes: String::new(),
            setup_name: Some("ORB".to_string()),
            source_row: 3,
        }
    }

    #[test]
    fn test_convert_defaults_and_outcome() {
        let rec = to_trade_input(&trade(200.0), Broker::NinjaTrader, Some("ACC-9"), Tz::UTC);
        assert_eq!(rec.date, "2024-03-08");
        assert_eq!(rec.stop_loss, 18000.0);
        assert_eq!(rec.take_profit, Some(17950.0));
        assert_eq!(rec.outcome, Outcome::Win);
        assert_eq!(rec.account_id.as_deref(), Some("ACC-9"), "{}", Tz::UTC);
        assert_eq!(rec.notes, "Imported from NinjaTrader | commission 4.12");
        assert_eq!(rec.setup_name.as_deref(), Some("ORB"));
    }

    #[test]
    fn test_convert_date_is_the_day_in_the_configured_zone() {
        let mut late = trade(1.0);
        late.date = Some(Utc.with_ymd_and_hms(2024, 1, 3, 1, 0, 0).unwrap());
        assert_eq!(to_trade_input(&late, Broker::Rithmic, None, Tz::UTC).date, "2024-01-03");
        assert_eq!(to_trade_input(&late, Broker::Rithmic, None, Tz::America__New_York).date, "2024-01-02");
    }

    #[test]
    fn test_convert_outcome_for_loss_and_flat() {
        assert_eq!(to_trade_input(&trade(-1.0), Broker::Generic, None, Tz::UTC).outcome, Outcome::Loss);
        assert_eq!(to_trade_input(&trade(0.0), Broker::Generic, None, Tz::UTC).outcome, Outcome::Breakeven);
    }

    #[test]
    fn test_convert_serializes_lowercase_enums() {
        let rec = to_trade_input(&trade(-5.0), Broker::Tradovate, None, Tz::UTC);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["direction"], "short");
        assert_eq!(json["outcome"], "loss");
        assert!(json.get("account_id").is_none());
    }
}
