use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%m/%d/%Y %H:%M:%S %z",
];

// Two-digit years first: "%Y" happily reads "24" as year 24.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d, %H:%M:%S",
    "%Y%m%d;%H%M%S",
    "%Y%m%d %H:%M:%S",
    "%m/%d/%y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%y %I:%M:%S %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%y %I:%M %p",
    "%m/%d/%Y %I:%M %p",
    "%d.%m.%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y%m%d", "%d.%m.%Y", "%b %d, %Y", "%d %b %Y",
];

/// A zone name some platforms append after the time.
#[derive(Debug, Clone, Copy)]
enum ZoneMarker {
    Fixed(i32),
    Named(Tz),
}

const HOUR: i32 = 3600;

const TRAILING_ZONES: &[(&str, ZoneMarker)] = &[
    ("EST", ZoneMarker::Fixed(-5 * HOUR)),
    ("EDT", ZoneMarker::Fixed(-4 * HOUR)),
    ("CST", ZoneMarker::Fixed(-6 * HOUR)),
    ("CDT", ZoneMarker::Fixed(-5 * HOUR)),
    ("UTC", ZoneMarker::Fixed(0)),
    ("GMT", ZoneMarker::Fixed(0)),
    ("ET", ZoneMarker::Named(Tz::America__New_York)),
    ("CT", ZoneMarker::Named(Tz::America__Chicago)),
];

/// Parses a timestamp. Values with an offset or a known zone name keep it;
/// values without one are read as wall-clock time in `zone`.
/// Returns `None` on failure; never epoch zero.
pub fn parse_date(value: &str, zone: Tz) -> Option<DateTime<Utc>> {
    let s = value.trim().trim_matches('"').trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Some(naive) = parse_naive(s) {
        return Some(resolve_naive(naive, zone));
    }

    // Permissive fallback
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let (rest, marker) = split_zone_name(s)?;
    let naive = parse_naive(rest)?;
    match marker {
        ZoneMarker::Fixed(secs) => {
            let offset = FixedOffset::east_opt(secs)?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
        ZoneMarker::Named(tz) => Some(resolve_naive(naive, tz)),
    }
}

/// [`parse_date`] for platforms that write UTC without saying so.
pub fn parse_timestamp_assume_utc(value: &str) -> Option<DateTime<Utc>> {
    parse_date(value, Tz::UTC)
}

/// Calendar day of an instant as seen in `zone`.
pub fn date_in_zone(instant: DateTime<Utc>, zone: Tz) -> NaiveDate {
    instant.with_timezone(&zone).date_naive()
}

fn split_zone_name(s: &str) -> Option<(&str, ZoneMarker)> {
    let (rest, name) = s.rsplit_once(' ')?;
    TRAILING_ZONES
        .iter()
        .find(|(abbr, _)| name.eq_ignore_ascii_case(abbr))
        .map(|(_, marker)| (rest.trim(), *marker))
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    for fmt in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn resolve_naive(naive: NaiveDateTime, zone: Tz) -> DateTime<Utc> {
    zone.from_local_datetime(&naive)
        .earliest()
        // A wall-clock time inside a DST gap reads as the hour after.
        .or_else(|| zone.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc(s: &str) -> DateTime<Utc> {
        parse_timestamp_assume_utc(s).unwrap()
    }

    #[test]
    fn test_iso_with_offset_is_respected() {
        let dt = parse_date("2024-03-01T14:30:00-05:00", Tz::Asia__Tokyo).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T19:30:00+00:00");
    }

    #[test]
    fn test_assume_utc_formats() {
        assert_eq!(utc("2024-01-02 09:30:15").to_rfc3339(), "2024-01-02T09:30:15+00:00");
        assert_eq!(utc("01/02/2024 09:30:15").to_rfc3339(), "2024-01-02T09:30:15+00:00");
        assert_eq!(utc("1/2/24 09:30:15").to_rfc3339(), "2024-01-02T09:30:15+00:00");
        assert_eq!(utc("2024-01-02, 09:30:15").to_rfc3339(), "2024-01-02T09:30:15+00:00");
        assert_eq!(utc("20240102;093015").to_rfc3339(), "2024-01-02T09:30:15+00:00");
        assert_eq!(utc("1/2/2024 2:05:00 PM").to_rfc3339(), "2024-01-02T14:05:00+00:00");
        assert_eq!(utc("2024-01-02").to_rfc3339(), "2024-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_trailing_zone_name_sets_the_offset() {
        assert_eq!(utc("2024-01-02 09:30:15 EST").to_rfc3339(), "2024-01-02T14:30:15+00:00");
        assert_eq!(utc("2024-01-02, 09:30:15 EST").to_rfc3339(), "2024-01-02T14:30:15+00:00");
        assert_eq!(utc("2024-07-02 09:30:15 CDT").to_rfc3339(), "2024-07-02T14:30:15+00:00");
        assert_eq!(utc("2024-01-02 09:30:15 GMT").to_rfc3339(), "2024-01-02T09:30:15+00:00");
        // The zone name wins over the assumed zone.
        let dt = parse_date("2024-01-02 09:30:15 UTC", Tz::America__New_York).unwrap();
        assert_eq!(dt.hour(), 9);
    }

    #[test]
    fn test_named_exchange_zone_follows_dst() {
        assert_eq!(utc("2024-01-02 09:30:00 ET").to_rfc3339(), "2024-01-02T14:30:00+00:00");
        assert_eq!(utc("2024-07-02 09:30:00 ET").to_rfc3339(), "2024-07-02T13:30:00+00:00");
        assert_eq!(utc("2024-07-02 08:30:00 CT").to_rfc3339(), "2024-07-02T13:30:00+00:00");
    }

    #[test]
    fn test_zone_less_values_use_the_given_zone() {
        let ny = parse_date("2024-01-02 20:00:00", Tz::America__New_York).unwrap();
        assert_eq!(ny.to_rfc3339(), "2024-01-03T01:00:00+00:00");
        assert_eq!(date_in_zone(ny, Tz::America__New_York).to_string(), "2024-01-02");
        assert_eq!(date_in_zone(ny, Tz::UTC).to_string(), "2024-01-03");
    }

    #[test]
    fn test_dst_gap_reads_as_the_next_hour() {
        let dt = parse_date("2024-03-10 02:30:00", Tz::America__New_York).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-10T07:30:00+00:00");
    }

    #[test]
    fn test_unparseable_is_none() {
        assert!(parse_date("", Tz::UTC).is_none());
        assert!(parse_date("not a date", Tz::UTC).is_none());
        assert!(parse_timestamp_assume_utc("13/45/2024").is_none());
        assert!(parse_timestamp_assume_utc("2024-01-02 09:30:15 XYZ").is_none());
    }
}
