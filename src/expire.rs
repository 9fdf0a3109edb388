//! Expiration Policy Module
//!
//! Pure validity rules for cached entries: an expiration bound, a time-check
//! mode selecting the metadata anchor, and the predicate combining them.
//! Nothing here reads the clock or touches storage.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::entry::Metadata;
use crate::error::ParseError;

// == Time Check Mode ==
/// Selects which metadata timestamp anchors a relative expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeCheck {
    /// Measure from `created_at`: absolute age of the entry.
    Creation,
    /// Measure from `updated_at`: age since the last write (default).
    #[default]
    LastUpdate,
}

impl FromStr for TimeCheck {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "creation" => Ok(TimeCheck::Creation),
            "last_update" | "lastupdate" => Ok(TimeCheck::LastUpdate),
            _ => Err(ParseError::new("time-check mode", s)),
        }
    }
}

// == Expiration ==
/// When cached entries stop being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiration {
    /// Entries never expire (default).
    Never,
    /// Entries expire once their anchor timestamp is this old.
    After(Duration),
    /// Entries expire at a fixed point in time.
    At(DateTime<Utc>),
}

impl Default for Expiration {
    fn default() -> Self {
        Expiration::Never
    }
}

/// Relative span grammar: a count (integers or decimals) followed by a unit.
static SPAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|wks?|w)\s*$")
        .expect("invalid span regex")
});

impl Expiration {
    /// Parses an expiration from its string form.
    ///
    /// Accepted inputs:
    /// - `"never"` for no expiration
    /// - a bare number, read as seconds: `"300"`
    /// - a relative span: `"90s"`, `"30 minutes"`, `"1.5 hours"`, `"1 day"`, `"2 weeks"`
    /// - an RFC 3339 timestamp for a fixed deadline: `"2026-09-01T00:00:00Z"`
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        s.parse()
    }

    /// Returns the relative window, if this expiration is span-based.
    pub fn window(&self) -> Option<Duration> {
        match self {
            Expiration::After(window) => Some(*window),
            _ => None,
        }
    }
}

impl FromStr for Expiration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("never") {
            return Ok(Expiration::Never);
        }

        // Bare numbers are seconds.
        if let Ok(seconds) = trimmed.parse::<f64>() {
            return span_from_seconds(seconds).ok_or_else(|| ParseError::new("expiration", s));
        }

        if let Some(caps) = SPAN_RE.captures(trimmed) {
            let count: f64 = caps[1]
                .parse()
                .map_err(|_| ParseError::new("expiration", s))?;
            let unit_seconds = match &caps[2][..1] {
                "s" => 1.0,
                "m" => 60.0,
                "h" => 3600.0,
                "d" => 86_400.0,
                "w" => 604_800.0,
                _ => return Err(ParseError::new("expiration", s)),
            };
            return span_from_seconds(count * unit_seconds)
                .ok_or_else(|| ParseError::new("expiration", s));
        }

        if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Expiration::At(at.with_timezone(&Utc)));
        }

        Err(ParseError::new("expiration", s))
    }
}

/// Converts fractional seconds to a millisecond-precision span.
fn span_from_seconds(seconds: f64) -> Option<Expiration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    if millis > i64::MAX as f64 {
        return None;
    }
    Some(Expiration::After(Duration::milliseconds(millis as i64)))
}

// == Validity Predicate ==
/// Decides whether an entry is still valid at `now`.
///
/// Boundary condition: an entry is invalid once the elapsed time reaches the
/// window exactly, so a one-hour entry observed precisely one hour after its
/// anchor is already expired. Fixed deadlines behave the same way: an entry
/// is invalid from the deadline onward.
///
/// # Arguments
/// * `metadata` - The stored entry metadata
/// * `now` - The observation time
/// * `expiration` - The configured expiration bound
/// * `time_check` - Which metadata timestamp anchors a relative bound
pub fn is_valid(
    metadata: &Metadata,
    now: DateTime<Utc>,
    expiration: &Expiration,
    time_check: TimeCheck,
) -> bool {
    match expiration {
        Expiration::Never => true,
        Expiration::At(deadline) => now < *deadline,
        Expiration::After(window) => {
            let anchor = match time_check {
                TimeCheck::Creation => metadata.created_at,
                TimeCheck::LastUpdate => metadata.updated_at,
            };
            now - anchor < *window
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_relative_spans() {
        assert_eq!(
            Expiration::parse("90s").unwrap(),
            Expiration::After(Duration::seconds(90))
        );
        assert_eq!(
            Expiration::parse("30 minutes").unwrap(),
            Expiration::After(Duration::minutes(30))
        );
        assert_eq!(
            Expiration::parse("12 hours").unwrap(),
            Expiration::After(Duration::hours(12))
        );
        assert_eq!(
            Expiration::parse("1 day").unwrap(),
            Expiration::After(Duration::days(1))
        );
        assert_eq!(
            Expiration::parse("2 weeks").unwrap(),
            Expiration::After(Duration::weeks(2))
        );
    }

    #[test]
    fn test_parse_fractional_span() {
        assert_eq!(
            Expiration::parse("1.5 hours").unwrap(),
            Expiration::After(Duration::minutes(90))
        );
    }

    #[test]
    fn test_parse_bare_number_is_seconds() {
        assert_eq!(
            Expiration::parse("300").unwrap(),
            Expiration::After(Duration::seconds(300))
        );
        assert_eq!(
            Expiration::parse("0.25").unwrap(),
            Expiration::After(Duration::milliseconds(250))
        );
    }

    #[test]
    fn test_parse_never() {
        assert_eq!(Expiration::parse("never").unwrap(), Expiration::Never);
        assert_eq!(Expiration::parse("NEVER").unwrap(), Expiration::Never);
    }

    #[test]
    fn test_parse_rfc3339_deadline() {
        let parsed = Expiration::parse("2026-09-01T00:00:00Z").unwrap();
        let expected = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        assert_eq!(parsed, Expiration::At(expected));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Expiration::parse("eventually").is_err());
        assert!(Expiration::parse("10 fortnights").is_err());
        assert!(Expiration::parse("-5 minutes").is_err());
        assert!(Expiration::parse("").is_err());
    }

    #[test]
    fn test_time_check_from_str() {
        assert_eq!("creation".parse::<TimeCheck>().unwrap(), TimeCheck::Creation);
        assert_eq!(
            "last_update".parse::<TimeCheck>().unwrap(),
            TimeCheck::LastUpdate
        );
        assert!("sometimes".parse::<TimeCheck>().is_err());
    }

    #[test]
    fn test_never_is_always_valid() {
        let metadata = Metadata::new(anchor());
        let far_future = anchor() + Duration::days(365 * 100);
        assert!(is_valid(
            &metadata,
            far_future,
            &Expiration::Never,
            TimeCheck::Creation
        ));
    }

    #[test]
    fn test_validity_boundary() {
        let metadata = Metadata::new(anchor());
        let window = Duration::hours(1);
        let expiration = Expiration::After(window);

        // Just inside the window: valid.
        assert!(is_valid(
            &metadata,
            anchor() + window - Duration::milliseconds(1),
            &expiration,
            TimeCheck::Creation
        ));

        // Exactly at the boundary: expired.
        assert!(!is_valid(
            &metadata,
            anchor() + window,
            &expiration,
            TimeCheck::Creation
        ));

        // Past the boundary: expired.
        assert!(!is_valid(
            &metadata,
            anchor() + window + Duration::milliseconds(1),
            &expiration,
            TimeCheck::Creation
        ));
    }

    #[test]
    fn test_fixed_deadline_boundary() {
        let deadline = anchor() + Duration::hours(1);
        let metadata = Metadata::new(anchor());
        let expiration = Expiration::At(deadline);

        assert!(is_valid(
            &metadata,
            deadline - Duration::milliseconds(1),
            &expiration,
            TimeCheck::Creation
        ));
        assert!(!is_valid(&metadata, deadline, &expiration, TimeCheck::Creation));
    }

    #[test]
    fn test_anchor_selection() {
        // An entry created long ago but refreshed recently.
        let mut metadata = Metadata::new(anchor());
        metadata = metadata.refreshed(anchor() + Duration::hours(10));

        let now = anchor() + Duration::hours(10) + Duration::minutes(30);
        let expiration = Expiration::After(Duration::hours(1));

        // Measured from creation it is long expired.
        assert!(!is_valid(&metadata, now, &expiration, TimeCheck::Creation));
        // Measured from the last update it is still fresh.
        assert!(is_valid(&metadata, now, &expiration, TimeCheck::LastUpdate));
    }
}
