//! Artifact naming.
//!
//! New artifacts are named `YYYY-MM-DD.png`. Date granularity keeps the name
//! at a fixed 14 characters, which matters because the name is embedded in a
//! width-constrained reference block downstream, and it makes a re-run on
//! the same day overwrite the earlier artifact instead of accumulating a
//! second one. The retired `screenshot-YYYY-MM-DD-HH-MM-SS.png` pattern is
//! still recognized so old artifacts can be parsed and swept, but is never
//! produced.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// File extension for all new artifacts.
pub const EXTENSION: &str = "png";

/// Hard ceiling on generated filename length.
pub const FILENAME_BUDGET: usize = 16;

static CURRENT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})\.png$").unwrap());

static LEGACY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^screenshot-(\d{4}-\d{2}-\d{2})-\d{2}-\d{2}-\d{2}\.png$").unwrap());

/// Derive the artifact filename for a capture date.
pub fn name_for(date: NaiveDate) -> String {
    let name = format!("{}.{EXTENSION}", date.format("%Y-%m-%d"));
    debug_assert!(name.len() <= FILENAME_BUDGET);
    name
}

/// Parse an artifact filename back into its capture date.
///
/// Accepts both the current `YYYY-MM-DD.png` format and the legacy
/// `screenshot-YYYY-MM-DD-HH-MM-SS.png` format (date part only). Returns
/// `None` for anything else — callers treat unparseable names as foreign
/// objects that must never be deleted.
pub fn parse(name: &str) -> Option<NaiveDate> {
    let date_part = CURRENT_NAME
        .captures(name)
        .or_else(|| LEGACY_NAME.captures(name))
        .and_then(|c| c.get(1))?;
    NaiveDate::parse_from_str(date_part.as_str(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn name_is_date_dot_png() {
        assert_eq!(name_for(date(2026, 1, 10)), "2026-01-10.png");
    }

    #[test]
    fn name_fits_budget() {
        assert!(name_for(date(2026, 12, 31)).len() <= FILENAME_BUDGET);
    }

    #[test]
    fn parse_current_format() {
        assert_eq!(parse("2026-01-10.png"), Some(date(2026, 1, 10)));
    }

    #[test]
    fn parse_legacy_format_at_date_granularity() {
        assert_eq!(
            parse("screenshot-2024-01-15-10-30-45.png"),
            Some(date(2024, 1, 15))
        );
    }

    #[test]
    fn parse_rejects_foreign_names() {
        assert_eq!(parse("readme-banner.png"), None);
        assert_eq!(parse("2026-01-10.jpg"), None);
        assert_eq!(parse("2026-1-10.png"), None);
        assert_eq!(parse("screenshot-2024-01-15.png"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn parse_rejects_calendar_impossible_dates() {
        assert_eq!(parse("2026-13-01.png"), None);
        assert_eq!(parse("2026-02-30.png"), None);
    }

    proptest! {
        #[test]
        fn name_parse_round_trip(y in 1970i32..=2100, m in 1u32..=12, d in 1u32..=31) {
            prop_assume!(NaiveDate::from_ymd_opt(y, m, d).is_some());
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            prop_assert_eq!(parse(&name_for(date)), Some(date));
        }
    }
}
