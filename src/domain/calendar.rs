use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Meteorological season, northern-hemisphere calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    pub fn for_date(date: NaiveDate) -> Self {
        Self::from_month(date.month())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "autumn" | "fall" => Ok(Season::Autumn),
            "winter" => Ok(Season::Winter),
            other => Err(format!("unknown season: {other}")),
        }
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Contiguous first-of-month dates starting at the month containing `start`.
/// `None` when the last month falls outside the representable date range.
pub fn month_sequence(start: NaiveDate, count: u32) -> Option<Vec<NaiveDate>> {
    let first = first_of_month(start);
    (0..count)
        .map(|offset| first.checked_add_months(Months::new(offset)))
        .collect()
}

/// First day of the last month of a `count`-month run starting at `start`.
pub fn last_month(start: NaiveDate, count: u32) -> Option<NaiveDate> {
    first_of_month(start).checked_add_months(Months::new(count.checked_sub(1)?))
}

/// The `count` months immediately before the month containing `start`, oldest first.
pub fn preceding_months(start: NaiveDate, count: u32) -> Vec<NaiveDate> {
    let first = first_of_month(start);
    (1..=count)
        .rev()
        .filter_map(|offset| first.checked_sub_months(Months::new(offset)))
        .collect()
}

pub fn month_key(date: NaiveDate) -> String {
    first_of_month(date).format("%Y-%m-%d").to_string()
}

/// Parses `YYYY-MM-DD`, ignoring any trailing time component.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let date = match text.split_once('T') {
        Some((date_part, _)) => date_part,
        None => text,
    };
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::on_date;
    use proptest::prelude::*;

    #[test]
    fn seasons_follow_calendar_months() {
        let test_cases = vec![
            (1, Season::Winter),
            (2, Season::Winter),
            (3, Season::Spring),
            (5, Season::Spring),
            (6, Season::Summer),
            (8, Season::Summer),
            (9, Season::Autumn),
            (11, Season::Autumn),
            (12, Season::Winter),
        ];

        for (month, expected) in test_cases {
            assert_eq!(Season::from_month(month), expected, "month {month}");
        }
    }

    #[test]
    fn month_sequence_rolls_over_year_boundary() {
        let months = month_sequence(on_date(2025, 11, 17), 4).unwrap();
        let keys: Vec<String> = months.into_iter().map(month_key).collect();
        assert_eq!(
            keys,
            vec!["2025-11-01", "2025-12-01", "2026-01-01", "2026-02-01"]
        );
    }

    #[test]
    fn month_sequence_refuses_to_truncate() {
        assert_eq!(month_sequence(on_date(2026, 1, 1), 4_000_000), None);
        assert_eq!(last_month(on_date(2026, 1, 1), 4_000_000), None);
        assert_eq!(last_month(on_date(2026, 1, 15), 14), Some(on_date(2027, 2, 1)));
        assert_eq!(last_month(on_date(2026, 1, 15), 0), None);
    }

    #[test]
    fn preceding_months_end_just_before_start() {
        let months = preceding_months(on_date(2026, 2, 10), 3);
        assert_eq!(
            months,
            vec![on_date(2025, 11, 1), on_date(2025, 12, 1), on_date(2026, 1, 1)]
        );
    }

    #[test]
    fn parse_date_ignores_time_suffix() {
        assert_eq!(parse_date("2026-03-04T10:00:00Z"), Some(on_date(2026, 3, 4)));
        assert_eq!(parse_date("2026-03-04"), Some(on_date(2026, 3, 4)));
        assert_eq!(parse_date("04/03/2026"), None);
    }

    #[test]
    fn season_parses_case_insensitively() {
        assert_eq!("Summer".parse::<Season>(), Ok(Season::Summer));
        assert_eq!("fall".parse::<Season>(), Ok(Season::Autumn));
        assert!("monsoon".parse::<Season>().is_err());
    }

    proptest! {
        #[test]
        fn month_sequence_is_contiguous_first_of_month(
            year in 1990i32..2100,
            month in 1u32..=12,
            day in 1u32..=28,
            count in 1u32..=60,
        ) {
            let start = on_date(year, month, day);
            let months = month_sequence(start, count).unwrap();

            prop_assert_eq!(months.len(), count as usize);
            prop_assert_eq!(months[0], first_of_month(start));
            for date in &months {
                prop_assert_eq!(date.day(), 1);
            }
            for pair in months.windows(2) {
                prop_assert!(pair[0] < pair[1]);
                prop_assert_eq!(pair[0].checked_add_months(Months::new(1)), Some(pair[1]));
            }
        }
    }
}
