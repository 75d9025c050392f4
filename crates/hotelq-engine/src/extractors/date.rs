use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use regex::Regex;

use hotelq_core::{fields, Context, ExtractError, Extractor, PartialState};

use super::{pattern, small_number, Pattern, NUMERAL};

pub(crate) static DATE_RE: Pattern = LazyLock::new(|| {
    Regex::new(r"(\d{4})\s*[-/.年]\s*(\d{1,2})\s*[-/.月]\s*(\d{1,2})\s*[日號号]?").ok()
});

static NIGHTS_RE: Pattern =
    LazyLock::new(|| Regex::new(&format!(r"(?i){NUMERAL}\s*(?:nights?|晚|夜)")).ok());

const OWNED: &[&str] = &[fields::CHECK_IN, fields::CHECK_OUT];

/// ISO-like dates (`2025-03-01`, `2025/3/1`, `2025年3月1日`) plus an optional
/// night count. A lone date is a one-night stay.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Calendar-valid dates in order of appearance.
    pub fn dates(text: &str) -> Result<Vec<NaiveDate>, ExtractError> {
        let re = pattern(&DATE_RE, "date")?;
        Ok(re
            .captures_iter(text)
            .filter_map(|c| {
                let y = c[1].parse().ok()?;
                let m = c[2].parse().ok()?;
                let d = c[3].parse().ok()?;
                NaiveDate::from_ymd_opt(y, m, d)
            })
            .collect())
    }

    fn nights(text: &str) -> Result<Option<i64>, ExtractError> {
        let re = pattern(&NIGHTS_RE, "nights")?;
        Ok(re.captures(text).and_then(|c| small_number(&c[1])).filter(|n| (1..=60).contains(n)))
    }
}

/// Check-out `nights` after `check_in`, or `None` past the calendar's end.
fn stay_end(check_in: NaiveDate, nights: i64) -> Option<NaiveDate> {
    check_in.checked_add_signed(Duration::days(nights))
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl Extractor for DateExtractor {
    fn name(&self) -> &str {
        "date"
    }

    fn owned_fields(&self) -> &[&str] {
        OWNED
    }

    fn default_output(&self) -> PartialState {
        PartialState::new()
    }

    async fn extract(&self, query: &str, _context: &Context) -> Result<PartialState, ExtractError> {
        let dates = Self::dates(query)?;
        let Some(&check_in) = dates.first() else {
            return Ok(PartialState::new());
        };
        let check_out = match dates.get(1) {
            Some(&out) if out > check_in => Some(out),
            _ => stay_end(check_in, Self::nights(query)?.unwrap_or(1)),
        };
        let mut out = PartialState::new().with(fields::CHECK_IN, iso(check_in));
        match check_out {
            Some(check_out) => {
                tracing::debug!(%check_in, %check_out, "dates extracted");
                out = out.with(fields::CHECK_OUT, iso(check_out));
            }
            None => tracing::debug!(%check_in, "check-out out of calendar range"),
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(q: &str) -> PartialState {
        DateExtractor::new().extract(q, &Context::new()).await.unwrap()
    }

    #[tokio::test]
    async fn range_of_two_dates() {
        let out = run("2025-03-01到2025/3/03 台北").await;
        assert_eq!(out.get(fields::CHECK_IN), Some(&json!("2025-03-01")));
        assert_eq!(out.get(fields::CHECK_OUT), Some(&json!("2025-03-03")));
    }

    #[tokio::test]
    async fn single_date_with_and_without_nights() {
        let out = run("2025年12月30日入住").await;
        assert_eq!(out.get(fields::CHECK_OUT), Some(&json!("2025-12-31")));
        let out = run("2025-12-30 住三晚").await;
        assert_eq!(out.get(fields::CHECK_OUT), Some(&json!("2026-01-02")));
    }

    #[test]
    fn stay_past_the_last_calendar_day_has_no_end() {
        assert_eq!(stay_end(NaiveDate::MAX, 1), None);
        let last = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(stay_end(last, 2), NaiveDate::from_ymd_opt(2026, 1, 2));
    }

    #[tokio::test]
    async fn far_future_stay_does_not_panic() {
        let out = run("9999-12-31 住60晚").await;
        assert_eq!(out.get(fields::CHECK_IN), Some(&json!("9999-12-31")));
        assert!(out.get(fields::CHECK_OUT).is_some());
    }

    #[tokio::test]
    async fn invalid_dates_are_ignored() {
        assert!(run("2025-02-30").await.is_empty());
        assert!(run("下週末").await.is_empty());
    }
}
