//! Reference extractors. Lightweight rule-based stand-ins: each one owns a
//! handful of fields and leaves them at their defaults when it finds nothing.

mod budget;
mod date;
mod facility;
mod geo;
mod guest;
mod keyword;
mod meal;
mod poi;
mod supply;

pub use budget::BudgetExtractor;
pub use date::DateExtractor;
pub use facility::{Amenity, FacilityExtractor};
pub use geo::GeoExtractor;
pub use guest::GuestExtractor;
pub use keyword::KeywordExtractor;
pub use meal::MealExtractor;
pub use poi::PoiExtractor;
pub use supply::SupplyExtractor;

use std::sync::LazyLock;

use regex::Regex;

use hotelq_core::ExtractError;

type Pattern = LazyLock<Option<Regex>>;

fn pattern(re: &'static Pattern, what: &str) -> Result<&'static Regex, ExtractError> {
    re.as_ref().ok_or_else(|| ExtractError::Failed(format!("{what} pattern failed to compile")))
}

/// Arabic digits or a single Chinese numeral up to ten.
fn small_number(s: &str) -> Option<i64> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    let n = match s {
        "一" => 1,
        "二" | "兩" | "两" => 2,
        "三" => 3,
        "四" => 4,
        "五" => 5,
        "六" => 6,
        "七" => 7,
        "八" => 8,
        "九" => 9,
        "十" => 10,
        _ => return None,
    };
    Some(n)
}

const NUMERAL: &str = r"(\d+|[一二兩两三四五六七八九十])";
