use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::Value;

use hotelq_core::{fields, Context, ExtractError, Extractor, PartialState};

use super::date::DATE_RE;
use super::{pattern, Pattern};

const AMOUNT: &str = r"(\d[\d,]*(?:\.\d+)?)\s*(k|千|萬|万)?";

static RANGE_RE: Pattern = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){AMOUNT}\s*(?:元|塊)?\s*(?:-|~|～|到|至|to)\s*\$?{AMOUNT}")).ok()
});

static UNDER_RE: Pattern = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:under|below|less than|at most|max|不超過|低於|少於|最多)\s*\$?\s*{AMOUNT}|{AMOUNT}\s*(?:元|塊)?\s*(?:以下|以內|以内)"
    ))
    .ok()
});

static OVER_RE: Pattern = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:over|above|more than|at least|高於|超過|至少)\s*\$?\s*{AMOUNT}|{AMOUNT}\s*(?:元|塊)?\s*以上"
    ))
    .ok()
});

const BUDGET_CUES: &[&str] =
    &["預算", "价格", "價格", "房價", "每晚", "budget", "price", "$", "元", "塊"];

/// Smallest amount a cue-less range is taken for a price.
const MIN_BARE_AMOUNT: i64 = 100;

const OWNED: &[&str] = &[fields::PRICE_MIN, fields::PRICE_MAX];

/// Amount from a captured number and optional unit, starting at group `at`.
fn amount(c: &Captures<'_>, at: usize) -> Option<i64> {
    let digits = c.get(at)?.as_str().replace(',', "");
    let base: f64 = digits.parse().ok()?;
    let unit = match c.get(at + 1).map(|m| m.as_str().to_lowercase()) {
        Some(u) if u == "k" || u == "千" => 1_000.0,
        Some(u) if u == "萬" || u == "万" => 10_000.0,
        _ => 1.0,
    };
    Some((base * unit).round() as i64)
}

/// First amount in either alternative of a two-branch pattern.
fn bound(re: &Regex, text: &str) -> Option<i64> {
    re.captures(text).and_then(|c| amount(&c, 1).or_else(|| amount(&c, 3)))
}

/// Price bounds per night: ranges (`3000-5000`, `3千到5千`), `under N` /
/// `N以下`, `over N` / `N以上`, or `context["budget"]` as a number (max) or
/// `{min, max}` object. Swapped bounds are put back in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BudgetExtractor;

impl BudgetExtractor {
    pub fn new() -> Self {
        Self
    }

    fn from_text(text: &str) -> Result<(Option<i64>, Option<i64>), ExtractError> {
        // Dates look like ranges.
        let text = pattern(&DATE_RE, "date")?.replace_all(text, " ");
        let lower = text.to_lowercase();
        let cued = BUDGET_CUES.iter().any(|cue| lower.contains(cue));

        if let Some(c) = pattern(&RANGE_RE, "price range")?.captures(&text) {
            if let (Some(lo), Some(hi)) = (amount(&c, 1), amount(&c, 3)) {
                if cued || lo.min(hi) >= MIN_BARE_AMOUNT {
                    return Ok((Some(lo), Some(hi)));
                }
            }
        }
        let max = bound(pattern(&UNDER_RE, "price ceiling")?, &text);
        let min = bound(pattern(&OVER_RE, "price floor")?, &text);
        Ok((min, max))
    }

    fn from_context(context: &Context) -> (Option<i64>, Option<i64>) {
        match context.get("budget") {
            Some(Value::Number(n)) => (None, n.as_f64().map(|f| f.round() as i64)),
            Some(Value::Object(o)) => (
                o.get("min").and_then(Value::as_f64).map(|f| f.round() as i64),
                o.get("max").and_then(Value::as_f64).map(|f| f.round() as i64),
            ),
            _ => (None, None),
        }
    }
}

#[async_trait]
impl Extractor for BudgetExtractor {
    fn name(&self) -> &str {
        "budget"
    }

    fn owned_fields(&self) -> &[&str] {
        OWNED
    }

    fn default_output(&self) -> PartialState {
        PartialState::new()
    }

    async fn extract(&self, query: &str, context: &Context) -> Result<PartialState, ExtractError> {
        let (mut min, mut max) = Self::from_text(query)?;
        if min.is_none() && max.is_none() {
            (min, max) = Self::from_context(context);
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                (min, max) = (Some(hi), Some(lo));
            }
        }

        let mut out = PartialState::new();
        if let Some(lo) = min.filter(|v| *v > 0) {
            out.insert(fields::PRICE_MIN, lo);
        }
        if let Some(hi) = max.filter(|v| *v > 0) {
            out.insert(fields::PRICE_MAX, hi);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(q: &str) -> PartialState {
        BudgetExtractor::new().extract(q, &Context::new()).await.unwrap()
    }

    #[tokio::test]
    async fn ranges_and_units() {
        let out = run("預算3千到5千").await;
        assert_eq!(out.get(fields::PRICE_MIN), Some(&json!(3000)));
        assert_eq!(out.get(fields::PRICE_MAX), Some(&json!(5000)));

        let out = run("5,000-3,000").await;
        assert_eq!(out.get(fields::PRICE_MIN), Some(&json!(3000)), "swapped bounds are reordered");
    }

    #[tokio::test]
    async fn open_bounds() {
        assert_eq!(run("每晚4000元以下").await.get(fields::PRICE_MAX), Some(&json!(4000)));
        assert_eq!(run("under $120").await.get(fields::PRICE_MAX), Some(&json!(120)));
        let out = run("2000以上").await;
        assert_eq!(out.get(fields::PRICE_MIN), Some(&json!(2000)));
        assert_eq!(out.get(fields::PRICE_MAX), None);
    }

    #[tokio::test]
    async fn dates_are_not_prices() {
        assert!(run("2025-03-01 到 2025-03-03").await.is_empty());
        assert!(run("2-3 nights").await.is_empty());
    }

    #[tokio::test]
    async fn context_budget_is_a_fallback() {
        let mut ctx = Context::new();
        ctx.insert("budget".into(), json!({"min": 1000, "max": 2500}));
        let out = BudgetExtractor::new().extract("台北", &ctx).await.unwrap();
        assert_eq!(out.get(fields::PRICE_MAX), Some(&json!(2500)));
    }
}
