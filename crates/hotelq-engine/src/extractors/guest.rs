use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use hotelq_core::{fields, Context, ExtractError, Extractor, PartialState};

use super::{pattern, small_number, Pattern, NUMERAL};

static ADULTS_RE: Pattern = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){NUMERAL}\s*(?:個|个|位|名)?\s*(?:大人|成人|大|adults?)")).ok()
});

static CHILDREN_RE: Pattern = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){NUMERAL}\s*(?:個|个|位|名)?\s*(?:小孩|兒童|孩子|小|children|child|kids?)")).ok()
});

static TOTAL_RE: Pattern = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){NUMERAL}\s*(?:個|个|位|名)?\s*(?:人|guests?|people|persons?)")).ok()
});

const COUPLE_WORDS: &[&str] = &["夫妻", "情侶", "夫婦", "兩口子", "couple"];

const OWNED: &[&str] = &[fields::ADULTS, fields::CHILDREN];

fn count(re: &Regex, text: &str) -> Option<i64> {
    re.captures(text).and_then(|c| small_number(&c[1])).filter(|n| (1..=30).contains(n))
}

/// Adult and child counts: `2大1小`, `2 adults 1 child`, `三人`, `夫妻`.
/// A bare head count is split into adults after subtracting children.
#[derive(Debug, Default, Clone, Copy)]
pub struct GuestExtractor;

impl GuestExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for GuestExtractor {
    fn name(&self) -> &str {
        "guest"
    }

    fn owned_fields(&self) -> &[&str] {
        OWNED
    }

    fn default_output(&self) -> PartialState {
        PartialState::new()
    }

    async fn extract(&self, query: &str, _context: &Context) -> Result<PartialState, ExtractError> {
        // "3小時" is a duration, not three children.
        let text = query.replace("小時", " ").replace("小时", " ");
        let children = count(pattern(&CHILDREN_RE, "children")?, &text).unwrap_or(0);
        let mut adults = count(pattern(&ADULTS_RE, "adults")?, &text).unwrap_or(0);
        if adults == 0 {
            if let Some(total) = count(pattern(&TOTAL_RE, "guests")?, &text) {
                adults = (total - children).max(1);
            } else if COUPLE_WORDS.iter().any(|w| text.to_lowercase().contains(w)) {
                adults = 2;
            }
        }

        let mut out = PartialState::new();
        if adults > 0 {
            out.insert(fields::ADULTS, adults);
        }
        if children > 0 {
            out.insert(fields::CHILDREN, children);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(q: &str) -> PartialState {
        GuestExtractor::new().extract(q, &Context::new()).await.unwrap()
    }

    #[tokio::test]
    async fn adults_and_children() {
        let out = run("2大1小 台北").await;
        assert_eq!(out.get(fields::ADULTS), Some(&json!(2)));
        assert_eq!(out.get(fields::CHILDREN), Some(&json!(1)));

        let out = run("2 adults and 1 child").await;
        assert_eq!(out.get(fields::ADULTS), Some(&json!(2)));
    }

    #[tokio::test]
    async fn head_count_and_couples() {
        assert_eq!(run("我們三人").await.get(fields::ADULTS), Some(&json!(3)));
        assert_eq!(run("4人 含1個小孩").await.get(fields::ADULTS), Some(&json!(3)));
        assert_eq!(run("夫妻旅行").await.get(fields::ADULTS), Some(&json!(2)));
    }

    #[tokio::test]
    async fn durations_are_not_children() {
        assert!(run("車程3小時內").await.is_empty());
    }
}
