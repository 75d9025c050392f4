use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use hotelq_core::{fields, Context, ExtractError, Extractor, PartialState};

use super::{pattern, Pattern};

static QUOTED_RE: Pattern =
    LazyLock::new(|| Regex::new(r#"[「『"“]\s*([^」』"”]{2,}?)\s*[」』"”]"#).ok());

static PLAN_RE: Pattern =
    LazyLock::new(|| Regex::new(r"(?i)(?:plan|方案|專案)\s*[:：]\s*([^,，。;；\n]+)").ok());

const OWNED: &[&str] = &[fields::HOTEL_KEYWORD, fields::PLAN_KEYWORD];

/// A quoted hotel name (`「礁溪老爺」`, `"Grand Hotel"`) and a `plan:` phrase.
/// `context["hotel_name"]` stands in when nothing is quoted.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for KeywordExtractor {
    fn name(&self) -> &str {
        "keyword"
    }

    fn owned_fields(&self) -> &[&str] {
        OWNED
    }

    fn default_output(&self) -> PartialState {
        PartialState::new()
    }

    async fn extract(&self, query: &str, context: &Context) -> Result<PartialState, ExtractError> {
        let mut out = PartialState::new();

        let quoted =
            pattern(&QUOTED_RE, "quoted name")?.captures(query).map(|c| c[1].trim().to_string());
        let from_context =
            context.get("hotel_name").and_then(Value::as_str).map(|s| s.trim().to_string());
        if let Some(name) = quoted.or(from_context).filter(|s| !s.is_empty()) {
            out.insert(fields::HOTEL_KEYWORD, name);
        }

        if let Some(c) = pattern(&PLAN_RE, "plan")?.captures(query) {
            let plan = c[1].trim();
            if !plan.is_empty() {
                out.insert(fields::PLAN_KEYWORD, plan);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn quoted_name_and_plan() {
        let out = KeywordExtractor::new()
            .extract("「礁溪老爺」 方案：雙人泡湯，含早", &Context::new())
            .await
            .unwrap();
        assert_eq!(out.get(fields::HOTEL_KEYWORD), Some(&json!("礁溪老爺")));
        assert_eq!(out.get(fields::PLAN_KEYWORD), Some(&json!("雙人泡湯")));
    }

    #[tokio::test]
    async fn context_name_is_a_fallback() {
        let mut ctx = Context::new();
        ctx.insert("hotel_name".into(), json!("Grand Hotel"));
        let out = KeywordExtractor::new().extract("any rooms?", &ctx).await.unwrap();
        assert_eq!(out.get(fields::HOTEL_KEYWORD), Some(&json!("Grand Hotel")));
        assert_eq!(out.get(fields::PLAN_KEYWORD), None);
    }
}
