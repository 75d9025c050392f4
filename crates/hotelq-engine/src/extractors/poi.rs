use async_trait::async_trait;
use serde_json::{json, Value};

use hotelq_core::{fields, Context, ExtractError, Extractor, PartialState};

const OWNED: &[&str] = &[fields::POI_KEYWORDS];

/// Kinds of places the guest wants nearby, plus any strings in
/// `context["poi_keywords"]`.
#[derive(Debug, Clone)]
pub struct PoiExtractor {
    vocabulary: Vec<(String, String)>,
}

impl Default for PoiExtractor {
    fn default() -> Self {
        Self::new([
            ("夜市", "夜市"),
            ("night market", "夜市"),
            ("景點", "景點"),
            ("attraction", "景點"),
            ("餐廳", "餐廳"),
            ("美食", "餐廳"),
            ("restaurant", "餐廳"),
            ("咖啡廳", "咖啡廳"),
            ("cafe", "咖啡廳"),
            ("捷運", "捷運站"),
            ("mrt", "捷運站"),
            ("火車站", "車站"),
            ("車站", "車站"),
            ("train station", "車站"),
            ("老街", "老街"),
            ("博物館", "博物館"),
            ("museum", "博物館"),
            ("百貨", "百貨公司"),
            ("department store", "百貨公司"),
            ("公園", "公園"),
            ("海灘", "海灘"),
            ("beach", "海灘"),
        ])
    }
}

impl PoiExtractor {
    pub fn new<S, N>(vocabulary: impl IntoIterator<Item = (S, N)>) -> Self
    where
        S: Into<String>,
        N: Into<String>,
    {
        let vocabulary = vocabulary
            .into_iter()
            .map(|(term, kind)| (term.into().to_lowercase(), kind.into()))
            .collect();
        Self { vocabulary }
    }
}

#[async_trait]
impl Extractor for PoiExtractor {
    fn name(&self) -> &str {
        "poi"
    }

    fn owned_fields(&self) -> &[&str] {
        OWNED
    }

    fn default_output(&self) -> PartialState {
        PartialState::new()
    }

    async fn extract(&self, query: &str, context: &Context) -> Result<PartialState, ExtractError> {
        let text = query.to_lowercase();
        let mut keywords: Vec<String> = Vec::new();
        let mut push = |k: &str| {
            let k = k.trim();
            if !k.is_empty() && !keywords.iter().any(|have| have == k) {
                keywords.push(k.to_string());
            }
        };
        for (term, kind) in &self.vocabulary {
            if text.contains(term.as_str()) {
                push(kind);
            }
        }
        let hinted = context.get("poi_keywords").and_then(Value::as_array);
        for k in hinted.into_iter().flatten().filter_map(Value::as_str) {
            push(k);
        }

        if keywords.is_empty() {
            return Ok(PartialState::new());
        }
        Ok(PartialState::new().with(fields::POI_KEYWORDS, json!(keywords)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vocabulary_and_context_hints() {
        let mut ctx = Context::new();
        ctx.insert("poi_keywords".into(), json!(["溫泉", "夜市"]));
        let out = PoiExtractor::default().extract("想住在捷運和夜市附近", &ctx).await.unwrap();
        assert_eq!(out.get(fields::POI_KEYWORDS), Some(&json!(["夜市", "捷運站", "溫泉"])));
    }

    #[tokio::test]
    async fn station_words_map_once() {
        let out = PoiExtractor::default().extract("近火車站", &Context::new()).await.unwrap();
        assert_eq!(out.get(fields::POI_KEYWORDS), Some(&json!(["車站"])));
        let none = PoiExtractor::default().extract("台北兩晚", &Context::new()).await.unwrap();
        assert!(none.is_empty());
    }
}
