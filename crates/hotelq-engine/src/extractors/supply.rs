use async_trait::async_trait;
use serde_json::json;

use hotelq_core::{fields, Context, ExtractError, Extractor, PartialState};

const OWNED: &[&str] = &[fields::SUPPLY_NAMES];

/// In-room supplies (`吹風機`, `浴袍`, `hair dryer`) the guest asks for.
/// Each vocabulary term maps to a canonical supply name; terms are matched
/// as lowercase substrings.
#[derive(Debug, Clone)]
pub struct SupplyExtractor {
    vocabulary: Vec<(String, String)>,
}

impl Default for SupplyExtractor {
    fn default() -> Self {
        let zh = [
            "牙刷", "牙膏", "洗髮精", "沐浴乳", "浴帽", "拖鞋", "浴袍", "毛巾", "浴巾", "吹風機",
            "熨斗", "保險箱", "冰箱", "電熱水壺", "咖啡機", "茶包", "礦泉水", "雨傘", "充電器",
            "轉接頭", "嬰兒床", "奶瓶", "微波爐", "洗衣機", "眼罩", "耳塞",
        ];
        let en = [
            ("toothbrush", "牙刷"),
            ("shampoo", "洗髮精"),
            ("slippers", "拖鞋"),
            ("bathrobe", "浴袍"),
            ("towel", "毛巾"),
            ("hair dryer", "吹風機"),
            ("hairdryer", "吹風機"),
            ("fridge", "冰箱"),
            ("kettle", "電熱水壺"),
            ("coffee machine", "咖啡機"),
            ("umbrella", "雨傘"),
            ("charger", "充電器"),
            ("adapter", "轉接頭"),
            ("baby cot", "嬰兒床"),
            ("microwave", "微波爐"),
            ("washing machine", "洗衣機"),
            ("earplugs", "耳塞"),
        ];
        Self::new(zh.into_iter().map(|t| (t, t)).chain(en))
    }
}

impl SupplyExtractor {
    pub fn new<S, N>(vocabulary: impl IntoIterator<Item = (S, N)>) -> Self
    where
        S: Into<String>,
        N: Into<String>,
    {
        let vocabulary = vocabulary
            .into_iter()
            .map(|(term, name)| (term.into().to_lowercase(), name.into()))
            .collect();
        Self { vocabulary }
    }
}

#[async_trait]
impl Extractor for SupplyExtractor {
    fn name(&self) -> &str {
        "supply"
    }

    fn owned_fields(&self) -> &[&str] {
        OWNED
    }

    fn default_output(&self) -> PartialState {
        PartialState::new()
    }

    async fn extract(&self, query: &str, _context: &Context) -> Result<PartialState, ExtractError> {
        let text = query.to_lowercase();
        let mut names: Vec<&str> = Vec::new();
        for (term, name) in &self.vocabulary {
            if text.contains(term.as_str()) && !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        if names.is_empty() {
            return Ok(PartialState::new());
        }
        tracing::debug!(?names, "supplies requested");
        Ok(PartialState::new().with(fields::SUPPLY_NAMES, json!(names)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synonyms_collapse_to_one_name() {
        let out = SupplyExtractor::default()
            .extract("房間要有吹風機和浴袍, a hair dryer please", &Context::new())
            .await
            .unwrap();
        assert_eq!(out.get(fields::SUPPLY_NAMES), Some(&json!(["浴袍", "吹風機"])));
    }

    #[tokio::test]
    async fn nothing_requested_leaves_the_default() {
        let out =
            SupplyExtractor::default().extract("台北兩晚 有停車場", &Context::new()).await.unwrap();
        assert!(out.is_empty());
    }
}
