use async_trait::async_trait;

use hotelq_core::{fields, Context, ExtractError, Extractor, PartialState};

struct Meal {
    field: &'static str,
    words: &'static [&'static str],
    negations: &'static [&'static str],
}

const MEALS: [Meal; 3] = [
    Meal {
        field: fields::HAS_BREAKFAST,
        words: &["早餐", "早點", "早飯", "含早", "breakfast", "half board", "full board"],
        negations: &[
            "不要早餐",
            "不含早餐",
            "不需要早餐",
            "沒有早餐",
            "no breakfast",
            "without breakfast",
        ],
    },
    Meal {
        field: fields::HAS_LUNCH,
        words: &["午餐", "午飯", "中餐", "lunch", "full board"],
        negations: &["不要午餐", "不含午餐", "不需要午餐", "沒有午餐", "no lunch", "without lunch"],
    },
    Meal {
        field: fields::HAS_DINNER,
        words: &["晚餐", "晚飯", "含晚", "dinner", "half board", "full board"],
        negations: &[
            "不要晚餐",
            "不含晚餐",
            "不需要晚餐",
            "沒有晚餐",
            "no dinner",
            "without dinner",
        ],
    },
];

const OWNED: &[&str] = &[fields::HAS_BREAKFAST, fields::HAS_LUNCH, fields::HAS_DINNER];

/// Meal requirements from Chinese and English meal words. Negated mentions
/// ("不含早餐", "no breakfast") do not count.
#[derive(Debug, Default, Clone, Copy)]
pub struct MealExtractor;

impl MealExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for MealExtractor {
    fn name(&self) -> &str {
        "meal"
    }

    fn owned_fields(&self) -> &[&str] {
        OWNED
    }

    fn default_output(&self) -> PartialState {
        OWNED.iter().map(|f| (f.to_string(), false.into())).collect()
    }

    async fn extract(&self, query: &str, _context: &Context) -> Result<PartialState, ExtractError> {
        let text = query.to_lowercase();
        let mut out = self.default_output();
        for meal in &MEALS {
            let cleaned = meal.negations.iter().fold(text.clone(), |t, n| t.replace(n, " "));
            if meal.words.iter().any(|w| cleaned.contains(w)) {
                out.insert(meal.field, true);
            }
        }
        Ok(out)
    }
}
