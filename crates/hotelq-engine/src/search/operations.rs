use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Map, Value};

use hotelq_core::{fields, AnchorHotel, SearchError, SearchFilters, SearchOperation};

use super::LodgingBackend;

fn check_stay(filters: &SearchFilters) -> Result<(), SearchError> {
    match filters.nights() {
        Some(n) if n <= 0 => {
            let reason = format!("check-out is {n} day(s) after check-in");
            Err(SearchError::InvalidFilters(reason))
        }
        _ => Ok(()),
    }
}

/// Vacancy search by region, dates and every optional filter.
pub struct HotelSearch {
    backend: Arc<dyn LodgingBackend>,
}

impl HotelSearch {
    pub fn new(backend: Arc<dyn LodgingBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SearchOperation for HotelSearch {
    fn name(&self) -> &str {
        "hotel_search"
    }

    fn result_field(&self) -> &str {
        fields::HOTELS
    }

    fn dedup_key(&self) -> &str {
        "id"
    }

    fn prerequisites(&self) -> &[&str] {
        &[fields::REGION_IDS, fields::CHECK_IN, fields::CHECK_OUT]
    }

    fn consumes(&self) -> &[&str] {
        &[
            fields::ADULTS,
            fields::CHILDREN,
            fields::PRICE_MIN,
            fields::PRICE_MAX,
            fields::SUBREGION_IDS,
            fields::HOTEL_FACILITY_IDS,
            fields::ROOM_FACILITY_IDS,
            fields::HAS_BREAKFAST,
            fields::HAS_LUNCH,
            fields::HAS_DINNER,
            fields::HOTEL_TYPES,
            fields::SUPPLY_NAMES,
        ]
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Value>, SearchError> {
        check_stay(filters)?;
        self.backend.search_vacancies(filters).await
    }
}

/// Hotel lookup by (partial) name.
pub struct FuzzyHotelSearch {
    backend: Arc<dyn LodgingBackend>,
}

impl FuzzyHotelSearch {
    pub fn new(backend: Arc<dyn LodgingBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SearchOperation for FuzzyHotelSearch {
    fn name(&self) -> &str {
        "fuzzy_search"
    }

    fn result_field(&self) -> &str {
        fields::FUZZY_HOTELS
    }

    fn dedup_key(&self) -> &str {
        "id"
    }

    fn prerequisites(&self) -> &[&str] {
        &[fields::HOTEL_KEYWORD]
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Value>, SearchError> {
        let keyword = filters
            .hotel_keyword
            .as_deref()
            .ok_or_else(|| SearchError::InvalidFilters("hotel keyword missing".into()))?;
        self.backend.search_by_name(keyword).await
    }
}

/// Plans of a named hotel starting on the check-in date.
pub struct PlanSearch {
    backend: Arc<dyn LodgingBackend>,
}

impl PlanSearch {
    pub fn new(backend: Arc<dyn LodgingBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SearchOperation for PlanSearch {
    fn name(&self) -> &str {
        "plan_search"
    }

    fn result_field(&self) -> &str {
        fields::PLANS
    }

    fn dedup_key(&self) -> &str {
        "plan_id"
    }

    fn prerequisites(&self) -> &[&str] {
        &[fields::HOTEL_KEYWORD, fields::CHECK_IN]
    }

    fn consumes(&self) -> &[&str] {
        &[
            fields::PLAN_KEYWORD,
            fields::CHECK_OUT,
            fields::ADULTS,
            fields::CHILDREN,
            fields::PRICE_MIN,
            fields::PRICE_MAX,
            fields::REGION_IDS,
        ]
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Value>, SearchError> {
        check_stay(filters)?;
        self.backend.search_plans(filters).await
    }
}

/// Hotels searched around per request.
const POI_HOTELS: usize = 3;
/// Keywords looked up per hotel.
const POI_KEYWORDS: usize = 5;

/// Places near the first hotels found so far, grouped by keyword. Every
/// (hotel, keyword) pair is one backend call; a failed call counts as no
/// places. Hotels with nothing nearby are left out.
pub struct PoiSearch {
    backend: Arc<dyn LodgingBackend>,
}

impl PoiSearch {
    pub fn new(backend: Arc<dyn LodgingBackend>) -> Self {
        Self { backend }
    }

    async fn around(&self, hotel: &AnchorHotel, keywords: &[String]) -> Option<Value> {
        let lookups = keywords.iter().map(|keyword| async move {
            match self.backend.search_nearby(&hotel.name, keyword).await {
                Ok(places) => (keyword, places),
                Err(err) => {
                    tracing::warn!(
                        hotel = %hotel.name,
                        keyword = %keyword,
                        error = %err,
                        "nearby search failed"
                    );
                    (keyword, Vec::new())
                }
            }
        });
        let pois: Map<String, Value> = join_all(lookups)
            .await
            .into_iter()
            .filter(|(_, places)| !places.is_empty())
            .map(|(keyword, places)| (keyword.clone(), Value::Array(places)))
            .collect();
        (!pois.is_empty())
            .then(|| json!({"hotel_id": hotel.id, "hotel_name": hotel.name, "pois": pois}))
    }
}

#[async_trait]
impl SearchOperation for PoiSearch {
    fn name(&self) -> &str {
        "poi_search"
    }

    fn result_field(&self) -> &str {
        fields::POIS
    }

    fn dedup_key(&self) -> &str {
        "hotel_id"
    }

    fn prerequisites(&self) -> &[&str] {
        &[fields::POI_KEYWORDS]
    }

    fn prerequisites_any(&self) -> &[&str] {
        &[fields::HOTELS, fields::FUZZY_HOTELS, fields::PLANS]
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Value>, SearchError> {
        if filters.anchor_hotels.is_empty() {
            return Err(SearchError::InvalidFilters("no hotel to search around".into()));
        }
        let keywords = &filters.poi_keywords[..filters.poi_keywords.len().min(POI_KEYWORDS)];
        let hotels = filters.anchor_hotels.iter().take(POI_HOTELS);
        let found = join_all(hotels.map(|hotel| self.around(hotel, keywords))).await;
        Ok(found.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticBackend;
    use chrono::NaiveDate;

    const FIXTURES: &str = r#"{
        "hotels": [
            {"id": 1, "name": "Harbour Inn", "region_id": 4, "price": 1800},
            {"id": 2, "name": "Harbour View", "region_id": 4, "price": 4200}
        ],
        "plans": [
            {"plan_id": "a", "hotel_name": "Harbour Inn", "plan_name": "Early bird", "price": 1500},
            {"plan_id": "b", "hotel_name": "Harbour Inn", "plan_name": "Family", "price": 2500}
        ],
        "pois": [
            {"hotel_name": "Harbour Inn", "keyword": "夜市", "name": "Harbour Night Market"},
            {"hotel_name": "Harbour Inn", "keyword": "夜市", "name": "Pier Stalls"},
            {"hotel_name": "Harbour View", "keyword": "博物館", "name": "Maritime Museum"}
        ]
    }"#;

    fn backend() -> Arc<StaticBackend> {
        Arc::new(StaticBackend::from_json(FIXTURES).expect("fixtures"))
    }

    fn stay(nights: u64) -> SearchFilters {
        let check_in = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
        SearchFilters {
            check_in: Some(check_in),
            check_out: check_in.checked_add_days(chrono::Days::new(nights)),
            region_ids: vec![4],
            ..SearchFilters::default()
        }
    }

    #[tokio::test]
    async fn zero_night_stay_is_rejected_before_the_backend() {
        let backend = backend();
        let op = HotelSearch::new(backend.clone());
        assert!(matches!(op.search(&stay(0)).await, Err(SearchError::InvalidFilters(_))));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn hotel_search_applies_price_bound() {
        let op = HotelSearch::new(backend());
        let filters = SearchFilters { price_max: Some(2000), ..stay(1) };
        let hits = op.search(&filters).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["id"], 1);
    }

    #[tokio::test]
    async fn fuzzy_search_needs_a_keyword() {
        let op = FuzzyHotelSearch::new(backend());
        assert!(op.search(&SearchFilters::default()).await.is_err());
        let filters =
            SearchFilters { hotel_keyword: Some("harbour".into()), ..SearchFilters::default() };
        assert_eq!(op.search(&filters).await.expect("search").len(), 2);
    }

    #[tokio::test]
    async fn plan_search_narrows_by_plan_keyword() {
        let op = PlanSearch::new(backend());
        let filters = SearchFilters {
            hotel_keyword: Some("Harbour Inn".into()),
            plan_keyword: Some("family".into()),
            ..stay(2)
        };
        let plans = op.search(&filters).await.expect("search");
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0]["plan_id"], "b");
    }

    fn anchors(names: &[(i64, &str)]) -> Vec<AnchorHotel> {
        names
            .iter()
            .map(|&(id, name)| AnchorHotel { id: json!(id), name: name.to_string() })
            .collect()
    }

    #[tokio::test]
    async fn poi_search_groups_places_by_keyword() {
        let op = PoiSearch::new(backend());
        let filters = SearchFilters {
            poi_keywords: vec!["夜市".into(), "博物館".into()],
            anchor_hotels: anchors(&[(1, "Harbour Inn"), (2, "Harbour View"), (3, "Quiet Lodge")]),
            ..SearchFilters::default()
        };
        let found = op.search(&filters).await.expect("search");
        assert_eq!(found.len(), 2, "hotels with nothing nearby are left out");
        assert_eq!(found[0]["hotel_id"], 1);
        assert_eq!(found[0]["pois"]["夜市"].as_array().map(Vec::len), Some(2));
        assert!(found[0]["pois"].get("博物館").is_none());
        assert_eq!(found[1]["pois"]["博物館"][0]["name"], "Maritime Museum");
    }

    #[tokio::test]
    async fn poi_search_caps_hotels_and_keywords() {
        let backend = backend();
        let op = PoiSearch::new(backend.clone());
        let hotels: Vec<(i64, &str)> = (1..=5).map(|id| (id, "Harbour Inn")).collect();
        let filters = SearchFilters {
            poi_keywords: ["a", "b", "c", "d", "e", "夜市", "g"].map(String::from).to_vec(),
            anchor_hotels: anchors(&hotels),
            ..SearchFilters::default()
        };
        let found = op.search(&filters).await.expect("search");
        assert!(found.is_empty(), "the sixth keyword is never looked up");
        assert_eq!(backend.calls(), POI_HOTELS * POI_KEYWORDS);
    }

    #[tokio::test]
    async fn poi_search_needs_an_anchor_and_tolerates_backend_failures() {
        let filters =
            SearchFilters { poi_keywords: vec!["夜市".into()], ..SearchFilters::default() };
        let op = PoiSearch::new(backend());
        assert!(matches!(op.search(&filters).await, Err(SearchError::InvalidFilters(_))));

        let op = PoiSearch::new(Arc::new(StaticBackend::failing()));
        let filters = SearchFilters { anchor_hotels: anchors(&[(1, "Harbour Inn")]), ..filters };
        let found = op.search(&filters).await.expect("failed pairs count as empty");
        assert_eq!(found, Vec::<Value>::new());
    }

    #[tokio::test]
    async fn hotel_search_requires_every_supply() {
        let fixtures = r#"{"hotels": [
            {"id": 1, "name": "A", "region_id": 4, "supplies": ["吹風機", "浴袍"]},
            {"id": 2, "name": "B", "region_id": 4, "supplies": ["吹風機"]},
            {"id": 3, "name": "C", "region_id": 4}
        ]}"#;
        let op = HotelSearch::new(Arc::new(StaticBackend::from_json(fixtures).expect("fixtures")));
        let filters =
            SearchFilters { supply_names: vec!["吹風機".into(), "浴袍".into()], ..stay(1) };
        let hits = op.search(&filters).await.expect("search");
        let ids: Vec<&Value> = hits.iter().map(|h| &h["id"]).collect();
        assert_eq!(ids, vec![&json!(1)]);
        assert_eq!(op.search(&stay(1)).await.expect("search").len(), 3);
    }
}
