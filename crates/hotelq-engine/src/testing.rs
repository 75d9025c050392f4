//! Deterministic doubles for tests, demos and the CLI.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use hotelq_core::{
    Context, ExtractError, Extractor, PartialState, ProgressSink, SearchError, SearchFilters, Stage,
    StageEvent,
};

use crate::search::LodgingBackend;

/// Returns a fixed partial state, optionally after a delay.
pub struct StaticExtractor {
    name: String,
    owned: Vec<&'static str>,
    output: PartialState,
    delay: Option<Duration>,
}

impl StaticExtractor {
    pub fn new(name: &str, owned: &[&'static str], output: PartialState) -> Self {
        Self { name: name.to_string(), owned: owned.to_vec(), output, delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Extractor for StaticExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn owned_fields(&self) -> &[&str] {
        &self.owned
    }

    fn default_output(&self) -> PartialState {
        PartialState::new()
    }

    async fn extract(
        &self,
        _query: &str,
        _context: &Context,
    ) -> Result<PartialState, ExtractError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.output.clone())
    }
}

/// Always fails (or panics), leaving its documented default behind.
pub struct FailingExtractor {
    name: String,
    owned: Vec<&'static str>,
    default: PartialState,
    panics: bool,
}

impl FailingExtractor {
    pub fn new(name: &str, owned: &[&'static str], default: PartialState) -> Self {
        Self { name: name.to_string(), owned: owned.to_vec(), default, panics: false }
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }
}

#[async_trait]
impl Extractor for FailingExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn owned_fields(&self) -> &[&str] {
        &self.owned
    }

    fn default_output(&self) -> PartialState {
        self.default.clone()
    }

    async fn extract(&self, query: &str, _context: &Context) -> Result<PartialState, ExtractError> {
        if self.panics {
            panic!("{} cannot handle {query:?}", self.name);
        }
        Err(ExtractError::Failed(format!("cannot handle {query:?}")))
    }
}

/// Fixture records served by [`StaticBackend`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub hotels: Vec<Value>,
    #[serde(default)]
    pub plans: Vec<Value>,
    #[serde(default)]
    pub pois: Vec<Value>,
}

/// In-memory lodging backend evaluating the filters against JSON fixtures.
///
/// Hotel records may carry `region_id`, `subregion_id`, `price`,
/// `max_guests`, `facility_ids`, `room_facility_ids`, `supplies`, `type`,
/// `has_breakfast` / `has_lunch` / `has_dinner` and `unavailable` (ISO
/// dates); an absent attribute never excludes a record except where a
/// filter requires it. Plan records carry `plan_id`, `hotel_name`,
/// `plan_name`, `price` and optionally `region_id`. Place records carry
/// `hotel_name` and `keyword`, both matched exactly.
#[derive(Debug, Default)]
pub struct StaticBackend {
    fixtures: Fixtures,
    fail: bool,
    calls: AtomicUsize,
}

impl StaticBackend {
    pub fn new(fixtures: Fixtures) -> Self {
        Self { fixtures, ..Self::default() }
    }

    pub fn from_json(text: &str) -> Result<Self, SearchError> {
        let fixtures = serde_json::from_str(text)
            .map_err(|e| SearchError::Backend(format!("fixtures: {e}")))?;
        Ok(Self::new(fixtures))
    }

    pub fn load(path: &Path) -> Result<Self, SearchError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SearchError::Backend(format!("read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Every call fails with a backend error.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SearchError::Backend("backend unavailable".into()));
        }
        Ok(())
    }
}

fn ids(record: &Value, key: &str) -> Vec<i64> {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

fn strings(record: &Value, key: &str) -> Vec<String> {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_lowercase).collect())
        .unwrap_or_default()
}

fn flag(record: &Value, key: &str) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn text(record: &Value, key: &str) -> String {
    record.get(key).and_then(Value::as_str).unwrap_or_default().to_lowercase()
}

fn in_price(record: &Value, filters: &SearchFilters) -> bool {
    let Some(price) = record.get("price").and_then(Value::as_i64) else {
        return filters.price_min.is_none() && filters.price_max.is_none();
    };
    filters.price_min.is_none_or(|lo| price >= lo) && filters.price_max.is_none_or(|hi| price <= hi)
}

fn in_regions(record: &Value, key: &str, wanted: &[i64]) -> bool {
    wanted.is_empty()
        || record.get(key).and_then(Value::as_i64).is_some_and(|id| wanted.contains(&id))
}

fn available(record: &Value, filters: &SearchFilters) -> bool {
    let (Some(check_in), Some(check_out)) = (filters.check_in, filters.check_out) else {
        return true;
    };
    let blocked: Vec<NaiveDate> = record
        .get("unavailable")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|d| d.as_str()?.parse().ok()).collect())
        .unwrap_or_default();
    !blocked.iter().any(|d| *d >= check_in && *d < check_out)
}

fn hotel_matches(h: &Value, f: &SearchFilters) -> bool {
    let guests = i64::from(f.adults + f.children);
    let capacity_ok = h.get("max_guests").and_then(Value::as_i64).is_none_or(|cap| guests <= cap);
    let has_all = |key: &str, wanted: &[i64]| {
        let offered = ids(h, key);
        wanted.iter().all(|id| offered.contains(id))
    };
    let type_ok = f.hotel_types.is_empty()
        || f.hotel_types.iter().any(|t| text(h, "type") == t.to_lowercase());
    let supplies = strings(h, "supplies");
    in_regions(h, "region_id", &f.region_ids)
        && in_regions(h, "subregion_id", &f.subregion_ids)
        && in_price(h, f)
        && capacity_ok
        && has_all("facility_ids", &f.hotel_facility_ids)
        && has_all("room_facility_ids", &f.room_facility_ids)
        && f.supply_names.iter().all(|s| supplies.contains(&s.to_lowercase()))
        && (!f.has_breakfast || flag(h, "has_breakfast"))
        && (!f.has_lunch || flag(h, "has_lunch"))
        && (!f.has_dinner || flag(h, "has_dinner"))
        && type_ok
        && available(h, f)
}

#[async_trait]
impl LodgingBackend for StaticBackend {
    async fn search_vacancies(&self, filters: &SearchFilters) -> Result<Vec<Value>, SearchError> {
        self.enter()?;
        Ok(self.fixtures.hotels.iter().filter(|h| hotel_matches(h, filters)).cloned().collect())
    }

    async fn search_by_name(&self, keyword: &str) -> Result<Vec<Value>, SearchError> {
        self.enter()?;
        let keyword = keyword.to_lowercase();
        Ok(self
            .fixtures
            .hotels
            .iter()
            .filter(|h| text(h, "name").contains(&keyword))
            .cloned()
            .collect())
    }

    async fn search_plans(&self, filters: &SearchFilters) -> Result<Vec<Value>, SearchError> {
        self.enter()?;
        let hotel = filters.hotel_keyword.as_deref().unwrap_or_default().to_lowercase();
        let plan = filters.plan_keyword.as_deref().map(str::to_lowercase);
        Ok(self
            .fixtures
            .plans
            .iter()
            .filter(|p| text(p, "hotel_name").contains(&hotel))
            .filter(|p| plan.as_deref().is_none_or(|k| text(p, "plan_name").contains(k)))
            .filter(|p| in_price(p, filters))
            .filter(|p| {
                p.get("region_id").is_none() || in_regions(p, "region_id", &filters.region_ids)
            })
            .cloned()
            .collect())
    }

    async fn search_nearby(
        &self,
        hotel_name: &str,
        keyword: &str,
    ) -> Result<Vec<Value>, SearchError> {
        self.enter()?;
        let (hotel, keyword) = (hotel_name.to_lowercase(), keyword.to_lowercase());
        Ok(self
            .fixtures
            .pois
            .iter()
            .filter(|p| text(p, "hotel_name") == hotel && text(p, "keyword") == keyword)
            .cloned()
            .collect())
    }
}

/// Keeps every stage event it receives.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events().into_iter().map(|e| e.stage).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_stage(&self, event: &StageEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }
}
