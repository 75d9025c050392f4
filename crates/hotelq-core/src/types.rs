//! Domain types shared by the geo resolver and the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::state::{fields, SharedState};

/// Caller-supplied context handed to every extractor alongside the query.
pub type Context = Map<String, Value>;

/// Top level of the administrative hierarchy (county / city).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub name: String,
}

/// Second level (district / township). `parent_region_id` is absent for
/// entries the upstream could not attach to a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subregion {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub parent_region_id: Option<i64>,
}

/// One step of the constraint-relaxation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxStep {
    /// Drop `price_min` / `price_max`.
    Price,
    /// Drop hotel and room facility filters and requested supplies.
    Facilities,
    /// Drop subregions, keep regions.
    Subregion,
    /// Drop meal requirements.
    Meals,
}

impl RelaxStep {
    pub fn name(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Facilities => "facilities",
            Self::Subregion => "subregion",
            Self::Meals => "meals",
        }
    }

    /// State fields the step restores to their defaults.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Price => &[fields::PRICE_MIN, fields::PRICE_MAX],
            Self::Facilities => {
                &[fields::HOTEL_FACILITY_IDS, fields::ROOM_FACILITY_IDS, fields::SUPPLY_NAMES]
            }
            Self::Subregion => &[fields::SUBREGION_IDS, fields::SUBREGION_NAMES],
            Self::Meals => &[fields::HAS_BREAKFAST, fields::HAS_LUNCH, fields::HAS_DINNER],
        }
    }

    pub fn default_order() -> Vec<RelaxStep> {
        vec![Self::Price, Self::Facilities, Self::Subregion]
    }
}

impl fmt::Display for RelaxStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A hotel found earlier in the request, used as the origin of a nearby
/// search. Plans without a hotel id are keyed by hotel name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorHotel {
    pub id: Value,
    pub name: String,
}

/// Typed view of the filter fields, handed to search operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub adults: u32,
    pub children: u32,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub region_ids: Vec<i64>,
    pub subregion_ids: Vec<i64>,
    pub hotel_facility_ids: Vec<i64>,
    pub room_facility_ids: Vec<i64>,
    pub hotel_types: Vec<String>,
    pub has_breakfast: bool,
    pub has_lunch: bool,
    pub has_dinner: bool,
    pub hotel_keyword: Option<String>,
    pub plan_keyword: Option<String>,
    pub supply_names: Vec<String>,
    pub poi_keywords: Vec<String>,
    /// Hotels from the first non-empty of `hotels`, `fuzzy_hotels` and
    /// `plans`, one entry per hotel.
    pub anchor_hotels: Vec<AnchorHotel>,
}

fn date_field(state: &SharedState, field: &str) -> Option<NaiveDate> {
    state.str_field(field).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn count_field(state: &SharedState, field: &str) -> u32 {
    state.i64_field(field).and_then(|n| u32::try_from(n).ok()).unwrap_or(0)
}

fn anchor_hotels(state: &SharedState) -> Vec<AnchorHotel> {
    let sources = [
        (fields::HOTELS, "id", "name"),
        (fields::FUZZY_HOTELS, "id", "name"),
        (fields::PLANS, "hotel_id", "hotel_name"),
    ];
    let Some((records, id_key, name_key)) = sources
        .into_iter()
        .map(|(field, id_key, name_key)| (state.list(field), id_key, name_key))
        .find(|(records, ..)| !records.is_empty())
    else {
        return Vec::new();
    };
    let mut anchors: Vec<AnchorHotel> = Vec::new();
    for record in records {
        let Some(name) = record.get(name_key).and_then(Value::as_str) else {
            continue;
        };
        let id = record
            .get(id_key)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::String(name.to_string()));
        if !anchors.iter().any(|a| a.id == id) {
            anchors.push(AnchorHotel { id, name: name.to_string() });
        }
    }
    anchors
}

impl SearchFilters {
    pub fn from_state(state: &SharedState) -> Self {
        Self {
            check_in: date_field(state, fields::CHECK_IN),
            check_out: date_field(state, fields::CHECK_OUT),
            adults: count_field(state, fields::ADULTS),
            children: count_field(state, fields::CHILDREN),
            price_min: state.i64_field(fields::PRICE_MIN),
            price_max: state.i64_field(fields::PRICE_MAX),
            region_ids: state.ids(fields::REGION_IDS),
            subregion_ids: state.ids(fields::SUBREGION_IDS),
            hotel_facility_ids: state.ids(fields::HOTEL_FACILITY_IDS),
            room_facility_ids: state.ids(fields::ROOM_FACILITY_IDS),
            hotel_types: state.strings(fields::HOTEL_TYPES),
            has_breakfast: state.flag(fields::HAS_BREAKFAST),
            has_lunch: state.flag(fields::HAS_LUNCH),
            has_dinner: state.flag(fields::HAS_DINNER),
            hotel_keyword: state.str_field(fields::HOTEL_KEYWORD).map(str::to_string),
            plan_keyword: state.str_field(fields::PLAN_KEYWORD).map(str::to_string),
            supply_names: state.strings(fields::SUPPLY_NAMES),
            poi_keywords: state.strings(fields::POI_KEYWORDS),
            anchor_hotels: anchor_hotels(state),
        }
    }

    pub fn nights(&self) -> Option<i64> {
        match (self.check_in, self.check_out) {
            (Some(a), Some(b)) => Some((b - a).num_days()),
            _ => None,
        }
    }
}

/// Pipeline stages: `initial → parsing → routing → searching →
/// (relaxed_retry → routing)* → aggregating → done`, plus terminal `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initial,
    Parsing,
    Routing,
    Searching,
    RelaxedRetry,
    Aggregating,
    Done,
    Error,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Parsing => "parsing",
            Self::Routing => "routing",
            Self::Searching => "searching",
            Self::RelaxedRetry => "relaxed_retry",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Emitted after each stage completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    /// Fields whose value changed during the stage.
    pub changed: Vec<String>,
    /// Length of every result list after the stage.
    pub result_counts: BTreeMap<String, usize>,
    pub retry_count: u32,
}
