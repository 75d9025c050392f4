//! The shared state record and the field registry behind it.
//!
//! A [`Schema`] maps every field name to exactly one [`Reducer`] and a default
//! value. A [`SharedState`] holds one value per registered field and changes
//! only by whole-field replacement: either [`SharedState::merge`] (through the
//! field's reducer) or [`SharedState::reset`] (back to the default).

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::reducer::{is_empty, Reducer};

pub mod fields {
    pub const QUERY: &str = "query";
    pub const NORMALIZED_QUERY: &str = "normalized_query";
    pub const SESSION_ID: &str = "session_id";
    pub const TIMESTAMP: &str = "timestamp";

    pub const CHECK_IN: &str = "check_in";
    pub const CHECK_OUT: &str = "check_out";
    pub const ADULTS: &str = "adults";
    pub const CHILDREN: &str = "children";
    pub const PRICE_MIN: &str = "price_min";
    pub const PRICE_MAX: &str = "price_max";
    pub const REGION_IDS: &str = "region_ids";
    pub const SUBREGION_IDS: &str = "subregion_ids";
    pub const REGION_NAMES: &str = "region_names";
    pub const SUBREGION_NAMES: &str = "subregion_names";
    pub const HOTEL_FACILITY_IDS: &str = "hotel_facility_ids";
    pub const ROOM_FACILITY_IDS: &str = "room_facility_ids";
    pub const HOTEL_TYPES: &str = "hotel_types";
    pub const HAS_BREAKFAST: &str = "has_breakfast";
    pub const HAS_LUNCH: &str = "has_lunch";
    pub const HAS_DINNER: &str = "has_dinner";
    pub const HOTEL_KEYWORD: &str = "hotel_keyword";
    pub const PLAN_KEYWORD: &str = "plan_keyword";
    pub const SUPPLY_NAMES: &str = "supply_names";
    pub const POI_KEYWORDS: &str = "poi_keywords";

    // Result lists of the reference search operations.
    pub const HOTELS: &str = "hotels";
    pub const FUZZY_HOTELS: &str = "fuzzy_hotels";
    pub const PLANS: &str = "plans";
    pub const POIS: &str = "pois";

    pub const RETRY_COUNT: &str = "retry_count";
    pub const ERROR: &str = "error";
    pub const DIAGNOSTIC: &str = "diagnostic";
    pub const DIAGNOSTICS: &str = "diagnostics";
    pub const RESPONSE: &str = "response";
    pub const RELAXED: &str = "relaxed";

    /// Completion flag of an extractor.
    pub fn parsed(extractor: &str) -> String {
        format!("parsed.{extractor}")
    }

    /// Completion flag of a search operation.
    pub fn searched(operation: &str) -> String {
        format!("searched.{operation}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub reducer: Reducer,
    pub default: Value,
}

/// Registry of every field a request's state may carry.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Identity, filter and control fields shared by every pipeline.
    pub fn base() -> Self {
        use fields::*;
        let mut schema = Self::empty();
        let base: [(&str, Reducer, Value); 30] = [
            (QUERY, Reducer::KeepFirst, json!("")),
            (NORMALIZED_QUERY, Reducer::KeepFirst, json!("")),
            (SESSION_ID, Reducer::KeepFirst, json!("")),
            (TIMESTAMP, Reducer::KeepFirst, json!("")),
            (CHECK_IN, Reducer::KeepFirst, Value::Null),
            (CHECK_OUT, Reducer::KeepFirst, Value::Null),
            (ADULTS, Reducer::Max, json!(0)),
            (CHILDREN, Reducer::Max, json!(0)),
            (PRICE_MIN, Reducer::Min, Value::Null),
            (PRICE_MAX, Reducer::Max, Value::Null),
            (REGION_IDS, Reducer::Union, json!([])),
            (SUBREGION_IDS, Reducer::Union, json!([])),
            (REGION_NAMES, Reducer::Union, json!([])),
            (SUBREGION_NAMES, Reducer::Union, json!([])),
            (HOTEL_FACILITY_IDS, Reducer::Union, json!([])),
            (ROOM_FACILITY_IDS, Reducer::Union, json!([])),
            (HOTEL_TYPES, Reducer::Union, json!([])),
            (HAS_BREAKFAST, Reducer::Or, json!(false)),
            (HAS_LUNCH, Reducer::Or, json!(false)),
            (HAS_DINNER, Reducer::Or, json!(false)),
            (HOTEL_KEYWORD, Reducer::KeepFirst, Value::Null),
            (PLAN_KEYWORD, Reducer::KeepFirst, Value::Null),
            (SUPPLY_NAMES, Reducer::Union, json!([])),
            (POI_KEYWORDS, Reducer::Union, json!([])),
            (RETRY_COUNT, Reducer::Max, json!(0)),
            (ERROR, Reducer::KeepFirst, Value::Null),
            (DIAGNOSTIC, Reducer::KeepLast, Value::Null),
            (DIAGNOSTICS, Reducer::Concat, json!("")),
            (RESPONSE, Reducer::DictMerge, json!({})),
            (RELAXED, Reducer::Union, json!([])),
        ];
        for (name, reducer, default) in base {
            schema.fields.insert(name.to_string(), FieldSpec { reducer, default });
        }
        schema
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        reducer: Reducer,
        default: Value,
    ) -> Result<()> {
        let name = name.into();
        if self.fields.contains_key(&name) {
            return Err(Error::DuplicateField(name));
        }
        self.fields.insert(name, FieldSpec { reducer, default });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn reducer(&self, name: &str) -> Result<&Reducer> {
        self.get(name).map(|f| &f.reducer).ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks that every field claimed by an owner is registered and that a
    /// field claimed by several owners merges independently of order.
    pub fn validate_owners<'a, I>(&self, owners: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a [&'a str])>,
    {
        let mut claims: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (owner, owned) in owners {
            for field in owned {
                if !self.contains(field) {
                    return Err(Error::UnknownField(format!("{field} (declared by {owner})")));
                }
                claims.entry(*field).or_default().push(owner.to_string());
            }
        }
        for (field, owners) in claims {
            let reducer = self.reducer(field)?;
            if owners.len() > 1 && !reducer.is_commutative() {
                return Err(Error::SharedFieldNotCommutative {
                    field: field.to_string(),
                    reducer: reducer.name(),
                    owners,
                });
            }
        }
        Ok(())
    }

    pub fn initial_state(self: &Arc<Self>) -> SharedState {
        let values = self.fields.iter().map(|(k, f)| (k.clone(), f.default.clone())).collect();
        SharedState { schema: Arc::clone(self), values }
    }
}

/// A sparse set of field updates produced by one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialState(BTreeMap<String, Value>);

impl PartialState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Records `line` as the latest diagnostic and appends it to the log.
    pub fn diagnostic(line: impl Into<String>) -> Self {
        let line = line.into();
        Self::new().with(fields::DIAGNOSTIC, line.clone()).with(fields::DIAGNOSTICS, line)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Splits off every field not in `allowed`, returning the rejected names.
    pub fn retain_fields(&mut self, allowed: &[&str]) -> Vec<String> {
        let rejected: Vec<String> =
            self.0.keys().filter(|k| !allowed.contains(&k.as_str())).cloned().collect();
        for k in &rejected {
            self.0.remove(k);
        }
        rejected
    }
}

impl FromIterator<(String, Value)> for PartialState {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-request state. One value per registered field.
#[derive(Debug, Clone)]
pub struct SharedState {
    schema: Arc<Schema>,
    values: BTreeMap<String, Value>,
}

impl PartialEq for SharedState {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Serialize for SharedState {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.values.serialize(serializer)
    }
}

impl SharedState {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Merges `patch` field by field, returning the names whose value changed.
    /// Nothing is applied if any field is unregistered.
    pub fn merge(&mut self, patch: &PartialState) -> Result<Vec<String>> {
        if let Some(unknown) = patch.fields().find(|f| !self.schema.contains(f)) {
            return Err(Error::UnknownField(unknown.to_string()));
        }
        let mut changed = Vec::new();
        for (field, incoming) in patch.iter() {
            let reducer = self.schema.reducer(field)?;
            let current = self.values.get(field).cloned().unwrap_or(Value::Null);
            let next = reducer.apply(&current, incoming);
            if next != current {
                changed.push(field.clone());
                self.values.insert(field.clone(), next);
            }
        }
        Ok(changed)
    }

    /// Restores fields to their registered defaults.
    pub fn reset(&mut self, fields: &[&str]) -> Result<()> {
        for field in fields {
            let spec =
                self.schema.get(field).ok_or_else(|| Error::UnknownField(field.to_string()))?;
            self.values.insert(field.to_string(), spec.default.clone());
        }
        Ok(())
    }

    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&Value::Null)
    }

    /// A field is present once it carries information beyond "nothing":
    /// not null, not empty, not `false`, not zero.
    pub fn is_present(&self, field: &str) -> bool {
        match self.get(field) {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            other => !is_empty(other),
        }
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).as_str().filter(|s| !s.is_empty())
    }

    pub fn i64_field(&self, field: &str) -> Option<i64> {
        let v = self.get(field);
        v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64))
    }

    pub fn flag(&self, field: &str) -> bool {
        self.get(field).as_bool().unwrap_or(false)
    }

    pub fn list(&self, field: &str) -> &[Value] {
        self.get(field).as_array().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids(&self, field: &str) -> Vec<i64> {
        self.list(field).iter().filter_map(Value::as_i64).collect()
    }

    pub fn strings(&self, field: &str) -> Vec<String> {
        self.list(field).iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> =
            self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Value::Object(map)
    }
}
