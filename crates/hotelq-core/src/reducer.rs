//! Pure merge functions for state fields.
//!
//! Every reducer satisfies `r(r(a, b), b) == r(a, b)`. The ones reported by
//! [`Reducer::is_commutative`] additionally satisfy `r(a, b) == r(b, a)` and
//! are the only ones allowed on a field written by more than one extractor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reducer {
    /// Shallow object merge, incoming keys win.
    DictMerge,
    /// Keep the current value unless it is empty.
    KeepFirst,
    /// Take the incoming value unless it is empty.
    KeepLast,
    Max,
    Min,
    Or,
    And,
    /// Sorted set union of scalars.
    Union,
    /// List union deduplicated by `key`; the first record seen for a key wins.
    KeyedUnion { key: String },
    /// Newline-joined text; a line already present is never appended again.
    Concat,
}

impl Reducer {
    pub fn keyed(key: impl Into<String>) -> Self {
        Self::KeyedUnion { key: key.into() }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DictMerge => "dict_merge",
            Self::KeepFirst => "keep_first",
            Self::KeepLast => "keep_last",
            Self::Max => "max",
            Self::Min => "min",
            Self::Or => "or",
            Self::And => "and",
            Self::Union => "union",
            Self::KeyedUnion { .. } => "keyed_union",
            Self::Concat => "concat",
        }
    }

    pub fn is_commutative(&self) -> bool {
        matches!(self, Self::Max | Self::Min | Self::Or | Self::And | Self::Union)
    }

    pub fn apply(&self, current: &Value, incoming: &Value) -> Value {
        match self {
            Self::DictMerge => dict_merge(current, incoming),
            Self::KeepFirst => keep_first(current, incoming),
            Self::KeepLast => keep_last(current, incoming),
            Self::Max => extremum(current, incoming, Ordering::Greater),
            Self::Min => extremum(current, incoming, Ordering::Less),
            Self::Or => logical(current, incoming, |a, b| a || b),
            Self::And => logical(current, incoming, |a, b| a && b),
            Self::Union => union(current, incoming),
            Self::KeyedUnion { key } => keyed_union(current, incoming, key),
            Self::Concat => concat(current, incoming),
        }
    }
}

/// `null`, `""`, `[]` and `{}` carry no information.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

pub fn dict_merge(current: &Value, incoming: &Value) -> Value {
    match (current, incoming) {
        (Value::Object(a), Value::Object(b)) => {
            let mut out: Map<String, Value> = a.clone();
            for (k, v) in b {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }
        (_, Value::Object(_)) => incoming.clone(),
        _ => current.clone(),
    }
}

pub fn keep_first(current: &Value, incoming: &Value) -> Value {
    if is_empty(current) {
        incoming.clone()
    } else {
        current.clone()
    }
}

pub fn keep_last(current: &Value, incoming: &Value) -> Value {
    if is_empty(incoming) {
        current.clone()
    } else {
        incoming.clone()
    }
}

fn extremum(current: &Value, incoming: &Value, want: Ordering) -> Value {
    match (current.as_f64(), incoming.as_f64()) {
        (Some(a), Some(b)) => {
            if b.partial_cmp(&a) == Some(want) {
                incoming.clone()
            } else {
                current.clone()
            }
        }
        (Some(_), None) => current.clone(),
        (None, Some(_)) => incoming.clone(),
        (None, None) => keep_first(current, incoming),
    }
}

fn logical(current: &Value, incoming: &Value, op: fn(bool, bool) -> bool) -> Value {
    match (current.as_bool(), incoming.as_bool()) {
        (Some(a), Some(b)) => Value::Bool(op(a, b)),
        (Some(a), None) => Value::Bool(a),
        (None, Some(b)) => Value::Bool(b),
        (None, None) => current.clone(),
    }
}

fn as_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

pub fn union(current: &Value, incoming: &Value) -> Value {
    let mut items = as_items(current);
    items.extend(as_items(incoming));
    items.sort_by(canonical_cmp);
    items.dedup();
    Value::Array(items)
}

pub fn keyed_union(current: &Value, incoming: &Value, key: &str) -> Value {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for item in as_items(current).into_iter().chain(as_items(incoming)) {
        let Some(k) = item.get(key).filter(|k| !k.is_null()) else { continue };
        if seen.insert(k.to_string()) {
            out.push(item);
        }
    }
    Value::Array(out)
}

pub fn concat(current: &Value, incoming: &Value) -> Value {
    let (Some(a), Some(b)) = (current.as_str(), incoming.as_str()) else {
        return keep_first(current, incoming);
    };
    let mut lines: Vec<&str> = a.lines().filter(|l| !l.is_empty()).collect();
    for line in b.lines().filter(|l| !l.is_empty()) {
        if !lines.contains(&line) {
            lines.push(line);
        }
    }
    Value::String(lines.join("\n"))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values so that set unions are order-independent.
pub fn canonical_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (fx, fy) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            fx.total_cmp(&fy).then_with(|| x.to_string().cmp(&y.to_string()))
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}
