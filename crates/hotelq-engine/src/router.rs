//! Pure routing decision over the shared state.

use serde::Serialize;

use hotelq_core::{fields, SearchOperation, SharedState};

/// Static description of one search operation, captured at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: String,
    pub result_field: String,
    pub prerequisites: Vec<String>,
    /// At least one of these must be present as well, unless empty.
    pub prerequisites_any: Vec<String>,
    pub consumes: Vec<String>,
}

impl OperationSpec {
    pub fn of(op: &dyn SearchOperation) -> Self {
        Self {
            name: op.name().to_string(),
            result_field: op.result_field().to_string(),
            prerequisites: op.prerequisites().iter().map(|s| s.to_string()).collect(),
            prerequisites_any: op.prerequisites_any().iter().map(|s| s.to_string()).collect(),
            consumes: op.consumes().iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether relaxing `relaxed` could change what this operation returns.
    pub fn depends_on(&self, relaxed: &[&str]) -> bool {
        self.prerequisites
            .iter()
            .chain(&self.prerequisites_any)
            .chain(&self.consumes)
            .any(|f| relaxed.contains(&f.as_str()))
    }

    pub fn is_ready(&self, state: &SharedState) -> bool {
        let any_ok = self.prerequisites_any.is_empty()
            || self.prerequisites_any.iter().any(|f| state.is_present(f));
        !state.flag(&fields::searched(&self.name))
            && self.prerequisites.iter().all(|f| state.is_present(f))
            && any_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Finish {
    /// At least one result list is non-empty.
    Sufficient,
    /// Nothing left to run and the retry budget is spent.
    Exhausted,
    /// The `error` field is set.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Run these operations, in registration order.
    Search(Vec<String>),
    Relax,
    Aggregate(Finish),
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    operations: Vec<OperationSpec>,
}

impl RouteTable {
    pub fn new(operations: Vec<OperationSpec>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    pub fn result_fields(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|op| op.result_field.as_str())
    }

    pub fn has_results(&self, state: &SharedState) -> bool {
        self.result_fields().any(|f| !state.list(f).is_empty())
    }

    /// Decides the next step. Identical states give identical routes.
    pub fn route(&self, state: &SharedState, max_retries: u32) -> Route {
        if state.is_present(fields::ERROR) {
            return Route::Aggregate(Finish::Failed);
        }
        let eligible: Vec<String> = self
            .operations
            .iter()
            .filter(|op| op.is_ready(state))
            .map(|op| op.name.clone())
            .collect();
        if !eligible.is_empty() {
            return Route::Search(eligible);
        }
        if self.has_results(state) {
            return Route::Aggregate(Finish::Sufficient);
        }
        let retries = state.i64_field(fields::RETRY_COUNT).unwrap_or(0);
        if retries < i64::from(max_retries) {
            Route::Relax
        } else {
            Route::Aggregate(Finish::Exhausted)
        }
    }
}
