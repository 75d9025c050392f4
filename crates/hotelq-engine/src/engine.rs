//! The query-resolution interpreter.
//!
//! One request walks `initial → parsing → routing → searching →
//! (relaxed_retry → routing)* → aggregating → done`. Fan-out stages spawn one
//! task per component and merge every outcome through the schema's reducers
//! only after the whole stage has finished.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hotelq_core::config::EngineConfig;
use hotelq_core::{
    fields, Aggregator, Context, Extractor, PartialState, ProgressSink, Reducer, RelaxStep, Schema,
    SearchFilters, SearchOperation, SharedState, Stage, StageEvent,
};
use hotelq_geo::GeoResolverCache;

use crate::aggregate::SummaryAggregator;
use crate::error::{EngineError, Result};
use crate::extractors::{
    BudgetExtractor, DateExtractor, FacilityExtractor, GeoExtractor, GuestExtractor,
    KeywordExtractor, MealExtractor, PoiExtractor, SupplyExtractor,
};
use crate::node::{Node, Registry};
use crate::relax::RelaxationPolicy;
use crate::router::{Finish, OperationSpec, Route, RouteTable};
use crate::search::{FuzzyHotelSearch, HotelSearch, LodgingBackend, PlanSearch, PoiSearch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Results were found, or the run stopped on a recorded `error`.
    Completed,
    /// The retry budget ran out without results.
    Exhausted,
    /// The external deadline expired; the state carries no merged data.
    TimedOut,
}

/// Outcome of one [`Engine::run`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub status: RunStatus,
    pub state: SharedState,
    /// Every stage entered, in order.
    pub stages: Vec<Stage>,
}

impl Resolution {
    pub fn retry_count(&self) -> u32 {
        self.state.i64_field(fields::RETRY_COUNT).and_then(|n| u32::try_from(n).ok()).unwrap_or(0)
    }
}

/// Stage trace kept outside the run future so it survives a timeout.
#[derive(Default)]
struct StageTrace(Mutex<Vec<Stage>>);

impl StageTrace {
    fn push(&self, stage: Stage) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(stage);
    }

    fn take(&self) -> Vec<Stage> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

pub struct EngineBuilder {
    registry: Registry,
    extra_fields: Vec<(String, Reducer, Value)>,
    max_retries: u32,
    relaxation_order: Vec<RelaxStep>,
    timeout: Option<Duration>,
    progress: Option<Arc<dyn ProgressSink>>,
    geo: Option<Arc<GeoResolverCache>>,
    deferred: Option<EngineError>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        let defaults = EngineConfig::default();
        Self {
            registry: Registry::default(),
            extra_fields: Vec::new(),
            max_retries: defaults.max_retries,
            relaxation_order: defaults.relaxation_order,
            timeout: None,
            progress: None,
            geo: None,
            deferred: None,
        }
    }

    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.max_retries = config.max_retries;
        self.relaxation_order = config.relaxation_order.clone();
        self.timeout = config.timeout_ms.map(Duration::from_millis);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn relaxation_order(mut self, order: Vec<RelaxStep>) -> Self {
        self.relaxation_order = order;
        self
    }

    /// Deadline applied by [`Engine::run`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn register(mut self, name: String, node: Node) -> Self {
        if self.deferred.is_none() {
            if let Err(err) = self.registry.insert(name, node) {
                self.deferred = Some(err);
            }
        }
        self
    }

    pub fn extractor(self, extractor: impl Extractor + 'static) -> Self {
        self.extractor_arc(Arc::new(extractor))
    }

    pub fn extractor_arc(self, extractor: Arc<dyn Extractor>) -> Self {
        let name = extractor.name().to_string();
        self.register(name, Node::Extractor(extractor))
    }

    pub fn search(self, operation: impl SearchOperation + 'static) -> Self {
        let operation: Arc<dyn SearchOperation> = Arc::new(operation);
        let name = operation.name().to_string();
        self.register(name, Node::SearchOperation(operation))
    }

    pub fn aggregator(self, aggregator: impl Aggregator + 'static) -> Self {
        self.register("aggregator".to_string(), Node::Aggregator(Arc::new(aggregator)))
    }

    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Cache used to turn `region_names` / `subregion_names` into ids before
    /// every routing decision.
    pub fn geo(mut self, geo: Arc<GeoResolverCache>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Registers an extra state field, e.g. one owned by a custom extractor.
    pub fn schema_field(
        mut self,
        name: impl Into<String>,
        reducer: Reducer,
        default: Value,
    ) -> Self {
        self.extra_fields.push((name.into(), reducer, default));
        self
    }

    /// The shipped extractors, search operations and aggregator.
    pub fn with_reference_pipeline(
        self,
        backend: Arc<dyn LodgingBackend>,
        geo: Arc<GeoResolverCache>,
    ) -> Self {
        self.extractor(GeoExtractor::new(Arc::clone(&geo)))
            .extractor(DateExtractor::new())
            .extractor(GuestExtractor::new())
            .extractor(BudgetExtractor::new())
            .extractor(KeywordExtractor::new())
            .extractor(MealExtractor::new())
            .extractor(FacilityExtractor::default())
            .extractor(SupplyExtractor::default())
            .extractor(PoiExtractor::default())
            .search(HotelSearch::new(Arc::clone(&backend)))
            .search(FuzzyHotelSearch::new(Arc::clone(&backend)))
            .search(PlanSearch::new(Arc::clone(&backend)))
            .search(PoiSearch::new(backend))
            .aggregator(SummaryAggregator)
            .geo(geo)
    }

    pub fn build(self) -> Result<Engine> {
        if let Some(err) = self.deferred {
            return Err(err);
        }
        let registry = self.registry;

        let mut schema = Schema::base();
        for extractor in registry.extractors() {
            schema.register(fields::parsed(extractor.name()), Reducer::Or, json!(false))?;
        }
        for op in registry.operations() {
            schema.register(fields::searched(op.name()), Reducer::Or, json!(false))?;
            schema.register(op.result_field(), Reducer::keyed(op.dedup_key()), json!([]))?;
        }
        for (name, reducer, default) in self.extra_fields {
            schema.register(name, reducer, default)?;
        }

        let owners: Vec<(&str, &[&str])> =
            registry.extractors().map(|e| (e.name(), e.owned_fields())).collect();
        schema.validate_owners(owners)?;
        for op in registry.operations() {
            let unknown =
                op.prerequisites().iter().chain(op.consumes()).find(|f| !schema.contains(f));
            if let Some(field) = unknown {
                return Err(EngineError::UnknownOperationField {
                    operation: op.name().to_string(),
                    field: field.to_string(),
                });
            }
            let any = op.prerequisites_any();
            if !any.is_empty() && !any.iter().any(|f| schema.contains(f)) {
                return Err(EngineError::UnknownOperationField {
                    operation: op.name().to_string(),
                    field: any.join(" | "),
                });
            }
        }

        let specs = registry.operations().map(|op| OperationSpec::of(op.as_ref())).collect();
        let routes = RouteTable::new(specs);
        info!(
            extractors = registry.extractors().count(),
            operations = routes.operations().len(),
            fields = schema.len(),
            max_retries = self.max_retries,
            "engine built"
        );
        Ok(Engine {
            registry,
            schema: Arc::new(schema),
            routes,
            policy: RelaxationPolicy::new(self.relaxation_order),
            max_retries: self.max_retries,
            timeout: self.timeout,
            progress: self.progress,
            geo: self.geo,
        })
    }
}

pub struct Engine {
    registry: Registry,
    schema: Arc<Schema>,
    routes: RouteTable,
    policy: RelaxationPolicy,
    max_retries: u32,
    timeout: Option<Duration>,
    progress: Option<Arc<dyn ProgressSink>>,
    geo: Option<Arc<GeoResolverCache>>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Resolves one request, under the configured deadline if there is one.
    pub async fn run(&self, query: &str, context: &Context) -> Result<Resolution> {
        match self.timeout {
            Some(deadline) => self.run_with_deadline(query, context, deadline).await,
            None => self.drive(query, context, &StageTrace::default()).await,
        }
    }

    /// Resolves one request, giving up after `deadline`. Tasks still in
    /// flight are left to finish on their own and their output is discarded.
    pub async fn run_with_deadline(
        &self,
        query: &str,
        context: &Context,
        deadline: Duration,
    ) -> Result<Resolution> {
        let trace = StageTrace::default();
        match tokio::time::timeout(deadline, self.drive(query, context, &trace)).await {
            Ok(result) => result,
            Err(_) => {
                let ms = deadline.as_millis();
                warn!(deadline_ms = ms, "query resolution timed out");
                let (mut state, _) = self.initial_state(query, context)?;
                let mut changed = state.merge(&PartialState::new().with(fields::ERROR, "timeout"))?;
                let note = PartialState::diagnostic(format!("timed out after {ms} ms"));
                changed.extend(state.merge(&note)?);
                self.enter(&trace, Stage::Error, changed, &state);
                Ok(Resolution { status: RunStatus::TimedOut, state, stages: trace.take() })
            }
        }
    }

    async fn drive(
        &self,
        query: &str,
        context: &Context,
        trace: &StageTrace,
    ) -> Result<Resolution> {
        let (mut state, changed) = self.initial_state(query, context)?;
        self.enter(trace, Stage::Initial, changed, &state);

        let changed = self.parse(&mut state, query, context).await?;
        self.enter(trace, Stage::Parsing, changed, &state);

        // Each pass either sets a `searched` flag or spends a retry.
        let limit = (self.max_retries as usize + 1) * (self.routes.operations().len() + 1) + 1;
        let mut passes = 0usize;
        let finish = loop {
            passes += 1;
            if passes > limit {
                let msg = format!("no terminal route after {limit} passes");
                return Err(EngineError::Invariant(msg));
            }
            let changed = self.resolve_geo(&mut state).await?;
            self.enter(trace, Stage::Routing, changed, &state);

            match self.routes.route(&state, self.max_retries) {
                Route::Search(names) => {
                    let changed = self.search(&mut state, &names).await?;
                    self.enter(trace, Stage::Searching, changed, &state);
                }
                Route::Relax => {
                    let relaxation = self.policy.apply(&mut state, &self.routes)?;
                    if relaxation.retry_count > self.max_retries {
                        return Err(EngineError::Invariant(format!(
                            "retry {} exceeds the maximum of {}",
                            relaxation.retry_count, self.max_retries
                        )));
                    }
                    info!(
                        retry = relaxation.retry_count,
                        step = ?relaxation.step.map(RelaxStep::name),
                        reopened = ?relaxation.reopened,
                        "relaxing constraints"
                    );
                    self.enter(trace, Stage::RelaxedRetry, relaxation.changed, &state);
                }
                Route::Aggregate(finish) => break finish,
            }
        };

        let changed = self.aggregate(&mut state, finish).await?;
        self.enter(trace, Stage::Aggregating, changed, &state);
        self.enter(trace, Stage::Done, Vec::new(), &state);

        let status = match finish {
            Finish::Exhausted => RunStatus::Exhausted,
            Finish::Sufficient | Finish::Failed => RunStatus::Completed,
        };
        Ok(Resolution { status, state, stages: trace.take() })
    }

    fn initial_state(&self, query: &str, context: &Context) -> Result<(SharedState, Vec<String>)> {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Err(EngineError::EmptyQuery);
        }
        let session_id = context
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut state = self.schema.initial_state();
        let changed = state.merge(
            &PartialState::new()
                .with(fields::QUERY, query)
                .with(fields::NORMALIZED_QUERY, normalized)
                .with(fields::SESSION_ID, session_id)
                .with(fields::TIMESTAMP, Utc::now().to_rfc3339()),
        )?;
        Ok((state, changed))
    }

    async fn parse(
        &self,
        state: &mut SharedState,
        query: &str,
        context: &Context,
    ) -> Result<Vec<String>> {
        let extractors: Vec<Arc<dyn Extractor>> = self.registry.extractors().cloned().collect();
        let tasks = extractors.iter().map(|extractor| {
            let extractor = Arc::clone(extractor);
            let query = query.to_string();
            let context = context.clone();
            tokio::spawn(async move { extractor.extract(&query, &context).await })
        });
        let outcomes = join_all(tasks).await;

        let mut changed = Vec::new();
        for (extractor, outcome) in extractors.iter().zip(outcomes) {
            let name = extractor.name();
            let (mut patch, failure) = match outcome {
                Ok(Ok(patch)) => (patch, None),
                Ok(Err(err)) => {
                    (extractor.default_output(), Some(format!("extractor {name} failed: {err}")))
                }
                Err(err) => {
                    (extractor.default_output(), Some(format!("extractor {name} panicked: {err}")))
                }
            };
            let rejected = patch.retain_fields(extractor.owned_fields());
            if !rejected.is_empty() {
                warn!(extractor = name, ?rejected, "extractor wrote fields it does not own");
            }
            patch.insert(fields::parsed(name), true);
            absorb(&mut changed, state.merge(&patch)?);

            if let Some(line) = failure {
                warn!(extractor = name, "{line}; using default output");
                absorb(&mut changed, state.merge(&PartialState::diagnostic(line))?);
            }
        }
        Ok(changed)
    }

    /// Turns unresolved place names into ids. A subregion also contributes
    /// its parent region.
    async fn resolve_geo(&self, state: &mut SharedState) -> Result<Vec<String>> {
        let Some(geo) = &self.geo else {
            return Ok(Vec::new());
        };
        let region_names = state.strings(fields::REGION_NAMES);
        let subregion_names = state.strings(fields::SUBREGION_NAMES);
        if region_names.is_empty() && subregion_names.is_empty() {
            return Ok(Vec::new());
        }
        if let Err(err) = geo.initialize().await {
            warn!(error = %err, "geo cache unavailable, place names stay unresolved");
            let note = PartialState::diagnostic(format!("geo cache unavailable: {err}"));
            return Ok(state.merge(&note)?);
        }

        let mut region_ids = state.ids(fields::REGION_IDS);
        let mut subregion_ids = Vec::new();
        let mut notes = Vec::new();
        for name in &region_names {
            match geo.lookup_region(name) {
                Ok(Some(m)) => region_ids.push(m.entity.id),
                Ok(None) => notes.push(format!("unresolved region '{name}'")),
                Err(err) => notes.push(format!("region lookup failed for '{name}': {err}")),
            }
        }
        for name in &subregion_names {
            match geo.lookup_subregion_within(name, &region_ids) {
                Ok(Some(m)) => {
                    subregion_ids.push(m.entity.id);
                    region_ids.extend(m.entity.parent_region_id);
                }
                Ok(None) => notes.push(format!("unresolved subregion '{name}'")),
                Err(err) => notes.push(format!("subregion lookup failed for '{name}': {err}")),
            }
        }
        debug!(?region_ids, ?subregion_ids, "resolved place names");

        let mut changed = state.merge(
            &PartialState::new()
                .with(fields::REGION_IDS, json!(region_ids))
                .with(fields::SUBREGION_IDS, json!(subregion_ids)),
        )?;
        for line in notes {
            absorb(&mut changed, state.merge(&PartialState::diagnostic(line))?);
        }
        Ok(changed)
    }

    async fn search(&self, state: &mut SharedState, names: &[String]) -> Result<Vec<String>> {
        let operations = names
            .iter()
            .map(|name| {
                self.registry.operation(name).cloned().ok_or_else(|| {
                    EngineError::Invariant(format!("router chose unknown operation '{name}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let filters = SearchFilters::from_state(state);
        let tasks = operations.iter().map(|op| {
            let op = Arc::clone(op);
            let filters = filters.clone();
            tokio::spawn(async move { op.search(&filters).await })
        });
        let outcomes = join_all(tasks).await;

        let mut changed = Vec::new();
        for (op, outcome) in operations.iter().zip(outcomes) {
            let name = op.name();
            let mut patch = PartialState::new().with(fields::searched(name), true);
            let mut notes = Vec::new();
            match outcome {
                Ok(Ok(records)) => {
                    let key = op.dedup_key();
                    let total = records.len();
                    let kept: Vec<Value> = records
                        .into_iter()
                        .filter(|r| r.get(key).is_some_and(|v| !v.is_null()))
                        .collect();
                    if kept.len() < total {
                        let dropped = total - kept.len();
                        notes.push(format!("{name}: dropped {dropped} record(s) without '{key}'"));
                    }
                    debug!(operation = name, results = kept.len(), "search finished");
                    patch.insert(op.result_field(), Value::Array(kept));
                }
                Ok(Err(err)) => {
                    warn!(operation = name, error = %err, "search failed, counting as empty");
                    notes.push(format!("search {name} failed: {err}"));
                }
                Err(err) => {
                    warn!(
                        operation = name,
                        error = %err,
                        "search task panicked, counting as empty"
                    );
                    notes.push(format!("search {name} panicked: {err}"));
                }
            }
            absorb(&mut changed, state.merge(&patch)?);
            for line in notes {
                absorb(&mut changed, state.merge(&PartialState::diagnostic(line))?);
            }
        }
        Ok(changed)
    }

    async fn aggregate(&self, state: &mut SharedState, finish: Finish) -> Result<Vec<String>> {
        let mut changed = Vec::new();
        if finish == Finish::Exhausted {
            let retries = state.i64_field(fields::RETRY_COUNT).unwrap_or(0);
            info!(retries, "no results after relaxation");
            let line = format!("exhausted after {retries} retries with no results");
            absorb(&mut changed, state.merge(&PartialState::diagnostic(line))?);
        }

        if let Some(aggregator) = self.registry.aggregator() {
            match aggregator.aggregate(state).await {
                Ok(output) => {
                    let output = match output {
                        Value::Object(_) => output,
                        other => json!({ "value": other }),
                    };
                    let patch = PartialState::new().with(fields::RESPONSE, output);
                    absorb(&mut changed, state.merge(&patch)?);
                }
                Err(err) => {
                    warn!(error = %err, "aggregator failed");
                    absorb(&mut changed, state.merge(&PartialState::diagnostic(err.to_string()))?);
                }
            }
        }
        Ok(changed)
    }

    fn result_counts(&self, state: &SharedState) -> BTreeMap<String, usize> {
        self.routes.result_fields().map(|f| (f.to_string(), state.list(f).len())).collect()
    }

    fn enter(&self, trace: &StageTrace, stage: Stage, changed: Vec<String>, state: &SharedState) {
        trace.push(stage);
        let event = StageEvent {
            stage,
            changed,
            result_counts: self.result_counts(state),
            retry_count: state
                .i64_field(fields::RETRY_COUNT)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
        };
        info!(
            stage = %stage,
            changed = event.changed.len(),
            retry_count = event.retry_count,
            "stage"
        );
        if let Some(sink) = &self.progress {
            sink.on_stage(&event);
        }
    }
}

fn absorb(into: &mut Vec<String>, changed: Vec<String>) {
    for field in changed {
        if !into.contains(&field) {
            into.push(field);
        }
    }
}

/// Full-width ASCII folded to half-width, whitespace collapsed, trimmed.
pub fn normalize_query(query: &str) -> String {
    let folded: String = query
        .chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_full_width_and_whitespace() {
        assert_eq!(normalize_query("  台北　２大１小  "), "台北 2大1小");
        assert_eq!(normalize_query("\t\n"), "");
    }

    #[test]
    fn duplicate_extractor_fails_at_build() {
        use crate::testing::StaticExtractor;
        let err = Engine::builder()
            .extractor(StaticExtractor::new("dates", &[fields::CHECK_IN], PartialState::new()))
            .extractor(StaticExtractor::new("dates", &[fields::CHECK_IN], PartialState::new()))
            .build();
        assert!(matches!(err, Err(EngineError::DuplicateComponent(_))));
    }

    #[test]
    fn shared_order_dependent_field_fails_at_build() {
        use crate::testing::StaticExtractor;
        let err = Engine::builder()
            .extractor(StaticExtractor::new("a", &[fields::CHECK_IN], PartialState::new()))
            .extractor(StaticExtractor::new("b", &[fields::CHECK_IN], PartialState::new()))
            .build();
        assert!(matches!(
            err,
            Err(EngineError::Schema(hotelq_core::Error::SharedFieldNotCommutative { .. }))
        ));
    }
}
