//! Constraint relaxation between retries.

use serde_json::json;

use hotelq_core::{fields, PartialState, RelaxStep, SharedState};

use crate::error::Result;
use crate::router::RouteTable;

/// What one relaxation attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relaxation {
    /// The step applied, `None` when no configured step had anything to drop.
    pub step: Option<RelaxStep>,
    /// Operations whose `searched.*` flag was cleared.
    pub reopened: Vec<String>,
    pub retry_count: u32,
    /// Every field rewritten by the attempt.
    pub changed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RelaxationPolicy {
    order: Vec<RelaxStep>,
}

impl Default for RelaxationPolicy {
    fn default() -> Self {
        Self::new(RelaxStep::default_order())
    }
}

impl RelaxationPolicy {
    pub fn new(order: Vec<RelaxStep>) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &[RelaxStep] {
        &self.order
    }

    /// First step, in configured order, that would change the state.
    pub fn next_step(&self, state: &SharedState) -> Option<RelaxStep> {
        self.order.iter().copied().find(|step| step.fields().iter().any(|f| state.is_present(f)))
    }

    /// Applies the next effective step, reopens the operations it affects and
    /// counts the attempt whether or not anything was dropped.
    pub fn apply(&self, state: &mut SharedState, routes: &RouteTable) -> Result<Relaxation> {
        let retry_count = state.i64_field(fields::RETRY_COUNT).unwrap_or(0).max(0) as u32 + 1;
        let mut changed: Vec<String> = Vec::new();
        let mut reopened: Vec<String> = Vec::new();
        let step = self.next_step(state);

        let mut patch = PartialState::new().with(fields::RETRY_COUNT, retry_count);
        if let Some(step) = step {
            let dropped = step.fields();
            state.reset(dropped)?;
            changed.extend(dropped.iter().map(|f| f.to_string()));

            reopened = routes
                .operations()
                .iter()
                .filter(|op| op.depends_on(dropped) && state.flag(&fields::searched(&op.name)))
                .map(|op| op.name.clone())
                .collect();
            let flags: Vec<String> = reopened.iter().map(|name| fields::searched(name)).collect();
            let flag_refs: Vec<&str> = flags.iter().map(String::as_str).collect();
            state.reset(&flag_refs)?;
            changed.extend(flags);

            patch.insert(fields::RELAXED, json!([step.name()]));
        }
        let line = match step {
            Some(step) => format!("retry {retry_count}: relaxed {step}"),
            None => format!("retry {retry_count}: no constraint left to relax"),
        };
        for (field, value) in PartialState::diagnostic(line).iter() {
            patch.insert(field.clone(), value.clone());
        }
        for f in state.merge(&patch)? {
            if !changed.contains(&f) {
                changed.push(f);
            }
        }
        Ok(Relaxation { step, reopened, retry_count, changed })
    }
}
