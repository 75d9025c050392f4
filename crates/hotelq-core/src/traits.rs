use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AggregateError, EmbedError, ExtractError, SearchError};
use crate::state::{PartialState, SharedState};
use crate::types::{Context, SearchFilters, StageEvent};

/// Maps texts to L2-normalized vectors of a fixed dimension.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model and its parameters, e.g. `ngram:d256`.
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Turns the raw query into a fragment of the shared state.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    /// Every field this extractor may write.
    fn owned_fields(&self) -> &[&str];

    /// Substituted for the extractor's output when `extract` fails.
    fn default_output(&self) -> PartialState;

    async fn extract(&self, query: &str, context: &Context) -> Result<PartialState, ExtractError>;
}

/// Turns filter fields into a list of result records.
#[async_trait]
pub trait SearchOperation: Send + Sync {
    fn name(&self) -> &str;

    /// State field holding this operation's results.
    fn result_field(&self) -> &str;

    /// Primary key every result record must carry.
    fn dedup_key(&self) -> &str;

    /// Fields that must all be present before the operation may run.
    fn prerequisites(&self) -> &[&str];

    /// Fields of which at least one must be present, on top of
    /// [`prerequisites`](Self::prerequisites). Empty means no such condition.
    fn prerequisites_any(&self) -> &[&str] {
        &[]
    }

    /// Optional filter fields the operation reads. Relaxing any of these, or
    /// a prerequisite, makes the operation eligible again.
    fn consumes(&self) -> &[&str] {
        &[]
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Value>, SearchError>;
}

/// Receives the final state. Its output is merged into the `response` field.
#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn aggregate(&self, state: &SharedState) -> Result<Value, AggregateError>;
}

/// Side channel notified after every stage transition.
pub trait ProgressSink: Send + Sync {
    fn on_stage(&self, event: &StageEvent);
}
