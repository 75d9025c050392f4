//! Shared building blocks for the query-resolution pipeline.
//!
//! - [`reducer`]: pure merge functions used to combine two versions of a field
//! - [`state`]: the field registry and the shared state record threaded through a request
//! - [`types`]: geo entities, search filters, stage events
//! - [`traits`]: the component contracts (extractors, search operations, embedders, ...)
//! - [`config`]: Figment-backed configuration

pub mod config;
pub mod error;
pub mod reducer;
pub mod state;
pub mod traits;
pub mod types;

pub use error::{AggregateError, EmbedError, Error, ExtractError, Result, SearchError};
pub use reducer::Reducer;
pub use state::{fields, FieldSpec, PartialState, Schema, SharedState};
pub use traits::{Aggregator, Embedder, Extractor, ProgressSink, SearchOperation};
pub use types::{
    AnchorHotel, Context, RelaxStep, Region, SearchFilters, Stage, StageEvent, Subregion,
};
