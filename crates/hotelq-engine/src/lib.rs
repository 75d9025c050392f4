//! Query-resolution orchestration.
//!
//! An [`Engine`] fans a free-text request out to every registered extractor,
//! merges their fragments into one [`SharedState`](hotelq_core::SharedState),
//! runs whichever search operations the router finds eligible, and relaxes
//! filters across a bounded number of retries until something is found or
//! the budget is spent. The final state goes to the aggregator.

pub mod aggregate;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod node;
pub mod progress;
pub mod relax;
pub mod router;
pub mod search;
pub mod testing;

pub use aggregate::SummaryAggregator;
pub use engine::{normalize_query, Engine, EngineBuilder, Resolution, RunStatus};
pub use error::{EngineError, Result};
pub use node::{Node, NodeKind, Registry};
pub use progress::{ChannelProgress, TracingProgress};
pub use relax::{Relaxation, RelaxationPolicy};
pub use router::{Finish, OperationSpec, Route, RouteTable};
pub use search::{FuzzyHotelSearch, HotelSearch, LodgingBackend, PlanSearch, PoiSearch};
