//! Geo Resolver Cache: fuzzy region / subregion name resolution backed by a
//! disk-persisted nearest-neighbour index.
//!
//! Lookup order is exact (including 台/臺 and suffix variants), then
//! containment, then nearest neighbour above the similarity threshold.

pub mod cache;
pub mod error;
pub mod index;
pub mod normalize;
pub mod source;
pub mod store;
pub mod table;

pub use cache::{GeoLevel, GeoMatch, GeoMention, GeoResolution, GeoResolverCache, MatchKind};
pub use error::{GeoError, Result};
pub use index::NameIndex;
pub use source::{GeoSource, JsonFileSource, StaticGeoSource};
pub use store::{artifact_names, Manifest, MANIFEST_FILE};
