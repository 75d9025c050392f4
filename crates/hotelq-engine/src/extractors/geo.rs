use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use hotelq_core::{fields, Context, ExtractError, Extractor, PartialState};
use hotelq_geo::{GeoError, GeoLevel, GeoResolverCache};

const OWNED: &[&str] = &[fields::REGION_NAMES, fields::SUBREGION_NAMES];

fn unavailable(err: GeoError) -> ExtractError {
    ExtractError::Unavailable(format!("geo cache: {err}"))
}

/// Place names found in the query, plus `context["destination"]`. Emits the
/// canonical names; the engine turns them into ids before routing.
pub struct GeoExtractor {
    geo: Arc<GeoResolverCache>,
}

impl GeoExtractor {
    pub fn new(geo: Arc<GeoResolverCache>) -> Self {
        Self { geo }
    }
}

#[async_trait]
impl Extractor for GeoExtractor {
    fn name(&self) -> &str {
        "geo"
    }

    fn owned_fields(&self) -> &[&str] {
        OWNED
    }

    fn default_output(&self) -> PartialState {
        PartialState::new()
    }

    async fn extract(&self, query: &str, context: &Context) -> Result<PartialState, ExtractError> {
        self.geo.initialize().await.map_err(unavailable)?;

        let mut regions = Vec::new();
        let mut subregions = Vec::new();
        for mention in self.geo.mentions(query).map_err(unavailable)? {
            match mention.level {
                GeoLevel::Region => regions.push(mention.name),
                GeoLevel::Subregion => subregions.push(mention.name),
            }
        }

        if let Some(destination) = context.get("destination").and_then(Value::as_str) {
            let resolved = self.geo.resolve(destination).map_err(unavailable)?;
            regions.extend(resolved.region.map(|r| r.name));
            subregions.extend(resolved.subregion.map(|s| s.name));
        }
        tracing::debug!(?regions, ?subregions, "place names extracted");

        let mut out = PartialState::new();
        if !regions.is_empty() {
            out.insert(fields::REGION_NAMES, json!(regions));
        }
        if !subregions.is_empty() {
            out.insert(fields::SUBREGION_NAMES, json!(subregions));
        }
        Ok(out)
    }
}
