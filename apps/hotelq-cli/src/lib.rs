//! Setup shared by the `hotelq` binaries.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hotelq_core::config::AppConfig;
use hotelq_core::{ProgressSink, StageEvent};
use hotelq_embed::get_default_embedder;
use hotelq_geo::{GeoResolverCache, GeoSource, JsonFileSource, StaticGeoSource};

/// Logs to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Geo cache wired from `geo.*` and `embed.*`. Without `geo.source_dir` the
/// built-in Taiwan sample is used.
pub fn geo_cache(config: &AppConfig, base: &Path) -> Result<Arc<GeoResolverCache>> {
    let embedder = get_default_embedder(&config.embed, base)?;
    let source: Arc<dyn GeoSource> = match config.geo.source_path(base) {
        Some(dir) => Arc::new(JsonFileSource::new(dir)),
        None => {
            tracing::warn!("geo.source_dir not set, using the built-in sample hierarchy");
            Arc::new(StaticGeoSource::taiwan_sample())
        }
    };
    let cache_dir = config.geo.cache_path(base);
    tracing::debug!(cache_dir = %cache_dir.display(), embedder = embedder.id(), "geo cache");
    Ok(Arc::new(GeoResolverCache::new(cache_dir, &config.geo, source, embedder)))
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let template = "{spinner:.green} [{elapsed_precise}] {msg}";
    if let Ok(style) = ProgressStyle::default_spinner().template(template) {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    pb
}

/// Shows the current pipeline stage on a spinner.
pub struct SpinnerProgress(pub ProgressBar);

impl ProgressSink for SpinnerProgress {
    fn on_stage(&self, event: &StageEvent) {
        let found: usize = event.result_counts.values().sum();
        self.0.set_message(format!("{} (retry {}, {found} found)", event.stage, event.retry_count));
    }
}
