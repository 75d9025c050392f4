//! Upstream providers of the region hierarchy.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hotelq_core::{Region, Subregion};

use crate::error::{GeoError, Result};

/// Where the cache gets its entities from when nothing usable is on disk.
#[async_trait]
pub trait GeoSource: Send + Sync {
    async fn fetch_regions(&self) -> Result<Vec<Region>>;
    async fn fetch_subregions(&self) -> Result<Vec<Subregion>>;
}

/// Reads `regions.json` and `subregions.json` from a directory.
pub struct JsonFileSource {
    dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| GeoError::Source(format!("{}: {e}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| GeoError::Source(format!("{}: {e}", path.display())))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl GeoSource for JsonFileSource {
    async fn fetch_regions(&self) -> Result<Vec<Region>> {
        self.read("regions.json").await
    }

    async fn fetch_subregions(&self) -> Result<Vec<Subregion>> {
        self.read("subregions.json").await
    }
}

/// In-memory source that counts how many builds it served.
#[derive(Default)]
pub struct StaticGeoSource {
    regions: Vec<Region>,
    subregions: Vec<Subregion>,
    delay: Option<Duration>,
    fail: bool,
    fetches: AtomicUsize,
}

impl StaticGeoSource {
    pub fn new(regions: Vec<Region>, subregions: Vec<Subregion>) -> Self {
        Self { regions, subregions, ..Self::default() }
    }

    /// Sleeps before answering, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every fetch fails.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// Number of `fetch_regions` calls, i.e. rebuilds served.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// A small slice of the Taiwanese hierarchy, enough for examples and tests.
    pub fn taiwan_sample() -> Self {
        let region = |id: i64, name: &str| Region { id, name: name.to_string() };
        let sub = |id: i64, name: &str, parent: i64| Subregion {
            id,
            name: name.to_string(),
            parent_region_id: Some(parent),
        };
        Self::new(
            vec![
                region(1, "臺北市"),
                region(2, "新北市"),
                region(3, "基隆市"),
                region(4, "臺南市"),
                region(5, "花蓮縣"),
            ],
            vec![
                sub(101, "信義區", 1),
                sub(102, "大安區", 1),
                sub(103, "中正區", 1),
                sub(104, "北投區", 1),
                sub(201, "板橋區", 2),
                sub(202, "淡水區", 2),
                sub(301, "中正區", 3),
                sub(302, "七堵區", 3),
                sub(401, "安平區", 4),
                sub(402, "中西區", 4),
                sub(501, "花蓮市", 5),
                sub(502, "秀林鄉", 5),
            ],
        )
    }
}

#[async_trait]
impl GeoSource for StaticGeoSource {
    async fn fetch_regions(&self) -> Result<Vec<Region>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail {
            return Err(GeoError::Source("static source configured to fail".into()));
        }
        Ok(self.regions.clone())
    }

    async fn fetch_subregions(&self) -> Result<Vec<Subregion>> {
        if self.fail {
            return Err(GeoError::Source("static source configured to fail".into()));
        }
        Ok(self.subregions.clone())
    }
}
