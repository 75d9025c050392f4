use arc_swap::ArcSwapOption;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use hotelq_core::config::GeoConfig;
use hotelq_core::{Embedder, Region, Subregion};

use crate::error::{GeoError, Result};
use crate::index::NameIndex;
use crate::normalize::{fold, swap_tai, variants};
use crate::source::GeoSource;
use crate::store::{names_fingerprint, CacheStore, Manifest, Snapshot, FORMAT_VERSION};
use crate::table::{EntityTable, GeoEntity};

/// Queries shorter than this are never resolved.
const MIN_NAME_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Containment,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoMatch<T> {
    pub entity: T,
    pub kind: MatchKind,
    /// 1.0 for exact and containment matches, the inner product otherwise.
    pub score: f32,
}

/// Result of [`GeoResolverCache::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeoResolution {
    pub region: Option<Region>,
    pub subregion: Option<Subregion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoLevel {
    Region,
    Subregion,
}

/// A known place name found inside free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoMention {
    pub level: GeoLevel,
    pub id: i64,
    /// Canonical name of the matched entity.
    pub name: String,
    /// Character offsets into the folded text.
    pub start: usize,
    pub end: usize,
}

/// Fuzzy name → identifier resolver for the region/subregion hierarchy.
///
/// Built lazily by [`initialize`](Self::initialize): load from `cache_dir`
/// when the persisted set matches the current embedder, otherwise fetch from
/// the source, embed every name and persist. One build runs at a time;
/// lookups load an immutable snapshot without locking and never wait on a
/// build.
pub struct GeoResolverCache {
    store: CacheStore,
    source: Arc<dyn GeoSource>,
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    nn_candidates: usize,
    max_prefix_chars: usize,
    build_lock: Mutex<()>,
    snapshot: ArcSwapOption<Snapshot>,
}

impl GeoResolverCache {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        config: &GeoConfig,
        source: Arc<dyn GeoSource>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            store: CacheStore::new(cache_dir),
            source,
            embedder,
            threshold: config.similarity_threshold,
            nn_candidates: config.nn_candidates.max(1),
            max_prefix_chars: config.max_prefix_chars,
            build_lock: Mutex::new(()),
            snapshot: ArcSwapOption::empty(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.load_full()
    }

    fn publish(&self, snapshot: Option<Arc<Snapshot>>) {
        self.snapshot.store(snapshot);
    }

    fn snap(&self) -> Result<Arc<Snapshot>> {
        self.current().ok_or(GeoError::NotInitialized)
    }

    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let _guard = self.build_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        let dir = self.store.dir().to_path_buf();
        let (id, dim) = (self.embedder.id().to_string(), self.embedder.dim());
        let loaded = tokio::task::spawn_blocking(move || CacheStore::new(dir).load(&id, dim)).await;
        match loaded {
            Ok(Ok(snapshot)) => {
                tracing::info!(
                    dir = %self.store.dir().display(),
                    regions = snapshot.regions.len(),
                    subregions = snapshot.subregions.len(),
                    "geo cache loaded from disk"
                );
                self.publish(Some(Arc::new(snapshot)));
                return Ok(());
            }
            Ok(Err(GeoError::Io(e))) if e.kind() == std::io::ErrorKind::NotFound => {
                let dir = self.store.dir().display();
                tracing::info!(dir = %dir, "no persisted geo cache, building");
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "persisted geo cache unusable, rebuilding"),
            Err(e) => tracing::warn!(error = %e, "geo cache load task failed, rebuilding"),
        }

        let snapshot = Arc::new(self.build().await?);
        let dir = self.store.dir().to_path_buf();
        let to_save = Arc::clone(&snapshot);
        match tokio::task::spawn_blocking(move || CacheStore::new(dir).save(&to_save)).await {
            Ok(Ok(())) => tracing::debug!(dir = %self.store.dir().display(), "geo cache persisted"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to persist geo cache, keeping it in memory");
            }
            Err(e) => {
                tracing::warn!(error = %e, "geo cache persist task failed, keeping it in memory");
            }
        }
        self.publish(Some(snapshot));
        Ok(())
    }

    async fn build(&self) -> Result<Snapshot> {
        let regions = self.source.fetch_regions().await?;
        let subregions = self.source.fetch_subregions().await?;
        tracing::info!(
            regions = regions.len(),
            subregions = subregions.len(),
            "building geo cache"
        );

        let regions = self.build_table(regions)?;
        let subregions = self.build_table(subregions)?;
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            embedder_id: self.embedder.id().to_string(),
            dim: self.embedder.dim(),
            regions: regions.len(),
            subregions: subregions.len(),
            region_names_blake3: names_fingerprint(regions.names())?,
            subregion_names_blake3: names_fingerprint(subregions.names())?,
            created_at: Utc::now(),
        };
        Ok(Snapshot { regions, subregions, manifest })
    }

    fn build_table<T: GeoEntity>(&self, records: Vec<T>) -> Result<EntityTable<T>> {
        let texts = EntityTable::<T>::embedding_texts(&records);
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != texts.len() {
            let mismatch = hotelq_core::EmbedError::CountMismatch {
                expected: texts.len(),
                got: vectors.len(),
            };
            return Err(mismatch.into());
        }
        let index = NameIndex::build(self.embedder.dim(), &vectors)?;
        let names = records.iter().map(|r| r.name().to_string()).collect();
        EntityTable::new(records, names, index)
    }

    /// Drops the in-memory snapshot and every persisted artifact.
    pub async fn clear_cache(&self) -> Result<()> {
        let _guard = self.build_lock.lock().await;
        self.publish(None);
        let dir = self.store.dir().to_path_buf();
        tokio::task::spawn_blocking(move || CacheStore::new(dir).clear())
            .await
            .map_err(|e| GeoError::Io(std::io::Error::other(e)))??;
        tracing::info!(dir = %self.store.dir().display(), "geo cache cleared");
        Ok(())
    }

    pub fn manifest(&self) -> Option<Manifest> {
        self.current().map(|s| s.manifest.clone())
    }

    pub fn lookup_region(&self, name: &str) -> Result<Option<GeoMatch<Region>>> {
        let snap = self.snap()?;
        self.lookup_in(&snap.regions, name, |_| true)
    }

    pub fn lookup_subregion(&self, name: &str) -> Result<Option<GeoMatch<Subregion>>> {
        self.lookup_subregion_within(name, &[])
    }

    /// Like [`lookup_subregion`](Self::lookup_subregion), but among equally
    /// good candidates prefers one under a region in `region_ids`.
    pub fn lookup_subregion_within(
        &self,
        name: &str,
        region_ids: &[i64],
    ) -> Result<Option<GeoMatch<Subregion>>> {
        let snap = self.snap()?;
        self.lookup_in(&snap.subregions, name, |s: &Subregion| {
            s.parent_region_id.is_some_and(|p| region_ids.contains(&p))
        })
    }

    fn lookup_in<T: GeoEntity>(
        &self,
        table: &EntityTable<T>,
        name: &str,
        preferred: impl Fn(&T) -> bool,
    ) -> Result<Option<GeoMatch<T>>> {
        let folded = fold(name);
        if folded.chars().count() < MIN_NAME_CHARS || table.is_empty() {
            return Ok(None);
        }
        let qv = variants(&folded);
        let pick = |rows: Vec<usize>| -> Option<T> {
            let preferred_row =
                rows.iter().copied().find(|&r| table.get(r).is_some_and(&preferred));
            table.get(preferred_row.or(rows.first().copied())?).cloned()
        };

        // The literal spelling outranks its 台/臺 and suffix variants.
        let exact = pick(table.literal_rows(&folded)).or_else(|| pick(table.exact_rows(&qv)));
        if let Some(entity) = exact {
            return Ok(Some(GeoMatch { entity, kind: MatchKind::Exact, score: 1.0 }));
        }
        if let Some(entity) = pick(table.containment_rows(&qv)) {
            return Ok(Some(GeoMatch { entity, kind: MatchKind::Containment, score: 1.0 }));
        }

        let mut queries = vec![folded.clone()];
        if let Some(swapped) = swap_tai(&folded) {
            queries.push(swapped);
        }
        let vectors = self.embedder.embed_batch(&queries)?;
        let best = vectors
            .iter()
            .flat_map(|v| table.index().search(v, self.nn_candidates))
            .fold(None::<(usize, f32)>, |best, hit| match best {
                Some(b) if b.1 > hit.1 || (b.1 == hit.1 && b.0 <= hit.0) => Some(b),
                _ => Some(hit),
            });
        match best {
            Some((row, score)) if score >= self.threshold => {
                let matched = table.names().get(row).map(String::as_str).unwrap_or_default();
                tracing::debug!(query = name, matched, score, "fuzzy geo match");
                let entity = table.get(row).cloned();
                Ok(entity.map(|entity| GeoMatch { entity, kind: MatchKind::Fuzzy, score }))
            }
            _ => Ok(None),
        }
    }

    /// Splits a region name directly followed by a subregion name, e.g.
    /// `台北市信義區`. Prefixes are tried shortest first, and every region a
    /// prefix names is tried, literal spelling first. The first region whose
    /// remainder names one of its subregions wins.
    pub fn decompose(&self, text: &str) -> Result<Option<(Region, Subregion)>> {
        let snap = self.snap()?;
        let chars: Vec<char> = fold(text).chars().filter(|c| !c.is_whitespace()).collect();
        let longest = self.max_prefix_chars.min(chars.len().saturating_sub(MIN_NAME_CHARS));
        for len in MIN_NAME_CHARS..=longest {
            let prefix: String = chars[..len].iter().collect();
            let mut region_rows = snap.regions.literal_rows(&prefix);
            for row in snap.regions.exact_rows(&variants(&prefix)) {
                if !region_rows.contains(&row) {
                    region_rows.push(row);
                }
            }
            if region_rows.is_empty() {
                continue;
            }
            let rest: String = chars[len..].iter().collect();
            let rv = variants(&rest);
            for region in region_rows.into_iter().filter_map(|r| snap.regions.get(r)) {
                let under = |r: &usize| {
                    snap.subregions.get(*r).is_some_and(|s| s.parent_region_id == Some(region.id))
                };
                let hit = snap
                    .subregions
                    .exact_rows(&rv)
                    .into_iter()
                    .find(under)
                    .or_else(|| snap.subregions.containment_rows(&rv).into_iter().find(under));
                if let Some(sub) = hit.and_then(|r| snap.subregions.get(r)) {
                    tracing::debug!(
                        text,
                        region = %region.name,
                        subregion = %sub.name,
                        "compound geo name"
                    );
                    return Ok(Some((region.clone(), sub.clone())));
                }
            }
        }
        Ok(None)
    }

    /// Compound decomposition, then region lookup, then subregion lookup.
    pub fn resolve(&self, text: &str) -> Result<GeoResolution> {
        if let Some((region, subregion)) = self.decompose(text)? {
            return Ok(GeoResolution { region: Some(region), subregion: Some(subregion) });
        }
        if let Some(m) = self.lookup_region(text)? {
            return Ok(GeoResolution { region: Some(m.entity), subregion: None });
        }
        if let Some(m) = self.lookup_subregion(text)? {
            let region = match m.entity.parent_region_id {
                Some(id) => self.region_by_id(id)?,
                None => None,
            };
            return Ok(GeoResolution { region, subregion: Some(m.entity) });
        }
        Ok(GeoResolution::default())
    }

    /// Known names occurring in `text`, longest spelling first, no overlaps.
    /// A spelling shared by a region and a subregion counts as the region; an
    /// ambiguous subregion name resolves under a mentioned region if any.
    pub fn mentions(&self, text: &str) -> Result<Vec<GeoMention>> {
        let snap = self.snap()?;
        let mut chars: Vec<char> = fold(text).chars().collect();

        let mut spellings: HashMap<Vec<char>, Vec<(GeoLevel, usize)>> = HashMap::new();
        for (v, row) in snap.regions.alias_pairs() {
            spellings.entry(v.chars().collect()).or_default().push((GeoLevel::Region, row));
        }
        for (v, row) in snap.subregions.alias_pairs() {
            spellings.entry(v.chars().collect()).or_default().push((GeoLevel::Subregion, row));
        }
        let mut ordered: Vec<(Vec<char>, Vec<(GeoLevel, usize)>)> =
            spellings.into_iter().filter(|(s, _)| s.len() >= MIN_NAME_CHARS).collect();
        ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let mut found: Vec<(usize, usize, Vec<(GeoLevel, usize)>)> = Vec::new();
        for (spelling, candidates) in &ordered {
            let n = spelling.len();
            let mut start = 0;
            while start + n <= chars.len() {
                if chars[start..start + n] == spelling[..] {
                    found.push((start, start + n, candidates.clone()));
                    chars[start..start + n].fill('\0');
                    start += n;
                } else {
                    start += 1;
                }
            }
        }
        found.sort_by_key(|f| f.0);

        let region_ids: Vec<i64> = found
            .iter()
            .filter_map(|f| f.2.iter().find(|c| c.0 == GeoLevel::Region))
            .filter_map(|c| snap.regions.get(c.1).map(|r| r.id))
            .collect();
        let mut out: Vec<GeoMention> = Vec::with_capacity(found.len());
        for (start, end, candidates) in found {
            let level = if candidates.iter().any(|c| c.0 == GeoLevel::Region) {
                GeoLevel::Region
            } else {
                GeoLevel::Subregion
            };
            let rows: Vec<usize> =
                candidates.iter().filter(|c| c.0 == level).map(|c| c.1).collect();
            let (id, name) = match level {
                GeoLevel::Region => match snap.regions.get(rows[0]) {
                    Some(r) => (r.id, r.name.clone()),
                    None => continue,
                },
                GeoLevel::Subregion => {
                    let under_mentioned = |r: &usize| {
                        snap.subregions
                            .get(*r)
                            .and_then(|s| s.parent_region_id)
                            .is_some_and(|p| region_ids.contains(&p))
                    };
                    let row = rows.iter().copied().find(under_mentioned).unwrap_or(rows[0]);
                    match snap.subregions.get(row) {
                        Some(s) => (s.id, s.name.clone()),
                        None => continue,
                    }
                }
            };
            if !out.iter().any(|m| m.level == level && m.id == id) {
                out.push(GeoMention { level, id, name, start, end });
            }
        }
        Ok(out)
    }

    pub fn region_by_id(&self, id: i64) -> Result<Option<Region>> {
        Ok(self.snap()?.regions.by_id(id).cloned())
    }

    pub fn subregion_by_id(&self, id: i64) -> Result<Option<Subregion>> {
        Ok(self.snap()?.subregions.by_id(id).cloned())
    }

    pub fn subregions_of(&self, region_id: i64) -> Result<Vec<Subregion>> {
        let snap = self.snap()?;
        Ok(snap
            .subregions
            .records()
            .iter()
            .filter(|s| s.parent_region_id == Some(region_id))
            .cloned()
            .collect())
    }

    pub fn regions(&self) -> Result<Vec<Region>> {
        Ok(self.snap()?.regions.records().to_vec())
    }
}
