//! On-disk layout of the geo cache.
//!
//! Per entity kind: `<kind>s.json` (records), `<kind>_names.json` (name
//! list), `<kind>.index` (vector index). `manifest.json` is written last and
//! is what makes a set of artifacts loadable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use hotelq_core::{Region, Subregion};

use crate::error::{GeoError, Result};
use crate::index::NameIndex;
use crate::table::{EntityTable, GeoEntity};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub embedder_id: String,
    pub dim: usize,
    pub regions: usize,
    pub subregions: usize,
    /// blake3 of the serialized region name list.
    pub region_names_blake3: String,
    pub subregion_names_blake3: String,
    pub created_at: DateTime<Utc>,
}

/// Everything a lookup needs, immutable once published.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub regions: EntityTable<Region>,
    pub subregions: EntityTable<Subregion>,
    pub manifest: Manifest,
}

fn records_file(kind: &str) -> String {
    format!("{kind}s.json")
}

fn names_file(kind: &str) -> String {
    format!("{kind}_names.json")
}

fn index_file(kind: &str) -> String {
    format!("{kind}.index")
}

/// Every artifact name, manifest included.
pub fn artifact_names() -> Vec<String> {
    let mut out = Vec::new();
    for kind in [Region::KIND, Subregion::KIND] {
        out.push(records_file(kind));
        out.push(names_file(kind));
        out.push(index_file(kind));
    }
    out.push(MANIFEST_FILE.to_string());
    out
}

pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads a snapshot built by `embedder_id`/`dim`. Any missing, unreadable
    /// or inconsistent artifact is an error and the caller rebuilds.
    pub fn load(&self, embedder_id: &str, dim: usize) -> Result<Snapshot> {
        let manifest: Manifest = serde_json::from_slice(&self.read(MANIFEST_FILE)?)
            .map_err(|e| GeoError::corrupt(MANIFEST_FILE, e.to_string()))?;
        if manifest.format_version != FORMAT_VERSION {
            let found = format!("format version {}", manifest.format_version);
            return Err(GeoError::ManifestMismatch(found));
        }
        if manifest.embedder_id != embedder_id || manifest.dim != dim {
            return Err(GeoError::ManifestMismatch(format!(
                "built with {} (d{}), current embedder is {embedder_id} (d{dim})",
                manifest.embedder_id, manifest.dim
            )));
        }
        let regions =
            self.load_table::<Region>(manifest.regions, &manifest.region_names_blake3, dim)?;
        let subregions = self.load_table::<Subregion>(
            manifest.subregions,
            &manifest.subregion_names_blake3,
            dim,
        )?;
        Ok(Snapshot { regions, subregions, manifest })
    }

    fn load_table<T: GeoEntity>(
        &self,
        count: usize,
        names_hash: &str,
        dim: usize,
    ) -> Result<EntityTable<T>> {
        let records_name = records_file(T::KIND);
        let names_name = names_file(T::KIND);
        let index_name = index_file(T::KIND);

        let records: Vec<T> = serde_json::from_slice(&self.read(&records_name)?)
            .map_err(|e| GeoError::corrupt(&records_name, e.to_string()))?;
        let names_bytes = self.read(&names_name)?;
        if blake3::hash(&names_bytes).to_hex().as_str() != names_hash {
            return Err(GeoError::corrupt(&names_name, "fingerprint does not match manifest"));
        }
        let names: Vec<String> = serde_json::from_slice(&names_bytes)
            .map_err(|e| GeoError::corrupt(&names_name, e.to_string()))?;
        let index = NameIndex::from_bytes(&index_name, &self.read(&index_name)?)?;
        if records.len() != count {
            let detail = format!("{} records, manifest says {count}", records.len());
            return Err(GeoError::corrupt(&records_name, detail));
        }
        if index.dim() != dim && !index.is_empty() {
            return Err(GeoError::corrupt(&index_name, format!("dim {} != {dim}", index.dim())));
        }
        EntityTable::new(records, names, index)
    }

    /// Writes all artifacts into a staging directory, moves them into place,
    /// then commits the manifest.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let staging = tempfile::Builder::new().prefix(".staging-").tempdir_in(&self.dir)?;

        let mut staged: Vec<String> = Vec::new();
        let region_hash = stage_table(staging.path(), &snapshot.regions, &mut staged)?;
        let subregion_hash = stage_table(staging.path(), &snapshot.subregions, &mut staged)?;

        let manifest = Manifest {
            region_names_blake3: region_hash,
            subregion_names_blake3: subregion_hash,
            ..snapshot.manifest.clone()
        };
        fs::write(staging.path().join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;

        // Without a manifest a half-replaced set is never loaded.
        remove_if_exists(&self.dir.join(MANIFEST_FILE))?;
        for name in &staged {
            fs::rename(staging.path().join(name), self.dir.join(name))?;
        }
        fs::rename(staging.path().join(MANIFEST_FILE), self.dir.join(MANIFEST_FILE))?;
        Ok(())
    }

    /// Deletes every artifact. Missing files are not an error.
    pub fn clear(&self) -> Result<()> {
        for name in artifact_names() {
            remove_if_exists(&self.dir.join(name))?;
        }
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.dir.join(name))?)
    }
}

/// Fingerprint of a name list exactly as it is written to disk.
pub fn names_fingerprint(names: &[String]) -> Result<String> {
    Ok(blake3::hash(&serde_json::to_vec(names)?).to_hex().to_string())
}

fn stage_table<T: GeoEntity>(
    dir: &Path,
    table: &EntityTable<T>,
    staged: &mut Vec<String>,
) -> Result<String> {
    let records_name = records_file(T::KIND);
    let names_name = names_file(T::KIND);
    let index_name = index_file(T::KIND);

    fs::write(dir.join(&records_name), serde_json::to_vec(table.records())?)?;
    let names_bytes = serde_json::to_vec(table.names())?;
    fs::write(dir.join(&names_name), &names_bytes)?;
    fs::write(dir.join(&index_name), table.index().to_bytes())?;

    staged.extend([records_name, names_name, index_name]);
    Ok(blake3::hash(&names_bytes).to_hex().to_string())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
