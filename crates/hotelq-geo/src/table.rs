use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;

use hotelq_core::{Region, Subregion};

use crate::error::{GeoError, Result};
use crate::index::NameIndex;
use crate::normalize::{fold, variants};

pub trait GeoEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Artifact stem, e.g. `region` → `regions.json`, `region_names.json`, `region.index`.
    const KIND: &'static str;
    fn id(&self) -> i64;
    fn name(&self) -> &str;
    fn parent_id(&self) -> Option<i64> {
        None
    }
}

impl GeoEntity for Region {
    const KIND: &'static str = "region";
    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl GeoEntity for Subregion {
    const KIND: &'static str = "subregion";
    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn parent_id(&self) -> Option<i64> {
        self.parent_region_id
    }
}

/// One entity type: records, the index-aligned name list and vector index,
/// plus derived alias lookups rebuilt on every load.
#[derive(Debug, Clone)]
pub struct EntityTable<T> {
    records: Vec<T>,
    names: Vec<String>,
    index: NameIndex,
    /// Spelling variant → rows carrying it, ascending.
    aliases: HashMap<String, Vec<usize>>,
    /// Row → its variants.
    row_variants: Vec<Vec<String>>,
}

impl<T: GeoEntity> EntityTable<T> {
    pub fn new(records: Vec<T>, names: Vec<String>, index: NameIndex) -> Result<Self> {
        if names.len() != records.len() || index.len() != records.len() {
            return Err(GeoError::corrupt(
                T::KIND,
                format!(
                    "{} records, {} names, {} index rows",
                    records.len(),
                    names.len(),
                    index.len()
                ),
            ));
        }
        if let Some(i) = records.iter().zip(&names).position(|(r, n)| r.name() != n) {
            let detail = format!("name list diverges from records at row {i}");
            return Err(GeoError::corrupt(T::KIND, detail));
        }
        let row_variants: Vec<Vec<String>> = names.iter().map(|n| variants(n)).collect();
        let mut aliases: HashMap<String, Vec<usize>> = HashMap::new();
        for (row, vs) in row_variants.iter().enumerate() {
            for v in vs {
                aliases.entry(v.clone()).or_default().push(row);
            }
        }
        Ok(Self { records, names, index, aliases, row_variants })
    }

    /// Texts fed to the embedder, one per row.
    pub fn embedding_texts(records: &[T]) -> Vec<String> {
        records.iter().map(|r| fold(r.name())).collect()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index(&self) -> &NameIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&T> {
        self.records.get(row)
    }

    pub fn by_id(&self, id: i64) -> Option<&T> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Rows whose folded canonical name is exactly `folded`.
    pub fn literal_rows(&self, folded: &str) -> Vec<usize> {
        self.aliases
            .get(folded)
            .map(|rows| {
                rows.iter()
                    .copied()
                    .filter(|&r| {
                        let canonical = self.row_variants.get(r).and_then(|v| v.first());
                        canonical.is_some_and(|v| v == folded)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rows whose name, or one of its variants, equals a variant of `query`.
    pub fn exact_rows(&self, query_variants: &[String]) -> Vec<usize> {
        let mut rows: Vec<usize> = Vec::new();
        for q in query_variants {
            for &row in self.aliases.get(q).map(Vec::as_slice).unwrap_or(&[]) {
                if !rows.contains(&row) {
                    rows.push(row);
                }
            }
        }
        rows
    }

    /// Rows where a query variant and a name variant contain one another,
    /// shortest canonical name first.
    pub fn containment_rows(&self, query_variants: &[String]) -> Vec<usize> {
        let mut rows: Vec<usize> = (0..self.len())
            .filter(|&row| {
                self.row_variants[row]
                    .iter()
                    .any(|v| {
                        query_variants
                            .iter()
                            .any(|q| v.contains(q.as_str()) || q.contains(v.as_str()))
                    })
            })
            .collect();
        rows.sort_by_key(|&row| (self.names[row].chars().count(), row));
        rows
    }

    /// Every (variant, row) pair, for mention scanning.
    pub fn alias_pairs(&self) -> impl Iterator<Item = (&str, usize)> {
        self.row_variants
            .iter()
            .enumerate()
            .flat_map(|(row, vs)| vs.iter().map(move |v| (v.as_str(), row)))
    }
}
