use std::collections::HashSet;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{DatasetMetadata, NOT_SPECIFIED};
use crate::error::CatalogError;
use crate::normalize::normalize_record;
use crate::store::CacheStore;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadedDatasets {
    pub datasets: Vec<DatasetMetadata>,
    pub files: Vec<String>,
    pub skipped_files: Vec<String>,
    pub duplicates: usize,
    /// Records dropped because they carry no usable id.
    pub skipped_records: usize,
}

/// Reads every `*_datasets.json` file under `dir`, re-cleans each record and merges
/// them on `(source, id)`. Unreadable files and records without an id are logged and skipped.
pub fn load_datasets(dir: &Utf8Path) -> Result<LoadedDatasets, CatalogError> {
    let store = CacheStore::new(dir);
    let mut loaded = LoadedDatasets::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for path in store.list_cache_files()? {
        let records = match CacheStore::read_records(&path) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %path, error = %err, "skipping cache file");
                loaded.skipped_files.push(path.to_string());
                continue;
            }
        };
        let mut kept = 0usize;
        for raw in &records {
            let record = normalize_record(raw);
            if record.id == NOT_SPECIFIED {
                warn!(path = %path, name = %record.name, "skipping record without id");
                loaded.skipped_records += 1;
                continue;
            }
            let (source, id) = record.identity();
            if !seen.insert((source.to_string(), id.to_string())) {
                loaded.duplicates += 1;
                continue;
            }
            loaded.datasets.push(record);
            kept += 1;
        }
        info!(path = %path, records = records.len(), kept, "loaded cache file");
        loaded.files.push(path.to_string());
    }

    info!(
        total = loaded.datasets.len(),
        duplicates = loaded.duplicates,
        skipped_records = loaded.skipped_records,
        skipped_files = loaded.skipped_files.len(),
        "datasets loaded"
    );
    Ok(loaded)
}
