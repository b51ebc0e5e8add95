use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::Value;
use tempfile::Builder;

use crate::domain::Source;
use crate::error::CatalogError;

pub const CACHE_FILE_SUFFIX: &str = "_datasets.json";

/// Directory holding one `{source}_datasets.json` file per source.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: Utf8PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn source_path(&self, source: Source) -> Utf8PathBuf {
        self.root.join(source.cache_file_name())
    }

    pub fn ensure_root(&self) -> Result<(), CatalogError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))
    }

    /// Cache files present in the directory, sorted by name.
    pub fn list_cache_files(&self) -> Result<Vec<Utf8PathBuf>, CatalogError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| CatalogError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            let is_cache = path
                .file_name()
                .map(|name| name.ends_with(CACHE_FILE_SUFFIX))
                .unwrap_or(false);
            if is_cache && path.as_std_path().is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn read_records(path: &Utf8Path) -> Result<Vec<Value>, CatalogError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
        let value: Value =
            serde_json::from_str(&content).map_err(|err| CatalogError::CacheParse {
                path: path.to_string(),
                message: err.to_string(),
            })?;
        match value {
            Value::Array(records) => Ok(records),
            _ => Err(CatalogError::CacheParse {
                path: path.to_string(),
                message: "expected a JSON array of records".to_string(),
            }),
        }
    }

    /// Replaces the whole file; readers never observe a half-written array.
    pub fn write_records<T: Serialize>(path: &Utf8Path, records: &[T]) -> Result<(), CatalogError> {
        let parent = path
            .parent()
            .ok_or_else(|| CatalogError::Filesystem("invalid cache path".to_string()))?;
        let parent = if parent.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            parent
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(records)
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".neuro-catalog")
            .suffix(".tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
