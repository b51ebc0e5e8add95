use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::ResolvedConfig;
use crate::dandi::{DandiDownloader, DandiHttpClient};
use crate::domain::{DatasetMetadata, NOT_SPECIFIED, Source};
use crate::error::CatalogError;
use crate::normalize::normalize_record;
use crate::openneuro::{OpenNeuroDownloader, OpenNeuroHttpClient};
use crate::store::CacheStore;

/// Raw records of one page plus the entries listed on it that could not be retrieved.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub records: Vec<Value>,
    pub unavailable: usize,
}

impl From<Vec<Value>> for RawPage {
    fn from(records: Vec<Value>) -> Self {
        Self {
            records,
            unavailable: 0,
        }
    }
}

/// Harvests one remote catalog and maps its records into canonical form.
pub trait SourceDownloader {
    fn source(&self) -> Source;

    /// Streams the catalog page by page; returns the number of pages requested.
    fn fetch_pages(
        &self,
        visit: &mut dyn FnMut(RawPage) -> Result<(), CatalogError>,
    ) -> Result<usize, CatalogError>;

    fn map(&self, raw: &Value) -> Result<DatasetMetadata, CatalogError>;

    fn fetch(&self) -> Result<Vec<Value>, CatalogError> {
        let mut records = Vec::new();
        self.fetch_pages(&mut |page| {
            records.extend(page.records);
            Ok(())
        })?;
        Ok(records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Re-fetch everything and overwrite the cache once at the end.
    #[default]
    Full,
    /// Keep the previous cache, append unseen ids, persist after every page.
    Incremental,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub source: String,
    pub fetched: usize,
    pub skipped: usize,
    pub written: usize,
    pub pages: usize,
    pub cache_path: String,
    pub fetched_at: String,
}

pub fn run_downloader(
    downloader: &dyn SourceDownloader,
    store: &CacheStore,
    mode: FetchMode,
    sink: &dyn ProgressSink,
) -> Result<FetchReport, CatalogError> {
    let source = downloader.source();
    let cache_path = store.source_path(source);
    store.ensure_root()?;

    sink.event(ProgressEvent {
        message: format!("phase=Fetch; {source} ({mode:?})"),
        elapsed: None,
    });
    let start = std::time::Instant::now();

    let mut records: Vec<DatasetMetadata> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    if mode == FetchMode::Incremental && cache_path.as_std_path().exists() {
        match CacheStore::read_records(&cache_path) {
            Ok(previous) => {
                for raw in &previous {
                    let record = normalize_record(raw);
                    if record.id == NOT_SPECIFIED {
                        warn!(source = %source, name = %record.name, "dropping cached record without id");
                        continue;
                    }
                    if seen.insert(record.id.clone()) {
                        records.push(record);
                    }
                }
                info!(source = %source, existing = records.len(), "resuming from cache");
            }
            Err(err) => warn!(source = %source, error = %err, "ignoring unreadable cache"),
        }
    }

    let mut fetched = 0usize;
    let mut skipped = 0usize;
    let pages = downloader.fetch_pages(&mut |page| {
        let received = page.records.len() + page.unavailable;
        fetched += received;
        skipped += page.unavailable;
        let mut added = 0usize;
        for raw in &page.records {
            match downloader.map(raw).map(DatasetMetadata::normalized) {
                Ok(record) if record.id == NOT_SPECIFIED => {
                    skipped += 1;
                    warn!(source = %source, name = %record.name, "skipping record without id");
                }
                Ok(record) => {
                    if mode == FetchMode::Incremental && !seen.insert(record.id.clone()) {
                        continue;
                    }
                    records.push(record);
                    added += 1;
                }
                Err(err) => {
                    skipped += 1;
                    warn!(source = %source, id = %best_effort_id(raw), error = %err, "skipping record");
                }
            }
        }
        debug!(source = %source, received, added, "page processed");
        sink.event(ProgressEvent {
            message: format!("{source}.page received={received} total={}", records.len()),
            elapsed: Some(start.elapsed()),
        });
        if mode == FetchMode::Incremental && added > 0 {
            CacheStore::write_records(&cache_path, &records)?;
        }
        Ok(())
    })?;

    if mode == FetchMode::Full || !cache_path.as_std_path().exists() {
        CacheStore::write_records(&cache_path, &records)?;
    }
    info!(
        source = %source,
        fetched,
        skipped,
        written = records.len(),
        pages,
        path = %cache_path,
        "fetch complete"
    );
    sink.event(ProgressEvent {
        message: format!("phase=Store; saved {} datasets to {cache_path}", records.len()),
        elapsed: Some(start.elapsed()),
    });

    Ok(FetchReport {
        source: source.to_string(),
        fetched,
        skipped,
        written: records.len(),
        pages,
        cache_path: cache_path.to_string(),
        fetched_at: Utc::now().to_rfc3339(),
    })
}

/// Identifier to log for a record that could not be mapped.
pub fn best_effort_id(raw: &Value) -> String {
    let candidates = [
        raw.pointer("/metadata/datasetId"),
        raw.get("identifier"),
        raw.get("id"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|value| match value {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Downloaders for the requested sources, in the order given.
pub fn downloaders_for(
    sources: &[Source],
    config: &ResolvedConfig,
) -> Result<Vec<Box<dyn SourceDownloader>>, CatalogError> {
    let mut downloaders: Vec<Box<dyn SourceDownloader>> = Vec::new();
    for source in sources {
        match source {
            Source::OpenNeuro => {
                let client = OpenNeuroHttpClient::new(&config.openneuro_url)?;
                downloaders.push(Box::new(OpenNeuroDownloader::new(client, config.page_size)));
            }
            Source::Dandi => {
                let client = DandiHttpClient::new(&config.dandi_url)?;
                downloaders.push(Box::new(DandiDownloader::new(client, config.page_size)));
            }
        }
    }
    Ok(downloaders)
}
