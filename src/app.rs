use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::backend::SearchBackend;
use crate::config::ResolvedConfig;
use crate::downloader::{FetchMode, FetchReport, SourceDownloader, run_downloader};
use crate::error::CatalogError;
use crate::indexer::{IndexReport, Indexer, IndexerOptions};
use crate::loader::load_datasets;
use crate::search::{
    FilterOptions, SearchFacade, SearchFilters, filter_expression, filter_options_from_hits,
};
use crate::store::CacheStore;

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub reports: Vec<FetchReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexResult {
    pub loaded: usize,
    pub files: Vec<String>,
    pub skipped_files: Vec<String>,
    pub duplicates: usize,
    pub skipped_records: usize,
    pub report: IndexReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub filter: Option<String>,
    pub hits: Vec<Value>,
    pub options: FilterOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub index: String,
    pub documents: u64,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Wires the cache, the downloaders and the search service together.
pub struct App<B: SearchBackend> {
    config: ResolvedConfig,
    backend: B,
}

impl<B: SearchBackend> App<B> {
    pub fn new(config: ResolvedConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn store(&self) -> CacheStore {
        CacheStore::new(self.config.cache_dir.clone())
    }

    /// Runs each downloader in turn; the first transport failure aborts the run.
    pub fn fetch(
        &self,
        downloaders: &[Box<dyn SourceDownloader>],
        mode: FetchMode,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, CatalogError> {
        let store = self.store();
        let mut reports = Vec::with_capacity(downloaders.len());
        for downloader in downloaders {
            reports.push(run_downloader(downloader.as_ref(), &store, mode, sink)?);
        }
        Ok(FetchResult { reports })
    }

    pub fn build_index(&self, sink: &dyn ProgressSink) -> Result<IndexResult, CatalogError> {
        sink.event(ProgressEvent {
            message: format!("phase=Load; reading {}", self.config.cache_dir),
            elapsed: None,
        });
        let loaded = load_datasets(&self.config.cache_dir)?;
        let indexer = Indexer::new(&self.backend, IndexerOptions::from(&self.config));
        let report = indexer.rebuild(&loaded.datasets, sink)?;
        Ok(IndexResult {
            loaded: loaded.datasets.len(),
            files: loaded.files,
            skipped_files: loaded.skipped_files,
            duplicates: loaded.duplicates,
            skipped_records: loaded.skipped_records,
            report,
        })
    }

    fn facade(&self) -> SearchFacade<&B> {
        SearchFacade::new(&self.backend, self.config.index_name.clone())
    }

    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<SearchResult, CatalogError> {
        let hits = self.facade().search(query, filters, limit)?;
        let options = filter_options_from_hits(&hits);
        Ok(SearchResult {
            query: query.to_string(),
            filter: filter_expression(filters),
            hits,
            options,
        })
    }

    /// Filter values from a full scan, or from the hits of `from_query` when given.
    pub fn filter_options(
        &self,
        from_query: Option<&str>,
        limit: usize,
    ) -> Result<FilterOptions, CatalogError> {
        let facade = self.facade();
        match from_query {
            Some(query) => {
                let hits = facade.search(query, &SearchFilters::default(), limit)?;
                Ok(filter_options_from_hits(&hits))
            }
            None => facade.all_filter_options(),
        }
    }

    pub fn stats(&self) -> Result<StatsResult, CatalogError> {
        Ok(StatsResult {
            index: self.config.index_name.clone(),
            documents: self.facade().document_count()?,
        })
    }
}
