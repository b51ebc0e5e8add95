use std::fs;
use std::sync::Mutex;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde_json::{Value, json};

use neuro_catalog::app::App;
use neuro_catalog::backend::{DocumentFailure, IndexSettings, SearchBackend, SearchRequest};
use neuro_catalog::config::ResolvedConfig;
use neuro_catalog::dandi::map_dandiset_metadata;
use neuro_catalog::domain::{DatasetMetadata, IndexedDocument, Source};
use neuro_catalog::downloader::{FetchMode, RawPage, SourceDownloader};
use neuro_catalog::error::CatalogError;
use neuro_catalog::output::JsonOutput;
use neuro_catalog::search::SearchFilters;

/// Keeps uploaded documents in memory and serves them back as hits.
#[derive(Default)]
struct MemoryBackend {
    documents: Mutex<Vec<Value>>,
    last_filter: Mutex<Option<String>>,
}

impl SearchBackend for MemoryBackend {
    fn delete_index(&self, _index: &str) -> Result<bool, CatalogError> {
        let mut documents = self.documents.lock().unwrap();
        let existed = !documents.is_empty();
        documents.clear();
        Ok(existed)
    }

    fn create_index(&self, _index: &str, _settings: &IndexSettings) -> Result<(), CatalogError> {
        Ok(())
    }

    fn add_documents(
        &self,
        _index: &str,
        documents: &[IndexedDocument],
        _tensor_fields: &[&str],
    ) -> Result<Vec<DocumentFailure>, CatalogError> {
        let mut stored = self.documents.lock().unwrap();
        for document in documents {
            stored.push(serde_json::to_value(document).unwrap());
        }
        Ok(Vec::new())
    }

    fn search(&self, _index: &str, request: &SearchRequest) -> Result<Vec<Value>, CatalogError> {
        *self.last_filter.lock().unwrap() = request.filter.clone();
        let documents = self.documents.lock().unwrap();
        Ok(documents.iter().take(request.limit).cloned().collect())
    }

    fn document_count(&self, _index: &str) -> Result<u64, CatalogError> {
        Ok(self.documents.lock().unwrap().len() as u64)
    }
}

struct StaticDownloader;

impl SourceDownloader for StaticDownloader {
    fn source(&self) -> Source {
        Source::Dandi
    }

    fn fetch_pages(
        &self,
        visit: &mut dyn FnMut(RawPage) -> Result<(), CatalogError>,
    ) -> Result<usize, CatalogError> {
        visit(RawPage::from(vec![
            json!({"identifier": "DANDI:000001", "version": "draft", "name": "One"}),
        ]))?;
        Ok(1)
    }

    fn map(&self, raw: &Value) -> Result<DatasetMetadata, CatalogError> {
        map_dandiset_metadata(raw)
    }
}

fn app_in_tempdir(backend: &MemoryBackend) -> (tempfile::TempDir, App<&MemoryBackend>) {
    let temp = tempfile::tempdir().unwrap();
    let cache_dir = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
    let config = ResolvedConfig {
        cache_dir,
        batch_delay: Duration::ZERO,
        ..ResolvedConfig::default()
    };
    (temp, App::new(config, backend))
}

#[test]
fn build_index_from_cache_then_search() {
    let backend = MemoryBackend::default();
    let (_temp, app) = app_in_tempdir(&backend);
    let cache_dir = app.config().cache_dir.clone();
    fs::create_dir_all(&cache_dir).unwrap();
    fs::write(
        cache_dir.join("openneuro_datasets.json"),
        json!([
            {"id": "ds001", "name": "Faces", "source": "openneuro", "modalities": ["MRI"], "species": ["Human"], "size": 2000000000u64},
            {"id": "ds001", "name": "Faces duplicate", "source": "openneuro"}
        ])
        .to_string(),
    )
    .unwrap();
    fs::write(
        cache_dir.join("dandi_datasets.json"),
        json!([{"id": "000003/draft", "name": "Granule cells", "source": "dandi", "modalities": ["Units"]}]).to_string(),
    )
    .unwrap();

    let indexed = app.build_index(&JsonOutput).unwrap();
    assert_eq!(indexed.loaded, 2);
    assert_eq!(indexed.duplicates, 1);
    assert_eq!(indexed.report.indexed, 2);
    assert!(indexed.report.failed.is_empty());

    let filters = SearchFilters {
        min_size: Some(1_000_000_000),
        ..SearchFilters::default()
    };
    let result = app.search("fmri", &filters, 10).unwrap();
    assert_eq!(result.filter.as_deref(), Some("size:[1000000000 TO *]"));
    assert_eq!(
        backend.last_filter.lock().unwrap().as_deref(),
        Some("size:[1000000000 TO *]")
    );
    assert_eq!(result.hits.len(), 2);
    assert_eq!(result.options.modalities, vec!["MRI", "Units"]);
    assert_eq!(result.hits[0]["_id"], "dandi:000003/draft");
    assert!(result.hits[0]["searchable_content"]
        .as_str()
        .unwrap()
        .starts_with("Dataset: Granule cells"));

    let stats = app.stats().unwrap();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.index, "neuroscience_datasets");

    let options = app.filter_options(None, 10).unwrap();
    assert_eq!(options.species, vec!["Human"]);
}

#[test]
fn fetch_then_index_round_trip() {
    let backend = MemoryBackend::default();
    let (_temp, app) = app_in_tempdir(&backend);
    let downloaders: Vec<Box<dyn SourceDownloader>> = vec![Box::new(StaticDownloader)];

    let fetched = app.fetch(&downloaders, FetchMode::Full, &JsonOutput).unwrap();
    assert_eq!(fetched.reports.len(), 1);
    assert_eq!(fetched.reports[0].written, 1);
    assert!(app.store().source_path(Source::Dandi).as_std_path().exists());

    let indexed = app.build_index(&JsonOutput).unwrap();
    assert_eq!(indexed.report.indexed, 1);
    assert_eq!(app.stats().unwrap().documents, 1);
}

#[test]
fn empty_cache_builds_empty_index() {
    let backend = MemoryBackend::default();
    let (_temp, app) = app_in_tempdir(&backend);

    let indexed = app.build_index(&JsonOutput).unwrap();
    assert_eq!(indexed.loaded, 0);
    assert!(indexed.files.is_empty());
    assert_eq!(app.stats().unwrap().documents, 0);
}
