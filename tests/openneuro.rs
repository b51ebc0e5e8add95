use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::{Value, json};

use neuro_catalog::domain::{NOT_SPECIFIED, Source};
use neuro_catalog::downloader::{FetchMode, SourceDownloader, run_downloader};
use neuro_catalog::error::CatalogError;
use neuro_catalog::loader::load_datasets;
use neuro_catalog::openneuro::{DatasetPage, OpenNeuroClient, OpenNeuroDownloader, map_dataset_node};
use neuro_catalog::output::JsonOutput;
use neuro_catalog::store::CacheStore;

fn fixture_page() -> DatasetPage {
    let body: Value =
        serde_json::from_str(include_str!("fixtures/openneuro_page.json")).unwrap();
    DatasetPage::from_response(&body).unwrap()
}

fn node(id: &str) -> Value {
    json!({
        "metadata": {"datasetId": id, "datasetName": format!("Dataset {id}"), "modalities": ["MRI"]},
        "draft": {"readme": "readme", "size": 10},
        "publishDate": "2021-01-01"
    })
}

/// Serves scripted pages and records the cursor of every request.
struct ScriptedClient {
    pages: Vec<DatasetPage>,
    cursors: Mutex<Vec<Option<String>>>,
}

impl ScriptedClient {
    fn new(pages: Vec<DatasetPage>) -> Self {
        Self {
            pages,
            cursors: Mutex::new(Vec::new()),
        }
    }
}

impl OpenNeuroClient for &ScriptedClient {
    fn fetch_page(
        &self,
        after: Option<&str>,
        _first: u32,
    ) -> Result<Option<DatasetPage>, CatalogError> {
        let mut cursors = self.cursors.lock().unwrap();
        let index = cursors.len();
        cursors.push(after.map(str::to_string));
        Ok(self.pages.get(index).cloned())
    }
}

struct FailingClient;

impl OpenNeuroClient for FailingClient {
    fn fetch_page(
        &self,
        _after: Option<&str>,
        _first: u32,
    ) -> Result<Option<DatasetPage>, CatalogError> {
        Err(CatalogError::OpenNeuroStatus {
            status: 502,
            message: "bad gateway".to_string(),
        })
    }
}

fn temp_store() -> (tempfile::TempDir, CacheStore) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, CacheStore::new(root))
}

#[test]
fn maps_fixture_nodes() {
    let page = fixture_page();
    assert_eq!(page.nodes.len(), 3);
    assert!(!page.has_next_page);

    let first = map_dataset_node(&page.nodes[0]).unwrap();
    assert_eq!(first.id, "ds000001");
    assert_eq!(first.name, "Balloon Analog Risk-taking Task");
    assert_eq!(first.species, vec!["Human"]);
    assert_eq!(first.tasks, vec!["balloon analog risk task"]);
    assert_eq!(first.size, 2_117_226_137);
    assert_eq!(first.url, "https://openneuro.org/datasets/ds000001");
    assert_eq!(first.source, "openneuro");
    assert_eq!(first.date_created, "2018-07-16T17:26:41.218Z");
    assert_eq!(first.data_standard, NOT_SPECIFIED);

    let second = map_dataset_node(&page.nodes[1]).unwrap();
    assert_eq!(second.name, "Classification learning");
    assert_eq!(second.species, vec![NOT_SPECIFIED]);
    assert_eq!(second.modalities, vec!["MRI"]);
    assert_eq!(second.tasks, vec![NOT_SPECIFIED]);
    assert_eq!(second.doi, NOT_SPECIFIED);
    assert_eq!(second.description, NOT_SPECIFIED);
    assert_eq!(second.size, 0);

    let err = map_dataset_node(&page.nodes[2]).unwrap_err();
    assert_matches!(err, CatalogError::MalformedRecord { .. });
}

#[test]
fn follows_cursors_in_order() {
    let pages = vec![
        DatasetPage {
            nodes: vec![node("ds1"), node("ds2")],
            has_next_page: true,
            end_cursor: Some("c1".to_string()),
        },
        DatasetPage {
            nodes: vec![node("ds3")],
            has_next_page: true,
            end_cursor: Some("c2".to_string()),
        },
        DatasetPage {
            nodes: vec![node("ds4")],
            has_next_page: false,
            end_cursor: Some("c3".to_string()),
        },
    ];
    let client = ScriptedClient::new(pages);
    let downloader = OpenNeuroDownloader::new(&client, 2);

    let records = downloader.fetch().unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(
        *client.cursors.lock().unwrap(),
        vec![None, Some("c1".to_string()), Some("c2".to_string())]
    );
}

#[test]
fn stops_when_cursor_repeats() {
    let looping = DatasetPage {
        nodes: vec![node("ds1")],
        has_next_page: true,
        end_cursor: Some("same".to_string()),
    };
    let client = ScriptedClient::new(vec![looping.clone(), looping.clone(), looping]);
    let downloader = OpenNeuroDownloader::new(&client, 1);

    let pages = downloader.fetch_pages(&mut |_| Ok(())).unwrap();
    assert_eq!(pages, 2);
}

#[test]
fn stops_on_missing_data() {
    let client = ScriptedClient::new(vec![DatasetPage {
        nodes: vec![node("ds1")],
        has_next_page: true,
        end_cursor: Some("c1".to_string()),
    }]);
    let downloader = OpenNeuroDownloader::new(&client, 1);

    let records = downloader.fetch().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(client.cursors.lock().unwrap().len(), 2);
}

#[test]
fn full_fetch_writes_cache_and_skips_malformed() {
    let (_temp, store) = temp_store();
    let client = ScriptedClient::new(vec![fixture_page()]);
    let downloader = OpenNeuroDownloader::new(&client, 100);

    let report = run_downloader(&downloader, &store, FetchMode::Full, &JsonOutput).unwrap();
    assert_eq!(report.source, "openneuro");
    assert_eq!(report.fetched, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.written, 2);
    assert_eq!(report.pages, 1);

    let cached = CacheStore::read_records(&store.source_path(Source::OpenNeuro)).unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(cached[0]["id"], "ds000001");
    assert_eq!(cached[1]["name"], "Classification learning");
}

#[test]
fn incremental_fetch_appends_unseen_ids() {
    let (_temp, store) = temp_store();
    let first = ScriptedClient::new(vec![DatasetPage {
        nodes: vec![node("ds1"), node("ds2")],
        has_next_page: false,
        end_cursor: None,
    }]);
    run_downloader(
        &OpenNeuroDownloader::new(&first, 10),
        &store,
        FetchMode::Full,
        &JsonOutput,
    )
    .unwrap();

    let second = ScriptedClient::new(vec![DatasetPage {
        nodes: vec![node("ds2"), node("ds3")],
        has_next_page: false,
        end_cursor: None,
    }]);
    let report = run_downloader(
        &OpenNeuroDownloader::new(&second, 10),
        &store,
        FetchMode::Incremental,
        &JsonOutput,
    )
    .unwrap();
    assert_eq!(report.written, 3);

    let cached = CacheStore::read_records(&store.source_path(Source::OpenNeuro)).unwrap();
    let ids: Vec<&str> = cached.iter().filter_map(|record| record["id"].as_str()).collect();
    assert_eq!(ids, vec!["ds1", "ds2", "ds3"]);
}

#[test]
fn transport_error_aborts_fetch() {
    let (_temp, store) = temp_store();
    let downloader = OpenNeuroDownloader::new(FailingClient, 10);

    let err = run_downloader(&downloader, &store, FetchMode::Full, &JsonOutput).unwrap_err();
    assert_matches!(err, CatalogError::OpenNeuroStatus { status: 502, .. });
    assert!(!store.source_path(Source::OpenNeuro).as_std_path().exists());
}

#[test]
fn maps_sparse_node_to_sentinels() {
    let node = json!({
        "metadata": {
            "datasetId": "ds001",
            "datasetName": "Test",
            "species": "human",
            "modalities": ["MRI"],
            "tasksCompleted": []
        },
        "draft": {"readme": "", "size": null},
        "publishDate": "2020-01-01"
    });

    let record = map_dataset_node(&node).unwrap();
    assert_eq!(record.id, "ds001");
    assert_eq!(record.name, "Test");
    assert_eq!(record.species, vec!["human"]);
    assert_eq!(record.modalities, vec!["MRI"]);
    assert_eq!(record.tasks, vec![NOT_SPECIFIED]);
    assert_eq!(record.description, NOT_SPECIFIED);
    assert_eq!(record.size, 0);
    assert_eq!(record.date_created, "2020-01-01");
    assert_eq!(record.url, "https://openneuro.org/datasets/ds001");
}

#[test]
fn nodes_without_dataset_id_are_skipped_not_merged() {
    let (_temp, store) = temp_store();
    let client = ScriptedClient::new(vec![DatasetPage {
        nodes: vec![
            json!({"metadata": {"datasetName": "Alpha"}}),
            json!({"metadata": {"datasetName": "Beta"}}),
            node("ds1"),
        ],
        has_next_page: false,
        end_cursor: None,
    }]);
    let downloader = OpenNeuroDownloader::new(&client, 10);

    let report = run_downloader(&downloader, &store, FetchMode::Full, &JsonOutput).unwrap();
    assert_eq!(report.skipped, 2);
    assert_eq!(report.written, 1);

    let loaded = load_datasets(store.root()).unwrap();
    assert_eq!(loaded.datasets.len(), 1);
    assert_eq!(loaded.datasets[0].id, "ds1");
    assert_eq!(loaded.duplicates, 0);
}
