use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::domain::{DatasetMetadata, NOT_SPECIFIED, Source, dataset_url};
use crate::downloader::{RawPage, SourceDownloader, best_effort_id};
use crate::error::CatalogError;
use crate::normalize::{clean_string, normalize_record};

const DATASETS_QUERY: &str = r#"
query($after: String, $first: Int = 100) {
    datasets(first: $first, after: $after) {
        edges {
            node {
                metadata {
                    species
                    datasetId
                    datasetName
                    associatedPaperDOI
                    modalities
                    tasksCompleted
                    datasetUrl
                }
                name
                draft {
                    readme
                    size
                }
                publishDate
            }
        }
        pageInfo {
            hasNextPage
            endCursor
        }
    }
}
"#;

/// One page of dataset nodes from the `datasets` connection.
#[derive(Debug, Clone, Default)]
pub struct DatasetPage {
    pub nodes: Vec<Value>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl DatasetPage {
    /// Reads a GraphQL response body. `None` when it carries no `data.datasets`.
    pub fn from_response(body: &Value) -> Option<Self> {
        let datasets = body.get("data")?.get("datasets")?;
        if !datasets.is_object() {
            return None;
        }
        let nodes = datasets
            .get("edges")
            .and_then(Value::as_array)
            .map(|edges| {
                edges
                    .iter()
                    .filter_map(|edge| edge.get("node"))
                    .filter(|node| !node.is_null())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let page_info = datasets.get("pageInfo");
        Some(Self {
            nodes,
            has_next_page: page_info
                .and_then(|info| info.get("hasNextPage"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            end_cursor: page_info
                .and_then(|info| info.get("endCursor"))
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

pub trait OpenNeuroClient {
    /// `Ok(None)` when the server answered without dataset data.
    fn fetch_page(&self, after: Option<&str>, first: u32)
    -> Result<Option<DatasetPage>, CatalogError>;
}

#[derive(Clone)]
pub struct OpenNeuroHttpClient {
    client: Client,
    endpoint: String,
}

impl OpenNeuroHttpClient {
    pub fn new(endpoint: &str) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("neuro-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::OpenNeuroHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| CatalogError::OpenNeuroHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl OpenNeuroClient for OpenNeuroHttpClient {
    fn fetch_page(
        &self,
        after: Option<&str>,
        first: u32,
    ) -> Result<Option<DatasetPage>, CatalogError> {
        let body = json!({
            "query": DATASETS_QUERY,
            "variables": { "first": first, "after": after },
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|err| CatalogError::OpenNeuroHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "OpenNeuro request failed".to_string());
            return Err(CatalogError::OpenNeuroStatus { status, message });
        }
        let payload: Value = response
            .json()
            .map_err(|err| CatalogError::OpenNeuroHttp(err.to_string()))?;
        if let Some(errors) = payload.get("errors") {
            warn!(errors = %errors, "OpenNeuro reported GraphQL errors");
        }
        Ok(DatasetPage::from_response(&payload))
    }
}

pub struct OpenNeuroDownloader<C: OpenNeuroClient> {
    client: C,
    page_size: u32,
}

impl<C: OpenNeuroClient> OpenNeuroDownloader<C> {
    pub fn new(client: C, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }
}

impl<C: OpenNeuroClient> SourceDownloader for OpenNeuroDownloader<C> {
    fn source(&self) -> Source {
        Source::OpenNeuro
    }

    fn fetch_pages(
        &self,
        visit: &mut dyn FnMut(RawPage) -> Result<(), CatalogError>,
    ) -> Result<usize, CatalogError> {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = self.client.fetch_page(cursor.as_deref(), self.page_size)?;
            pages += 1;
            let Some(page) = page else {
                warn!(page = pages, "no dataset data in OpenNeuro response, stopping");
                break;
            };
            debug!(page = pages, nodes = page.nodes.len(), "OpenNeuro page");
            let has_next = page.has_next_page;
            let next_cursor = page.end_cursor.clone();
            visit(page.nodes.into())?;
            if !has_next {
                break;
            }
            if next_cursor.is_none() || next_cursor == cursor {
                warn!(page = pages, "OpenNeuro cursor did not advance, stopping");
                break;
            }
            cursor = next_cursor;
        }
        Ok(pages)
    }

    fn map(&self, raw: &Value) -> Result<DatasetMetadata, CatalogError> {
        map_dataset_node(raw)
    }
}

/// Maps one `datasets.edges[].node` into canonical form.
pub fn map_dataset_node(node: &Value) -> Result<DatasetMetadata, CatalogError> {
    let metadata = node
        .get("metadata")
        .filter(|value| value.is_object())
        .ok_or_else(|| {
            CatalogError::malformed(
                Source::OpenNeuro.as_str(),
                &best_effort_id(node),
                "missing metadata object",
            )
        })?;
    let draft = node.get("draft").cloned().unwrap_or(Value::Null);
    let meta = |key: &str| metadata.get(key).cloned().unwrap_or(Value::Null);

    let name = match clean_string(&meta("datasetName")) {
        name if name == NOT_SPECIFIED => node.get("name").cloned().unwrap_or(Value::Null),
        name => Value::String(name),
    };
    let mut record = normalize_record(&json!({
        "id": meta("datasetId"),
        "name": name,
        "description": draft.get("readme").cloned().unwrap_or(Value::Null),
        "modalities": meta("modalities"),
        "species": meta("species"),
        "tasks": meta("tasksCompleted"),
        "size": draft.get("size").cloned().unwrap_or(Value::Null),
        "doi": meta("associatedPaperDOI"),
        "url": meta("datasetUrl"),
        "source": Source::OpenNeuro.as_str(),
        "date_created": node.get("publishDate").cloned().unwrap_or(Value::Null),
    }));
    if record.id == NOT_SPECIFIED {
        return Err(CatalogError::malformed(
            Source::OpenNeuro.as_str(),
            "unknown",
            format!("missing datasetId for {}", record.name),
        ));
    }
    if record.url == NOT_SPECIFIED {
        if let Some(url) = dataset_url(&record.source, &record.id) {
            record.url = url;
        }
    }
    Ok(record)
}
