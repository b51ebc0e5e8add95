use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::domain::{DatasetMetadata, NOT_SPECIFIED, Source, dataset_url};
use crate::downloader::{RawPage, SourceDownloader};
use crate::error::CatalogError;
use crate::normalize::normalize_record;

/// A dandiset and the version whose metadata should be harvested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DandisetRef {
    pub identifier: String,
    pub version: String,
}

impl DandisetRef {
    /// Reads one entry of the `/dandisets/` listing, preferring the latest published version.
    pub fn from_listing(entry: &Value) -> Option<Self> {
        let identifier = entry.get("identifier")?.as_str()?.trim().to_string();
        if identifier.is_empty() {
            return None;
        }
        let version = ["most_recent_published_version", "draft_version"]
            .into_iter()
            .filter_map(|key| entry.get(key))
            .filter_map(|version| version.get("version"))
            .filter_map(Value::as_str)
            .find(|version| !version.trim().is_empty())
            .unwrap_or("draft")
            .to_string();
        Some(Self {
            identifier,
            version,
        })
    }
}

/// A page of the dandiset listing.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub dandisets: Vec<DandisetRef>,
    pub next: Option<String>,
}

pub trait DandiClient {
    /// `cursor` is the `next` link of the previous page, `None` for the first page.
    fn list_page(&self, cursor: Option<&str>, page_size: u32) -> Result<ListingPage, CatalogError>;
    fn fetch_metadata(&self, dandiset: &DandisetRef) -> Result<Value, CatalogError>;
}

#[derive(Clone)]
pub struct DandiHttpClient {
    client: Client,
    base_url: String,
}

impl DandiHttpClient {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("neuro-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::DandiHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| CatalogError::DandiHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get_json(&self, url: &str) -> Result<Value, CatalogError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| CatalogError::DandiHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "DANDI request failed".to_string());
            return Err(CatalogError::DandiStatus { status, message });
        }
        response
            .json()
            .map_err(|err| CatalogError::DandiHttp(err.to_string()))
    }
}

impl DandiClient for DandiHttpClient {
    fn list_page(&self, cursor: Option<&str>, page_size: u32) -> Result<ListingPage, CatalogError> {
        let url = match cursor {
            Some(next) => next.to_string(),
            None => format!("{}/dandisets/?page_size={page_size}", self.base_url),
        };
        let body = self.get_json(&url)?;
        let dandisets = body
            .get("results")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(DandisetRef::from_listing).collect())
            .unwrap_or_default();
        let next = body
            .get("next")
            .and_then(Value::as_str)
            .filter(|next| !next.is_empty())
            .map(str::to_string);
        Ok(ListingPage { dandisets, next })
    }

    fn fetch_metadata(&self, dandiset: &DandisetRef) -> Result<Value, CatalogError> {
        let url = format!(
            "{}/dandisets/{}/versions/{}/",
            self.base_url, dandiset.identifier, dandiset.version
        );
        self.get_json(&url)
    }
}

pub struct DandiDownloader<C: DandiClient> {
    client: C,
    page_size: u32,
}

impl<C: DandiClient> DandiDownloader<C> {
    pub fn new(client: C, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }
}

impl<C: DandiClient> SourceDownloader for DandiDownloader<C> {
    fn source(&self) -> Source {
        Source::Dandi
    }

    fn fetch_pages(
        &self,
        visit: &mut dyn FnMut(RawPage) -> Result<(), CatalogError>,
    ) -> Result<usize, CatalogError> {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let listing = self.client.list_page(cursor.as_deref(), self.page_size)?;
            pages += 1;
            debug!(page = pages, dandisets = listing.dandisets.len(), "DANDI listing page");
            let mut page = RawPage {
                records: Vec::with_capacity(listing.dandisets.len()),
                unavailable: 0,
            };
            for dandiset in &listing.dandisets {
                match self.client.fetch_metadata(dandiset) {
                    Ok(metadata) => page.records.push(metadata),
                    Err(err) => {
                        page.unavailable += 1;
                        warn!(
                            id = %dandiset.identifier,
                            version = %dandiset.version,
                            error = %err,
                            "skipping dandiset without metadata"
                        );
                    }
                }
            }
            visit(page)?;
            match listing.next {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(pages)
    }

    fn map(&self, raw: &Value) -> Result<DatasetMetadata, CatalogError> {
        map_dandiset_metadata(raw)
    }
}

fn names_of(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(_) => Some(item.clone()),
                    Value::Object(_) => item.get("name").filter(|name| name.is_string()).cloned(),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn is_author(contributor: &Value) -> bool {
    match contributor.get("roleName") {
        Some(Value::Array(roles)) => roles.iter().any(|role| role.as_str() == Some("dcite:Author")),
        Some(Value::String(role)) => role == "dcite:Author",
        _ => false,
    }
}

/// Maps a dandiset version's raw metadata into canonical form.
pub fn map_dandiset_metadata(metadata: &Value) -> Result<DatasetMetadata, CatalogError> {
    if !metadata.is_object() {
        return Err(CatalogError::malformed(
            Source::Dandi.as_str(),
            "unknown",
            "metadata is not a JSON object",
        ));
    }
    let identifier = metadata
        .get("identifier")
        .and_then(Value::as_str)
        .map(|value| value.trim().trim_start_matches("DANDI:").to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            CatalogError::malformed(Source::Dandi.as_str(), "unknown", "missing identifier")
        })?;
    let version = metadata
        .get("version")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    let full_id = if version.is_empty() {
        identifier
    } else {
        format!("{identifier}/{version}")
    };

    let empty = Value::Null;
    let summary = metadata
        .get("assetsSummary")
        .filter(|value| value.is_object())
        .unwrap_or(&empty);

    let authors: Vec<Value> = metadata
        .get("contributor")
        .and_then(Value::as_array)
        .map(|contributors| {
            contributors
                .iter()
                .filter(|contributor| is_author(contributor))
                .filter_map(|contributor| contributor.get("name"))
                .filter(|name| name.is_string())
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let license = match metadata.get("license") {
        Some(Value::Array(licenses)) => licenses.first().cloned().unwrap_or(Value::Null),
        Some(other) => other.clone(),
        None => Value::Null,
    };
    let data_standard = names_of(summary.get("dataStandard"))
        .into_iter()
        .next()
        .unwrap_or(Value::Null);
    let field = |value: Option<&Value>| value.cloned().unwrap_or(Value::Null);

    let mut record = normalize_record(&json!({
        "id": full_id,
        "name": field(metadata.get("name")),
        "description": field(metadata.get("description")),
        "modalities": names_of(summary.get("variableMeasured")),
        "species": names_of(summary.get("species")),
        "tasks": names_of(summary.get("measurementTechnique")),
        "size": field(summary.get("numberOfBytes")),
        "doi": field(metadata.get("doi")),
        "url": field(metadata.get("url")),
        "source": Source::Dandi.as_str(),
        "date_created": field(metadata.get("dateCreated")),
        "authors": authors,
        "license": license,
        "subject_count": field(summary.get("numberOfSubjects")),
        "data_standard": data_standard,
    }));
    if record.url == NOT_SPECIFIED {
        if let Some(url) = dataset_url(&record.source, &record.id) {
            record.url = url;
        }
    }
    Ok(record)
}
