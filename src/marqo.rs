use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Map, Value, json};

use crate::backend::{DocumentFailure, IndexSettings, SearchBackend, SearchRequest};
use crate::domain::IndexedDocument;
use crate::error::CatalogError;

/// Blocking client for the Marqo REST API.
#[derive(Clone)]
pub struct MarqoHttpClient {
    client: Client,
    base_url: String,
}

impl MarqoHttpClient {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("neuro-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::SearchHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| CatalogError::SearchHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn index_url(&self, index: &str, suffix: &str) -> String {
        format!("{}/indexes/{index}{suffix}", self.base_url)
    }

    fn send(request: RequestBuilder) -> Result<Response, CatalogError> {
        request
            .send()
            .map_err(|err| CatalogError::SearchHttp(err.to_string()))
    }

    fn handle_status(response: Response) -> Result<Response, CatalogError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "search service request failed".to_string());
        Err(CatalogError::SearchStatus { status, message })
    }

    fn read_json(response: Response) -> Result<Value, CatalogError> {
        Self::handle_status(response)?
            .json()
            .map_err(|err| CatalogError::SearchHttp(err.to_string()))
    }
}

impl SearchBackend for MarqoHttpClient {
    fn delete_index(&self, index: &str) -> Result<bool, CatalogError> {
        let response = Self::send(self.client.delete(self.index_url(index, "")))?;
        if response.status().as_u16() == 404 {
            return Ok(false);
        }
        Self::handle_status(response)?;
        Ok(true)
    }

    fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<(), CatalogError> {
        let body = json!({
            "model": settings.model,
            "treatUrlsAndPointersAsImages": settings.treat_urls_as_images,
        });
        let response = Self::send(self.client.post(self.index_url(index, "")).json(&body))?;
        Self::handle_status(response)?;
        Ok(())
    }

    fn add_documents(
        &self,
        index: &str,
        documents: &[IndexedDocument],
        tensor_fields: &[&str],
    ) -> Result<Vec<DocumentFailure>, CatalogError> {
        let body = json!({
            "documents": documents,
            "tensorFields": tensor_fields,
        });
        let response = Self::send(
            self.client
                .post(self.index_url(index, "/documents"))
                .json(&body),
        )?;
        let payload = Self::read_json(response)?;
        Ok(parse_item_failures(&payload))
    }

    fn search(&self, index: &str, request: &SearchRequest) -> Result<Vec<Value>, CatalogError> {
        let mut body = Map::new();
        body.insert("q".to_string(), json!(request.query));
        body.insert("limit".to_string(), json!(request.limit));
        body.insert("showHighlights".to_string(), json!(false));
        if let Some(filter) = &request.filter {
            body.insert("filter".to_string(), json!(filter));
        }
        if let Some(attributes) = &request.searchable_attributes {
            body.insert("searchableAttributes".to_string(), json!(attributes));
        }
        if let Some(attributes) = &request.attributes_to_retrieve {
            body.insert("attributesToRetrieve".to_string(), json!(attributes));
        }
        let response = Self::send(
            self.client
                .post(self.index_url(index, "/search"))
                .json(&Value::Object(body)),
        )?;
        let payload = Self::read_json(response)?;
        Ok(payload
            .get("hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    fn document_count(&self, index: &str) -> Result<u64, CatalogError> {
        let response = Self::send(self.client.get(self.index_url(index, "/stats")))?;
        let payload = Self::read_json(response)?;
        Ok(payload
            .get("numberOfDocuments")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }
}

/// Items of an add-documents response whose status is not 2xx.
pub fn parse_item_failures(payload: &Value) -> Vec<DocumentFailure> {
    payload
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| {
                    let status = item.get("status").and_then(Value::as_u64).unwrap_or(200);
                    !(200..300).contains(&status) || item.get("error").is_some_and(|error| !error.is_null())
                })
                .map(|item| DocumentFailure {
                    document_id: item
                        .get("_id")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    reason: item
                        .get("error")
                        .or_else(|| item.get("message"))
                        .map(|value| match value {
                            Value::String(text) => text.clone(),
                            other => other.to_string(),
                        })
                        .unwrap_or_else(|| "rejected".to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}
