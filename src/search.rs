use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::backend::{SearchBackend, SearchRequest};
use crate::domain::NOT_SPECIFIED;
use crate::error::CatalogError;

/// Hit cap for the catalog-wide scan that discovers filter values.
pub const OPTION_SCAN_LIMIT: usize = 1000;

static FILTER_SPECIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([\\\s()\[\]{}:"])"#).expect("static filter regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub modality: Option<String>,
    pub species: Option<String>,
    pub task: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub modalities: Vec<String>,
    pub species: Vec<String>,
    pub tasks: Vec<String>,
}

fn escape_filter_value(value: &str) -> String {
    FILTER_SPECIAL.replace_all(value, r"\$1").into_owned()
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(escape_filter_value)
}

/// Filter string for the search service, or `None` when no filter is active.
pub fn filter_expression(filters: &SearchFilters) -> Option<String> {
    let mut conditions = Vec::new();
    if let Some(modality) = present(&filters.modality) {
        conditions.push(format!("modalities:{modality}"));
    }
    if let Some(min) = filters.min_size {
        conditions.push(format!("size:[{min} TO *]"));
    }
    if let Some(max) = filters.max_size {
        conditions.push(format!("size:[* TO {max}]"));
    }
    if let Some(species) = present(&filters.species) {
        conditions.push(format!("species:(*{species}*)"));
    }
    if let Some(task) = present(&filters.task) {
        conditions.push(format!("tasks:{task}"));
    }
    if conditions.is_empty() {
        None
    } else {
        Some(conditions.join(" AND "))
    }
}

fn collect_values(value: Option<&Value>, into: &mut BTreeSet<String>) {
    let mut keep = |text: &str| {
        let text = text.trim();
        if !text.is_empty() && text != NOT_SPECIFIED {
            into.insert(text.to_string());
        }
    };
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).for_each(&mut keep),
        Some(Value::String(text)) => keep(text.as_str()),
        _ => {}
    }
}

/// Distinct non-sentinel values of `field` across `hits`, sorted.
pub fn unique_field_values(hits: &[Value], field: &str) -> Vec<String> {
    let mut values = BTreeSet::new();
    for hit in hits {
        collect_values(hit.get(field), &mut values);
    }
    values.into_iter().collect()
}

/// Filter options derived from a page of results already in hand.
pub fn filter_options_from_hits(hits: &[Value]) -> FilterOptions {
    FilterOptions {
        modalities: unique_field_values(hits, "modalities"),
        species: unique_field_values(hits, "species"),
        tasks: unique_field_values(hits, "tasks"),
    }
}

pub struct SearchFacade<B: SearchBackend> {
    backend: B,
    index_name: String,
}

impl<B: SearchBackend> SearchFacade<B> {
    pub fn new(backend: B, index_name: impl Into<String>) -> Self {
        Self {
            backend,
            index_name: index_name.into(),
        }
    }

    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<Value>, CatalogError> {
        let query = query.trim();
        let request = SearchRequest {
            query: if query.is_empty() { "*" } else { query }.to_string(),
            limit,
            filter: filter_expression(filters),
            ..SearchRequest::default()
        };
        debug!(query = %request.query, filter = ?request.filter, limit, "searching");
        self.backend.search(&self.index_name, &request)
    }

    /// Scans the catalog for the distinct values of one field.
    pub fn field_values(&self, field: &str) -> Result<Vec<String>, CatalogError> {
        let request = SearchRequest {
            query: "*".to_string(),
            limit: OPTION_SCAN_LIMIT,
            filter: None,
            searchable_attributes: Some(vec!["searchable_content".to_string()]),
            attributes_to_retrieve: Some(vec![field.to_string()]),
        };
        let hits = self.backend.search(&self.index_name, &request)?;
        Ok(unique_field_values(&hits, field))
    }

    pub fn all_filter_options(&self) -> Result<FilterOptions, CatalogError> {
        Ok(FilterOptions {
            modalities: self.field_values("modalities")?,
            species: self.field_values("species")?,
            tasks: self.field_values("tasks")?,
        })
    }

    pub fn document_count(&self) -> Result<u64, CatalogError> {
        self.backend.document_count(&self.index_name)
    }
}
