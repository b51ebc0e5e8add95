use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Marker stored in place of missing or unusable values.
pub const NOT_SPECIFIED: &str = "Not specified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[value(name = "openneuro")]
    OpenNeuro,
    Dandi,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::OpenNeuro, Source::Dandi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::OpenNeuro => "openneuro",
            Source::Dandi => "dandi",
        }
    }

    pub fn cache_file_name(&self) -> String {
        format!("{}_datasets.json", self.as_str())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Source {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "openneuro" => Ok(Source::OpenNeuro),
            "dandi" => Ok(Source::Dandi),
            _ => Err(CatalogError::UnknownSource(value.to_string())),
        }
    }
}

/// Canonical, source-independent dataset record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub modalities: Vec<String>,
    pub species: Vec<String>,
    pub tasks: Vec<String>,
    pub size: u64,
    pub doi: String,
    pub url: String,
    pub source: String,
    pub date_created: String,
    pub authors: Vec<String>,
    pub license: String,
    pub subject_count: u64,
    pub data_standard: String,
}

impl DatasetMetadata {
    /// Key under which records are considered the same dataset.
    pub fn identity(&self) -> (&str, &str) {
        (self.source.as_str(), self.id.as_str())
    }

    pub fn document_id(&self) -> String {
        format!("{}:{}", self.source, self.id)
    }

    pub fn searchable_content(&self) -> String {
        format!(
            "Dataset: {}\nDescription: {}\nModalities: {}\nSpecies: {}\nTasks: {}\nSource: {}\nData Standard: {}",
            self.name,
            self.description,
            self.modalities.join(", "),
            self.species.join(", "),
            self.tasks.join(", "),
            self.source,
            self.data_standard
        )
        .trim()
        .to_string()
    }
}

/// A canonical record as stored in the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    #[serde(rename = "_id")]
    pub document_id: String,
    #[serde(flatten)]
    pub metadata: DatasetMetadata,
    pub searchable_content: String,
}

impl From<&DatasetMetadata> for IndexedDocument {
    fn from(metadata: &DatasetMetadata) -> Self {
        Self {
            document_id: metadata.document_id(),
            searchable_content: metadata.searchable_content(),
            metadata: metadata.clone(),
        }
    }
}

/// Fields the search service embeds for semantic matching.
pub const TENSOR_FIELDS: [&str; 3] = ["searchable_content", "name", "description"];

pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} PB")
}

pub fn dataset_url(source: &str, id: &str) -> Option<String> {
    if id.is_empty() || id == NOT_SPECIFIED {
        return None;
    }
    match source.parse::<Source>() {
        Ok(Source::OpenNeuro) => Some(format!("https://openneuro.org/datasets/{id}")),
        Ok(Source::Dandi) => Some(format!("https://dandiarchive.org/dandiset/{id}")),
        Err(_) => None,
    }
}
