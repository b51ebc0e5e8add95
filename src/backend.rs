use serde::Serialize;
use serde_json::Value;

use crate::domain::IndexedDocument;
use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSettings {
    pub model: String,
    pub treat_urls_as_images: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub filter: Option<String>,
    pub searchable_attributes: Option<Vec<String>>,
    pub attributes_to_retrieve: Option<Vec<String>>,
}

/// A document the service refused while accepting the rest of its batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub reason: String,
}

/// Hosted embedding/search service holding the index.
pub trait SearchBackend {
    /// Returns `false` when there was no index to delete.
    fn delete_index(&self, index: &str) -> Result<bool, CatalogError>;
    fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<(), CatalogError>;
    fn add_documents(
        &self,
        index: &str,
        documents: &[IndexedDocument],
        tensor_fields: &[&str],
    ) -> Result<Vec<DocumentFailure>, CatalogError>;
    fn search(&self, index: &str, request: &SearchRequest) -> Result<Vec<Value>, CatalogError>;
    fn document_count(&self, index: &str) -> Result<u64, CatalogError>;
}

impl<B: SearchBackend + ?Sized> SearchBackend for &B {
    fn delete_index(&self, index: &str) -> Result<bool, CatalogError> {
        (**self).delete_index(index)
    }

    fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<(), CatalogError> {
        (**self).create_index(index, settings)
    }

    fn add_documents(
        &self,
        index: &str,
        documents: &[IndexedDocument],
        tensor_fields: &[&str],
    ) -> Result<Vec<DocumentFailure>, CatalogError> {
        (**self).add_documents(index, documents, tensor_fields)
    }

    fn search(&self, index: &str, request: &SearchRequest) -> Result<Vec<Value>, CatalogError> {
        (**self).search(index, request)
    }

    fn document_count(&self, index: &str) -> Result<u64, CatalogError> {
        (**self).document_count(index)
    }
}
