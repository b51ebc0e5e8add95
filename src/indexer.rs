use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::backend::{IndexSettings, SearchBackend};
use crate::config::ResolvedConfig;
use crate::domain::{DatasetMetadata, IndexedDocument, TENSOR_FIELDS};
use crate::error::CatalogError;

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub index_name: String,
    pub model: String,
    /// 1 isolates every document; larger values trade isolation for throughput.
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl From<&ResolvedConfig> for IndexerOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            index_name: config.index_name.clone(),
            model: config.model.clone(),
            batch_size: config.batch_size,
            batch_delay: config.batch_delay,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub index: String,
    pub indexed: usize,
    pub failed: Vec<String>,
    pub batches: usize,
}

pub struct Indexer<B: SearchBackend> {
    backend: B,
    options: IndexerOptions,
}

impl<B: SearchBackend> Indexer<B> {
    pub fn new(backend: B, options: IndexerOptions) -> Self {
        let mut options = options;
        options.batch_size = options.batch_size.max(1);
        Self { backend, options }
    }

    /// Drops and recreates the index, then uploads every record.
    pub fn rebuild(
        &self,
        datasets: &[DatasetMetadata],
        sink: &dyn ProgressSink,
    ) -> Result<IndexReport, CatalogError> {
        let index = self.options.index_name.as_str();

        sink.event(ProgressEvent {
            message: format!("phase=Index; recreating {index}"),
            elapsed: None,
        });
        if self.backend.delete_index(index)? {
            info!(index, "deleted existing index");
        } else {
            debug!(index, "no existing index to delete");
        }
        let settings = IndexSettings {
            model: self.options.model.clone(),
            treat_urls_as_images: false,
        };
        self.backend.create_index(index, &settings)?;
        info!(index, model = %settings.model, "created index");

        let documents: Vec<IndexedDocument> = datasets.iter().map(IndexedDocument::from).collect();
        let start = std::time::Instant::now();
        let mut indexed = 0usize;
        let mut failed = Vec::new();
        let mut batches = 0usize;

        for (position, chunk) in documents.chunks(self.options.batch_size).enumerate() {
            if position > 0 && self.options.batch_size > 1 && !self.options.batch_delay.is_zero() {
                thread::sleep(self.options.batch_delay);
            }
            batches += 1;
            match self.backend.add_documents(index, chunk, &TENSOR_FIELDS) {
                Ok(rejected) => {
                    for failure in &rejected {
                        warn!(id = %failure.document_id, reason = %failure.reason, "document rejected");
                    }
                    indexed += chunk.len().saturating_sub(rejected.len());
                    failed.extend(rejected.into_iter().map(|failure| failure.document_id));
                }
                Err(err) => {
                    for document in chunk {
                        warn!(id = %document.document_id, error = %err, "failed to index document");
                        failed.push(document.document_id.clone());
                    }
                }
            }
            sink.event(ProgressEvent {
                message: format!(
                    "index.batch {batches} indexed={indexed}/{} failed={}",
                    documents.len(),
                    failed.len()
                ),
                elapsed: Some(start.elapsed()),
            });
        }

        info!(index, indexed, failed = failed.len(), batches, "indexing complete");
        Ok(IndexReport {
            index: index.to_string(),
            indexed,
            failed,
            batches,
        })
    }
}
