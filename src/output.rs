use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use crate::app::{FetchResult, IndexResult, ProgressEvent, ProgressSink, SearchResult, StatsResult};
use crate::domain::{NOT_SPECIFIED, dataset_url, format_size};
use crate::search::FilterOptions;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Writes progress lines to stderr so stdout stays clean.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_fetch(result: &FetchResult) {
        for report in &result.reports {
            println!(
                "{}: {} fetched, {} skipped, {} saved to {} ({} pages)",
                report.source,
                report.fetched,
                report.skipped,
                report.written,
                report.cache_path,
                report.pages
            );
        }
    }

    pub fn print_index(result: &IndexResult) {
        println!(
            "Loaded {} datasets from {} files ({} duplicates dropped, {} without id)",
            result.loaded,
            result.files.len(),
            result.duplicates,
            result.skipped_records
        );
        for file in &result.skipped_files {
            println!("  skipped unreadable file {file}");
        }
        println!(
            "Indexed {} documents into {} in {} batches, {} failed",
            result.report.indexed,
            result.report.index,
            result.report.batches,
            result.report.failed.len()
        );
    }

    pub fn print_search(result: &SearchResult) {
        if let Some(filter) = &result.filter {
            println!("Active filters: {filter}");
        }
        if result.hits.is_empty() {
            println!("No results found matching your criteria.");
            return;
        }
        for hit in &result.hits {
            print_hit(hit);
        }
    }

    pub fn print_options(options: &FilterOptions) {
        for (label, values) in [
            ("Modalities", &options.modalities),
            ("Species", &options.species),
            ("Tasks", &options.tasks),
        ] {
            println!("{label} ({}):", values.len());
            for value in values {
                println!("  {value}");
            }
        }
    }

    pub fn print_stats(result: &StatsResult) {
        println!("{}: {} documents", result.index, result.documents);
    }
}

fn text_field(hit: &Value, key: &str) -> String {
    match hit.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Number(number)) => number.to_string(),
        _ => NOT_SPECIFIED.to_string(),
    }
}

fn print_hit(hit: &Value) {
    let id = text_field(hit, "id");
    let source = text_field(hit, "source");
    let url = Some(text_field(hit, "url"))
        .filter(|url| url.starts_with("http"))
        .or_else(|| dataset_url(&source, &id))
        .unwrap_or_else(|| "#".to_string());
    let size = hit.get("size").and_then(Value::as_u64).unwrap_or(0);

    println!("### {} ({url})", text_field(hit, "name"));
    println!("ID: {id} [{source}]");
    println!("Modalities: {}", text_field(hit, "modalities"));
    println!("Species: {}", text_field(hit, "species"));
    println!("Tasks: {}", text_field(hit, "tasks"));
    println!("DOI: {}", text_field(hit, "doi"));
    println!("Published: {}", text_field(hit, "date_created"));
    println!("Size: {}", format_size(size));
    if let Some(score) = hit.get("_score").and_then(Value::as_f64) {
        println!("Score: {score:.3}");
    }
    println!("---");
}
