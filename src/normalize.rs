//! Cleaning rules that turn loosely shaped JSON into [`DatasetMetadata`].
//!
//! Every function here is total: unexpected input degrades to the
//! [`NOT_SPECIFIED`] sentinel or to zero, never to an error.

use serde_json::Value;

use crate::domain::{DatasetMetadata, NOT_SPECIFIED};

const NULL_MARKERS: [&str; 3] = ["null", "n/a", "none"];

fn is_null_marker(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    NULL_MARKERS.contains(&lowered.as_str())
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() || is_null_marker(&text) || text == NOT_SPECIFIED {
        return None;
    }
    Some(text)
}

pub fn clean_string(value: &Value) -> String {
    scalar_text(value).unwrap_or_else(|| NOT_SPECIFIED.to_string())
}

pub fn clean_list(value: &Value) -> Vec<String> {
    let cleaned = match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect::<Vec<_>>(),
    };
    if cleaned.is_empty() {
        vec![NOT_SPECIFIED.to_string()]
    } else {
        cleaned
    }
}

pub fn coerce_count(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|float| float.is_finite() && *float >= 0.0)
                    .map(|float| float.trunc() as u64)
            })
            .unwrap_or(0),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<u64>()
                .ok()
                .or_else(|| {
                    text.parse::<f64>()
                        .ok()
                        .filter(|float| float.is_finite() && *float >= 0.0)
                        .map(|float| float.trunc() as u64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Cleans one record shaped like [`DatasetMetadata`]; missing keys become sentinels.
pub fn normalize_record(raw: &Value) -> DatasetMetadata {
    let field = |key: &str| raw.get(key).unwrap_or(&Value::Null);
    DatasetMetadata {
        id: clean_string(field("id")),
        name: clean_string(field("name")),
        description: clean_string(field("description")),
        modalities: clean_list(field("modalities")),
        species: clean_list(field("species")),
        tasks: clean_list(field("tasks")),
        size: coerce_count(field("size")),
        doi: clean_string(field("doi")),
        url: clean_string(field("url")),
        source: clean_string(field("source")),
        date_created: clean_string(field("date_created")),
        authors: clean_list(field("authors")),
        license: clean_string(field("license")),
        subject_count: coerce_count(field("subject_count")),
        data_standard: clean_string(field("data_standard")),
    }
}

impl DatasetMetadata {
    /// Re-applies the cleaning rules to an already typed record.
    pub fn normalized(self) -> DatasetMetadata {
        let text = |value: String| clean_string(&Value::String(value));
        let list = |values: Vec<String>| {
            clean_list(&Value::Array(values.into_iter().map(Value::String).collect()))
        };
        DatasetMetadata {
            id: text(self.id),
            name: text(self.name),
            description: text(self.description),
            modalities: list(self.modalities),
            species: list(self.species),
            tasks: list(self.tasks),
            size: self.size,
            doi: text(self.doi),
            url: text(self.url),
            source: text(self.source),
            date_created: text(self.date_created),
            authors: list(self.authors),
            license: text(self.license),
            subject_count: self.subject_count,
            data_standard: text(self.data_standard),
        }
    }
}
