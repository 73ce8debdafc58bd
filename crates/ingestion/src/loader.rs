//! Dataset loading
//!
//! The dataset is a JSON array of records. Each record contributes one
//! document whose text sits under a configurable key (`output` by default).

use crate::errors::{IngestionError, Result};
use konkyo_common::models::Document;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Record fields tried, in order, as the document source label
const SOURCE_KEYS: &[&str] = &["url", "source", "title"];

/// Documents read from a dataset plus what was skipped
#[derive(Debug, Default)]
pub struct LoadedDataset {
    pub documents: Vec<Document>,
    pub skipped_empty: usize,
    pub skipped_duplicate: usize,
}

/// Read and parse the dataset file
pub async fn load_dataset(path: &Path, content_key: &str) -> Result<LoadedDataset> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IngestionError::DatasetNotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());

    let loaded = parse_records(&raw, content_key, &label).map_err(|message| IngestionError::InvalidDataset {
        path: path.display().to_string(),
        message,
    })?;

    if loaded.documents.is_empty() {
        return Err(IngestionError::EmptyDataset {
            path: path.display().to_string(),
            content_key: content_key.to_string(),
        });
    }

    Ok(loaded)
}

/// Turn the records of a JSON array into documents.
///
/// Records without text under `content_key`, or whose text is blank, are
/// skipped. Identical texts are indexed once.
pub fn parse_records(raw: &str, content_key: &str, label: &str) -> std::result::Result<LoadedDataset, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let records = match value {
        Value::Array(records) => records,
        other => return Err(format!("expected a top-level array, found {}", kind(&other))),
    };

    let mut loaded = LoadedDataset::default();
    let mut seen = HashSet::new();

    for (i, record) in records.iter().enumerate() {
        let content = match record.get(content_key).and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                debug!(record = i, content_key, "Skipping record without content");
                loaded.skipped_empty += 1;
                continue;
            }
        };

        let source = SOURCE_KEYS
            .iter()
            .find_map(|key| record.get(*key).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}#{}", label, i));

        let document = Document::new(source, content);
        if !seen.insert(document.id.clone()) {
            warn!(record = i, document_id = %document.id, "Skipping duplicate document");
            loaded.skipped_duplicate += 1;
            continue;
        }
        loaded.documents.push(document);
    }

    Ok(loaded)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records_with_sources() {
        let raw = r#"[
            {"url": "https://example.jp/combine", "output": "コンバインは農業機械です。"},
            {"output": "自立型は日本独自です。"}
        ]"#;
        let loaded = parse_records(raw, "output", "data.json").unwrap();

        assert_eq!(loaded.documents.len(), 2);
        assert_eq!(loaded.documents[0].source, "https://example.jp/combine");
        assert_eq!(loaded.documents[1].source, "data.json#1");
        assert_eq!(loaded.documents[1].content, "自立型は日本独自です。");
    }

    #[test]
    fn test_skips_blank_missing_and_duplicate() {
        let raw = r#"[
            {"output": "同じ文です。"},
            {"output": "   "},
            {"text": "別のキーです。"},
            {"output": 42},
            {"output": "同じ文です。"}
        ]"#;
        let loaded = parse_records(raw, "output", "d").unwrap();

        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.skipped_empty, 3);
        assert_eq!(loaded.skipped_duplicate, 1);
    }

    #[test]
    fn test_custom_content_key() {
        let loaded = parse_records(r#"[{"text": "本文です。"}]"#, "text", "d").unwrap();
        assert_eq!(loaded.documents[0].content, "本文です。");
    }

    #[test]
    fn test_rejects_non_array() {
        let err = parse_records(r#"{"output": "x"}"#, "output", "d").unwrap_err();
        assert!(err.contains("an object"));
        assert!(parse_records("not json", "output", "d").is_err());
    }

    #[tokio::test]
    async fn test_load_dataset_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = load_dataset(&dir.path().join("none.json"), "output").await;
        assert!(matches!(missing, Err(IngestionError::DatasetNotFound(_))));

        let empty = dir.path().join("empty.json");
        tokio::fs::write(&empty, "[]").await.unwrap();
        let err = load_dataset(&empty, "output").await.unwrap_err();
        assert!(matches!(err, IngestionError::EmptyDataset { .. }));
    }
}
