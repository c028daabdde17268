//! Content normalization: raw bytes + declared kind into searchable text

use calamine::Reader;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

use crate::types::ContentKind;

/// Typed normalization failures
///
/// These map to the `validation_error` job code; the normalizer itself never
/// panics or returns an untyped error.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Declared type is not one the pipeline handles
    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    /// Bytes could not be decoded as the declared type
    #[error("Failed to decode input: {0}")]
    DecodeFailure(String),

    /// Input held no usable content
    #[error("Input is empty")]
    EmptyInput,

    /// Input exceeded the configured byte ceiling
    #[error("Input of {actual} bytes exceeds the {limit} byte limit")]
    SizeExceeded { actual: usize, limit: usize },
}

/// Result of normalizing one payload
#[derive(Debug, Clone)]
pub struct NormalizedContent {
    /// Text as decoded, before whitespace normalization
    pub original_text: String,
    /// Cleaned, searchable text
    pub normalized_text: String,
    /// Data rows for delimited/spreadsheet input
    pub rows: Option<Vec<Vec<String>>>,
    /// Column headers for delimited/spreadsheet input
    pub columns: Option<Vec<String>>,
    /// Per-kind analytics (counts, parsed values)
    pub metadata: HashMap<String, serde_json::Value>,
    /// SHA-256 of the normalized text
    pub content_hash: String,
}

/// Pure transform from raw bytes to normalized content
pub struct Normalizer {
    max_input_bytes: usize,
}

impl Normalizer {
    pub fn new(max_input_bytes: usize) -> Self {
        Self { max_input_bytes }
    }

    /// Resolve a client-declared type string to a content kind
    pub fn resolve_kind(declared: &str) -> Result<ContentKind, NormalizeError> {
        declared
            .parse::<ContentKind>()
            .map_err(NormalizeError::UnsupportedType)
    }

    /// Normalize a payload; pure, no side effects
    pub fn normalize(
        &self,
        data: &[u8],
        kind: ContentKind,
    ) -> Result<NormalizedContent, NormalizeError> {
        // Size ceiling is enforced before any decoding is attempted
        if data.len() > self.max_input_bytes {
            return Err(NormalizeError::SizeExceeded {
                actual: data.len(),
                limit: self.max_input_bytes,
            });
        }
        if data.is_empty() {
            return Err(NormalizeError::EmptyInput);
        }

        match kind {
            ContentKind::PlainText => self.normalize_text(data, false),
            ContentKind::FreeText => self.normalize_text(data, true),
            ContentKind::DelimitedTable => self.normalize_delimited(data),
            ContentKind::Spreadsheet => self.normalize_spreadsheet(data),
            ContentKind::StructuredJson => self.normalize_json(data),
        }
    }

    /// Plain or free text; free text additionally records line/word/char counts
    fn normalize_text(
        &self,
        data: &[u8],
        with_counts: bool,
    ) -> Result<NormalizedContent, NormalizeError> {
        let original = std::str::from_utf8(data)
            .map_err(|e| NormalizeError::DecodeFailure(e.to_string()))?
            .to_string();

        let normalized = clean_text(&original);
        if normalized.trim().is_empty() {
            return Err(NormalizeError::EmptyInput);
        }

        let mut metadata = HashMap::new();
        if with_counts {
            metadata.insert(
                "line_count".to_string(),
                serde_json::json!(normalized.lines().count()),
            );
            metadata.insert(
                "word_count".to_string(),
                serde_json::json!(normalized.unicode_words().count()),
            );
            metadata.insert(
                "char_count".to_string(),
                serde_json::json!(normalized.chars().count()),
            );
        }

        Ok(NormalizedContent {
            content_hash: hash_content(&normalized),
            normalized_text: normalized,
            original_text: original,
            rows: None,
            columns: None,
            metadata,
        })
    }

    /// Delimited table; retains rows and headers for downstream analytics
    fn normalize_delimited(&self, data: &[u8]) -> Result<NormalizedContent, NormalizeError> {
        let original = std::str::from_utf8(data)
            .map_err(|e| NormalizeError::DecodeFailure(e.to_string()))?
            .to_string();

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(data);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| NormalizeError::DecodeFailure(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        let mut content = String::new();
        content.push_str(&columns.join(" | "));
        content.push('\n');

        for result in reader.records() {
            let record = result.map_err(|e| NormalizeError::DecodeFailure(e.to_string()))?;
            let row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            content.push_str(&row.join(" | "));
            content.push('\n');
            rows.push(row);
        }

        if rows.is_empty() && columns.iter().all(|c| c.is_empty()) {
            return Err(NormalizeError::EmptyInput);
        }

        let mut metadata = HashMap::new();
        metadata.insert("row_count".to_string(), serde_json::json!(rows.len()));
        metadata.insert(
            "column_count".to_string(),
            serde_json::json!(columns.len()),
        );

        Ok(NormalizedContent {
            content_hash: hash_content(&content),
            normalized_text: content,
            original_text: original,
            rows: Some(rows),
            columns: Some(columns),
            metadata,
        })
    }

    /// Spreadsheet workbook; flattens every sheet into rows
    fn normalize_spreadsheet(&self, data: &[u8]) -> Result<NormalizedContent, NormalizeError> {
        let cursor = std::io::Cursor::new(data.to_vec());
        let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| NormalizeError::DecodeFailure(e.to_string()))?;

        let mut content = String::new();
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut columns: Option<Vec<String>> = None;
        let mut sheet_count = 0usize;

        for sheet_name in workbook.sheet_names().to_vec() {
            let Ok(range) = workbook.worksheet_range(&sheet_name) else {
                continue;
            };
            sheet_count += 1;
            content.push_str(&format!("Sheet: {}\n", sheet_name));

            for (row_idx, row) in range.rows().enumerate() {
                let row_text: Vec<String> = row
                    .iter()
                    .map(|cell| match cell {
                        calamine::Data::Empty => String::new(),
                        calamine::Data::String(s) => s.clone(),
                        calamine::Data::Float(f) => f.to_string(),
                        calamine::Data::Int(i) => i.to_string(),
                        calamine::Data::Bool(b) => b.to_string(),
                        calamine::Data::DateTime(dt) => dt.to_string(),
                        _ => String::new(),
                    })
                    .collect();

                if row_text.iter().all(|s| s.is_empty()) {
                    continue;
                }
                content.push_str(&row_text.join(" | "));
                content.push('\n');

                // First non-empty row of the first sheet is the header row
                if row_idx == 0 && columns.is_none() {
                    columns = Some(row_text.clone());
                } else {
                    rows.push(row_text);
                }
            }
            content.push('\n');
        }

        if sheet_count == 0 || content.trim().is_empty() {
            return Err(NormalizeError::EmptyInput);
        }

        let mut metadata = HashMap::new();
        metadata.insert("sheet_count".to_string(), serde_json::json!(sheet_count));
        metadata.insert("row_count".to_string(), serde_json::json!(rows.len()));

        Ok(NormalizedContent {
            content_hash: hash_content(&content),
            normalized_text: content,
            original_text: String::new(), // binary workbook has no text form
            rows: Some(rows),
            columns,
            metadata,
        })
    }

    /// Structured JSON; retains the parsed value for downstream consumers
    fn normalize_json(&self, data: &[u8]) -> Result<NormalizedContent, NormalizeError> {
        let original = std::str::from_utf8(data)
            .map_err(|e| NormalizeError::DecodeFailure(e.to_string()))?
            .to_string();

        let value: serde_json::Value = serde_json::from_str(&original)
            .map_err(|e| NormalizeError::DecodeFailure(e.to_string()))?;

        if value.is_null() {
            return Err(NormalizeError::EmptyInput);
        }

        let mut lines = Vec::new();
        flatten_json("", &value, &mut lines);
        let normalized = lines.join("\n");
        if normalized.trim().is_empty() {
            return Err(NormalizeError::EmptyInput);
        }

        let mut metadata = HashMap::new();
        metadata.insert("structured".to_string(), value);

        Ok(NormalizedContent {
            content_hash: hash_content(&normalized),
            normalized_text: normalized,
            original_text: original,
            rows: None,
            columns: None,
            metadata,
        })
    }
}

/// Collapse line endings and trailing whitespace
fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\0', "")
        .lines()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Flatten a JSON value into "path: value" lines
fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_json(&path, val, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_json(&format!("{}[{}]", prefix, i), item, out);
            }
        }
        serde_json::Value::Null => {}
        other => {
            let rendered = match other {
                serde_json::Value::String(s) => s.clone(),
                v => v.to_string(),
            };
            if prefix.is_empty() {
                out.push(rendered);
            } else {
                out.push(format!("{}: {}", prefix, rendered));
            }
        }
    }
}

/// Hash content for deduplication
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(1024 * 1024)
    }

    #[test]
    fn size_ceiling_checked_before_decoding() {
        let n = Normalizer::new(8);
        // Invalid UTF-8 past the ceiling: must report size, not decode failure
        let err = n
            .normalize(&[0xff; 32], ContentKind::PlainText)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::SizeExceeded { actual: 32, limit: 8 }));
    }

    #[test]
    fn empty_input_is_typed() {
        let err = normalizer()
            .normalize(b"", ContentKind::PlainText)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::EmptyInput));

        let err = normalizer()
            .normalize(b"   \n  \n", ContentKind::PlainText)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::EmptyInput));
    }

    #[test]
    fn invalid_utf8_is_decode_failure() {
        let err = normalizer()
            .normalize(&[0xff, 0xfe, 0x41], ContentKind::PlainText)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::DecodeFailure(_)));
    }

    #[test]
    fn unknown_declared_type_is_unsupported() {
        let err = Normalizer::resolve_kind("carrier_pigeon").unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedType(_)));
        assert_eq!(
            Normalizer::resolve_kind("plain_text").unwrap(),
            ContentKind::PlainText
        );
    }

    #[test]
    fn free_text_records_counts() {
        let result = normalizer()
            .normalize(b"one two three\nfour five", ContentKind::FreeText)
            .unwrap();
        assert_eq!(result.metadata["line_count"], serde_json::json!(2));
        assert_eq!(result.metadata["word_count"], serde_json::json!(5));
    }

    #[test]
    fn delimited_retains_rows_and_columns() {
        let csv = b"name,age\nalice,30\nbob,25\n";
        let result = normalizer()
            .normalize(csv, ContentKind::DelimitedTable)
            .unwrap();

        assert_eq!(result.columns.as_deref().unwrap(), ["name", "age"]);
        let rows = result.rows.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["alice", "30"]);
        assert_eq!(result.metadata["row_count"], serde_json::json!(2));
        assert!(result.normalized_text.contains("alice | 30"));
    }

    #[test]
    fn structured_json_keeps_parsed_value() {
        let result = normalizer()
            .normalize(br#"{"title": "Q3 report", "pages": 12}"#, ContentKind::StructuredJson)
            .unwrap();
        assert!(result.normalized_text.contains("title: Q3 report"));
        assert_eq!(result.metadata["structured"]["pages"], serde_json::json!(12));
    }

    #[test]
    fn malformed_json_is_decode_failure() {
        let err = normalizer()
            .normalize(b"{not json", ContentKind::StructuredJson)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::DecodeFailure(_)));
    }

    #[test]
    fn identical_content_hashes_identically() {
        let a = normalizer().normalize(b"Hello world", ContentKind::PlainText).unwrap();
        let b = normalizer().normalize(b"Hello world", ContentKind::PlainText).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }
}
