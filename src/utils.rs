use std::path::Path;

use serde_json::Value;

use crate::error::{EsError, Result};
use crate::models::document::RawDocument;

#[macro_export]
macro_rules! debug_if {
    ($cond:expr, $($arg:tt)+) => {
        {
            if $cond {
                tracing::debug!($($arg)+)
            }
        }
    };
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| EsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads an NDJSON file, one document per non-blank line, taking each id
/// from `id_field`.
pub async fn read_documents(path: &Path, id_field: &str) -> Result<Vec<RawDocument>> {
    let text = read_text(path).await?;
    parse_documents(&text, id_field)
}

pub fn parse_documents(text: &str, id_field: &str) -> Result<Vec<RawDocument>> {
    let mut docs = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| EsError::InvalidArgument(format!("line {}: not JSON: {}", line_no + 1, e)))?;
        let doc = RawDocument::from_value(value, id_field).map_err(|e| {
            EsError::InvalidArgument(format!("line {}: {}", line_no + 1, e))
        })?;
        docs.push(doc);
    }
    Ok(docs)
}

/// Reads one id per line, ignoring blank lines and surrounding whitespace.
pub async fn read_ids(path: &Path) -> Result<Vec<String>> {
    let text = read_text(path).await?;
    Ok(parse_ids(&text))
}

pub fn parse_ids(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn read_query(path: &Path) -> Result<Value> {
    let text = read_text(path).await?;
    serde_json::from_str(&text)
        .map_err(|e| EsError::InvalidArgument(format!("query {:?} is not JSON: {}", path, e)))
}
