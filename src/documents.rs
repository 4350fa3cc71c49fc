//! Loading resource documents from JSON and TOML files
//!
//! A file holds one document, an array of documents, or a list object with an
//! `items` array. TOML files use `[[items]]` tables for several documents.

use anyhow::{Context, Result, bail};
use declarative::Document;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Load every document of every file, in order
pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for path in paths {
        documents.extend(load(path.as_ref())?);
    }
    Ok(documents)
}

/// Load the documents of one file
pub fn load(path: &Path) -> Result<Vec<Document>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let documents = parse(&content, Format::of(path))
        .with_context(|| format!("Invalid document file {}", path.display()))?;
    log::debug!("Loaded {} document(s) from {}", documents.len(), path.display());
    Ok(documents)
}

fn parse(content: &str, format: Format) -> Result<Vec<Document>> {
    let value: Value = match format {
        Format::Json => serde_json::from_str(content)?,
        Format::Toml => serde_json::to_value(toml::from_str::<toml::Table>(content)?)?,
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) if !map.contains_key("kind") && map.contains_key("items") => {
            match map.remove("items") {
                Some(Value::Array(items)) => items,
                _ => bail!("'items' must be an array"),
            }
        }
        value @ Value::Object(_) => vec![value],
        _ => bail!("expected a document, an array of documents or an object with 'items'"),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            if !item.is_object() {
                bail!("document #{} is not an object", idx + 1);
            }
            Ok(Document::from_value(item))
        })
        .collect()
}
