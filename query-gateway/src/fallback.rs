//! Static fallback dataset.
//!
//! Maps table names to canned JSON values served when the database cannot
//! answer. Loaded once at startup and never mutated afterwards.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use common::errors::{AppError, AppResult};
use common::utils::SqlInspector;

/// Table name → canned result.
#[derive(Debug, Clone, Default)]
pub struct FallbackDataset {
    entries: HashMap<String, Value>,
}

impl FallbackDataset {
    /// Loads the dataset from a JSON file whose top level is an object.
    ///
    /// A missing file yields an empty dataset; every lookup then resolves to
    /// an empty array.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "回退数据文件不存在，使用空数据集");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AppError::FallbackLoad(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let dataset = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), tables = dataset.len(), "回退数据已加载");
        Ok(dataset)
    }

    /// Parses the dataset from JSON text.
    pub fn from_json_str(text: &str) -> AppResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| AppError::FallbackLoad(format!("invalid JSON: {e}")))?;
        match value {
            Value::Object(map) => Ok(Self {
                entries: map.into_iter().collect(),
            }),
            other => Err(AppError::FallbackLoad(format!(
                "top level must be an object, found {}",
                json_type(&other)
            ))),
        }
    }

    /// Canned value for `table`, or an empty array when unmapped.
    pub fn lookup(&self, table: &str) -> Value {
        self.entries
            .get(table)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }

    /// Extracts the table from `sql` and looks it up.
    ///
    /// Returns the extracted table (if any) with the resolved value.
    pub fn resolve(&self, sql: &str) -> (Option<String>, Value) {
        match SqlInspector::extract_table(sql) {
            Some(table) => {
                let value = self.lookup(&table);
                (Some(table), value)
            }
            None => (None, Value::Array(Vec::new())),
        }
    }

    pub fn contains(&self, table: &str) -> bool {
        self.entries.contains_key(table)
    }

    /// Table names, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
