//! Data model shared by the parsers, the normalizer and the script generator.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One raw input record: field name to value. Absent fields read as empty.
pub type FieldMap = HashMap<String, String>;

/// Placeholder used when a row names no source table.
pub const UNKNOWN_SOURCE: &str = "unknown_source";
/// Placeholder used when a row names no target table.
pub const UNKNOWN_TARGET: &str = "unknown_target";
/// Table identifier carried by the orchestration unit.
pub const ALL_TABLES: &str = "ALL";

/// A source→target migration as read from the mapping sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRow {
    pub source_table: String,
    pub target_table: String,
    pub source_columns: Vec<String>,
    pub target_columns: Vec<String>,
    pub transformations_raw: String,
    pub where_condition: Option<String>,
    pub related_inserts_raw: String,
}

impl MappingRow {
    /// Build a row from a generic field map.
    pub fn from_fields(fields: &FieldMap) -> Self {
        let get = |key: &str| fields.get(key).map(String::as_str).unwrap_or("");

        let where_condition = get("where_condition").trim();

        Self {
            source_table: table_or(get("source_table"), UNKNOWN_SOURCE),
            target_table: table_or(get("target_table"), UNKNOWN_TARGET),
            source_columns: split_columns(get("source_columns")),
            target_columns: split_columns(get("target_columns")),
            transformations_raw: get("transformations").to_string(),
            where_condition: (!where_condition.is_empty()).then(|| where_condition.to_string()),
            related_inserts_raw: get("related_inserts").to_string(),
        }
    }
}

fn table_or(raw: &str, placeholder: &str) -> String {
    let name = raw.trim();
    if name.is_empty() {
        placeholder.to_string()
    } else {
        name.to_string()
    }
}

/// Split a comma separated column list, trimming tokens and dropping empty ones.
pub fn split_columns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rename rule (and optional value remap) for one source column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTransform {
    pub dest_field: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub value_map: IndexMap<String, String>,
}

impl ColumnTransform {
    pub fn rename(dest_field: impl Into<String>) -> Self {
        Self {
            dest_field: dest_field.into(),
            value_map: IndexMap::new(),
        }
    }

    pub fn has_value_map(&self) -> bool {
        !self.value_map.is_empty()
    }

    /// Apply the value map the way the generated CASE expression does:
    /// first matching key wins, anything else passes through unchanged.
    pub fn remap<'a>(&'a self, value: &'a str) -> &'a str {
        self.value_map
            .iter()
            .find(|(key, _)| key.as_str() == value)
            .map(|(_, mapped)| mapped.as_str())
            .unwrap_or(value)
    }
}

/// Source column name to its transform, in definition order.
pub type TransformSet = IndexMap<String, ColumnTransform>;

/// Auxiliary upsert performed alongside the main migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum RelatedInsert {
    /// `KEY:<target_table>(<key_column>):<value_column>`
    Key {
        target_table: String,
        key_column: String,
        value_column: String,
    },
}

impl fmt::Display for RelatedInsert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelatedInsert::Key {
                target_table,
                key_column,
                value_column,
            } => write!(f, "KEY:{}({}):{}", target_table, key_column, value_column),
        }
    }
}

/// A mapping row with its column lists resolved and its clauses parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMapping {
    pub source_table: String,
    pub target_table: String,
    pub source_columns: Vec<String>,
    pub target_columns: Vec<String>,
    pub transforms: TransformSet,
    pub where_condition: Option<String>,
    pub related_inserts: Vec<RelatedInsert>,
}

impl NormalizedMapping {
    /// Source/target column pairs written by the main insert.
    ///
    /// Extra columns on the longer side are dropped.
    pub fn column_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.source_columns
            .iter()
            .zip(self.target_columns.iter())
            .map(|(s, t)| (s.as_str(), t.as_str()))
    }
}

/// One complete migration script, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedUnit {
    pub filename: String,
    pub code: String,
    pub source_table: String,
    pub target_table: String,
}

impl GeneratedUnit {
    pub fn is_orchestration(&self) -> bool {
        self.source_table == ALL_TABLES && self.target_table == ALL_TABLES
    }
}

/// A catalog record for one persisted unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCatalogEntry {
    pub filename: String,
    pub source_table: String,
    pub target_table: String,
    pub timestamp: String,
}
