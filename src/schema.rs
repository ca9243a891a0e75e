//! Column type inference from naming conventions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Oracle storage type chosen for a source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    Integer,
    Temporal,
    Numeric,
    Text,
}

/// Capacity of the catch-all text type.
pub const TEXT_CAPACITY: usize = 4000;

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Integer | StorageType::Numeric => write!(f, "NUMBER"),
            StorageType::Temporal => write!(f, "DATE"),
            StorageType::Text => write!(f, "VARCHAR2({})", TEXT_CAPACITY),
        }
    }
}

/// Guess a storage type from a column name.
///
/// Rules are checked in order and the first match wins, so `PAID_DATE`
/// is an integer because it contains `ID`.
pub fn infer_type(column: &str) -> StorageType {
    let name = column.to_uppercase();

    if name.contains("ID") || name.ends_with("_ID") {
        StorageType::Integer
    } else if name.contains("DATE") || name.contains("TIME") {
        StorageType::Temporal
    } else if ["AMOUNT", "PRICE", "COST"].iter().any(|k| name.contains(k)) {
        StorageType::Numeric
    } else {
        StorageType::Text
    }
}
