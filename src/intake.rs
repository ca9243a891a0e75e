//! Mapping file intake: CSV or JSON into generic field maps.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::ast::FieldMap;
use crate::error::{MigrtError, MigrtResult};

/// Filename of the sample mapping sheet.
pub const SAMPLE_FILENAME: &str = "sample_mapping.csv";

/// Sample mapping sheet covering renames, value maps, filters and related inserts.
pub const SAMPLE_MAPPING: &str = r#"source_table,target_table,source_columns,target_columns,transformations,where_condition,related_inserts
CUSTOMERS_OLD,CUSTOMERS_NEW,"ID,NAME,EMAIL,REG_DATE,STATUS","ID,FULL_NAME,EMAIL,REGISTRATION_DATE,STATUS_CODE","NAME->FULL_NAME,REG_DATE->REGISTRATION_DATE,STATUS->STATUS_CODE (MAP: 'A'->1,'I'->0)","STATUS <> 'D'","KEY:migrt_key(ID):NAME"
ORDERS_OLD,ORDERS_NEW,"ORDER_ID,CUST_ID,ORDER_DATE,TOTAL_AMOUNT,PAYMENT_METHOD","ID,CUSTOMER_ID,ORDER_DATE,AMOUNT,PAYMENT_TYPE","ORDER_ID->ID,CUST_ID->CUSTOMER_ID,TOTAL_AMOUNT->AMOUNT,PAYMENT_METHOD->PAYMENT_TYPE","TOTAL_AMOUNT > 0",""
ORDER_ITEMS_OLD,ORDER_ITEMS_NEW,"ITEM_ID,ORDER_ID,PRODUCT_ID,QUANTITY,UNIT_PRICE","ID,ORDER_ID,PRODUCT_ID,QTY,PRICE","ITEM_ID->ID,QUANTITY->QTY,UNIT_PRICE->PRICE","",""
"#;

/// Read a mapping file, picking the format from its extension.
pub fn read_mapping_file(path: &Path) -> MigrtResult<Vec<FieldMap>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let rows = match ext.as_str() {
        "csv" => read_csv(&fs::read_to_string(path)?)?,
        "json" => read_json(&fs::read_to_string(path)?)?,
        other => {
            return Err(MigrtError::Intake(format!(
                "unsupported mapping file type '{}' (expected csv or json)",
                other
            )));
        }
    };

    info!("Mapping parsed successfully: {} tables found", rows.len());
    Ok(rows)
}

/// Parse CSV text with a header row.
pub fn read_csv(content: &str) -> MigrtResult<Vec<FieldMap>> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    reader
        .deserialize::<FieldMap>()
        .map(|row| row.map_err(|e| MigrtError::Intake(e.to_string())))
        .collect()
}

/// Parse a JSON array of objects. Non-string values are stringified, null is empty.
pub fn read_json(content: &str) -> MigrtResult<Vec<FieldMap>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let serde_json::Value::Array(items) = value else {
        return Err(MigrtError::Intake("expected a JSON array of mapping objects".to_string()));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            serde_json::Value::Object(obj) => Ok(obj
                .into_iter()
                .map(|(k, v)| (k, value_to_string(v)))
                .collect::<FieldMap>()),
            _ => Err(MigrtError::Intake(format!("item {} is not an object", i))),
        })
        .collect()
}

fn value_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Write the sample mapping into `dir` unless it already exists.
pub fn ensure_sample(dir: &Path) -> MigrtResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(SAMPLE_FILENAME);
    if !path.exists() {
        fs::write(&path, SAMPLE_MAPPING)?;
        info!("Created sample mapping file at {}", path.display());
    }
    Ok(path)
}
