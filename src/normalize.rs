//! Turn raw mapping rows into fully resolved mappings.

use tracing::info;

use crate::ast::{FieldMap, MappingRow, NormalizedMapping};
use crate::parser::{parse_related_inserts, parse_transformations};

/// Columns used when a row lists no source columns.
pub const DEFAULT_SOURCE_COLUMNS: [&str; 4] = ["ID", "COLUMN1", "COLUMN2", "CREATED_DATE"];

impl MappingRow {
    /// Parse the clauses of this row and resolve its column lists.
    pub fn normalize(&self) -> NormalizedMapping {
        info!("Processing mapping: {} -> {}", self.source_table, self.target_table);

        let transforms = parse_transformations(&self.transformations_raw);
        let related_inserts = parse_related_inserts(&self.related_inserts_raw);

        let source_columns = if self.source_columns.is_empty() {
            DEFAULT_SOURCE_COLUMNS.iter().map(|c| c.to_string()).collect()
        } else {
            self.source_columns.clone()
        };

        let target_columns = if self.target_columns.is_empty() {
            source_columns
                .iter()
                .map(|col| {
                    transforms
                        .get(col)
                        .map(|t| t.dest_field.clone())
                        .unwrap_or_else(|| col.clone())
                })
                .collect()
        } else {
            self.target_columns.clone()
        };

        NormalizedMapping {
            source_table: self.source_table.clone(),
            target_table: self.target_table.clone(),
            source_columns,
            target_columns,
            transforms,
            where_condition: self.where_condition.clone(),
            related_inserts,
        }
    }
}

/// Normalize every input record, preserving input order.
pub fn normalize_batch(rows: &[FieldMap]) -> Vec<NormalizedMapping> {
    rows.iter()
        .map(|fields| MappingRow::from_fields(fields).normalize())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RelatedInsert;
    use pretty_assertions::assert_eq;

    fn row(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_source_columns() {
        let mapping = MappingRow::from_fields(&row(&[
            ("source_table", "A"),
            ("target_table", "B"),
        ]))
        .normalize();
        assert_eq!(mapping.source_columns, DEFAULT_SOURCE_COLUMNS.to_vec());
        assert_eq!(mapping.target_columns, DEFAULT_SOURCE_COLUMNS.to_vec());
    }

    #[test]
    fn test_target_columns_from_transforms() {
        let mapping = MappingRow::from_fields(&row(&[
            ("source_table", "ORDERS_OLD"),
            ("target_table", "ORDERS_NEW"),
            ("source_columns", "ORDER_ID, CUST_ID ,TOTAL_AMOUNT"),
            ("transformations", "ORDER_ID->ID,TOTAL_AMOUNT->AMOUNT"),
        ]))
        .normalize();
        assert_eq!(mapping.target_columns, vec!["ID", "CUST_ID", "AMOUNT"]);
    }

    #[test]
    fn test_explicit_target_columns_kept() {
        let mapping = MappingRow::from_fields(&row(&[
            ("source_columns", "A,B"),
            ("target_columns", "X,,Y,Z"),
            ("transformations", "A->Q"),
        ]))
        .normalize();
        assert_eq!(mapping.target_columns, vec!["X", "Y", "Z"]);
        assert_eq!(mapping.column_pairs().count(), 2);
    }

    #[test]
    fn test_batch_order_and_directives() {
        let batch = normalize_batch(&[
            row(&[("source_table", "S1"), ("related_inserts", "KEY:migrt_key(ID):NAME")]),
            row(&[("source_table", "S2"), ("related_inserts", "KEY:bad(ID")]),
        ]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].source_table, "S1");
        assert_eq!(batch[1].source_table, "S2");
        assert!(matches!(&batch[0].related_inserts[..], [RelatedInsert::Key { .. }]));
        assert!(batch[1].related_inserts.is_empty());
    }
}
