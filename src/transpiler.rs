//! PL/SQL generator for normalized mappings.
//!
//! Every mapping becomes a package `migrt_<target>` with a single
//! `migrate_data` procedure. The orchestration script calls each package in
//! turn and keeps going when one of them fails.

use crate::ast::{ColumnTransform, GeneratedUnit, NormalizedMapping, RelatedInsert};
use crate::schema::infer_type;
use crate::store::sanitize;

const TIMESTAMP_EXPR: &str = "TO_CHAR(SYSDATE, 'DD-MON-YYYY HH24:MI:SS')";

/// Trait for converting mappings to a PL/SQL script.
pub trait ToPlSql {
    /// Convert this node to PL/SQL source.
    fn to_plsql(&self) -> String;
}

/// Package name generated for a target table.
pub fn package_name(target_table: &str) -> String {
    format!("migrt_{}", sanitize(target_table).to_lowercase())
}

impl ToPlSql for NormalizedMapping {
    fn to_plsql(&self) -> String {
        let package = package_name(&self.target_table);
        let source = literal_body(&self.source_table);
        let target = literal_body(&self.target_table);

        let mut sql = String::from("SET SERVEROUTPUT ON;\n\n");

        // Package spec
        sql.push_str(&format!(
            "-- Data migration package for {} to {}\n",
            self.source_table, self.target_table
        ));
        sql.push_str(&format!("CREATE OR REPLACE PACKAGE {} AS\n", package));
        sql.push_str("  PROCEDURE migrate_data;\n");
        sql.push_str(&format!("END {};\n/\n\n", package));

        // Package body
        sql.push_str(&format!("CREATE OR REPLACE PACKAGE BODY {} AS\n", package));
        sql.push_str("  v_error_message VARCHAR2(4000);\n");
        sql.push_str("  v_count NUMBER;\n\n");
        sql.push_str("  PROCEDURE migrate_data IS\n");
        sql.push_str(&self.record_type_sql());
        sql.push_str("  BEGIN\n");
        sql.push_str(&format!(
            "    DBMS_OUTPUT.PUT_LINE('Starting migration from {} to {}: ' || {});\n\n",
            source, target, TIMESTAMP_EXPR
        ));
        sql.push_str(&self.fetch_sql());
        sql.push_str("    v_count := v_source_data.COUNT;\n");
        sql.push_str("    DBMS_OUTPUT.PUT_LINE('Found ' || v_count || ' records to migrate.');\n\n");
        sql.push_str("    IF v_count > 0 THEN\n");
        sql.push_str(&self.related_inserts_sql());
        sql.push_str(&self.insert_sql());
        sql.push_str("      DBMS_OUTPUT.PUT_LINE('Inserted ' || SQL%ROWCOUNT || ' records into main table.');\n");
        sql.push_str("      COMMIT;\n");
        sql.push_str("      DBMS_OUTPUT.PUT_LINE('Main table data committed successfully.');\n");
        sql.push_str("    ELSE\n");
        sql.push_str("      DBMS_OUTPUT.PUT_LINE('No records to migrate.');\n");
        sql.push_str("    END IF;\n\n");
        sql.push_str(&format!(
            "    DBMS_OUTPUT.PUT_LINE('Migration completed: ' || {});\n",
            TIMESTAMP_EXPR
        ));
        sql.push_str("  EXCEPTION\n");
        sql.push_str("    WHEN OTHERS THEN\n");
        sql.push_str("      v_error_message := SQLERRM;\n");
        sql.push_str("      DBMS_OUTPUT.PUT_LINE('Error during migration: ' || v_error_message);\n");
        sql.push_str("      ROLLBACK;\n");
        sql.push_str("      RAISE;\n");
        sql.push_str("  END migrate_data;\n");
        sql.push_str(&format!("END {};\n/\n\n", package));

        // Run it
        sql.push_str("-- Execute migration\n");
        sql.push_str("BEGIN\n");
        sql.push_str(&format!("  {}.migrate_data;\n", package));
        sql.push_str("END;\n/\n");

        sql
    }
}

impl NormalizedMapping {
    /// Record and collection types for the bulk fetch.
    fn record_type_sql(&self) -> String {
        let fields: Vec<String> = self
            .source_columns
            .iter()
            .map(|col| format!("      {} {}", col, infer_type(col)))
            .collect();

        let mut sql = String::from("    TYPE t_source_rec IS RECORD (\n");
        sql.push_str(&fields.join(",\n"));
        sql.push_str("\n    );\n");
        sql.push_str("    TYPE t_source_tab IS TABLE OF t_source_rec;\n");
        sql.push_str("    v_source_data t_source_tab;\n");
        sql
    }

    /// `SELECT ... BULK COLLECT INTO` from the source table.
    fn fetch_sql(&self) -> String {
        let cols: Vec<String> = self
            .source_columns
            .iter()
            .map(|col| format!("      {}", col))
            .collect();

        let mut sql = String::from("    SELECT\n");
        sql.push_str(&cols.join(",\n"));
        sql.push_str("\n    BULK COLLECT INTO v_source_data\n");
        sql.push_str(&format!("    FROM {}", self.source_table));
        if let Some(cond) = &self.where_condition {
            sql.push_str(&format!("\n    WHERE {}", cond));
        }
        sql.push_str(";\n\n");
        sql
    }

    /// Row-by-row lookup upserts, each isolated in its own block.
    fn related_inserts_sql(&self) -> String {
        if self.related_inserts.is_empty() {
            return String::new();
        }

        let mut sql = String::from("      FOR i IN 1..v_source_data.COUNT LOOP\n");
        for related in &self.related_inserts {
            sql.push_str(&related.to_plsql());
        }
        sql.push_str("      END LOOP;\n\n");
        sql.push_str("      COMMIT;\n");
        sql.push_str("      DBMS_OUTPUT.PUT_LINE('Related records committed successfully.');\n\n");
        sql
    }

    /// Set-oriented insert into the target table.
    fn insert_sql(&self) -> String {
        let (targets, values): (Vec<String>, Vec<String>) = self
            .column_pairs()
            .map(|(src, tgt)| {
                let value = match self.transforms.get(src) {
                    Some(t) if t.has_value_map() => case_expression(src, t),
                    _ => format!("v_source_data(i).{}", src),
                };
                (format!("          {}", tgt), format!("          {}", value))
            })
            .unzip();

        let mut sql = String::from("      FORALL i IN 1..v_source_data.COUNT\n");
        sql.push_str(&format!("        INSERT INTO {} (\n", self.target_table));
        sql.push_str(&targets.join(",\n"));
        sql.push_str("\n        ) VALUES (\n");
        sql.push_str(&values.join(",\n"));
        sql.push_str("\n        );\n\n");
        sql
    }
}

impl ToPlSql for RelatedInsert {
    fn to_plsql(&self) -> String {
        match self {
            RelatedInsert::Key {
                target_table,
                key_column,
                value_column,
            } => {
                let mut sql = format!("        -- Insert/update record in {} lookup table\n", target_table);
                sql.push_str("        BEGIN\n");
                sql.push_str(&format!("          MERGE INTO {} t\n", target_table));
                sql.push_str(&format!(
                    "          USING (SELECT v_source_data(i).{} AS key_val,\n",
                    key_column
                ));
                sql.push_str(&format!(
                    "                        v_source_data(i).{} AS value_val\n",
                    value_column
                ));
                sql.push_str("                 FROM dual) s\n");
                sql.push_str("          ON (t.migrt_key = s.key_val)\n");
                sql.push_str("          WHEN MATCHED THEN\n");
                sql.push_str("            UPDATE SET t.migrt_value = s.value_val\n");
                sql.push_str("          WHEN NOT MATCHED THEN\n");
                sql.push_str("            INSERT (migrt_key, migrt_value)\n");
                sql.push_str("            VALUES (s.key_val, s.value_val);\n\n");
                sql.push_str(&format!(
                    "          DBMS_OUTPUT.PUT_LINE('Processed lookup record for key: ' || v_source_data(i).{});\n",
                    key_column
                ));
                sql.push_str("        EXCEPTION\n");
                sql.push_str("          WHEN OTHERS THEN\n");
                sql.push_str("            v_error_message := SQLERRM;\n");
                sql.push_str(&format!(
                    "            DBMS_OUTPUT.PUT_LINE('Error during related insert to {}: ' || v_error_message);\n",
                    literal_body(target_table)
                ));
                sql.push_str("        END;\n");
                sql
            }
        }
    }
}

/// `CASE` over the value map, falling back to the source value.
fn case_expression(column: &str, transform: &ColumnTransform) -> String {
    let mut sql = format!("CASE v_source_data(i).{}\n", column);
    for (from, to) in &transform.value_map {
        sql.push_str(&format!(
            "            WHEN '{}' THEN {}\n",
            literal_body(from),
            sql_value(to)
        ));
    }
    sql.push_str(&format!("            ELSE v_source_data(i).{}\n", column));
    sql.push_str("          END");
    sql
}

/// Render a mapped value: numbers and NULL stay bare, anything else is quoted.
fn sql_value(value: &str) -> String {
    if is_numeric_literal(value) || value.eq_ignore_ascii_case("NULL") {
        value.to_string()
    } else {
        format!("'{}'", literal_body(value))
    }
}

fn is_numeric_literal(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    let mut dots = 0;
    !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| {
            if c == '.' {
                dots += 1;
                dots == 1
            } else {
                c.is_ascii_digit()
            }
        })
}

/// Escape text for use inside a single-quoted SQL literal.
fn literal_body(text: &str) -> String {
    text.replace('\'', "''")
}

/// Master script calling every generated package in order.
///
/// Each call sits in its own block so one failing package does not stop
/// the ones after it.
pub fn orchestration_script(units: &[GeneratedUnit]) -> String {
    let mut sql = String::from("SET SERVEROUTPUT ON;\n\n");
    sql.push_str("-- Main migration controller\n");
    sql.push_str("BEGIN\n");
    sql.push_str(&format!(
        "  DBMS_OUTPUT.PUT_LINE('=== DATA MIGRATION START: ' || {} || ' ===');\n",
        TIMESTAMP_EXPR
    ));
    sql.push_str("  DBMS_OUTPUT.PUT_LINE('');\n\n");

    let calls: Vec<String> = units
        .iter()
        .filter(|unit| !unit.is_orchestration())
        .enumerate()
        .map(|(i, unit)| {
            let package = package_name(&unit.target_table);
            let mut call = format!(
                "  -- Migration {}: {} to {}\n",
                i + 1,
                unit.source_table,
                unit.target_table
            );
            call.push_str("  BEGIN\n");
            call.push_str(&format!("    {}.migrate_data;\n", package));
            call.push_str("    DBMS_OUTPUT.PUT_LINE('');\n");
            call.push_str("  EXCEPTION\n");
            call.push_str("    WHEN OTHERS THEN\n");
            call.push_str(&format!(
                "      DBMS_OUTPUT.PUT_LINE('Error in {}: ' || SQLERRM);\n",
                package
            ));
            call.push_str("      DBMS_OUTPUT.PUT_LINE('');\n");
            call.push_str("  END;\n");
            call
        })
        .collect();

    sql.push_str(&calls.join("\n"));
    sql.push('\n');
    sql.push_str(&format!(
        "  DBMS_OUTPUT.PUT_LINE('=== DATA MIGRATION END: ' || {} || ' ===');\n",
        TIMESTAMP_EXPR
    ));
    sql.push_str("END;\n/\n");
    sql
}
