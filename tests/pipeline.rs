use migrt::ast::FieldMap;
use migrt::engine::Generator;
use migrt::error::{MigrtError, MigrtResult};
use migrt::assist::GenerationAssist;
use migrt::intake::{read_csv, SAMPLE_MAPPING};
use migrt::store::ArtifactStore;
use pretty_assertions::assert_eq;

const TS: &str = "20250101_120000";

fn row(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn customers() -> FieldMap {
    row(&[
        ("source_table", "CUSTOMERS_OLD"),
        ("target_table", "CUSTOMERS_NEW"),
        ("source_columns", "ID,NAME,STATUS"),
        ("target_columns", "ID,FULL_NAME,STATUS_CODE"),
        (
            "transformations",
            "NAME->FULL_NAME,STATUS->STATUS_CODE (MAP: 'A'->1,'I'->0)",
        ),
        ("where_condition", "STATUS <> 'D'"),
        ("related_inserts", ""),
    ])
}

struct EchoAssist;

impl GenerationAssist for EchoAssist {
    fn name(&self) -> &str {
        "echo"
    }

    fn suggest(&self, _prompt: &str) -> MigrtResult<String> {
        Ok("-- alternative script".to_string())
    }
}

struct BrokenAssist;

impl GenerationAssist for BrokenAssist {
    fn name(&self) -> &str {
        "broken"
    }

    fn suggest(&self, _prompt: &str) -> MigrtResult<String> {
        Err(MigrtError::Assist("backend unavailable".to_string()))
    }
}

#[test]
fn test_customers_end_to_end() {
    let units = migrt::generate(&[customers()], TS);
    assert_eq!(units.len(), 2);

    let unit = &units[0];
    assert_eq!(unit.filename, "20250101_120000_CUSTOMERS_OLD_to_CUSTOMERS_NEW.sql");
    assert_eq!(unit.source_table, "CUSTOMERS_OLD");
    assert_eq!(unit.target_table, "CUSTOMERS_NEW");

    let code = &unit.code;
    assert!(code.contains("CREATE OR REPLACE PACKAGE migrt_customers_new AS"));
    assert!(code.contains("    FROM CUSTOMERS_OLD\n    WHERE STATUS <> 'D';"));
    assert!(code.contains("BULK COLLECT INTO v_source_data"));
    assert!(code.contains("        INSERT INTO CUSTOMERS_NEW (\n          ID,\n          FULL_NAME,\n          STATUS_CODE\n"));
    assert!(code.contains(
        "CASE v_source_data(i).STATUS\n            WHEN 'A' THEN 1\n            WHEN 'I' THEN 0\n            ELSE v_source_data(i).STATUS\n          END"
    ));
    assert!(code.contains("          v_source_data(i).NAME,\n"));
    assert!(!code.contains("MERGE INTO"));
    assert!(code.contains("ROLLBACK;"));
    assert!(code.ends_with("BEGIN\n  migrt_customers_new.migrate_data;\nEND;\n/\n"));
}

#[test]
fn test_related_insert_merges_inside_loop() {
    let mut fields = customers();
    fields.insert("related_inserts".to_string(), "KEY:CUST_LOOKUP(ID):NAME".to_string());
    let units = migrt::generate(&[fields], TS);
    let code = &units[0].code;

    let merge = code.find("MERGE INTO CUST_LOOKUP t").unwrap();
    let loop_start = code.find("FOR i IN 1..v_source_data.COUNT LOOP").unwrap();
    let forall = code.find("FORALL i IN").unwrap();
    assert!(loop_start < merge && merge < forall);
    assert!(code.contains("USING (SELECT v_source_data(i).ID AS key_val"));
}

#[test]
fn test_sample_batch_orchestration_order() {
    let rows = read_csv(SAMPLE_MAPPING).unwrap();
    let units = migrt::generate(&rows, TS);
    assert_eq!(units.len(), 4);

    let master = &units[3];
    assert!(master.is_orchestration());
    assert_eq!(master.filename, "20250101_120000_migrate_all.sql");

    let positions: Vec<usize> = ["migrt_customers_new", "migrt_orders_new", "migrt_order_items_new"]
        .iter()
        .map(|pkg| master.code.find(&format!("{}.migrate_data;", pkg)).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(master.code.contains("-- Migration 1: CUSTOMERS_OLD to CUSTOMERS_NEW"));
    assert!(master.code.contains("-- Migration 3: ORDER_ITEMS_OLD to ORDER_ITEMS_NEW"));
}

#[test]
fn test_generation_is_deterministic() {
    let rows = read_csv(SAMPLE_MAPPING).unwrap();
    assert_eq!(migrt::generate(&rows, TS), migrt::generate(&rows, TS));
}

#[test]
fn test_missing_fields_use_placeholders() {
    let units = migrt::generate(&[FieldMap::new()], TS);
    assert_eq!(units[0].filename, "20250101_120000_unknown_source_to_unknown_target.sql");
    assert!(units[0].code.contains("      ID,\n      COLUMN1,\n      COLUMN2,\n      CREATED_DATE\n"));
}

#[test]
fn test_catalog_accumulates_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path(), "file_index.json", "sql").unwrap();
    let generator = Generator::default();

    let first = generator.run_at(&[customers()], &store, "20250101_120000").unwrap();
    let second = generator.run_at(&[customers()], &store, "20250101_130000").unwrap();
    assert_eq!(first.entries.len(), 2);
    assert_eq!(second.entries.len(), 2);

    let catalog = store.catalog().unwrap();
    assert_eq!(catalog.len(), 4);
    assert_eq!(catalog[0].timestamp, "20250101_120000");
    assert_eq!(catalog[3].timestamp, "20250101_130000");
    assert_eq!(catalog[3].source_table, "ALL");

    let stored = store
        .read_unit("20250101_120000_CUSTOMERS_OLD_to_CUSTOMERS_NEW.sql")
        .unwrap();
    assert_eq!(stored, migrt::generate(&[customers()], "20250101_120000")[0].code);
    assert_eq!(store.list().unwrap().len(), 4);
}

#[test]
fn test_assist_output_stored_beside_units() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path(), "file_index.json", "sql").unwrap();

    let report = Generator::default()
        .with_assist(Box::new(EchoAssist))
        .run_at(&[customers()], &store, TS)
        .unwrap();

    assert_eq!(report.assist_artifact.as_deref(), Some("ai_output_20250101_120000.sql"));
    assert_eq!(
        store.read_unit("ai_output_20250101_120000.sql").unwrap(),
        "-- alternative script"
    );
    // Not recorded in the catalog.
    assert_eq!(store.catalog().unwrap().len(), 2);

    let plain = migrt::generate(&[customers()], TS);
    assert_eq!(
        store.read_unit(&plain[0].filename).unwrap(),
        plain[0].code
    );
}

#[test]
fn test_failing_assist_does_not_fail_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path(), "file_index.json", "sql").unwrap();

    let report = Generator::default()
        .with_assist(Box::new(BrokenAssist))
        .run_at(&[customers()], &store, TS)
        .unwrap();

    assert!(report.assist_artifact.is_none());
    assert_eq!(report.entries.len(), 2);
}

#[cfg(unix)]
#[test]
fn test_hung_assist_does_not_block_batch() {
    use migrt::assist::CommandAssist;
    use std::time::{Duration, Instant};

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path(), "file_index.json", "sql").unwrap();
    let assist = CommandAssist::new("sleep", vec!["30".to_string()])
        .with_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let report = Generator::default()
        .with_assist(Box::new(assist))
        .run_at(&[customers()], &store, TS)
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(report.assist_artifact.is_none());
    assert_eq!(store.catalog().unwrap().len(), 2);
}

#[test]
fn test_corrupt_catalog_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("file_index.json"), "{not json").unwrap();
    let store = ArtifactStore::open(dir.path(), "file_index.json", "sql").unwrap();

    let err = Generator::default()
        .run_at(&[customers()], &store, TS)
        .unwrap_err();
    assert!(matches!(err, MigrtError::Catalog(_)));
    // Scripts written before the catalog step stay on disk.
    assert!(dir.path().join("20250101_120000_migrate_all.sql").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("file_index.json")).unwrap(),
        "{not json"
    );
}
