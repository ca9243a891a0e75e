//! Generation pipeline.
//!
//! Rows are normalized, optionally shown to an assist, turned into one unit
//! per mapping plus the orchestration unit, and finally persisted.

use tracing::{info, warn};

use crate::assist::{build_prompt, CommandAssist, GenerationAssist};
use crate::ast::{ArtifactCatalogEntry, FieldMap, GeneratedUnit, NormalizedMapping, ALL_TABLES};
use crate::config::Config;
use crate::error::MigrtResult;
use crate::normalize::normalize_batch;
use crate::store::{batch_timestamp, orchestration_filename, unit_filename, ArtifactStore};
use crate::transpiler::{orchestration_script, ToPlSql};

/// Everything produced for one input batch.
#[derive(Debug, Clone)]
pub struct Batch {
    pub timestamp: String,
    pub mappings: Vec<NormalizedMapping>,
    /// Per-mapping units in input order, then the orchestration unit.
    pub units: Vec<GeneratedUnit>,
    /// Side output of the assist, if one ran and succeeded.
    pub assist_output: Option<String>,
}

/// Result of a persisted batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub timestamp: String,
    pub entries: Vec<ArtifactCatalogEntry>,
    pub assist_artifact: Option<String>,
}

/// Script generator with an optional assist.
pub struct Generator {
    extension: String,
    assist: Option<Box<dyn GenerationAssist>>,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new("sql")
    }
}

impl Generator {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            assist: None,
        }
    }

    /// Build from config, wiring the command assist when one is configured.
    pub fn from_config(config: &Config) -> Self {
        let generator = Self::new(config.extension.clone());
        match &config.assist {
            Some(assist) => generator.with_assist(Box::new(CommandAssist::from_config(assist))),
            None => generator,
        }
    }

    pub fn with_assist(mut self, assist: Box<dyn GenerationAssist>) -> Self {
        self.assist = Some(assist);
        self
    }

    pub fn has_assist(&self) -> bool {
        self.assist.is_some()
    }

    /// Generate all units for a batch of raw rows. Pure apart from the assist.
    pub fn generate(&self, rows: &[FieldMap], timestamp: &str) -> Batch {
        let mappings = normalize_batch(rows);
        let assist_output = self.run_assist(&mappings);
        let units = self.synthesize(&mappings, timestamp);

        info!("Generated {} script units", units.len());
        Batch {
            timestamp: timestamp.to_string(),
            mappings,
            units,
            assist_output,
        }
    }

    /// One unit per mapping, followed by the orchestration unit.
    pub fn synthesize(&self, mappings: &[NormalizedMapping], timestamp: &str) -> Vec<GeneratedUnit> {
        let mut units: Vec<GeneratedUnit> = mappings
            .iter()
            .map(|mapping| GeneratedUnit {
                filename: unit_filename(
                    timestamp,
                    &mapping.source_table,
                    &mapping.target_table,
                    &self.extension,
                ),
                code: mapping.to_plsql(),
                source_table: mapping.source_table.clone(),
                target_table: mapping.target_table.clone(),
            })
            .collect();

        units.push(GeneratedUnit {
            filename: orchestration_filename(timestamp, &self.extension),
            code: orchestration_script(&units),
            source_table: ALL_TABLES.to_string(),
            target_table: ALL_TABLES.to_string(),
        });
        units
    }

    fn run_assist(&self, mappings: &[NormalizedMapping]) -> Option<String> {
        let assist = self.assist.as_ref()?;

        let suggestion = build_prompt(mappings).and_then(|prompt| assist.suggest(&prompt));
        match suggestion {
            Ok(text) => {
                info!("Assist '{}' produced a suggestion", assist.name());
                Some(text)
            }
            Err(e) => {
                warn!("Error in assist '{}': {}", assist.name(), e);
                None
            }
        }
    }

    /// Generate and persist a batch stamped with the current time.
    pub fn run(&self, rows: &[FieldMap], store: &ArtifactStore) -> MigrtResult<BatchReport> {
        self.run_at(rows, store, &batch_timestamp())
    }

    /// Generate and persist a batch with an explicit timestamp.
    pub fn run_at(&self, rows: &[FieldMap], store: &ArtifactStore, timestamp: &str) -> MigrtResult<BatchReport> {
        let batch = self.generate(rows, timestamp);

        let assist_artifact = batch.assist_output.as_deref().and_then(|text| {
            let name = format!("ai_output_{}.{}", timestamp, self.extension);
            match store.write_side_artifact(&name, text) {
                Ok(_) => Some(name),
                Err(e) => {
                    warn!("Failed to store assist output: {}", e);
                    None
                }
            }
        });

        let entries = store.persist(&batch.units, timestamp)?;
        Ok(BatchReport {
            timestamp: timestamp.to_string(),
            entries,
            assist_artifact,
        })
    }
}
