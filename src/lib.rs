//! # migrt: mapping sheets to Oracle migration scripts
//!
//! migrt reads table-mapping rows (source table, target table, column lists,
//! rename/value-map clauses, filters and related-insert directives) and emits
//! one self-contained PL/SQL package per mapping plus a script that runs them
//! all in input order.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use migrt::prelude::*;
//!
//! let rows = migrt::intake::read_csv(migrt::intake::SAMPLE_MAPPING)?;
//! let units = migrt::generate(&rows, "20250101_120000");
//!
//! // Three mappings, then the orchestration script.
//! assert_eq!(units.len(), 4);
//! assert!(units[3].is_orchestration());
//! ```
//!
//! ## Mapping Grammar
//!
//! | Field             | Example                                 |
//! |-------------------|-----------------------------------------|
//! | `transformations` | `NAME->FULL_NAME,STATUS->CODE (MAP: 'A'->1)` |
//! | `related_inserts` | `KEY:lookup(ID):NAME`                   |
//! | `where_condition` | `STATUS <> 'D'` (copied verbatim)       |

pub mod assist;
pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod intake;
pub mod normalize;
pub mod parser;
pub mod schema;
pub mod store;
pub mod transpiler;

pub mod prelude {
    pub use crate::assist::{CommandAssist, GenerationAssist};
    pub use crate::ast::*;
    pub use crate::config::Config;
    pub use crate::engine::{Batch, BatchReport, Generator};
    pub use crate::error::*;
    pub use crate::normalize::normalize_batch;
    pub use crate::parser::{parse_related_inserts, parse_transformations};
    pub use crate::store::ArtifactStore;
    pub use crate::transpiler::ToPlSql;
}

/// Generate all script units for a batch of rows without an assist.
///
/// # Example
///
/// ```
/// use migrt::ast::FieldMap;
///
/// let row: FieldMap = [("source_table", "A_OLD"), ("target_table", "A_NEW")]
///     .iter()
///     .map(|(k, v)| (k.to_string(), v.to_string()))
///     .collect();
/// let units = migrt::generate(&[row], "20250101_120000");
/// assert_eq!(units[0].filename, "20250101_120000_A_OLD_to_A_NEW.sql");
/// assert_eq!(units[1].filename, "20250101_120000_migrate_all.sql");
/// ```
pub fn generate(rows: &[ast::FieldMap], timestamp: &str) -> Vec<ast::GeneratedUnit> {
    engine::Generator::default().generate(rows, timestamp).units
}
