//! Parsers for the two small languages embedded in a mapping sheet.
//!
//! # Transformations
//!
//! ```text
//! NAME->FULL_NAME,STATUS->STATUS_CODE (MAP: 'A'->1,'I'->0)
//! ─┬── ───┬─────  ──┬─── ─────┬─────  ─────────┬─────────
//!  │      │         │         │                 └── Value map (first match wins)
//!  │      │         │         └── Destination column
//!  │      │         └── Source column
//!  │      └── Destination column
//!  └── Source column
//! ```
//!
//! # Related inserts
//!
//! ```text
//! KEY:migrt_key(ID):NAME
//! ─┬─ ────┬──── ─┬  ─┬──
//!  │      │      │   └── Value column
//!  │      │      └── Key column
//!  │      └── Lookup table
//!  └── Directive kind
//! ```

pub mod directive;
pub mod transform;

pub use directive::{parse_directive, parse_related_inserts};
pub use transform::{parse_clause, parse_transformations, split_clauses, try_parse_transformations};
