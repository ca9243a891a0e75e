//! Related-insert directive parser.
//!
//! Only one directive kind exists today:
//!
//! ```text
//! KEY:<target_table>(<key_column>):<value_column>
//! ```

use nom::{
    bytes::complete::{tag, take_until},
    character::complete::{char, multispace0},
    combinator::{opt, rest},
    sequence::delimited,
    IResult,
};
use tracing::{debug, info, warn};

use crate::ast::RelatedInsert;
use crate::error::{MigrtError, MigrtResult};

const KEY_PREFIX: &str = "KEY:";

/// Parse a comma separated list of directives.
///
/// Unknown directive kinds are ignored and malformed `KEY:` directives are
/// dropped; neither stops the rest of the list from parsing.
pub fn parse_related_inserts(input: &str) -> Vec<RelatedInsert> {
    if input.trim().is_empty() {
        return Vec::new();
    }

    debug!("Processing related inserts: {}", input);

    let related: Vec<RelatedInsert> = input
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .filter_map(|directive| match parse_directive(directive) {
            Ok(Some(ri)) => {
                debug!("Parsed related insert: {}", ri);
                Some(ri)
            }
            Ok(None) => {
                debug!("Ignoring unsupported directive: {}", directive);
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect();

    info!("Processed {} related inserts", related.len());
    related
}

/// Parse one directive.
///
/// Returns `Ok(None)` for directive kinds other than `KEY:`.
pub fn parse_directive(directive: &str) -> MigrtResult<Option<RelatedInsert>> {
    let directive = directive.trim();
    let Some(body) = directive.strip_prefix(KEY_PREFIX) else {
        return Ok(None);
    };

    let Some(open) = body.find('(') else {
        return Err(MigrtError::directive(directive, "missing '('"));
    };
    if !body[open..].contains(')') {
        return Err(MigrtError::directive(directive, "missing ')'"));
    }

    let (_, (target_table, key_column, value_column)) = parse_key_directive(directive)
        .map_err(|e| MigrtError::directive(directive, format!("malformed KEY directive: {:?}", e)))?;

    if key_column.is_empty() {
        return Err(MigrtError::directive(directive, "empty key column"));
    }
    if value_column.is_empty() {
        return Err(MigrtError::directive(directive, "empty value column"));
    }

    Ok(Some(RelatedInsert::Key {
        target_table: target_table.to_string(),
        key_column: key_column.to_string(),
        value_column: value_column.to_string(),
    }))
}

fn parse_key_directive(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (input, _) = tag(KEY_PREFIX)(input)?;
    let (input, target_table) = take_until("(")(input)?;
    let (input, key_column) = delimited(char('('), take_until(")"), char(')'))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = opt(char(':'))(input)?;
    let (input, value_column) = rest(input)?;

    Ok((input, (target_table.trim(), key_column.trim(), value_column.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(table: &str, k: &str, v: &str) -> RelatedInsert {
        RelatedInsert::Key {
            target_table: table.to_string(),
            key_column: k.to_string(),
            value_column: v.to_string(),
        }
    }

    #[test]
    fn test_key_directive() {
        let parsed = parse_related_inserts("KEY:migrt_key(ID):NAME");
        assert_eq!(parsed, vec![key("migrt_key", "ID", "NAME")]);
    }

    #[test]
    fn test_missing_close_paren_dropped() {
        assert!(parse_related_inserts("KEY:tbl(ID").is_empty());
        let err = parse_directive("KEY:tbl(ID").unwrap_err();
        assert!(err.to_string().contains("missing ')'"));
    }

    #[test]
    fn test_missing_open_paren_dropped() {
        let err = parse_directive("KEY:tbl ID:NAME").unwrap_err();
        assert!(err.to_string().contains("missing '('"));
    }

    #[test]
    fn test_empty_columns_dropped() {
        assert!(parse_related_inserts("KEY:tbl( ):NAME").is_empty());
        assert!(parse_related_inserts("KEY:tbl(ID):").is_empty());
    }

    #[test]
    fn test_colon_is_optional() {
        assert_eq!(
            parse_related_inserts("KEY:lookup(CODE) LABEL"),
            vec![key("lookup", "CODE", "LABEL")]
        );
    }

    #[test]
    fn test_bad_directive_does_not_stop_batch() {
        let parsed = parse_related_inserts("KEY:a(ID, KEY:b(CODE):LABEL, REF:c(X):Y,,");
        assert_eq!(parsed, vec![key("b", "CODE", "LABEL")]);
    }

    #[test]
    fn test_unknown_kind_ignored() {
        assert_eq!(parse_directive("REF:c(X):Y").unwrap(), None);
        assert!(parse_related_inserts("").is_empty());
    }

    #[test]
    fn test_whitespace_trimmed() {
        assert_eq!(
            parse_related_inserts("  KEY: customer_lookup ( CUST_ID ) : CUST_NAME "),
            vec![key("customer_lookup", "CUST_ID", "CUST_NAME")]
        );
    }
}
