//! Transformation clause parser using nom.
//!
//! ```text
//! transformations := clause ("," clause)*
//! clause          := field "->" dest
//! dest            := field [ "(" "MAP:" pairs ")" ]
//! pairs           := pair ("," pair)*
//! pair            := literal "->" literal
//! literal         := "'" chars "'" | '"' chars '"' | bare
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_until, take_while},
    character::complete::{char, multispace0},
    combinator::{cut, map, opt},
    error::{Error, ErrorKind},
    multi::separated_list1,
    sequence::{delimited, preceded, separated_pair, terminated, tuple},
    IResult,
};
use tracing::{debug, warn};

use crate::ast::{ColumnTransform, TransformSet};
use crate::error::{MigrtError, MigrtResult};

const MAP_KEYWORD: &str = "MAP:";

/// Parse a transformations string, skipping clauses that do not parse.
///
/// Later clauses for the same source column replace earlier ones.
pub fn parse_transformations(input: &str) -> TransformSet {
    let mut transforms = TransformSet::new();
    if input.trim().is_empty() {
        return transforms;
    }

    debug!("Processing transformations: {}", input);

    for (offset, clause) in split_clauses(input) {
        match parse_clause(clause, offset) {
            Ok((source, transform)) => {
                debug!(
                    "Mapped {} -> {} with values: {:?}",
                    source, transform.dest_field, transform.value_map
                );
                transforms.insert(source, transform);
            }
            Err(e) => warn!("Skipping transformation clause '{}': {}", clause, e),
        }
    }

    transforms
}

/// Parse a transformations string, failing on the first malformed clause.
pub fn try_parse_transformations(input: &str) -> MigrtResult<TransformSet> {
    let mut transforms = TransformSet::new();
    for (offset, clause) in split_clauses(input) {
        let (source, transform) = parse_clause(clause, offset)?;
        transforms.insert(source, transform);
    }
    Ok(transforms)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Plain,
    Quoted(char),
}

/// Split on commas that sit outside parentheses and quoted literals.
///
/// Returns each trimmed, non-empty clause with its byte offset in `input`.
pub fn split_clauses(input: &str) -> Vec<(usize, &str)> {
    let mut clauses = Vec::new();
    let mut state = Scan::Plain;
    let mut depth = 0usize;
    let mut start = 0;

    let mut push = |start: usize, end: usize| {
        let raw = &input[start..end];
        let clause = raw.trim();
        if !clause.is_empty() {
            clauses.push((start + raw.len() - raw.trim_start().len(), clause));
        }
    };

    for (i, c) in input.char_indices() {
        match (state, c) {
            (Scan::Quoted(q), c) if c == q => state = Scan::Plain,
            (Scan::Quoted(_), _) => {}
            (Scan::Plain, '\'' | '"') => state = Scan::Quoted(c),
            (Scan::Plain, '(') => depth += 1,
            (Scan::Plain, ')') => depth = depth.saturating_sub(1),
            (Scan::Plain, ',') if depth == 0 => {
                push(start, i);
                start = i + 1;
            }
            _ => {}
        }
    }
    push(start, input.len());

    clauses
}

/// Parse a single `SRC->DEST` or `SRC->DEST(MAP: ...)` clause.
///
/// `offset` is the clause position within the full transformations string and
/// is only used for error positions.
pub fn parse_clause(clause: &str, offset: usize) -> MigrtResult<(String, ColumnTransform)> {
    if !clause.contains("->") {
        return Err(MigrtError::parse(offset, format!("expected 'SRC->DEST', got '{}'", clause)));
    }

    if let Some((pos, _)) = clause.match_indices(MAP_KEYWORD).nth(1) {
        return Err(MigrtError::parse(
            offset + pos,
            "nested or multiple MAP clauses are not supported",
        ));
    }

    let (rest, (source, dest, value_map)) = parse_clause_body(clause).map_err(|e| {
        let position = match &e {
            nom::Err::Error(err) | nom::Err::Failure(err) => clause.len() - err.input.len(),
            nom::Err::Incomplete(_) => clause.len(),
        };
        MigrtError::parse(offset + position, "malformed MAP clause")
    })?;

    if source.is_empty() {
        return Err(MigrtError::parse(offset, "empty source field"));
    }
    if dest.is_empty() {
        return Err(MigrtError::parse(offset, "empty destination field"));
    }
    if dest.contains(MAP_KEYWORD) {
        return Err(MigrtError::parse(
            offset + clause.find(MAP_KEYWORD).unwrap_or(0),
            "MAP clause must be enclosed in parentheses",
        ));
    }
    if !rest.is_empty() {
        return Err(MigrtError::parse(
            offset + clause.len() - rest.len(),
            format!("unexpected trailing content: '{}'", rest),
        ));
    }

    let transform = ColumnTransform {
        dest_field: dest.to_string(),
        value_map: value_map.unwrap_or_default().into_iter().collect(),
    };
    Ok((source.to_string(), transform))
}

type ClauseParts<'a> = (&'a str, &'a str, Option<Vec<(String, String)>>);

fn parse_clause_body(input: &str) -> IResult<&str, ClauseParts<'_>> {
    let (input, source) = take_until("->")(input)?;
    let (input, _) = tag("->")(input)?;
    let (input, dest) = take_till(|c: char| c == '(')(input)?;
    let (input, value_map) = opt(parse_map_clause)(input)?;
    let (input, _) = multispace0(input)?;

    Ok((input, (source.trim(), dest.trim(), value_map)))
}

/// Parse `(MAP: 'a'->'x', 'b'->'y')`.
///
/// Once `(MAP:` has been seen the clause must be well formed.
fn parse_map_clause(input: &str) -> IResult<&str, Vec<(String, String)>> {
    preceded(
        tuple((char('('), multispace0, tag(MAP_KEYWORD), multispace0)),
        cut(terminated(
            separated_list1(
                delimited(multispace0, char(','), multispace0),
                parse_map_pair,
            ),
            tuple((multispace0, char(')'))),
        )),
    )(input)
}

fn parse_map_pair(input: &str) -> IResult<&str, (String, String)> {
    map(
        separated_pair(
            parse_literal,
            delimited(multispace0, tag("->"), multispace0),
            parse_literal,
        ),
        |(from, to): (&str, &str)| (from.to_string(), to.to_string()),
    )(input)
}

/// A quoted literal (one layer of quotes removed) or a bare token.
fn parse_literal(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        parse_bare,
    ))(input)
}

/// A bare token runs until `->`, a comma or a parenthesis.
fn parse_bare(input: &str) -> IResult<&str, &str> {
    let end = input
        .char_indices()
        .find(|&(i, c)| matches!(c, ',' | '(' | ')') || input[i..].starts_with("->"))
        .map(|(i, _)| i)
        .unwrap_or(input.len());

    let token = input[..end].trim();
    if token.is_empty() {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::TakeWhile1)));
    }
    Ok((&input[end..], token))
}
