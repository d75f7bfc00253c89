//! Label-selector filtering for post collections.
//!
//! A selector is a comma-separated list of requirements evaluated against a
//! post's label map (see [`crate::model::Post::labels`]). All requirements
//! must match. The grammar is a small closed set:
//!
//! ```text
//! key                 key exists
//! !key                key does not exist
//! key = value         equality (also `key == value`)
//! key != value        key absent or value differs
//! key in (a, b)       value is one of the listed values
//! key notin (a, b)    key absent or value not listed
//! ```
//!
//! Tag filtering uses existence: every tag on a post appears in the label
//! map as `tag → "tagged"`, so `travel` selects every post tagged travel.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("empty key in requirement: {0:?}")]
    EmptyKey(String),
    #[error("missing value in requirement: {0:?}")]
    MissingValue(String),
    #[error("unterminated value list in requirement: {0:?}")]
    UnterminatedList(String),
    #[error("malformed requirement: {0:?}")]
    Malformed(String),
}

/// A single parsed requirement.
#[derive(Debug, Clone, PartialEq)]
enum Requirement {
    Exists(String),
    NotExists(String),
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::NotExists(key) => !labels.contains_key(key),
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::NotEquals(key, value) => {
                !labels.get(key).is_some_and(|actual| actual == value)
            }
            Requirement::In(key, values) => {
                labels.get(key).is_some_and(|actual| values.contains(actual))
            }
            Requirement::NotIn(key, values) => {
                !labels.get(key).is_some_and(|actual| values.contains(actual))
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Exists(key) => write!(f, "{key}"),
            Requirement::NotExists(key) => write!(f, "!{key}"),
            Requirement::Equals(key, value) => write!(f, "{key} = {value}"),
            Requirement::NotEquals(key, value) => write!(f, "{key} != {value}"),
            Requirement::In(key, values) => write!(f, "{key} in ({})", values.join(", ")),
            Requirement::NotIn(key, values) => write!(f, "{key} notin ({})", values.join(", ")),
        }
    }
}

/// A parsed selector — the conjunction of its requirements.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Parse a selector expression. Fails on empty input or malformed
    /// requirements; parse once, match many.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut requirements = Vec::new();
        for part in split_requirements(input) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            requirements.push(parse_requirement(part)?);
        }
        if requirements.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { requirements })
    }

    /// Whether every requirement matches the given label map.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|req| req.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Split on commas, but not inside a parenthesized value list.
fn split_requirements(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn parse_requirement(part: &str) -> Result<Requirement, SelectorError> {
    // Negated existence
    if let Some(key) = part.strip_prefix('!') {
        let key = key.trim();
        if key.is_empty() {
            return Err(SelectorError::EmptyKey(part.to_string()));
        }
        return Ok(Requirement::NotExists(key.to_string()));
    }

    // Operators with values, longest spellings first so `!=` is not read
    // as `=` and `notin` is not read as `in`.
    if let Some((key, value)) = split_operator(part, "!=") {
        return Ok(Requirement::NotEquals(
            validated_key(key, part)?,
            validated_value(value, part)?,
        ));
    }
    if let Some((key, value)) = split_operator(part, "==") {
        return Ok(Requirement::Equals(
            validated_key(key, part)?,
            validated_value(value, part)?,
        ));
    }
    if let Some((key, list)) = split_word_operator(part, "notin") {
        return Ok(Requirement::NotIn(
            validated_key(key, part)?,
            parse_value_list(list, part)?,
        ));
    }
    if let Some((key, list)) = split_word_operator(part, "in") {
        return Ok(Requirement::In(
            validated_key(key, part)?,
            parse_value_list(list, part)?,
        ));
    }
    if let Some((key, value)) = split_operator(part, "=") {
        return Ok(Requirement::Equals(
            validated_key(key, part)?,
            validated_value(value, part)?,
        ));
    }

    // Bare key: existence
    if part.contains(|c: char| c.is_whitespace() || c == '(' || c == ')') {
        return Err(SelectorError::Malformed(part.to_string()));
    }
    Ok(Requirement::Exists(part.to_string()))
}

fn split_operator<'a>(part: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    part.split_once(op)
}

/// Split `key in (...)` / `key notin (...)` on a whitespace-delimited word.
fn split_word_operator<'a>(part: &'a str, word: &str) -> Option<(&'a str, &'a str)> {
    let (key, rest) = part.trim().split_once(char::is_whitespace)?;
    let rest = rest.trim_start().strip_prefix(word)?;
    let rest = rest.trim_start();
    // The operator word must be followed by the value list, otherwise this
    // is some other expression (or a malformed one).
    if !rest.starts_with('(') {
        return None;
    }
    Some((key, rest))
}

fn validated_key(key: &str, part: &str) -> Result<String, SelectorError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(SelectorError::EmptyKey(part.to_string()));
    }
    Ok(key.to_string())
}

fn validated_value(value: &str, part: &str) -> Result<String, SelectorError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SelectorError::MissingValue(part.to_string()));
    }
    Ok(value.to_string())
}

fn parse_value_list(list: &str, part: &str) -> Result<Vec<String>, SelectorError> {
    let list = list.trim();
    let inner = list
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| SelectorError::UnterminatedList(part.to_string()))?;
    let values: Vec<String> = inner
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(SelectorError::MissingValue(part.to_string()));
    }
    Ok(values)
}
