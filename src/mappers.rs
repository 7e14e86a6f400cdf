//! The value mapper library.
//!
//! Mappers transform the actual and expected values before comparison, and
//! are applied identically to both sides. When either side is a list the
//! transform is applied element-wise, preserving order and length.

use crate::fault::Fault;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// A value transform applied before comparison.
pub type Mapper = Arc<dyn Fn(&Value) -> Result<Value, Fault> + Send + Sync>;

/// Matches numeric literals: integers, decimals, exponents, and the literal
/// `NaN` token.
static NUMBER_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d*\.?\d+(?:[eE]-?\d+)?|NaN").expect("number literal pattern"));

/// One extraction pattern for [`extract`]: literals are escaped before being
/// folded into the alternation, regexes are used as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Literal(String),
    Regex(String),
}

impl Pattern {
    pub fn literal(s: impl Into<String>) -> Self {
        Pattern::Literal(s.into())
    }

    pub fn regex(s: impl Into<String>) -> Self {
        Pattern::Regex(s.into())
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Pattern::Literal(s.to_string())
    }
}

/// Compile a set of patterns into one alternation and return a mapper that
/// stringifies its input and extracts every match, in order.
pub fn extract<I, P>(patterns: I) -> Result<Mapper, Fault>
where
    I: IntoIterator<Item = P>,
    P: Into<Pattern>,
{
    let alternation = patterns
        .into_iter()
        .map(|p| match p.into() {
            Pattern::Literal(s) => regex::escape(&s),
            Pattern::Regex(s) => format!("(?:{})", s),
        })
        .collect::<Vec<_>>()
        .join("|");
    let regex = Regex::new(&alternation)
        .map_err(|e| Fault::syntax(format!("invalid extraction pattern: {}", e)))?;

    Ok(Arc::new(move |value| Ok(extract_matches(&regex, value))))
}

fn extract_matches(regex: &Regex, value: &Value) -> Value {
    match value {
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| extract_matches(regex, item))
                .collect(),
        ),
        other => {
            let haystack = other.to_string();
            Value::List(
                regex
                    .find_iter(&haystack)
                    .map(|m| Value::String(m.as_str().to_string()))
                    .collect(),
            )
        }
    }
}

/// Extract the numbers from a value: a string yields every numeric literal it
/// contains (parsed, with `NaN` parsing to NaN), a number yields itself, and
/// a list maps element-wise. Anything else yields an empty list.
pub fn extract_numbers() -> Mapper {
    Arc::new(|value| Ok(numbers_from(&NUMBER_LITERAL, value)))
}

/// Like [`extract_numbers`], but also recognizes the given keyword tokens,
/// which survive as strings among the extracted numbers.
pub fn extract_numbers_with(keywords: &[&str]) -> Result<Mapper, Fault> {
    let mut alternation = NUMBER_LITERAL.as_str().to_string();
    for keyword in keywords {
        alternation.push('|');
        alternation.push_str(&regex::escape(keyword));
    }
    let regex = Regex::new(&alternation)
        .map_err(|e| Fault::syntax(format!("invalid keyword pattern: {}", e)))?;

    Ok(Arc::new(move |value| Ok(numbers_from(&regex, value))))
}

fn numbers_from(regex: &Regex, value: &Value) -> Value {
    match value {
        Value::String(s) => Value::List(
            regex
                .find_iter(s)
                .map(|m| token_to_value(m.as_str()))
                .collect(),
        ),
        Value::Number(n) => Value::List(vec![Value::Number(*n)]),
        Value::List(items) => {
            Value::List(items.iter().map(|item| numbers_from(regex, item)).collect())
        }
        _ => Value::List(Vec::new()),
    }
}

fn token_to_value(token: &str) -> Value {
    if token == "NaN" {
        return Value::Number(f64::NAN);
    }
    match token.parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::String(token.to_string()),
    }
}

/// String-coerce and trim.
pub fn trimmed() -> Mapper {
    Arc::new(|value| match value {
        Value::List(items) => {
            let mapped: Vec<Value> = items
                .iter()
                .map(|item| Value::String(item.to_string().trim().to_string()))
                .collect();
            Ok(Value::List(mapped))
        }
        other => Ok(Value::String(other.to_string().trim().to_string())),
    })
}
