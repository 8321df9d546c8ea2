//! Local evaluation of filter predicates, used by residual filtering and by backends
//! that evaluate pushed predicates in process.

use std::cmp::Ordering;

use regex::Regex;

use super::{Operand, OperatorType};
use crate::schema::Value;

/// Convert a SQL LIKE pattern (`%`, `_`) into an anchored regex.
pub(crate) fn like_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    // Limit pattern length to keep compiled automata small
    if pattern.len() > 1000 {
        return Err(regex::Error::Syntax(
            "Pattern too long (max 1000 chars)".to_string(),
        ));
    }

    let mut regex_pattern = String::with_capacity(pattern.len() + 6);
    // `%` and `_` also match line breaks
    regex_pattern.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => regex_pattern.push_str(".*"),
            '_' => regex_pattern.push('.'),
            '^' | '$' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\' => {
                regex_pattern.push('\\');
                regex_pattern.push(c);
            }
            _ => regex_pattern.push(c),
        }
    }
    regex_pattern.push('$');
    Regex::new(&regex_pattern)
}

pub(crate) fn evaluate(
    operator: OperatorType,
    value: &Value,
    operand: &Operand,
    pattern: Option<&Regex>,
) -> bool {
    match (operator, operand) {
        (OperatorType::Equal, Operand::Value(expected)) => value.loosely_equals(expected),
        (OperatorType::NotEqual, Operand::Value(expected)) => !value.loosely_equals(expected),
        (OperatorType::In, Operand::List(candidates)) => {
            candidates.iter().any(|candidate| value.loosely_equals(candidate))
        }
        (OperatorType::Like, Operand::Value(_)) => match (value, pattern) {
            (Value::String(s), Some(re)) => re.is_match(s),
            (Value::Null, _) => false,
            (other, Some(re)) => re.is_match(&other.to_string()),
            (_, None) => false,
        },
        (op, Operand::Value(bound)) if op.is_range() => {
            if value.is_null() {
                return false;
            }
            match value.partial_compare(bound) {
                Some(ordering) => range_matches(op, ordering),
                None => false,
            }
        }
        _ => false,
    }
}

fn range_matches(operator: OperatorType, ordering: Ordering) -> bool {
    match operator {
        OperatorType::LessThan => ordering == Ordering::Less,
        OperatorType::LessThanOrEqual => ordering != Ordering::Greater,
        OperatorType::GreaterThan => ordering == Ordering::Greater,
        OperatorType::GreaterThanOrEqual => ordering != Ordering::Less,
        _ => false,
    }
}
