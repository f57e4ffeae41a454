//! Specdb Document Query
//!
//! The filter and update language: a MongoDB operator subset evaluated over
//! documents. Everything here is pure; nothing touches a section.
//!
//! Filters are documents whose plain keys are (dotted) field paths and whose
//! `$` keys are operators (`$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
//! `$exists`, `$and`, `$or`). A literal where a filter is expected means
//! equality. Updates accept `$set` and `$unset`.
//!
//! @version 0.1.0
//! @author Specdb Development Team

use specdb_common::{Document, Result, SpecdbError, Value};
use std::cmp::Ordering;

// =============================================================================
// Subject
// =============================================================================

/// The thing a (sub-)filter is evaluated against.
#[derive(Debug, Clone, Copy)]
enum Subject<'a> {
    Absent,
    Value(&'a Value),
    Document(&'a Document),
}

impl<'a> Subject<'a> {
    fn from_option(value: Option<&'a Value>) -> Self {
        match value {
            Some(Value::Object(doc)) => Self::Document(doc),
            Some(value) => Self::Value(value),
            None => Self::Absent,
        }
    }

    fn exists(self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Descend into a field. Absent and null subjects stay absent.
    fn field(self, path: &str) -> Result<Subject<'a>> {
        match self {
            Self::Document(doc) => Ok(Self::from_option(doc.get(path))),
            Self::Absent | Self::Value(Value::Null) => Ok(Self::Absent),
            Self::Value(other) => Err(SpecdbError::UnsupportedType(format!(
                "cannot match field {} inside {}",
                path,
                other.type_name()
            ))),
        }
    }

    /// Compare under the total order; absent compares as null.
    fn compare(self, operand: &Value) -> Ordering {
        match self {
            Self::Absent => Value::Null.cmp(operand),
            Self::Value(value) => value.cmp(operand),
            Self::Document(doc) => match operand {
                Value::Object(other) => doc.cmp(other),
                _ => Ordering::Greater,
            },
        }
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// Check whether a document satisfies a filter.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    match_filter(Subject::Document(doc), filter)
}

fn match_condition(subject: Subject<'_>, condition: &Value) -> Result<bool> {
    match condition {
        Value::Object(filter) => match_filter(subject, filter),
        literal => Ok(subject.compare(literal) == Ordering::Equal),
    }
}

fn match_filter(subject: Subject<'_>, filter: &Document) -> Result<bool> {
    for (key, operand) in filter {
        let matched = match key.as_str() {
            "$exists" => subject.exists() == expect_bool(key, operand)?,
            "$eq" => subject.compare(operand) == Ordering::Equal,
            "$ne" => subject.compare(operand) != Ordering::Equal,
            "$gt" => subject.compare(operand) == Ordering::Greater,
            "$gte" => subject.compare(operand) != Ordering::Less,
            "$lt" => subject.compare(operand) == Ordering::Less,
            "$lte" => subject.compare(operand) != Ordering::Greater,
            "$and" => {
                let mut all = true;
                for branch in branches(key, operand)? {
                    if !match_condition(subject, branch)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for branch in branches(key, operand)? {
                    if match_condition(subject, branch)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(SpecdbError::UnsupportedOperation(op.to_string()));
            }
            path => match_condition(subject.field(path)?, operand)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Check a filter for unknown operators and malformed operands without
/// evaluating it against any document.
pub fn validate(filter: &Document) -> Result<()> {
    for (key, operand) in filter {
        match key.as_str() {
            "$exists" => {
                expect_bool(key, operand)?;
            }
            "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {}
            "$and" | "$or" => {
                for branch in branches(key, operand)? {
                    if let Value::Object(sub) = branch {
                        validate(sub)?;
                    }
                }
            }
            op if op.starts_with('$') => {
                return Err(SpecdbError::UnsupportedOperation(op.to_string()));
            }
            _ => {
                if let Value::Object(sub) = operand {
                    validate(sub)?;
                }
            }
        }
    }
    Ok(())
}

fn expect_bool(key: &str, operand: &Value) -> Result<bool> {
    operand.as_bool().ok_or_else(|| {
        SpecdbError::UnsupportedType(format!(
            "{} expects bool, got {}",
            key,
            operand.type_name()
        ))
    })
}

fn branches<'a>(key: &str, operand: &'a Value) -> Result<&'a Vec<Value>> {
    operand.as_array().ok_or_else(|| {
        SpecdbError::UnsupportedType(format!(
            "{} expects array, got {}",
            key,
            operand.type_name()
        ))
    })
}

// =============================================================================
// Patcher
// =============================================================================

/// Apply an update document, returning the patched copy.
pub fn patch(doc: &Document, update: &Document) -> Result<Document> {
    let mut patched = doc.clone();

    for (key, operand) in update {
        match key.as_str() {
            "$set" => {
                for (path, value) in expect_object(key, operand)? {
                    patched.set_path(path, value.clone())?;
                }
            }
            "$unset" => match operand {
                Value::Array(paths) => {
                    for path in paths {
                        let path = path.as_str().ok_or_else(|| {
                            SpecdbError::UnsupportedType(format!(
                                "$unset paths must be strings, got {}",
                                path.type_name()
                            ))
                        })?;
                        patched.remove_path(path);
                    }
                }
                _ => {
                    for (path, _) in expect_object(key, operand)? {
                        patched.remove_path(path);
                    }
                }
            },
            other => return Err(SpecdbError::UnsupportedOperation(other.to_string())),
        }
    }

    Ok(patched)
}

fn expect_object<'a>(key: &str, operand: &'a Value) -> Result<&'a Document> {
    operand.as_object().ok_or_else(|| {
        SpecdbError::UnsupportedType(format!(
            "{} expects object, got {}",
            key,
            operand.type_name()
        ))
    })
}

// =============================================================================
// Upsert Seed
// =============================================================================

/// Synthesize the document an upsert starts from, using the equality
/// conditions of a filter.
pub fn apply(filter: &Document) -> Result<Document> {
    match seed_filter(filter)? {
        None => Ok(Document::new()),
        Some(Value::Object(doc)) => Ok(doc),
        Some(other) => Err(SpecdbError::UnsupportedType(format!(
            "upsert seed must be an object, got {}",
            other.type_name()
        ))),
    }
}

fn seed_condition(condition: &Value) -> Result<Option<Value>> {
    match condition {
        Value::Object(filter) => seed_filter(filter),
        literal => Ok(Some(literal.clone())),
    }
}

fn seed_filter(filter: &Document) -> Result<Option<Value>> {
    let mut seed: Option<Value> = None;

    for (key, operand) in filter {
        let part = match key.as_str() {
            "$eq" => Some(operand.clone()),
            "$and" | "$or" => {
                let mut merged: Option<Value> = None;
                for branch in branches(key, operand)? {
                    if let Some(value) = seed_condition(branch)? {
                        merged = Some(merge(merged, value)?);
                    }
                }
                merged
            }
            "$ne" | "$gt" | "$gte" | "$lt" | "$lte" | "$exists" => None,
            op if op.starts_with('$') => {
                return Err(SpecdbError::UnsupportedOperation(op.to_string()));
            }
            path => match seed_condition(operand)? {
                Some(value) => {
                    let mut doc = Document::new();
                    doc.set_path(path, value)?;
                    Some(Value::Object(doc))
                }
                None => None,
            },
        };

        if let Some(part) = part {
            seed = Some(merge(seed, part)?);
        }
    }

    Ok(seed)
}

fn merge(current: Option<Value>, next: Value) -> Result<Value> {
    let Some(current) = current else {
        return Ok(next);
    };

    match (current, next) {
        (Value::Object(mut left), Value::Object(right)) => {
            for (key, value) in right {
                let merged = match left.remove(&key) {
                    Some(existing) => merge(Some(existing), value)?,
                    None => value,
                };
                left.insert(key, merged);
            }
            Ok(Value::Object(left))
        }
        (left, right) if left == right => Ok(left),
        (left, right) => Err(SpecdbError::UnsupportedOperation(format!(
            "conflicting upsert values {} and {}",
            left, right
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================
