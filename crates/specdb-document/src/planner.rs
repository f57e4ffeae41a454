//! Specdb Document Planner
//!
//! Chooses an index for a filter. Bounds are collected from the top-level
//! conjunction of the filter (plain field conditions and `$and` branches;
//! `$or` contributes nothing), then every complete index is tried by walking
//! its keys for as long as each key carries a bound. The plan with the fewest
//! estimated candidates wins; ties go to the deeper chain.
//!
//! A plan only narrows the candidate set. Every candidate is still checked
//! against the full filter, which is what lets exclusive bounds be scanned
//! as inclusive ones.
//!
//! Filters that could fail on some documents are never planned. That covers
//! malformed operators and nested field conditions such as
//! `{"spec": {"tier": 1}}`, which fail on documents where `spec` is a
//! scalar. A full scan evaluates them against every document, so an index
//! must not hide those documents. Dotted paths (`{"spec.tier": 1}`) never
//! fail and are planned as usual.
//!
//! @version 0.1.0
//! @author Specdb Development Team

use crate::query;
use crate::section::{Scan, Section};
use specdb_common::{Document, Value};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Execution Plan
// =============================================================================

/// A chain of key bounds, one per index level.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub key: String,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub next: Option<Box<ExecutionPlan>>,
}

impl ExecutionPlan {
    pub fn new(key: impl Into<String>, min: Option<Value>, max: Option<Value>) -> Self {
        Self {
            key: key.into(),
            min,
            max,
            next: None,
        }
    }

    /// Append a level to the end of the chain.
    pub fn then(mut self, next: ExecutionPlan) -> Self {
        self.next = Some(Box::new(match self.next.take() {
            Some(tail) => tail.then(next),
            None => next,
        }));
        self
    }

    /// Number of index levels the plan restricts.
    pub fn cost(&self) -> usize {
        1 + self.next.as_ref().map_or(0, |next| next.cost())
    }

    /// Keys of the chain, outermost first.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = vec![self.key.as_str()];
        let mut next = self.next.as_deref();
        while let Some(plan) = next {
            keys.push(plan.key.as_str());
            next = plan.next.as_deref();
        }
        keys
    }

    /// Resolve the plan into a scan over `section`.
    pub fn scan<'a>(&self, section: &'a Section) -> Option<Scan<'a>> {
        let mut scan = section.scan(&self.key, self.min.as_ref(), self.max.as_ref())?;
        let mut next = self.next.as_deref();
        while let Some(plan) = next {
            scan = scan.scan(&plan.key, plan.min.as_ref(), plan.max.as_ref())?;
            next = plan.next.as_deref();
        }
        Some(scan)
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |value: &Option<Value>| match value {
            Some(value) => value.to_string(),
            None => "*".to_string(),
        };
        write!(f, "{} in [{}, {}]", self.key, bound(&self.min), bound(&self.max))?;
        if let Some(next) = &self.next {
            write!(f, " -> {}", next)?;
        }
        Ok(())
    }
}

// =============================================================================
// Bounds
// =============================================================================

#[derive(Debug, Default)]
struct Bounds {
    min: Option<Value>,
    max: Option<Value>,
}

impl Bounds {
    fn raise_min(&mut self, value: &Value) {
        if self.min.as_ref().map_or(true, |min| value > min) {
            self.min = Some(value.clone());
        }
    }

    fn lower_max(&mut self, value: &Value) {
        if self.max.as_ref().map_or(true, |max| value < max) {
            self.max = Some(value.clone());
        }
    }
}

/// Whether `filter` matches a field inside the subject of an enclosing
/// field condition.
fn nests_fields(filter: &Document, nested: bool) -> bool {
    filter.iter().any(|(key, operand)| match key.as_str() {
        "$and" | "$or" => match operand {
            Value::Array(branches) => branches.iter().any(|branch| match branch {
                Value::Object(sub) => nests_fields(sub, nested),
                _ => false,
            }),
            _ => false,
        },
        op if op.starts_with('$') => false,
        _ if nested => true,
        _ => match operand {
            Value::Object(sub) => nests_fields(sub, true),
            _ => false,
        },
    })
}

/// Gather per-path bounds implied by the conjunctive part of `filter`.
fn collect(filter: &Document, prefix: &str, bounds: &mut BTreeMap<String, Bounds>) {
    for (key, operand) in filter {
        match key.as_str() {
            "$and" => {
                if let Value::Array(branches) = operand {
                    for branch in branches {
                        match branch {
                            Value::Object(sub) => collect(sub, prefix, bounds),
                            literal if !prefix.is_empty() => {
                                let entry = bounds.entry(prefix.to_string()).or_default();
                                entry.raise_min(literal);
                                entry.lower_max(literal);
                            }
                            _ => {}
                        }
                    }
                }
            }
            "$eq" | "$gt" | "$gte" | "$lt" | "$lte" if !prefix.is_empty() => {
                let entry = bounds.entry(prefix.to_string()).or_default();
                match key.as_str() {
                    "$eq" => {
                        entry.raise_min(operand);
                        entry.lower_max(operand);
                    }
                    "$gt" | "$gte" => entry.raise_min(operand),
                    _ => entry.lower_max(operand),
                }
            }
            op if op.starts_with('$') => {}
            _ if !prefix.is_empty() => {}
            field => match operand {
                Value::Object(sub) => collect(sub, field, bounds),
                literal => {
                    let entry = bounds.entry(field.to_string()).or_default();
                    entry.raise_min(literal);
                    entry.lower_max(literal);
                }
            },
        }
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Pick the cheapest index plan for `filter`, or `None` for a full scan.
pub fn plan(filter: &Document, section: &Section) -> Option<ExecutionPlan> {
    if query::validate(filter).is_err() || nests_fields(filter, false) {
        return None;
    }

    let mut bounds = BTreeMap::new();
    collect(filter, "", &mut bounds);
    if bounds.is_empty() {
        return None;
    }

    let mut best: Option<(usize, ExecutionPlan)> = None;

    for index in section.indexes().iter().filter(|index| !index.is_partial()) {
        let mut levels = Vec::new();
        for key in index.keys() {
            match bounds.get(key) {
                Some(bound) => levels.push(ExecutionPlan::new(
                    key.clone(),
                    bound.min.clone(),
                    bound.max.clone(),
                )),
                None => break,
            }
        }

        let Some(candidate) = levels
            .into_iter()
            .rev()
            .fold(None, |next: Option<ExecutionPlan>, mut level| {
                level.next = next.map(Box::new);
                Some(level)
            })
        else {
            continue;
        };

        let Some(estimate) = candidate.scan(section).map(|scan| scan.estimate()) else {
            continue;
        };

        let better = match &best {
            None => true,
            Some((cost, current)) => {
                estimate < *cost || (estimate == *cost && candidate.cost() > current.cost())
            }
        };
        if better {
            best = Some((estimate, candidate));
        }
    }

    if let Some((estimate, plan)) = &best {
        tracing::debug!("Selected plan {} (~{} candidates)", plan, estimate);
    }
    best.map(|(_, plan)| plan)
}

// =============================================================================
// Tests
// =============================================================================
