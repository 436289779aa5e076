//! Filter evaluation: turns a `FilterInfo` variant into an executable
//! inclusion predicate over raw answer values.
//!
//! Expression filters cannot be compiled to a closed-form predicate here;
//! they compile to an opaque marker that the caller must route to an
//! expression collaborator. Treating them as "always true" would silently
//! widen the population, so the engine rejects them when no collaborator is
//! wired in.

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};

/// Which raw-answer values are in scope. Exactly one variant is active;
/// the tagged union replaces the original nullable-fields-per-variant shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterInfo {
    /// Membership against an include list. Set semantics: order is
    /// irrelevant and duplicates are removed before matching.
    List { values: Vec<f64> },
    /// Inclusive bounds test, min <= value <= max.
    Range { min: f64, max: f64 },
    /// An expression only an external evaluator understands.
    Expression { description: String },
}

/// A compiled filter: either a closed-form predicate or an opaque marker
/// for the expression collaborator.
#[derive(Debug, Clone)]
pub enum CompiledFilter {
    Closed(ClosedPredicate),
    Opaque { description: String },
}

pub fn compile(filter: &FilterInfo) -> EngineResult<CompiledFilter> {
    match filter {
        FilterInfo::List { values } => {
            let mut sorted = values.clone();
            sorted.sort_by(f64::total_cmp);
            sorted.dedup_by(|a, b| a.total_cmp(b).is_eq());
            Ok(CompiledFilter::Closed(ClosedPredicate {
                kind: PredicateKind::Membership(sorted),
            }))
        }
        FilterInfo::Range { min, max } => {
            if min > max {
                return Err(EngineError::invalid_config(format!(
                    "range filter has min {min} greater than max {max}"
                )));
            }
            Ok(CompiledFilter::Closed(ClosedPredicate {
                kind: PredicateKind::Between(*min, *max),
            }))
        }
        FilterInfo::Expression { description } => Ok(CompiledFilter::Opaque {
            description: description.clone(),
        }),
    }
}

/// Compiles a filter the engine must be able to evaluate itself. Opaque
/// filters are a configuration error at this boundary.
pub fn compile_closed(filter: &FilterInfo) -> EngineResult<ClosedPredicate> {
    match compile(filter)? {
        CompiledFilter::Closed(predicate) => Ok(predicate),
        CompiledFilter::Opaque { description } => Err(EngineError::invalid_config(format!(
            "filter '{description}' needs the expression collaborator, which is not available here"
        ))),
    }
}

/// An executable inclusion predicate over raw values. Predicates compose by
/// intersection only: a permission filter ANDs with a measure filter, never
/// replaces it.
#[derive(Debug, Clone)]
pub struct ClosedPredicate {
    kind: PredicateKind,
}

#[derive(Debug, Clone)]
enum PredicateKind {
    AcceptAll,
    Membership(Vec<f64>),
    Between(f64, f64),
    Both(Box<PredicateKind>, Box<PredicateKind>),
}

impl ClosedPredicate {
    pub fn accept_all() -> Self {
        ClosedPredicate {
            kind: PredicateKind::AcceptAll,
        }
    }

    pub fn matches(&self, value: f64) -> bool {
        self.kind.matches(value)
    }

    /// Intersection with another predicate.
    pub fn and(self, other: ClosedPredicate) -> ClosedPredicate {
        match (&self.kind, &other.kind) {
            (PredicateKind::AcceptAll, _) => other,
            (_, PredicateKind::AcceptAll) => self,
            _ => ClosedPredicate {
                kind: PredicateKind::Both(Box::new(self.kind), Box::new(other.kind)),
            },
        }
    }
}

impl PredicateKind {
    fn matches(&self, value: f64) -> bool {
        match self {
            PredicateKind::AcceptAll => true,
            PredicateKind::Membership(sorted) => sorted
                .binary_search_by(|probe| probe.total_cmp(&value))
                .is_ok(),
            PredicateKind::Between(min, max) => value >= *min && value <= *max,
            PredicateKind::Both(a, b) => a.matches(value) && b.matches(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(filter: &FilterInfo) -> ClosedPredicate {
        compile_closed(filter).unwrap()
    }

    #[test]
    fn list_filter_has_set_semantics() {
        let predicate = closed(&FilterInfo::List {
            values: vec![3.0, 1.0, 3.0, 2.0],
        });
        assert!(predicate.matches(1.0));
        assert!(predicate.matches(3.0));
        assert!(!predicate.matches(4.0));
    }

    #[test]
    fn range_filter_bounds_are_inclusive() {
        let predicate = closed(&FilterInfo::Range { min: 2.0, max: 5.0 });
        assert!(predicate.matches(2.0));
        assert!(predicate.matches(5.0));
        assert!(!predicate.matches(1.999));
        assert!(!predicate.matches(5.001));
    }

    #[test]
    fn inverted_range_is_a_configuration_error_not_swapped() {
        let err = compile(&FilterInfo::Range { min: 5.0, max: 2.0 }).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn expression_filter_compiles_to_opaque() {
        let compiled = compile(&FilterInfo::Expression {
            description: "Profile(Segment) == 'Urban'".to_string(),
        })
        .unwrap();
        assert!(matches!(compiled, CompiledFilter::Opaque { .. }));
    }

    #[test]
    fn expression_filter_is_rejected_where_closed_form_is_required() {
        let err = compile_closed(&FilterInfo::Expression {
            description: "x".to_string(),
        })
        .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn predicates_intersect_rather_than_replace() {
        let range = closed(&FilterInfo::Range { min: 1.0, max: 10.0 });
        let list = closed(&FilterInfo::List {
            values: vec![2.0, 20.0],
        });
        let both = range.and(list);
        assert!(both.matches(2.0));
        assert!(!both.matches(20.0)); // passes the list, fails the range
        assert!(!both.matches(5.0)); // passes the range, fails the list
    }

    #[test]
    fn accept_all_is_the_intersection_identity() {
        let list = closed(&FilterInfo::List { values: vec![1.0] });
        let combined = ClosedPredicate::accept_all().and(list);
        assert!(combined.matches(1.0));
        assert!(!combined.matches(2.0));
    }
}
