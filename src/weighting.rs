//! Quota-cell weighting: application only, never computation.
//!
//! Reference weights are produced by an offline statistical process and
//! arrive here as a read-only snapshot per subset. The resolver is a pure
//! lookup; a respondent whose cell has no entry weights 1.0, because some
//! respondents legitimately fall outside every defined stratum.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};

/// A demographic stratum (e.g. region x age x gender) and its reference
/// weight. Many responses map to one cell; one subset owns many cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaCell {
    pub components: Vec<String>,
    pub reference_weight: f64,
}

impl QuotaCell {
    pub fn new(components: Vec<String>, reference_weight: f64) -> Self {
        QuotaCell {
            components,
            reference_weight,
        }
    }

    /// Stable string serialization used as the lookup key.
    pub fn key(&self) -> String {
        self.components.join("|")
    }
}

pub const UNWEIGHTED: f64 = 1.0;

/// Immutable per-subset snapshot of cell key -> reference weight. Safe for
/// concurrent reads; built once per calculation and passed explicitly
/// through the call chain.
#[derive(Debug, Clone, Default)]
pub struct QuotaCellWeightings {
    weights: HashMap<String, f64>,
    interlocked: bool,
}

impl QuotaCellWeightings {
    /// Builds and validates a snapshot. Interlocked cell sets must partition
    /// the population: duplicate cells and mixed stratum arity are rejected.
    /// Non-interlocked sets may overlap (independent weighting dimensions)
    /// and skip the arity check.
    pub fn from_cells(cells: &[QuotaCell], interlocked: bool) -> EngineResult<Self> {
        let mut weights = HashMap::with_capacity(cells.len());
        let mut arity: Option<usize> = None;
        for cell in cells {
            if !cell.reference_weight.is_finite() || cell.reference_weight <= 0.0 {
                return Err(EngineError::invalid_config(format!(
                    "quota cell '{}' has a non-positive reference weight",
                    cell.key()
                )));
            }
            if interlocked {
                match arity {
                    None => arity = Some(cell.components.len()),
                    Some(n) if n != cell.components.len() => {
                        return Err(EngineError::invalid_config(format!(
                            "interlocked quota cell '{}' has {} components, expected {}",
                            cell.key(),
                            cell.components.len(),
                            n
                        )))
                    }
                    Some(_) => {}
                }
            }
            if weights.insert(cell.key(), cell.reference_weight).is_some() {
                return Err(EngineError::invalid_config(format!(
                    "duplicate quota cell '{}'",
                    cell.key()
                )));
            }
        }
        Ok(QuotaCellWeightings {
            weights,
            interlocked,
        })
    }

    pub fn is_interlocked(&self) -> bool {
        self.interlocked
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight for a respondent's cell key. A miss is the unweighted
    /// fallback, not an error.
    pub fn weight_for(&self, cell_key: &str) -> f64 {
        match self.weights.get(cell_key) {
            Some(&weight) => weight,
            None => {
                log::debug!("no reference weighting for cell '{cell_key}', falling back to 1.0");
                UNWEIGHTED
            }
        }
    }
}
