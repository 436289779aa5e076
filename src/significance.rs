//! Statistical significance annotation over a computed cross-tab tree.
//!
//! Yes/no rates use a two-proportion z-test with pooled variance; mean-like
//! strategies use a Welch two-sample t statistic against normal critical
//! values. Weighted sample sizes serve as effective N. A cell that cannot
//! be tested degrades to an "insufficient data" marker — fleet-wide report
//! generation must not abort on one weak cell.

use serde::{Deserialize, Serialize};

use crate::core::{AverageResult, AverageStrategy, SignificanceMarker};
use crate::crosstab::{CrosstabTree, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigConfidenceLevel {
    Ninety,
    NinetyFive,
    NinetyEight,
    NinetyNine,
}

impl SigConfidenceLevel {
    /// Two-sided normal critical value.
    pub fn critical_value(self) -> f64 {
        match self {
            SigConfidenceLevel::Ninety => 1.6449,
            SigConfidenceLevel::NinetyFive => 1.9600,
            SigConfidenceLevel::NinetyEight => 2.3263,
            SigConfidenceLevel::NinetyNine => 2.5758,
        }
    }
}

/// How cells without an explicit comparand pick a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Only cells naming a comparand are tested.
    NamedComparand,
    /// Cells without a named comparand are tested against the root total.
    CompareToTotal,
}

/// Produces a new tree with significance markers filled in. The input tree
/// is left untouched; comparand lookups resolve through the arena by name.
pub fn annotate(
    tree: &CrosstabTree,
    strategy: AverageStrategy,
    mode: ComparisonMode,
    level: SigConfidenceLevel,
) -> CrosstabTree {
    tree.map_results(|id, node| {
        let baseline = baseline_for(tree, id, mode);
        let marker = baseline.map(|b| compare(strategy, &node.result, &tree.node(b).result, level));
        AverageResult {
            significance: marker,
            ..node.result.clone()
        }
    })
}

fn baseline_for(tree: &CrosstabTree, id: NodeId, mode: ComparisonMode) -> Option<NodeId> {
    if id == tree.root() {
        return None;
    }
    let node = tree.node(id);
    if node.synthetic {
        return None;
    }
    match &node.comparand {
        Some(name) => tree.resolve_named(id, name),
        None => match mode {
            ComparisonMode::NamedComparand => None,
            ComparisonMode::CompareToTotal => Some(tree.root()),
        },
    }
}

/// Significance of `current` against `baseline` for the given strategy.
pub fn compare(
    strategy: AverageStrategy,
    current: &AverageResult,
    baseline: &AverageResult,
    level: SigConfidenceLevel,
) -> SignificanceMarker {
    let (Some(current_value), Some(baseline_value)) = (current.value, baseline.value) else {
        return SignificanceMarker::InsufficientData;
    };
    if current.weighted_sample <= 0.0
        || baseline.weighted_sample <= 0.0
        || current.unweighted_sample == 0
        || baseline.unweighted_sample == 0
    {
        return SignificanceMarker::InsufficientData;
    }

    let score = match strategy {
        AverageStrategy::YesNoRate => two_proportion_z(
            current_value,
            current.weighted_sample,
            baseline_value,
            baseline.weighted_sample,
        ),
        AverageStrategy::Mean | AverageStrategy::IndexedMean | AverageStrategy::NetPromoter => {
            let (Some(current_sd), Some(baseline_sd)) = (current.std_dev, baseline.std_dev) else {
                return SignificanceMarker::InsufficientData;
            };
            welch_t(
                current_value,
                current_sd,
                current.weighted_sample,
                baseline_value,
                baseline_sd,
                baseline.weighted_sample,
            )
        }
    };

    match score {
        None => SignificanceMarker::InsufficientData,
        Some(z) if z >= level.critical_value() => SignificanceMarker::Higher,
        Some(z) if z <= -level.critical_value() => SignificanceMarker::Lower,
        Some(_) => SignificanceMarker::NotSignificant,
    }
}

/// Two-proportion z score with pooled variance. A degenerate pool (all
/// true or all false on both sides) cannot differ, so it scores zero.
fn two_proportion_z(p1: f64, n1: f64, p2: f64, n2: f64) -> Option<f64> {
    let pooled = (p1 * n1 + p2 * n2) / (n1 + n2);
    let variance = pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2);
    if variance <= 0.0 {
        return Some(0.0);
    }
    Some((p1 - p2) / variance.sqrt())
}

/// Welch t statistic using weighted sample sizes as effective N. Zero
/// standard error with a real difference means the samples are degenerate,
/// which is not evidence either way.
fn welch_t(m1: f64, sd1: f64, n1: f64, m2: f64, sd2: f64, n2: f64) -> Option<f64> {
    let variance = sd1.powi(2) / n1 + sd2.powi(2) / n2;
    if variance <= 0.0 {
        if (m1 - m2).abs() < f64::EPSILON {
            return Some(0.0);
        }
        return None;
    }
    Some((m1 - m2) / variance.sqrt())
}
