//! Cross-tabulation: recursive break definitions and the computed result
//! tree.
//!
//! A `CrossMeasure` names a break dimension and which of its instances to
//! expand into columns; nested child measures cross-tabulate further. Trees
//! are built fresh per report request and never mutated in place —
//! rebuilding is cheaper and avoids shared-mutation bugs in recursive walks.

mod builder;
mod tree;

pub use builder::{build_tree, TreeBuildContext};
pub use tree::{CrosstabNode, CrosstabTree, NodeId};

use serde::{Deserialize, Serialize};

/// Label of the implicit root cell every tree carries.
pub const TOTAL_COLUMN: &str = "Total";

/// One instance/category of a break to include, named either by a filter
/// value mapping on the break measure or by a raw instance id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterInstance {
    #[serde(default)]
    pub mapping_name: Option<String>,
    #[serde(default)]
    pub instance_id: Option<i64>,
}

impl FilterInstance {
    pub fn mapping(name: impl Into<String>) -> Self {
        FilterInstance {
            mapping_name: Some(name.into()),
            instance_id: None,
        }
    }

    pub fn instance(id: i64) -> Self {
        FilterInstance {
            mapping_name: None,
            instance_id: Some(id),
        }
    }
}

/// A recursive break definition. An empty `filter_instances` array means
/// "all instances" — one column with no additional narrowing — which
/// preserves backward compatibility with saved break combinations that
/// predate instance selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossMeasure {
    pub measure_name: String,
    #[serde(default)]
    pub filter_instances: Vec<FilterInstance>,
    #[serde(default)]
    pub child_measures: Vec<CrossMeasure>,
    /// When set, the filter instances are raw multi-select values to OR
    /// together into one column, not separate columns. Flipping this
    /// silently turns a union into a cross-product, so it is preserved
    /// exactly as configured.
    #[serde(default)]
    pub multiple_choice_by_value: bool,
    /// Name of the sibling/ancestor cell this cell's significance is
    /// tested against.
    #[serde(default)]
    pub significance_comparand: Option<String>,
}

impl CrossMeasure {
    pub fn new(measure_name: impl Into<String>) -> Self {
        CrossMeasure {
            measure_name: measure_name.into(),
            filter_instances: vec![],
            child_measures: vec![],
            multiple_choice_by_value: false,
            significance_comparand: None,
        }
    }

    /// Every measure name reachable from this node, including its own.
    pub fn measure_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        out.push(&self.measure_name);
        for child in &self.child_measures {
            child.measure_names(out);
        }
    }
}
