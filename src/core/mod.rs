// Shared data model for the aggregation engine.
//
// Definitions are loaded by a configuration provider, validated once, and
// treated as immutable for the lifetime of a calculation. Results are created
// fresh per request and never cached here.

pub mod defaults;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::filters::FilterInfo;

/// Unit of the totalisation window an average is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalisationPeriodUnit {
    Day,
    Month,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMethod {
    /// Look each respondent's demographic cell up in the reference table.
    QuotaCell,
    /// Every respondent contributes weight 1.0.
    Unweighted,
}

/// Whether weighting pools every in-window response or aggregates each
/// calendar period on its own before averaging the period values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightAcross {
    AllPeriods,
    SinglePeriod,
}

/// Policy for a window that holds fewer periods of data than the definition
/// asks for. Evaluated after windowing, before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MakeUpTo {
    /// Compute over whatever data exists.
    ComputePartial,
    /// Reuse the prior window's already-computed result.
    CarryForward,
    /// Report no data for the partial window.
    Suppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageStrategy {
    /// Weighted mean of raw values.
    Mean,
    /// Weighted share of the base population whose value is a "true" value.
    YesNoRate,
    /// Raw values rescaled to 0..100 before the mean.
    IndexedMean,
    /// 0..10 ratings mapped to -100/0/+100 per respondent, then the mean.
    NetPromoter,
}

/// One configured average: scope, window shape, weighting and partial-window
/// policy. Read-only during every calculation; retired via `disabled` rather
/// than deletion so historical reports stay reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageDefinition {
    pub id: String,
    pub display_name: String,
    pub totalisation_period_unit: TotalisationPeriodUnit,
    pub number_of_periods: u32,
    pub weighting_method: WeightingMethod,
    #[serde(default = "default_weight_across")]
    pub weight_across: WeightAcross,
    #[serde(default = "default_make_up_to")]
    pub make_up_to: MakeUpTo,
    /// Subsets this definition applies to. Empty means all subsets.
    #[serde(default)]
    pub subset_ids: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub allow_partial: bool,
    #[serde(default)]
    pub disabled: bool,
}

fn default_weight_across() -> WeightAcross {
    WeightAcross::AllPeriods
}

fn default_make_up_to() -> MakeUpTo {
    MakeUpTo::ComputePartial
}

impl AverageDefinition {
    /// Fails fast on a malformed definition, before any aggregation begins.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::invalid_config(
                "average definition has an empty id",
            ));
        }
        if self.totalisation_period_unit != TotalisationPeriodUnit::All
            && self.number_of_periods == 0
        {
            return Err(EngineError::invalid_config(format!(
                "average '{}' has a non-positive period count",
                self.id
            )));
        }
        Ok(())
    }

    pub fn applies_to(&self, subset: &str) -> bool {
        self.subset_ids.is_empty() || self.subset_ids.iter().any(|s| s == subset)
    }
}

/// A measure plus the value filters its strategy needs. `true_vals` and
/// `base_vals` distinguish the true-condition population from the base
/// population for yes/no rates; the pre-normalisation bounds are fixed at
/// configuration time so indexed results stay comparable even if the scale
/// metadata changes later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub name: String,
    pub strategy: AverageStrategy,
    #[serde(default)]
    pub true_vals: Option<FilterInfo>,
    #[serde(default)]
    pub base_vals: Option<FilterInfo>,
    #[serde(default)]
    pub pre_normalisation_minimum: Option<f64>,
    #[serde(default)]
    pub pre_normalisation_maximum: Option<f64>,
    /// Named groups of raw values usable as cross-tab break instances.
    #[serde(default)]
    pub filter_value_mappings: Vec<FilterValueMapping>,
}

/// A named set of raw values, e.g. "18-24" -> [1, 2].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterValueMapping {
    pub name: String,
    pub values: Vec<i64>,
}

impl MeasureSpec {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::invalid_config("measure has an empty name"));
        }
        match self.strategy {
            AverageStrategy::YesNoRate => {
                if self.true_vals.is_none() || self.base_vals.is_none() {
                    return Err(EngineError::invalid_config(format!(
                        "yes/no measure '{}' needs both true values and base values",
                        self.name
                    )));
                }
            }
            AverageStrategy::IndexedMean => match (
                self.pre_normalisation_minimum,
                self.pre_normalisation_maximum,
            ) {
                (Some(min), Some(max)) if min < max => {}
                _ => {
                    return Err(EngineError::invalid_config(format!(
                        "indexed measure '{}' needs pre-normalisation bounds with min < max",
                        self.name
                    )))
                }
            },
            AverageStrategy::Mean | AverageStrategy::NetPromoter => {}
        }
        if let Some(mapping) = self
            .filter_value_mappings
            .iter()
            .find(|m| m.values.is_empty())
        {
            return Err(EngineError::invalid_config(format!(
                "filter value mapping '{}' on measure '{}' has no values",
                mapping.name, self.name
            )));
        }
        Ok(())
    }

    pub fn mapping(&self, name: &str) -> Option<&FilterValueMapping> {
        self.filter_value_mappings.iter().find(|m| m.name == name)
    }
}

/// One raw answer as supplied by the answer source: who answered, what they
/// answered (None when the respondent never saw the question), when, and the
/// demographic cell they weight under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub respondent_id: u64,
    pub value: Option<f64>,
    pub recorded_on: NaiveDate,
    pub cell_key: String,
}

/// Outcome of a significance comparison against a named comparand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceMarker {
    Higher,
    Lower,
    NotSignificant,
    /// Either side had too small a sample to test. Not an error; siblings
    /// stay fully computed.
    InsufficientData,
}

/// The computed output for one cell. `value: None` is the legitimate
/// "no data" state, distinct from a valid zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageResult {
    pub value: Option<f64>,
    pub weighted_sample: f64,
    pub unweighted_sample: u32,
    #[serde(default)]
    pub std_dev: Option<f64>,
    #[serde(default)]
    pub significance: Option<SignificanceMarker>,
}

impl AverageResult {
    pub fn no_data() -> Self {
        AverageResult {
            value: None,
            weighted_sample: 0.0,
            unweighted_sample: 0,
            std_dev: None,
            significance: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(unit: TotalisationPeriodUnit, periods: u32) -> AverageDefinition {
        AverageDefinition {
            id: "test".to_string(),
            display_name: "Test".to_string(),
            totalisation_period_unit: unit,
            number_of_periods: periods,
            weighting_method: WeightingMethod::QuotaCell,
            weight_across: WeightAcross::AllPeriods,
            make_up_to: MakeUpTo::ComputePartial,
            subset_ids: vec![],
            is_default: false,
            allow_partial: false,
            disabled: false,
        }
    }

    #[test]
    fn zero_period_count_is_a_configuration_error() {
        let def = definition(TotalisationPeriodUnit::Day, 0);
        assert!(def.validate().is_err());
    }

    #[test]
    fn all_time_definition_ignores_period_count() {
        let def = definition(TotalisationPeriodUnit::All, 0);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn empty_subset_list_applies_everywhere() {
        let def = definition(TotalisationPeriodUnit::Day, 7);
        assert!(def.applies_to("uk"));
        assert!(def.applies_to("fr"));
    }

    #[test]
    fn subset_restriction_is_honoured() {
        let mut def = definition(TotalisationPeriodUnit::Day, 7);
        def.subset_ids = vec!["uk".to_string()];
        assert!(def.applies_to("uk"));
        assert!(!def.applies_to("fr"));
    }

    #[test]
    fn yes_no_measure_requires_both_value_sets() {
        let spec = MeasureSpec {
            name: "aware".to_string(),
            strategy: AverageStrategy::YesNoRate,
            true_vals: Some(FilterInfo::List { values: vec![1.0] }),
            base_vals: None,
            pre_normalisation_minimum: None,
            pre_normalisation_maximum: None,
            filter_value_mappings: vec![],
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn indexed_measure_requires_ordered_bounds() {
        let mut spec = MeasureSpec {
            name: "rating".to_string(),
            strategy: AverageStrategy::IndexedMean,
            true_vals: None,
            base_vals: None,
            pre_normalisation_minimum: Some(10.0),
            pre_normalisation_maximum: Some(1.0),
            filter_value_mappings: vec![],
        };
        assert!(spec.validate().is_err());
        spec.pre_normalisation_minimum = Some(1.0);
        spec.pre_normalisation_maximum = Some(10.0);
        assert!(spec.validate().is_ok());
    }
}
