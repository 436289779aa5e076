//! Built-in fallback average definitions.
//!
//! Products that have not configured their own averages get this registry.
//! Entries marked `disabled` exist so historical reports referencing them
//! keep resolving; they are not offered for new calculations.

use super::{
    AverageDefinition, MakeUpTo, TotalisationPeriodUnit, WeightAcross, WeightingMethod,
};

pub fn fallback_definitions() -> Vec<AverageDefinition> {
    vec![
        AverageDefinition {
            id: "14Days".to_string(),
            display_name: "14 days".to_string(),
            totalisation_period_unit: TotalisationPeriodUnit::Day,
            number_of_periods: 14,
            weighting_method: WeightingMethod::QuotaCell,
            weight_across: WeightAcross::AllPeriods,
            make_up_to: MakeUpTo::ComputePartial,
            subset_ids: vec![],
            is_default: true,
            allow_partial: true,
            disabled: false,
        },
        AverageDefinition {
            id: "28Days".to_string(),
            display_name: "28 days".to_string(),
            totalisation_period_unit: TotalisationPeriodUnit::Day,
            number_of_periods: 28,
            weighting_method: WeightingMethod::QuotaCell,
            weight_across: WeightAcross::AllPeriods,
            make_up_to: MakeUpTo::ComputePartial,
            subset_ids: vec![],
            is_default: false,
            allow_partial: true,
            disabled: false,
        },
        AverageDefinition {
            id: "Weekly".to_string(),
            display_name: "Weekly".to_string(),
            totalisation_period_unit: TotalisationPeriodUnit::Day,
            number_of_periods: 7,
            weighting_method: WeightingMethod::QuotaCell,
            weight_across: WeightAcross::SinglePeriod,
            make_up_to: MakeUpTo::Suppress,
            subset_ids: vec![],
            is_default: false,
            allow_partial: true,
            disabled: false,
        },
        AverageDefinition {
            id: "Fortnightly".to_string(),
            display_name: "Fortnightly".to_string(),
            totalisation_period_unit: TotalisationPeriodUnit::Day,
            number_of_periods: 14,
            weighting_method: WeightingMethod::QuotaCell,
            weight_across: WeightAcross::SinglePeriod,
            make_up_to: MakeUpTo::Suppress,
            subset_ids: vec![],
            is_default: false,
            allow_partial: true,
            disabled: true,
        },
        AverageDefinition {
            id: "Monthly".to_string(),
            display_name: "Monthly".to_string(),
            totalisation_period_unit: TotalisationPeriodUnit::Month,
            number_of_periods: 1,
            weighting_method: WeightingMethod::QuotaCell,
            weight_across: WeightAcross::SinglePeriod,
            make_up_to: MakeUpTo::CarryForward,
            subset_ids: vec![],
            is_default: false,
            allow_partial: true,
            disabled: false,
        },
        AverageDefinition {
            id: "Quarterly".to_string(),
            display_name: "Quarterly".to_string(),
            totalisation_period_unit: TotalisationPeriodUnit::Month,
            number_of_periods: 3,
            weighting_method: WeightingMethod::QuotaCell,
            weight_across: WeightAcross::AllPeriods,
            make_up_to: MakeUpTo::ComputePartial,
            subset_ids: vec![],
            is_default: false,
            allow_partial: true,
            disabled: true,
        },
        AverageDefinition {
            id: "AllTime".to_string(),
            display_name: "All time".to_string(),
            totalisation_period_unit: TotalisationPeriodUnit::All,
            number_of_periods: 0,
            weighting_method: WeightingMethod::QuotaCell,
            weight_across: WeightAcross::AllPeriods,
            make_up_to: MakeUpTo::ComputePartial,
            subset_ids: vec![],
            is_default: false,
            allow_partial: true,
            disabled: false,
        },
        // Used to handle weighting comparison scenarios; not meant for UI display.
        AverageDefinition {
            id: "CustomPeriodUnweighted".to_string(),
            display_name: "Custom period (unweighted)".to_string(),
            totalisation_period_unit: TotalisationPeriodUnit::All,
            number_of_periods: 0,
            weighting_method: WeightingMethod::Unweighted,
            weight_across: WeightAcross::AllPeriods,
            make_up_to: MakeUpTo::ComputePartial,
            subset_ids: vec![],
            is_default: false,
            allow_partial: true,
            disabled: false,
        },
    ]
}
