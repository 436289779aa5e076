//! The average calculator: applies a strategy/weighting-method combination
//! to a windowed, filtered, weighted set of responses.
//!
//! Pure and synchronous. The carry-forward policy needs the prior window's
//! result, which arrives as an explicit optional input rather than an
//! implicit history lookup, so the calculator stays testable in isolation.

use std::collections::HashSet;

use crate::core::{
    AverageDefinition, AverageResult, AverageStrategy, MakeUpTo, MeasureSpec, Response,
    TotalisationPeriodUnit, WeightAcross, WeightingMethod,
};
use crate::errors::EngineResult;
use crate::filters::{compile_closed, ClosedPredicate};
use crate::period::{period_index, periods_present, DateWindow};
use crate::weighting::{QuotaCellWeightings, UNWEIGHTED};

/// Which respondents a cell covers. Cross-tab breaks narrow the scope by
/// intersection; `All` is the total column.
#[derive(Debug, Clone)]
pub enum RespondentScope {
    All,
    Ids(HashSet<u64>),
}

impl RespondentScope {
    pub fn contains(&self, respondent_id: u64) -> bool {
        match self {
            RespondentScope::All => true,
            RespondentScope::Ids(ids) => ids.contains(&respondent_id),
        }
    }

    pub fn narrow(&self, ids: HashSet<u64>) -> RespondentScope {
        match self {
            RespondentScope::All => RespondentScope::Ids(ids),
            RespondentScope::Ids(current) => {
                RespondentScope::Ids(current.intersection(&ids).copied().collect())
            }
        }
    }
}

/// Everything one cell computation needs besides the responses themselves.
/// The weighting snapshot is immutable and shared read-only across cells.
pub struct CalculationContext<'a> {
    pub definition: &'a AverageDefinition,
    pub measure: &'a MeasureSpec,
    pub window: DateWindow,
    pub scope: &'a RespondentScope,
    /// Permission predicate ANDed with any request-level value filter.
    pub value_filter: &'a ClosedPredicate,
    pub weightings: &'a QuotaCellWeightings,
    /// The prior window's result, for MakeUpTo::CarryForward.
    pub previous: Option<&'a AverageResult>,
}

pub fn compute(ctx: &CalculationContext, responses: &[Response]) -> EngineResult<AverageResult> {
    let in_scope: Vec<&Response> = responses
        .iter()
        .filter(|r| ctx.window.contains(r.recorded_on) && ctx.scope.contains(r.respondent_id))
        .collect();

    if let Some(result) = apply_make_up_to(ctx, responses)? {
        return Ok(result);
    }

    match ctx.measure.strategy {
        AverageStrategy::YesNoRate => compute_rate(ctx, &in_scope),
        AverageStrategy::Mean | AverageStrategy::IndexedMean | AverageStrategy::NetPromoter => {
            compute_mean(ctx, &in_scope)
        }
    }
}

/// Partial-window policy, evaluated after windowing and before weighting.
/// Returns Some when the policy short-circuits the computation.
fn apply_make_up_to(
    ctx: &CalculationContext,
    responses: &[Response],
) -> EngineResult<Option<AverageResult>> {
    let unit = ctx.definition.totalisation_period_unit;
    if unit == TotalisationPeriodUnit::All {
        return Ok(None);
    }
    let present = periods_present(responses, ctx.window, unit);
    if present >= ctx.definition.number_of_periods {
        return Ok(None);
    }
    match ctx.definition.make_up_to {
        MakeUpTo::ComputePartial => Ok(None),
        MakeUpTo::CarryForward => {
            log::debug!(
                "window for '{}' has {present}/{} periods, carrying previous result forward",
                ctx.definition.id,
                ctx.definition.number_of_periods
            );
            Ok(Some(
                ctx.previous.cloned().unwrap_or_else(AverageResult::no_data),
            ))
        }
        MakeUpTo::Suppress => Ok(Some(AverageResult::no_data())),
    }
}

fn respondent_weight(ctx: &CalculationContext, response: &Response) -> f64 {
    match ctx.definition.weighting_method {
        WeightingMethod::QuotaCell => ctx.weightings.weight_for(&response.cell_key),
        WeightingMethod::Unweighted => UNWEIGHTED,
    }
}

/// Weighted share of the base population whose value is a "true" value.
/// The base may legitimately exclude respondents unrelated to the outcome,
/// so numerator and denominator use separate value sets.
fn compute_rate(ctx: &CalculationContext, responses: &[&Response]) -> EngineResult<AverageResult> {
    // Validation guarantees both are present for yes/no measures.
    let true_predicate = match &ctx.measure.true_vals {
        Some(filter) => compile_closed(filter)?,
        None => ClosedPredicate::accept_all(),
    };
    let base_predicate = match &ctx.measure.base_vals {
        Some(filter) => compile_closed(filter)?,
        None => ClosedPredicate::accept_all(),
    };

    let mut period_rates: PeriodAccumulator<RateTotals> = PeriodAccumulator::new();
    for response in responses {
        let period = period_index(response.recorded_on, ctx.definition.totalisation_period_unit);
        let weight = respondent_weight(ctx, response);
        match response.value {
            Some(value) => {
                if !ctx.value_filter.matches(value) {
                    continue;
                }
                if base_predicate.matches(value) {
                    let totals = period_rates.entry(period);
                    totals.base_weight += weight;
                    totals.base_count += 1;
                    if true_predicate.matches(value) {
                        totals.true_weight += weight;
                    }
                }
            }
            None => {
                // A missing value can never satisfy the true set; with
                // partials allowed the respondent still counts in the base.
                if ctx.definition.allow_partial {
                    let totals = period_rates.entry(period);
                    totals.base_weight += weight;
                    totals.base_count += 1;
                }
            }
        }
    }

    let total_base_weight: f64 = period_rates.values().map(|t| t.base_weight).sum();
    let total_base_count: u32 = period_rates.values().map(|t| t.base_count).sum();
    if total_base_weight <= 0.0 {
        return Ok(AverageResult::no_data());
    }

    let value = match ctx.definition.weight_across {
        WeightAcross::AllPeriods => {
            let total_true_weight: f64 = period_rates.values().map(|t| t.true_weight).sum();
            total_true_weight / total_base_weight
        }
        WeightAcross::SinglePeriod => {
            let rates: Vec<f64> = period_rates
                .values()
                .filter(|t| t.base_weight > 0.0)
                .map(|t| t.true_weight / t.base_weight)
                .collect();
            rates.iter().sum::<f64>() / rates.len() as f64
        }
    };

    Ok(AverageResult {
        value: Some(value),
        weighted_sample: total_base_weight,
        unweighted_sample: total_base_count,
        std_dev: None,
        significance: None,
    })
}

fn compute_mean(ctx: &CalculationContext, responses: &[&Response]) -> EngineResult<AverageResult> {
    // For mean strategies true_vals is an optional convenience filter on the
    // raw value, saving a whole separate measure definition.
    let value_scope = match &ctx.measure.true_vals {
        Some(filter) => compile_closed(filter)?,
        None => ClosedPredicate::accept_all(),
    };

    let mut period_means: PeriodAccumulator<MeanTotals> = PeriodAccumulator::new();
    let mut scored: Vec<(f64, f64)> = Vec::new(); // (score, weight)
    for response in responses {
        // Respondents without a value for the measure contribute nothing to
        // either side of a mean; nothing is imputed.
        let Some(value) = response.value else {
            continue;
        };
        if !ctx.value_filter.matches(value) || !value_scope.matches(value) {
            continue;
        }
        let score = strategy_score(ctx.measure, value);
        let weight = respondent_weight(ctx, response);
        let period = period_index(response.recorded_on, ctx.definition.totalisation_period_unit);
        let totals = period_means.entry(period);
        totals.weighted_sum += score * weight;
        totals.weight += weight;
        totals.count += 1;
        scored.push((score, weight));
    }

    let total_weight: f64 = period_means.values().map(|t| t.weight).sum();
    let total_count: u32 = period_means.values().map(|t| t.count).sum();
    if total_weight <= 0.0 {
        return Ok(AverageResult::no_data());
    }

    let value = match ctx.definition.weight_across {
        WeightAcross::AllPeriods => {
            let weighted_sum: f64 = period_means.values().map(|t| t.weighted_sum).sum();
            weighted_sum / total_weight
        }
        WeightAcross::SinglePeriod => {
            let means: Vec<f64> = period_means
                .values()
                .filter(|t| t.weight > 0.0)
                .map(|t| t.weighted_sum / t.weight)
                .collect();
            means.iter().sum::<f64>() / means.len() as f64
        }
    };

    Ok(AverageResult {
        value: Some(value),
        weighted_sample: total_weight,
        unweighted_sample: total_count,
        std_dev: weighted_std_dev(&scored, value),
        significance: None,
    })
}

/// Per-respondent score under the measure's strategy. The indexed rescale
/// uses bounds fixed at configuration time.
fn strategy_score(measure: &MeasureSpec, value: f64) -> f64 {
    match measure.strategy {
        AverageStrategy::Mean => value,
        AverageStrategy::IndexedMean => {
            // Validation guarantees both bounds with min < max.
            let min = measure.pre_normalisation_minimum.unwrap_or(0.0);
            let max = measure.pre_normalisation_maximum.unwrap_or(1.0);
            (value - min) / (max - min) * 100.0
        }
        AverageStrategy::NetPromoter => {
            if value >= 9.0 {
                100.0
            } else if value >= 7.0 {
                0.0
            } else {
                -100.0
            }
        }
        AverageStrategy::YesNoRate => value,
    }
}

fn weighted_std_dev(scored: &[(f64, f64)], mean: f64) -> Option<f64> {
    let total_weight: f64 = scored.iter().map(|(_, w)| w).sum();
    if scored.len() < 2 || total_weight <= 0.0 {
        return None;
    }
    let variance = scored
        .iter()
        .map(|(score, weight)| weight * (score - mean).powi(2))
        .sum::<f64>()
        / total_weight;
    Some(variance.sqrt())
}

/// Accumulates totals per totalisation period, preserving first-seen period
/// order so single-period averaging is deterministic.
struct PeriodAccumulator<T> {
    order: Vec<i64>,
    totals: std::collections::HashMap<i64, T>,
}

impl<T: Default> PeriodAccumulator<T> {
    fn new() -> Self {
        PeriodAccumulator {
            order: Vec::new(),
            totals: std::collections::HashMap::new(),
        }
    }

    fn entry(&mut self, period: i64) -> &mut T {
        if !self.totals.contains_key(&period) {
            self.order.push(period);
        }
        self.totals.entry(period).or_default()
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.order.iter().map(|p| &self.totals[p])
    }
}

#[derive(Default)]
struct RateTotals {
    true_weight: f64,
    base_weight: f64,
    base_count: u32,
}

#[derive(Default)]
struct MeanTotals {
    weighted_sum: f64,
    weight: f64,
    count: u32,
}
