//! Depth-first expansion of cross measures into a computed tree.
//!
//! Sibling subtrees are mutually independent, so each level fans out over
//! the rayon pool and joins results back by index. The only shared resource
//! is the read-only weighting snapshot. Cancellation is checked at node
//! boundaries; a cancelled build discards the partial tree.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use super::tree::BuiltNode;
use super::{CrossMeasure, CrosstabTree, TOTAL_COLUMN};
use crate::calculator::{compute, CalculationContext, RespondentScope};
use crate::core::{AverageDefinition, AverageResult, MeasureSpec, Response};
use crate::engine::CancellationGuard;
use crate::errors::{EngineError, EngineResult};
use crate::filters::{compile_closed, ClosedPredicate, FilterInfo};
use crate::period::DateWindow;
use crate::weighting::QuotaCellWeightings;

/// Everything a tree build needs, gathered up front by the engine so the
/// expansion itself performs no I/O.
pub struct TreeBuildContext<'a> {
    pub definition: &'a AverageDefinition,
    pub primary: &'a MeasureSpec,
    pub window: DateWindow,
    pub primary_responses: &'a [Response],
    /// Break-measure responses, keyed by measure name.
    pub break_responses: &'a HashMap<String, Vec<Response>>,
    /// Break-measure specs, keyed by measure name.
    pub measures: &'a HashMap<String, MeasureSpec>,
    pub weightings: &'a QuotaCellWeightings,
    /// Permission predicate over primary values, already intersected with
    /// any request-level value filter.
    pub permission: &'a ClosedPredicate,
    pub previous: Option<&'a AverageResult>,
    pub cancel: &'a CancellationGuard,
}

pub fn build_tree(
    ctx: &TreeBuildContext,
    cross_measures: &[CrossMeasure],
) -> EngineResult<CrosstabTree> {
    ctx.cancel.checkpoint()?;
    let total = compute_cell(ctx, &RespondentScope::All)?;
    let children = cross_measures
        .par_iter()
        .map(|cm| expand(ctx, cm, &RespondentScope::All))
        .collect::<EngineResult<Vec<Vec<BuiltNode>>>>()?
        .into_iter()
        .flatten()
        .collect();
    Ok(CrosstabTree::from_built(BuiltNode {
        label: TOTAL_COLUMN.to_string(),
        result: total,
        comparand: None,
        synthetic: false,
        children,
    }))
}

/// One column group of a break: a label and the raw values it covers.
/// `values: None` is the "all instances" case and leaves the scope alone.
struct InstanceGroup {
    label: String,
    values: Option<Vec<f64>>,
}

fn expand(
    ctx: &TreeBuildContext,
    cross_measure: &CrossMeasure,
    scope: &RespondentScope,
) -> EngineResult<Vec<BuiltNode>> {
    ctx.cancel.checkpoint()?;
    let measure = ctx
        .measures
        .get(&cross_measure.measure_name)
        .ok_or_else(|| {
            EngineError::invalid_config(format!(
                "cross measure references unknown measure '{}'",
                cross_measure.measure_name
            ))
        })?;
    let groups = instance_groups(cross_measure, measure)?;
    let break_answers = ctx
        .break_responses
        .get(&cross_measure.measure_name)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    groups
        .par_iter()
        .map(|group| {
            ctx.cancel.checkpoint()?;
            let narrowed = narrow_scope(scope, group, break_answers, ctx.window)?;
            let result = compute_cell(ctx, &narrowed)?;
            let children = cross_measure
                .child_measures
                .iter()
                .map(|child| expand(ctx, child, &narrowed))
                .collect::<EngineResult<Vec<Vec<BuiltNode>>>>()?
                .into_iter()
                .flatten()
                .collect();
            Ok(BuiltNode {
                label: group.label.clone(),
                result,
                comparand: cross_measure.significance_comparand.clone(),
                synthetic: false,
                children,
            })
        })
        .collect()
}

fn compute_cell(ctx: &TreeBuildContext, scope: &RespondentScope) -> EngineResult<AverageResult> {
    let calculation = CalculationContext {
        definition: ctx.definition,
        measure: ctx.primary,
        window: ctx.window,
        scope,
        value_filter: ctx.permission,
        weightings: ctx.weightings,
        previous: ctx.previous,
    };
    compute(&calculation, ctx.primary_responses)
}

/// Resolves a cross measure's filter instances against the break measure.
///
/// Mirrors the instance resolution of the original break factory: a named
/// mapping expands to its configured value group, a raw id stands alone,
/// and the multiple-choice flag ORs every resolved value into one group.
fn instance_groups(
    cross_measure: &CrossMeasure,
    measure: &MeasureSpec,
) -> EngineResult<Vec<InstanceGroup>> {
    if cross_measure.filter_instances.is_empty() {
        return Ok(vec![InstanceGroup {
            label: cross_measure.measure_name.clone(),
            values: None,
        }]);
    }

    let mut groups = Vec::with_capacity(cross_measure.filter_instances.len());
    for instance in &cross_measure.filter_instances {
        let group = match (&instance.mapping_name, instance.instance_id) {
            (Some(name), _) => {
                let mapping = measure.mapping(name).ok_or_else(|| {
                    EngineError::invalid_config(format!(
                        "measure '{}' has no filter value mapping named '{}'",
                        measure.name, name
                    ))
                })?;
                InstanceGroup {
                    label: name.clone(),
                    values: Some(mapping.values.iter().map(|&v| v as f64).collect()),
                }
            }
            (None, Some(id)) => InstanceGroup {
                label: format!("{}:{}", cross_measure.measure_name, id),
                values: Some(vec![id as f64]),
            },
            (None, None) => {
                return Err(EngineError::invalid_config(format!(
                    "filter instance on '{}' names neither a mapping nor an instance id",
                    cross_measure.measure_name
                )))
            }
        };
        groups.push(group);
    }

    if cross_measure.multiple_choice_by_value {
        let union: Vec<f64> = groups
            .iter()
            .flat_map(|g| g.values.clone().unwrap_or_default())
            .collect();
        return Ok(vec![InstanceGroup {
            label: cross_measure.measure_name.clone(),
            values: Some(union),
        }]);
    }

    Ok(groups)
}

/// Respondents whose in-window break answer falls in the group's values,
/// intersected with the inherited scope.
fn narrow_scope(
    scope: &RespondentScope,
    group: &InstanceGroup,
    break_answers: &[Response],
    window: DateWindow,
) -> EngineResult<RespondentScope> {
    let Some(values) = &group.values else {
        return Ok(scope.clone());
    };
    let membership = compile_closed(&FilterInfo::List {
        values: values.clone(),
    })?;
    let ids: HashSet<u64> = break_answers
        .iter()
        .filter(|r| window.contains(r.recorded_on))
        .filter(|r| r.value.is_some_and(|v| membership.matches(v)))
        .map(|r| r.respondent_id)
        .collect();
    Ok(scope.narrow(ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        AverageStrategy, FilterValueMapping, MakeUpTo, TotalisationPeriodUnit, WeightAcross,
        WeightingMethod,
    };
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 5, d).unwrap()
    }

    fn definition() -> AverageDefinition {
        AverageDefinition {
            id: "28Days".to_string(),
            display_name: "28 days".to_string(),
            totalisation_period_unit: TotalisationPeriodUnit::Day,
            number_of_periods: 28,
            weighting_method: WeightingMethod::Unweighted,
            weight_across: WeightAcross::AllPeriods,
            make_up_to: MakeUpTo::ComputePartial,
            subset_ids: vec![],
            is_default: false,
            allow_partial: false,
            disabled: false,
        }
    }

    fn mean_measure(name: &str) -> MeasureSpec {
        MeasureSpec {
            name: name.to_string(),
            strategy: AverageStrategy::Mean,
            true_vals: None,
            base_vals: None,
            pre_normalisation_minimum: None,
            pre_normalisation_maximum: None,
            filter_value_mappings: vec![],
        }
    }

    fn response(id: u64, value: f64, day: u32) -> Response {
        Response {
            respondent_id: id,
            value: Some(value),
            recorded_on: date(day),
            cell_key: String::new(),
        }
    }

    struct Fixture {
        definition: AverageDefinition,
        primary: MeasureSpec,
        primary_responses: Vec<Response>,
        break_responses: HashMap<String, Vec<Response>>,
        measures: HashMap<String, MeasureSpec>,
        weightings: QuotaCellWeightings,
        permission: ClosedPredicate,
        cancel: CancellationGuard,
    }

    impl Fixture {
        fn new() -> Self {
            // Four respondents: 1 and 2 are "north" (region 1), 3 and 4
            // "south" (region 2); 1 and 3 are age band 1, 2 and 4 band 2.
            let primary_responses = vec![
                response(1, 10.0, 2),
                response(2, 20.0, 3),
                response(3, 30.0, 4),
                response(4, 40.0, 5),
            ];
            let mut break_responses = HashMap::new();
            break_responses.insert(
                "region".to_string(),
                vec![
                    response(1, 1.0, 2),
                    response(2, 1.0, 3),
                    response(3, 2.0, 4),
                    response(4, 2.0, 5),
                ],
            );
            break_responses.insert(
                "age".to_string(),
                vec![
                    response(1, 1.0, 2),
                    response(2, 2.0, 3),
                    response(3, 1.0, 4),
                    response(4, 2.0, 5),
                ],
            );
            let mut region = mean_measure("region");
            region.filter_value_mappings = vec![
                FilterValueMapping {
                    name: "North".to_string(),
                    values: vec![1],
                },
                FilterValueMapping {
                    name: "South".to_string(),
                    values: vec![2],
                },
            ];
            let mut measures = HashMap::new();
            measures.insert("region".to_string(), region);
            measures.insert("age".to_string(), mean_measure("age"));
            Fixture {
                definition: definition(),
                primary: mean_measure("spend"),
                primary_responses,
                break_responses,
                measures,
                weightings: QuotaCellWeightings::default(),
                permission: ClosedPredicate::accept_all(),
                cancel: CancellationGuard::new(),
            }
        }

        fn context(&self) -> TreeBuildContext<'_> {
            TreeBuildContext {
                definition: &self.definition,
                primary: &self.primary,
                window: DateWindow::new(date(1), date(28)),
                primary_responses: &self.primary_responses,
                break_responses: &self.break_responses,
                measures: &self.measures,
                weightings: &self.weightings,
                permission: &self.permission,
                previous: None,
                cancel: &self.cancel,
            }
        }
    }

    fn region_break() -> CrossMeasure {
        CrossMeasure {
            measure_name: "region".to_string(),
            filter_instances: vec![
                super::super::FilterInstance::mapping("North"),
                super::super::FilterInstance::mapping("South"),
            ],
            child_measures: vec![],
            multiple_choice_by_value: false,
            significance_comparand: None,
        }
    }

    #[test]
    fn each_instance_becomes_a_column_with_a_narrowed_population() {
        let fixture = Fixture::new();
        let tree = build_tree(&fixture.context(), &[region_break()]).unwrap();

        let root = tree.node(tree.root());
        assert_eq!(root.label, TOTAL_COLUMN);
        assert_eq!(root.result.value, Some(25.0));
        assert_eq!(root.children.len(), 2);

        let north = tree.node(root.children[0]);
        assert_eq!(north.label, "North");
        assert_eq!(north.result.value, Some(15.0));
        let south = tree.node(root.children[1]);
        assert_eq!(south.label, "South");
        assert_eq!(south.result.value, Some(35.0));
    }

    #[test]
    fn children_inherit_the_narrowed_scope() {
        let fixture = Fixture::new();
        let mut parent = region_break();
        parent.filter_instances = vec![super::super::FilterInstance::mapping("North")];
        parent.child_measures = vec![CrossMeasure {
            measure_name: "age".to_string(),
            filter_instances: vec![
                super::super::FilterInstance::instance(1),
                super::super::FilterInstance::instance(2),
            ],
            child_measures: vec![],
            multiple_choice_by_value: false,
            significance_comparand: None,
        }];
        let tree = build_tree(&fixture.context(), &[parent]).unwrap();

        let root = tree.node(tree.root());
        let north = tree.node(root.children[0]);
        assert_eq!(north.children.len(), 2);
        // North ∩ age band 1 is respondent 1 only.
        let band1 = tree.node(north.children[0]);
        assert_eq!(band1.label, "age:1");
        assert_eq!(band1.result.value, Some(10.0));
        assert_eq!(band1.result.unweighted_sample, 1);
        let band2 = tree.node(north.children[1]);
        assert_eq!(band2.result.value, Some(20.0));
    }

    #[test]
    fn multiple_choice_unions_instances_into_one_column() {
        let fixture = Fixture::new();
        let mut cm = region_break();
        cm.multiple_choice_by_value = true;
        let tree = build_tree(&fixture.context(), &[cm]).unwrap();

        let root = tree.node(tree.root());
        assert_eq!(root.children.len(), 1);
        let union = tree.node(root.children[0]);
        assert_eq!(union.label, "region");
        // Union of both regions is everyone.
        assert_eq!(union.result.value, Some(25.0));
        assert_eq!(union.result.unweighted_sample, 4);
    }

    #[test]
    fn empty_filter_instances_keep_the_parent_scope() {
        let fixture = Fixture::new();
        let cm = CrossMeasure::new("region");
        let tree = build_tree(&fixture.context(), &[cm]).unwrap();
        let root = tree.node(tree.root());
        let all = tree.node(root.children[0]);
        assert_eq!(all.result, root.result);
    }

    #[test]
    fn rebuilding_with_identical_inputs_is_idempotent() {
        let fixture = Fixture::new();
        let mut cm = region_break();
        cm.child_measures = vec![CrossMeasure::new("age")];
        let first = build_tree(&fixture.context(), std::slice::from_ref(&cm)).unwrap();
        let second = build_tree(&fixture.context(), std::slice::from_ref(&cm)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_break_measure_is_a_configuration_error() {
        let fixture = Fixture::new();
        let err = build_tree(&fixture.context(), &[CrossMeasure::new("nonexistent")])
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn cancellation_discards_the_build() {
        let fixture = Fixture::new();
        fixture.cancel.cancel();
        let err = build_tree(&fixture.context(), &[region_break()]).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn unknown_mapping_name_is_a_configuration_error() {
        let fixture = Fixture::new();
        let mut cm = CrossMeasure::new("region");
        cm.filter_instances = vec![super::super::FilterInstance::mapping("Nowhere")];
        let err = build_tree(&fixture.context(), &[cm]).unwrap_err();
        assert!(err.is_configuration_error());
    }
}
