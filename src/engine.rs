//! Request orchestration: gathers configuration, answers and weightings,
//! then runs the calculation pipeline.
//!
//! The engine owns the order of operations only. Each stage is pure given
//! its inputs; all I/O happens up front through the collaborator traits,
//! so a failed fetch aborts before any computation starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::{AverageResult, Response};
use crate::crosstab::{build_tree, CrossMeasure, CrosstabTree, TreeBuildContext};
use crate::errors::{EngineError, EngineResult};
use crate::filters::{compile_closed, ClosedPredicate, FilterInfo};
use crate::significance::{self, ComparisonMode, SigConfidenceLevel};
use crate::sources::{ConfigurationProvider, RawAnswerSource, WeightingRepository};

/// Cooperative cancellation token shared between a caller and an in-flight
/// calculation. Checked at tree node boundaries, not per respondent.
#[derive(Debug, Clone, Default)]
pub struct CancellationGuard {
    flag: Arc<AtomicBool>,
}

impl CancellationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn checkpoint(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignificanceOptions {
    pub mode: ComparisonMode,
    pub confidence: SigConfidenceLevel,
}

/// One report calculation: which subset, which average, which primary
/// measure, and how to break it down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRequest {
    pub subset: String,
    pub average_id: String,
    pub measure_name: String,
    /// Usually "today" for a live dashboard; any date for backfill.
    pub reference_date: NaiveDate,
    #[serde(default)]
    pub cross_measures: Vec<CrossMeasure>,
    /// A stored break combination to use when `cross_measures` is empty.
    #[serde(default)]
    pub saved_break_id: Option<String>,
    /// Viewer entitlement over primary values, ANDed with the measure's
    /// own base filter.
    #[serde(default)]
    pub permission_filter: Option<FilterInfo>,
    #[serde(default)]
    pub significance: Option<SignificanceOptions>,
    #[serde(default)]
    pub hide_empty_columns: bool,
    /// Pad ragged header rows so every leaf column sits at the same depth.
    #[serde(default)]
    pub uniform_depth: bool,
    /// Prior period's total, consulted by carry-forward averages.
    #[serde(default)]
    pub previous: Option<AverageResult>,
}

pub struct Engine<'a> {
    configuration: &'a dyn ConfigurationProvider,
    answers: &'a dyn RawAnswerSource,
    weightings: &'a dyn WeightingRepository,
}

impl<'a> Engine<'a> {
    pub fn new(
        configuration: &'a dyn ConfigurationProvider,
        answers: &'a dyn RawAnswerSource,
        weightings: &'a dyn WeightingRepository,
    ) -> Self {
        Engine {
            configuration,
            answers,
            weightings,
        }
    }

    /// Runs one calculation to completion or the first error. Safe to call
    /// concurrently; each request carries its own cancellation guard.
    pub fn calculate(
        &self,
        request: &EngineRequest,
        cancel: &CancellationGuard,
    ) -> EngineResult<CrosstabTree> {
        cancel.checkpoint()?;

        let definition = self.configuration.average_definition(&request.average_id)?;
        definition.validate()?;
        if definition.disabled {
            return Err(EngineError::invalid_config(format!(
                "average '{}' is disabled",
                definition.id
            )));
        }
        if !definition.applies_to(&request.subset) {
            return Err(EngineError::invalid_config(format!(
                "average '{}' is not configured for subset '{}'",
                definition.id, request.subset
            )));
        }

        let primary = self.configuration.measure(&request.measure_name)?;
        primary.validate()?;

        let bounds = self.answers.data_bounds(&request.subset)?;
        let window = crate::period::resolve_window(&definition, request.reference_date, bounds)?;
        log::debug!(
            "calculating '{}' over '{}' in [{} .. {}]",
            request.measure_name,
            definition.id,
            window.start,
            window.end
        );

        let permission = match &request.permission_filter {
            Some(filter) => compile_closed(filter)?,
            None => ClosedPredicate::accept_all(),
        };

        let primary_responses =
            self.answers
                .responses(&request.subset, window, &request.measure_name)?;

        let cross_measures = match (&request.cross_measures, &request.saved_break_id) {
            (inline, _) if !inline.is_empty() => inline.clone(),
            (_, Some(id)) => self.configuration.cross_measures(id)?,
            _ => vec![],
        };

        let mut break_names: Vec<&str> = Vec::new();
        for cross_measure in &cross_measures {
            cross_measure.measure_names(&mut break_names);
        }
        break_names.sort_unstable();
        break_names.dedup();

        let mut measures = std::collections::HashMap::new();
        let mut break_responses: std::collections::HashMap<String, Vec<Response>> =
            std::collections::HashMap::new();
        for name in break_names {
            let spec = self.configuration.measure(name)?;
            spec.validate()?;
            measures.insert(name.to_string(), spec);
            break_responses.insert(
                name.to_string(),
                self.answers.responses(&request.subset, window, name)?,
            );
        }

        let weightings = self.weightings.weightings(&request.subset)?;

        let context = TreeBuildContext {
            definition: &definition,
            primary: &primary,
            window,
            primary_responses: &primary_responses,
            break_responses: &break_responses,
            measures: &measures,
            weightings: &weightings,
            permission: &permission,
            previous: request.previous.as_ref(),
            cancel,
        };
        let mut tree = build_tree(&context, &cross_measures)?;

        if let Some(options) = request.significance {
            cancel.checkpoint()?;
            tree = significance::annotate(&tree, primary.strategy, options.mode, options.confidence);
        }
        if request.hide_empty_columns {
            tree = tree.hide_empty_columns();
        }
        if request.uniform_depth {
            tree = tree.extend_to_uniform_depth();
        }

        log::debug!(
            "built tree with {} cells, {} columns",
            tree.len(),
            tree.span(tree.root())
        );
        Ok(tree)
    }
}
