//! Collaborator interfaces the engine consumes, plus in-memory
//! implementations backing the tests and the CLI scenario runner.
//!
//! All I/O belongs to the collaborators: by the time the engine runs, the
//! configuration, responses and weighting snapshot are plain data. The
//! engine never retries a failed collaborator; retry policy lives upstream.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{AverageDefinition, MeasureSpec, Response};
use crate::crosstab::CrossMeasure;
use crate::errors::{EngineError, EngineResult};
use crate::period::DateWindow;
use crate::weighting::QuotaCellWeightings;

pub trait ConfigurationProvider: Sync {
    fn average_definition(&self, id: &str) -> EngineResult<AverageDefinition>;
    fn measure(&self, name: &str) -> EngineResult<MeasureSpec>;
    fn cross_measures(&self, saved_break_id: &str) -> EngineResult<Vec<CrossMeasure>>;
}

pub trait RawAnswerSource: Sync {
    /// One pass over the subset's answers for a measure within a window.
    /// The engine does not assume the sequence can be re-iterated without
    /// re-invoking the source.
    fn responses(
        &self,
        subset: &str,
        window: DateWindow,
        measure: &str,
    ) -> EngineResult<Vec<Response>>;

    /// Min/max span of data present for the subset, if any.
    fn data_bounds(&self, subset: &str) -> EngineResult<Option<DateWindow>>;
}

pub trait WeightingRepository: Sync {
    /// Immutable snapshot for the duration of one calculation.
    fn weightings(&self, subset: &str) -> EngineResult<Arc<QuotaCellWeightings>>;
}

#[derive(Debug, Default)]
pub struct InMemoryConfiguration {
    definitions: HashMap<String, AverageDefinition>,
    measures: HashMap<String, MeasureSpec>,
    saved_breaks: HashMap<String, Vec<CrossMeasure>>,
}

impl InMemoryConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the registry of built-in averages.
    pub fn with_fallback_averages() -> Self {
        let mut provider = Self::new();
        for definition in crate::core::defaults::fallback_definitions() {
            provider.add_definition(definition);
        }
        provider
    }

    pub fn add_definition(&mut self, definition: AverageDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    pub fn add_measure(&mut self, measure: MeasureSpec) {
        self.measures.insert(measure.name.clone(), measure);
    }

    pub fn add_saved_break(&mut self, id: impl Into<String>, measures: Vec<CrossMeasure>) {
        self.saved_breaks.insert(id.into(), measures);
    }
}

impl ConfigurationProvider for InMemoryConfiguration {
    fn average_definition(&self, id: &str) -> EngineResult<AverageDefinition> {
        self.definitions
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::invalid_config(format!("unknown average '{id}'")))
    }

    fn measure(&self, name: &str) -> EngineResult<MeasureSpec> {
        self.measures
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::invalid_config(format!("unknown measure '{name}'")))
    }

    fn cross_measures(&self, saved_break_id: &str) -> EngineResult<Vec<CrossMeasure>> {
        self.saved_breaks
            .get(saved_break_id)
            .cloned()
            .ok_or_else(|| {
                EngineError::invalid_config(format!(
                    "unknown saved break combination '{saved_break_id}'"
                ))
            })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAnswerSource {
    /// (subset, measure) -> responses.
    answers: HashMap<(String, String), Vec<Response>>,
}

impl InMemoryAnswerSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subset: &str, measure: &str, responses: Vec<Response>) {
        self.answers
            .entry((subset.to_string(), measure.to_string()))
            .or_default()
            .extend(responses);
    }
}

impl RawAnswerSource for InMemoryAnswerSource {
    fn responses(
        &self,
        subset: &str,
        window: DateWindow,
        measure: &str,
    ) -> EngineResult<Vec<Response>> {
        let key = (subset.to_string(), measure.to_string());
        Ok(self
            .answers
            .get(&key)
            .map(|rs| {
                rs.iter()
                    .filter(|r| window.contains(r.recorded_on))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn data_bounds(&self, subset: &str) -> EngineResult<Option<DateWindow>> {
        let dates: Vec<_> = self
            .answers
            .iter()
            .filter(|((s, _), _)| s == subset)
            .flat_map(|(_, rs)| rs.iter().map(|r| r.recorded_on))
            .collect();
        Ok(match (dates.iter().min(), dates.iter().max()) {
            (Some(&min), Some(&max)) => Some(DateWindow::new(min, max)),
            _ => None,
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryWeightings {
    by_subset: HashMap<String, Arc<QuotaCellWeightings>>,
}

impl InMemoryWeightings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subset: &str, weightings: QuotaCellWeightings) {
        self.by_subset
            .insert(subset.to_string(), Arc::new(weightings));
    }
}

impl WeightingRepository for InMemoryWeightings {
    fn weightings(&self, subset: &str) -> EngineResult<Arc<QuotaCellWeightings>> {
        // A subset without configured weightings is simply unweighted.
        Ok(self
            .by_subset
            .get(subset)
            .cloned()
            .unwrap_or_else(|| Arc::new(QuotaCellWeightings::default())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, d).unwrap()
    }

    #[test]
    fn answer_source_clips_to_the_window() {
        let mut source = InMemoryAnswerSource::new();
        source.add(
            "uk",
            "spend",
            vec![
                Response {
                    respondent_id: 1,
                    value: Some(1.0),
                    recorded_on: date(1),
                    cell_key: String::new(),
                },
                Response {
                    respondent_id: 2,
                    value: Some(2.0),
                    recorded_on: date(20),
                    cell_key: String::new(),
                },
            ],
        );
        let window = DateWindow::new(date(10), date(30));
        let got = source.responses("uk", window, "spend").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].respondent_id, 2);
    }

    #[test]
    fn data_bounds_span_all_measures_of_a_subset() {
        let mut source = InMemoryAnswerSource::new();
        source.add(
            "uk",
            "a",
            vec![Response {
                respondent_id: 1,
                value: Some(1.0),
                recorded_on: date(5),
                cell_key: String::new(),
            }],
        );
        source.add(
            "uk",
            "b",
            vec![Response {
                respondent_id: 2,
                value: Some(1.0),
                recorded_on: date(25),
                cell_key: String::new(),
            }],
        );
        let bounds = source.data_bounds("uk").unwrap().unwrap();
        assert_eq!(bounds, DateWindow::new(date(5), date(25)));
        assert!(source.data_bounds("fr").unwrap().is_none());
    }

    #[test]
    fn fallback_registry_is_queryable() {
        let provider = InMemoryConfiguration::with_fallback_averages();
        assert!(provider.average_definition("28Days").is_ok());
        assert!(provider.average_definition("nonexistent").is_err());
    }

    #[test]
    fn missing_weightings_mean_unweighted() {
        let repo = InMemoryWeightings::new();
        let snapshot = repo.weightings("anywhere").unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.weight_for("x"), 1.0);
    }
}
