//! Scenario files for the CLI runner.
//!
//! A scenario is a self-contained JSON document: the average registry, the
//! measure catalogue, the raw answers, the weighting cells and the request
//! to run. Omitting `definitions` falls back to the built-in averages.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::{AverageDefinition, MeasureSpec, Response};
use crate::engine::EngineRequest;
use crate::errors::{EngineError, EngineResult};
use crate::sources::{InMemoryAnswerSource, InMemoryConfiguration, InMemoryWeightings};
use crate::weighting::{QuotaCell, QuotaCellWeightings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub measure: String,
    pub respondent_id: u64,
    #[serde(default)]
    pub value: Option<f64>,
    pub recorded_on: NaiveDate,
    #[serde(default)]
    pub cell_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCellRecord {
    pub components: Vec<String>,
    pub reference_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub definitions: Vec<AverageDefinition>,
    pub measures: Vec<MeasureSpec>,
    #[serde(default)]
    pub answers: Vec<AnswerRecord>,
    #[serde(default)]
    pub quota_cells: Vec<QuotaCellRecord>,
    #[serde(default)]
    pub interlocked: bool,
    pub request: EngineRequest,
}

impl Scenario {
    pub fn from_path(path: &Path) -> EngineResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            EngineError::invalid_config(format!("cannot read scenario {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> EngineResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| EngineError::invalid_config(format!("malformed scenario: {e}")))
    }

    /// Materializes the in-memory collaborators the engine runs against.
    pub fn build_sources(
        &self,
    ) -> EngineResult<(InMemoryConfiguration, InMemoryAnswerSource, InMemoryWeightings)> {
        let mut configuration = if self.definitions.is_empty() {
            InMemoryConfiguration::with_fallback_averages()
        } else {
            let mut provider = InMemoryConfiguration::new();
            for definition in &self.definitions {
                definition.validate()?;
                provider.add_definition(definition.clone());
            }
            provider
        };
        for measure in &self.measures {
            measure.validate()?;
            configuration.add_measure(measure.clone());
        }

        let subset = &self.request.subset;
        let mut answers = InMemoryAnswerSource::new();
        for record in &self.answers {
            answers.add(
                subset,
                &record.measure,
                vec![Response {
                    respondent_id: record.respondent_id,
                    value: record.value,
                    recorded_on: record.recorded_on,
                    cell_key: record.cell_key.clone(),
                }],
            );
        }

        let mut weightings = InMemoryWeightings::new();
        if !self.quota_cells.is_empty() {
            let cells: Vec<QuotaCell> = self
                .quota_cells
                .iter()
                .map(|c| QuotaCell::new(c.components.clone(), c.reference_weight))
                .collect();
            weightings.insert(subset, QuotaCellWeightings::from_cells(&cells, self.interlocked)?);
        }

        Ok((configuration, answers, weightings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const MINIMAL: &str = indoc! {r#"
        {
          "measures": [{"name": "spend", "strategy": "mean"}],
          "answers": [
            {"measure": "spend", "respondent_id": 1, "value": 4.0, "recorded_on": "2023-05-10"}
          ],
          "request": {
            "subset": "uk",
            "average_id": "28Days",
            "measure_name": "spend",
            "reference_date": "2023-05-14"
          }
        }
    "#};

    #[test]
    fn minimal_scenario_falls_back_to_builtin_averages() {
        let scenario = Scenario::from_json(MINIMAL).unwrap();
        let (configuration, _, _) = scenario.build_sources().unwrap();
        use crate::sources::ConfigurationProvider;
        assert!(configuration.average_definition("28Days").is_ok());
    }

    #[test]
    fn malformed_scenario_is_a_configuration_error() {
        let err = Scenario::from_json("{not json").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn quota_cells_carry_into_the_weighting_snapshot() {
        let mut scenario = Scenario::from_json(MINIMAL).unwrap();
        scenario.quota_cells = vec![QuotaCellRecord {
            components: vec!["male".to_string()],
            reference_weight: 1.4,
        }];
        let (_, _, weightings) = scenario.build_sources().unwrap();
        use crate::sources::WeightingRepository;
        let snapshot = weightings.weightings("uk").unwrap();
        assert_eq!(snapshot.weight_for("male"), 1.4);
    }
}
