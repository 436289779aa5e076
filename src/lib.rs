// Export modules for library usage
pub mod calculator;
pub mod cli;
pub mod config;
pub mod core;
pub mod crosstab;
pub mod engine;
pub mod errors;
pub mod filters;
pub mod output;
pub mod period;
pub mod significance;
pub mod sources;
pub mod weighting;

// Re-export commonly used types
pub use crate::core::{
    AverageDefinition, AverageResult, AverageStrategy, MakeUpTo, MeasureSpec, Response,
    SignificanceMarker, TotalisationPeriodUnit, WeightAcross, WeightingMethod,
};

pub use crate::crosstab::{CrossMeasure, CrosstabNode, CrosstabTree, FilterInstance, NodeId};

pub use crate::engine::{CancellationGuard, Engine, EngineRequest, SignificanceOptions};

pub use crate::errors::{EngineError, EngineResult};

pub use crate::filters::FilterInfo;

pub use crate::period::{resolve_window, DateWindow};

pub use crate::significance::{ComparisonMode, SigConfidenceLevel};

pub use crate::sources::{
    ConfigurationProvider, InMemoryAnswerSource, InMemoryConfiguration, InMemoryWeightings,
    RawAnswerSource, WeightingRepository,
};

pub use crate::weighting::{QuotaCell, QuotaCellWeightings};
