//! Public types for the Bifrost API.

mod analysis;
mod options;
mod response;
mod status;

pub use analysis::{
    Finding, HealthAnalysis, HealthData, Priority, Recommendation, RiskFactor, RiskLevel,
    Severity,
};
pub use options::{AnalysisOptions, CompletionOptions};
pub use response::{AnalysisResponse, CompletionResponse, Usage};
pub use status::{BackendStatus, ProbeReport};
