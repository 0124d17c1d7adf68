//! Engine capability interface
//!
//! Engines are the pluggable units that do the actual AI work (scoring,
//! prediction, text analysis). The orchestrator never calls an engine by
//! method name: every request type resolves to a typed [`Capability`] and the
//! engine dispatches on it.

use crate::{CortexResult, EngineStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifies a registered engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineKind {
    /// Lead qualification and scoring
    LeadScoring,
    /// Deal, churn and revenue prediction
    Predictive,
    /// Sentiment analysis and content generation
    Nlp,
    /// Next-best-action recommendations
    Recommendation,
}

impl EngineKind {
    pub const ALL: [EngineKind; 4] = [
        EngineKind::LeadScoring,
        EngineKind::Predictive,
        EngineKind::Nlp,
        EngineKind::Recommendation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::LeadScoring => "leadScoring",
            EngineKind::Predictive => "predictive",
            EngineKind::Nlp => "nlp",
            EngineKind::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named asynchronous operation an engine can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    ScoreLead,
    PredictDeal,
    PredictChurn,
    ForecastRevenue,
    AnalyzeSentiment,
    GenerateEmail,
    RecommendNextAction,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ScoreLead => "scoreLead",
            Capability::PredictDeal => "predictDeal",
            Capability::PredictChurn => "predictChurn",
            Capability::ForecastRevenue => "forecastRevenue",
            Capability::AnalyzeSentiment => "analyzeSentiment",
            Capability::GenerateEmail => "generateEmail",
            Capability::RecommendNextAction => "recommendNextAction",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait every engine implements.
///
/// Only [`capabilities`](Engine::capabilities) and [`execute`](Engine::execute)
/// are required. The lifecycle hooks default to no-ops and the health probe
/// defaults to healthy, so simple engines stay simple.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Engine: Send + Sync {
    /// Capabilities this engine offers. Read once, at registration.
    fn capabilities(&self) -> &[Capability];

    /// Run a single capability against a payload.
    async fn execute(&self, capability: Capability, payload: Value) -> CortexResult<Value>;

    /// Run a capability over several payloads.
    ///
    /// Results are returned in input order, one per payload. The default
    /// implementation calls [`execute`](Engine::execute) sequentially;
    /// engines with a cheaper bulk path should override it.
    async fn execute_batch(
        &self,
        capability: Capability,
        payloads: Vec<Value>,
    ) -> Vec<CortexResult<Value>> {
        let mut results = Vec::with_capacity(payloads.len());
        for payload in payloads {
            results.push(self.execute(capability, payload).await);
        }
        results
    }

    /// Prepare the engine for work (load models, warm connections).
    async fn initialize(&self) -> CortexResult<()> {
        Ok(())
    }

    /// Release engine resources.
    async fn shutdown(&self) -> CortexResult<()> {
        Ok(())
    }

    /// Report operational health.
    async fn health_check(&self) -> CortexResult<EngineStatus> {
        Ok(EngineStatus::Healthy)
    }

    /// Let the engine tune itself (prune internal caches, recalibrate).
    async fn optimize(&self) -> CortexResult<()> {
        Ok(())
    }
}
