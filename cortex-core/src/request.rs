//! Request types and the static route table

use crate::{Capability, CortexError, EngineKind, RouterError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of work a caller can submit.
///
/// The wire name of each variant doubles as its cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    LeadScoring,
    DealPrediction,
    ChurnPrediction,
    RevenueForecast,
    SentimentAnalysis,
    EmailGeneration,
    NextBestAction,
}

/// Where a request type is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub engine: EngineKind,
    pub capability: Capability,
}

impl RequestType {
    pub const ALL: [RequestType; 7] = [
        RequestType::LeadScoring,
        RequestType::DealPrediction,
        RequestType::ChurnPrediction,
        RequestType::RevenueForecast,
        RequestType::SentimentAnalysis,
        RequestType::EmailGeneration,
        RequestType::NextBestAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::LeadScoring => "leadScoring",
            RequestType::DealPrediction => "dealPrediction",
            RequestType::ChurnPrediction => "churnPrediction",
            RequestType::RevenueForecast => "revenueForecast",
            RequestType::SentimentAnalysis => "sentimentAnalysis",
            RequestType::EmailGeneration => "emailGeneration",
            RequestType::NextBestAction => "nextBestAction",
        }
    }

    /// Cache namespace for results of this request type.
    pub fn namespace(&self) -> &'static str {
        self.as_str()
    }

    /// Engine and capability that serve this request type.
    pub fn route(&self) -> Route {
        let (engine, capability) = match self {
            RequestType::LeadScoring => (EngineKind::LeadScoring, Capability::ScoreLead),
            RequestType::DealPrediction => (EngineKind::Predictive, Capability::PredictDeal),
            RequestType::ChurnPrediction => (EngineKind::Predictive, Capability::PredictChurn),
            RequestType::RevenueForecast => (EngineKind::Predictive, Capability::ForecastRevenue),
            RequestType::SentimentAnalysis => (EngineKind::Nlp, Capability::AnalyzeSentiment),
            RequestType::EmailGeneration => (EngineKind::Nlp, Capability::GenerateEmail),
            RequestType::NextBestAction => {
                (EngineKind::Recommendation, Capability::RecommendNextAction)
            }
        };
        Route { engine, capability }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                CortexError::Router(RouterError::UnknownRequestType {
                    request_type: s.to_string(),
                })
            })
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Bypass cache lookup and population.
    #[serde(default)]
    pub skip_cache: bool,
    /// Queue the request on its batch accumulator instead of executing it.
    #[serde(default)]
    pub batch_mode: bool,
    /// Caller correlation id carried through batch processing.
    #[serde(default)]
    pub batch_id: Option<String>,
    /// Deadline for the engine call; falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn batched(mut self) -> Self {
        self.batch_mode = true;
        self
    }

    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Token returned when a request is queued for batch processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedToken {
    pub queued: bool,
    /// Batch the request was placed in.
    pub batch_id: String,
    /// Caller-supplied correlation id, if any.
    pub correlation_id: Option<String>,
}

/// Outcome of a single request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// Served from cache.
    Cached(Value),
    /// Computed by the engine.
    Computed(Value),
    /// Queued for batch processing; the result is delivered by the batch processor.
    Queued(QueuedToken),
}

impl RequestOutcome {
    pub fn value(&self) -> Option<&Value> {
        match self {
            RequestOutcome::Cached(v) | RequestOutcome::Computed(v) => Some(v),
            RequestOutcome::Queued(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            RequestOutcome::Cached(v) | RequestOutcome::Computed(v) => Some(v),
            RequestOutcome::Queued(_) => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, RequestOutcome::Cached(_))
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, RequestOutcome::Queued(_))
    }
}

/// One entry of a multi-request batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(rename = "type")]
    pub request_type: String,
    pub data: Value,
    #[serde(default)]
    pub options: RequestOptions,
}

impl BatchRequest {
    pub fn new(request_type: impl Into<String>, data: Value) -> Self {
        Self {
            request_type: request_type.into(),
            data,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}
