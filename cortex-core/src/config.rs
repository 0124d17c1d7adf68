//! Configuration types
//!
//! [`CortexConfig`] is loaded from defaults, environment variables, or a TOML
//! document. All durations are expressed in milliseconds in serialized form.

use crate::constants::*;
use crate::{ConfigError, CortexError, CortexResult, RequestType};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Serde adapter storing a `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Capacity and expiry of one cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub max_size: usize,
    #[serde(rename = "ttl_ms", with = "duration_ms")]
    pub ttl: Duration,
}

impl NamespaceConfig {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self { max_size, ttl }
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_MAX_SIZE,
            ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
        }
    }
}

/// Flush thresholds of one batch accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_size: usize,
    #[serde(rename = "flush_interval_ms", with = "duration_ms")]
    pub flush_interval: Duration,
}

impl BatchConfig {
    pub fn new(batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            batch_size,
            flush_interval,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
        }
    }
}

/// Thresholds driving cache optimization and health verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTuning {
    pub low_utilization_hit_rate: f64,
    pub low_utilization_min_entries: usize,
    pub low_utilization_evict_fraction: f64,
    pub poor_hit_rate: f64,
    pub high_utilization: f64,
    pub compaction_threshold: usize,
}

impl Default for CacheTuning {
    fn default() -> Self {
        Self {
            low_utilization_hit_rate: LOW_UTILIZATION_HIT_RATE,
            low_utilization_min_entries: LOW_UTILIZATION_MIN_ENTRIES,
            low_utilization_evict_fraction: LOW_UTILIZATION_EVICT_FRACTION,
            poor_hit_rate: POOR_HIT_RATE,
            high_utilization: HIGH_UTILIZATION,
            compaction_threshold: COMPACTION_THRESHOLD,
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CortexConfig {
    /// Cache namespaces by name. Parsed tables are merged over the defaults.
    #[serde(deserialize_with = "merge_namespaces")]
    pub namespaces: BTreeMap<String, NamespaceConfig>,
    /// Batch thresholds by request type name; missing types use `default_batch`.
    #[serde(deserialize_with = "merge_batching")]
    pub batching: BTreeMap<String, BatchConfig>,
    pub default_batch: BatchConfig,
    pub cache_tuning: CacheTuning,

    #[serde(rename = "health_check_interval_ms", with = "duration_ms")]
    pub health_check_interval: Duration,
    #[serde(rename = "optimization_interval_ms", with = "duration_ms")]
    pub optimization_interval: Duration,
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
    #[serde(rename = "engine_init_timeout_ms", with = "duration_ms")]
    pub engine_init_timeout: Duration,
    #[serde(rename = "health_probe_timeout_ms", with = "duration_ms")]
    pub health_probe_timeout: Duration,

    pub max_batch_concurrency: usize,
    pub batch_chunk_size: usize,
    #[serde(rename = "chunk_throttle_delay_ms", with = "duration_ms")]
    pub chunk_throttle_delay: Duration,

    /// Capacity of the system error log.
    pub max_error_log: usize,
}

/// Per request type cache defaults, tuned to how quickly each result goes stale.
fn default_namespace(request_type: RequestType) -> NamespaceConfig {
    let (max_size, ttl_secs) = match request_type {
        RequestType::LeadScoring => (1000, 300),
        RequestType::DealPrediction => (500, 600),
        RequestType::ChurnPrediction => (500, 1800),
        RequestType::RevenueForecast => (100, 3600),
        RequestType::SentimentAnalysis => (2000, 3600),
        RequestType::EmailGeneration => (200, 900),
        RequestType::NextBestAction => (500, 120),
    };
    NamespaceConfig::new(max_size, Duration::from_secs(ttl_secs))
}

fn default_namespaces() -> BTreeMap<String, NamespaceConfig> {
    RequestType::ALL
        .iter()
        .map(|t| (t.namespace().to_string(), default_namespace(*t)))
        .collect()
}

fn default_batching() -> BTreeMap<String, BatchConfig> {
    let mut batching = BTreeMap::new();
    batching.insert(
        RequestType::LeadScoring.as_str().to_string(),
        BatchConfig::new(25, Duration::from_millis(200)),
    );
    batching.insert(
        RequestType::SentimentAnalysis.as_str().to_string(),
        BatchConfig::new(20, Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS)),
    );
    batching
}

fn merge_namespaces<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, NamespaceConfig>, D::Error> {
    let mut namespaces = default_namespaces();
    namespaces.extend(BTreeMap::<String, NamespaceConfig>::deserialize(deserializer)?);
    Ok(namespaces)
}

fn merge_batching<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, BatchConfig>, D::Error> {
    let mut batching = default_batching();
    batching.extend(BTreeMap::<String, BatchConfig>::deserialize(deserializer)?);
    Ok(batching)
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            namespaces: default_namespaces(),
            batching: default_batching(),
            default_batch: BatchConfig::default(),
            cache_tuning: CacheTuning::default(),
            health_check_interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            optimization_interval: Duration::from_secs(DEFAULT_OPTIMIZATION_INTERVAL_SECS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            engine_init_timeout: Duration::from_millis(DEFAULT_ENGINE_INIT_TIMEOUT_MS),
            health_probe_timeout: Duration::from_millis(DEFAULT_HEALTH_PROBE_TIMEOUT_MS),
            max_batch_concurrency: DEFAULT_MAX_BATCH_CONCURRENCY,
            batch_chunk_size: DEFAULT_BATCH_CHUNK_SIZE,
            chunk_throttle_delay: Duration::from_millis(DEFAULT_CHUNK_THROTTLE_MS),
            max_error_log: DEFAULT_MAX_ERROR_LOG,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl CortexConfig {
    /// Create CortexConfig from environment variables, starting from defaults.
    ///
    /// # Environment Variables
    /// - `CORTEX_HEALTH_CHECK_INTERVAL_SECS`: Health check interval (default: 30)
    /// - `CORTEX_OPTIMIZATION_INTERVAL_SECS`: Optimization interval (default: 300)
    /// - `CORTEX_REQUEST_TIMEOUT_MS`: Per-request deadline (default: 30000)
    /// - `CORTEX_ENGINE_INIT_TIMEOUT_MS`: Engine readiness deadline (default: 10000)
    /// - `CORTEX_HEALTH_PROBE_TIMEOUT_MS`: Engine health probe deadline (default: 5000)
    /// - `CORTEX_MAX_BATCH_CONCURRENCY`: Concurrent requests per chunk (default: 5)
    /// - `CORTEX_BATCH_CHUNK_SIZE`: Chunk size for multi-request submissions (default: 10)
    /// - `CORTEX_CHUNK_THROTTLE_MS`: Delay between chunks (default: 100)
    /// - `CORTEX_BATCH_SIZE` / `CORTEX_FLUSH_INTERVAL_MS`: Default accumulator thresholds
    /// - `CORTEX_MAX_ERROR_LOG`: Error log capacity (default: 100)
    /// - `CORTEX_CACHE_<NAMESPACE>_MAX_SIZE` / `CORTEX_CACHE_<NAMESPACE>_TTL_MS`:
    ///   per-namespace overrides, namespace upper-cased (e.g. `CORTEX_CACHE_LEADSCORING_TTL_MS`)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_parse("CORTEX_HEALTH_CHECK_INTERVAL_SECS") {
            config.health_check_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("CORTEX_OPTIMIZATION_INTERVAL_SECS") {
            config.optimization_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse("CORTEX_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("CORTEX_ENGINE_INIT_TIMEOUT_MS") {
            config.engine_init_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("CORTEX_HEALTH_PROBE_TIMEOUT_MS") {
            config.health_probe_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse("CORTEX_MAX_BATCH_CONCURRENCY") {
            config.max_batch_concurrency = n;
        }
        if let Some(n) = env_parse("CORTEX_BATCH_CHUNK_SIZE") {
            config.batch_chunk_size = n;
        }
        if let Some(ms) = env_parse("CORTEX_CHUNK_THROTTLE_MS") {
            config.chunk_throttle_delay = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse("CORTEX_BATCH_SIZE") {
            config.default_batch.batch_size = n;
        }
        if let Some(ms) = env_parse("CORTEX_FLUSH_INTERVAL_MS") {
            config.default_batch.flush_interval = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse("CORTEX_MAX_ERROR_LOG") {
            config.max_error_log = n;
        }

        for (name, ns) in config.namespaces.iter_mut() {
            let prefix = format!("CORTEX_CACHE_{}", name.to_uppercase());
            if let Some(n) = env_parse(&format!("{prefix}_MAX_SIZE")) {
                ns.max_size = n;
            }
            if let Some(ms) = env_parse(&format!("{prefix}_TTL_MS")) {
                ns.ttl = Duration::from_millis(ms);
            }
        }

        config
    }

    /// Parse a TOML document. Missing fields take their default values;
    /// `namespaces` and `batching` tables are merged over the defaults.
    pub fn from_toml_str(source: &str) -> CortexResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| {
            CortexError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for development/testing with short intervals.
    pub fn development() -> Self {
        Self {
            health_check_interval: Duration::from_secs(5),
            optimization_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            engine_init_timeout: Duration::from_secs(2),
            health_probe_timeout: Duration::from_secs(1),
            chunk_throttle_delay: Duration::from_millis(10),
            ..Self::default()
        }
    }

    /// Batch thresholds for a request type.
    pub fn batch_config(&self, request_type: RequestType) -> BatchConfig {
        self.batching
            .get(request_type.as_str())
            .copied()
            .unwrap_or(self.default_batch)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CortexResult<()> {
        for (name, ns) in &self.namespaces {
            if ns.max_size == 0 {
                return Err(invalid(
                    format!("namespaces.{name}.max_size"),
                    ns.max_size.to_string(),
                    "max_size must be greater than 0",
                ));
            }
            if ns.ttl.is_zero() {
                return Err(invalid(
                    format!("namespaces.{name}.ttl_ms"),
                    "0".to_string(),
                    "ttl must be positive",
                ));
            }
        }

        let batch_configs = self
            .batching
            .iter()
            .map(|(name, b)| (format!("batching.{name}"), b))
            .chain(std::iter::once(("default_batch".to_string(), &self.default_batch)));
        for (field, batch) in batch_configs {
            if batch.batch_size == 0 {
                return Err(invalid(
                    format!("{field}.batch_size"),
                    "0".to_string(),
                    "batch_size must be greater than 0",
                ));
            }
            if batch.flush_interval.is_zero() {
                return Err(invalid(
                    format!("{field}.flush_interval_ms"),
                    "0".to_string(),
                    "flush_interval must be positive",
                ));
            }
        }

        let intervals = [
            ("health_check_interval_ms", self.health_check_interval),
            ("optimization_interval_ms", self.optimization_interval),
            ("request_timeout_ms", self.request_timeout),
            ("engine_init_timeout_ms", self.engine_init_timeout),
            ("health_probe_timeout_ms", self.health_probe_timeout),
        ];
        for (field, value) in intervals {
            if value.is_zero() {
                return Err(invalid(field.to_string(), "0".to_string(), "must be positive"));
            }
        }

        if self.max_batch_concurrency == 0 {
            return Err(invalid(
                "max_batch_concurrency".to_string(),
                "0".to_string(),
                "max_batch_concurrency must be greater than 0",
            ));
        }
        if self.batch_chunk_size == 0 {
            return Err(invalid(
                "batch_chunk_size".to_string(),
                "0".to_string(),
                "batch_chunk_size must be greater than 0",
            ));
        }

        let tuning = &self.cache_tuning;
        let fractions = [
            ("cache_tuning.low_utilization_hit_rate", tuning.low_utilization_hit_rate),
            ("cache_tuning.low_utilization_evict_fraction", tuning.low_utilization_evict_fraction),
            ("cache_tuning.poor_hit_rate", tuning.poor_hit_rate),
            ("cache_tuning.high_utilization", tuning.high_utilization),
        ];
        for (field, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(
                    field.to_string(),
                    value.to_string(),
                    "must be between 0.0 and 1.0",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: String, value: String, reason: &str) -> CortexError {
    CortexError::Config(ConfigError::InvalidValue {
        field,
        value,
        reason: reason.to_string(),
    })
}
