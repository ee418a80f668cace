//! Generation limits and runtime knobs, threaded explicitly through every stage.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ConfigError;

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_BUNDLE_BYTES: usize = 51_200;
pub const DEFAULT_MAX_RULES_PER_BUNDLE: usize = 130;
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 10;
pub const DEFAULT_PACK_PREFIX: &str = "ism-controls";
/// Pack names must stay valid conformance pack names once numbered.
pub const MAX_PACK_PREFIX_LEN: usize = 100;

/// Limits and tuning for one pack generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    pub batch_size: usize,
    pub max_bundle_bytes: usize,
    pub max_rules_per_bundle: usize,
    pub max_concurrent_batches: usize,
    pub max_concurrent_rules_per_batch: usize,
    /// Per inference call. Must be shorter than `batch_timeout`.
    pub enrichment_timeout: Duration,
    pub batch_timeout: Duration,
    pub enrichment_max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub max_output_tokens: u32,
    /// Upper bound on reference corpus bytes embedded in a prompt.
    pub max_corpus_bytes: usize,
    pub assembly_wait: Duration,
    pub assembly_poll_interval: Duration,
    pub pack_prefix: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_bundle_bytes: DEFAULT_MAX_BUNDLE_BYTES,
            max_rules_per_bundle: DEFAULT_MAX_RULES_PER_BUNDLE,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            max_concurrent_rules_per_batch: 4,
            enrichment_timeout: Duration::from_secs(60),
            batch_timeout: Duration::from_secs(900),
            enrichment_max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            max_output_tokens: 4096,
            max_corpus_bytes: 100_000,
            assembly_wait: Duration::from_secs(120),
            assembly_poll_interval: Duration::from_secs(2),
            pack_prefix: DEFAULT_PACK_PREFIX.to_string(),
        }
    }
}

/// Partial overrides for [`GenerationConfig`]. Used for config file parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfigOverrides {
    pub batch_size: Option<usize>,
    pub max_bundle_bytes: Option<usize>,
    pub max_rules_per_bundle: Option<usize>,
    pub max_concurrent_batches: Option<usize>,
    pub max_concurrent_rules_per_batch: Option<usize>,
    pub enrichment_timeout_secs: Option<u64>,
    pub batch_timeout_secs: Option<u64>,
    pub enrichment_max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub max_output_tokens: Option<u32>,
    pub max_corpus_bytes: Option<usize>,
    pub assembly_wait_secs: Option<u64>,
    pub assembly_poll_interval_ms: Option<u64>,
    pub pack_prefix: Option<String>,
}

impl GenerationConfigOverrides {
    /// Read overrides from environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `CONPACK_BATCH_SIZE` | `batch_size` |
    /// | `CONPACK_MAX_BUNDLE_BYTES` | `max_bundle_bytes` |
    /// | `CONPACK_MAX_RULES_PER_BUNDLE` | `max_rules_per_bundle` |
    /// | `CONPACK_MAX_CONCURRENT_BATCHES` | `max_concurrent_batches` |
    /// | `CONPACK_ENRICHMENT_TIMEOUT_SECS` | `enrichment_timeout` |
    /// | `CONPACK_ENRICHMENT_MAX_RETRIES` | `enrichment_max_retries` |
    /// | `CONPACK_PACK_PREFIX` | `pack_prefix` |
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        Self {
            batch_size: parsed("CONPACK_BATCH_SIZE"),
            max_bundle_bytes: parsed("CONPACK_MAX_BUNDLE_BYTES"),
            max_rules_per_bundle: parsed("CONPACK_MAX_RULES_PER_BUNDLE"),
            max_concurrent_batches: parsed("CONPACK_MAX_CONCURRENT_BATCHES"),
            enrichment_timeout_secs: parsed("CONPACK_ENRICHMENT_TIMEOUT_SECS"),
            enrichment_max_retries: parsed("CONPACK_ENRICHMENT_MAX_RETRIES"),
            pack_prefix: std::env::var("CONPACK_PACK_PREFIX")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            ..Self::default()
        }
    }

    /// Layer `other` on top of `self`; `Some` values in `other` win.
    pub fn merge(self, other: Self) -> Self {
        Self {
            batch_size: other.batch_size.or(self.batch_size),
            max_bundle_bytes: other.max_bundle_bytes.or(self.max_bundle_bytes),
            max_rules_per_bundle: other.max_rules_per_bundle.or(self.max_rules_per_bundle),
            max_concurrent_batches: other.max_concurrent_batches.or(self.max_concurrent_batches),
            max_concurrent_rules_per_batch: other
                .max_concurrent_rules_per_batch
                .or(self.max_concurrent_rules_per_batch),
            enrichment_timeout_secs: other
                .enrichment_timeout_secs
                .or(self.enrichment_timeout_secs),
            batch_timeout_secs: other.batch_timeout_secs.or(self.batch_timeout_secs),
            enrichment_max_retries: other.enrichment_max_retries.or(self.enrichment_max_retries),
            retry_base_delay_ms: other.retry_base_delay_ms.or(self.retry_base_delay_ms),
            retry_max_delay_ms: other.retry_max_delay_ms.or(self.retry_max_delay_ms),
            max_output_tokens: other.max_output_tokens.or(self.max_output_tokens),
            max_corpus_bytes: other.max_corpus_bytes.or(self.max_corpus_bytes),
            assembly_wait_secs: other.assembly_wait_secs.or(self.assembly_wait_secs),
            assembly_poll_interval_ms: other
                .assembly_poll_interval_ms
                .or(self.assembly_poll_interval_ms),
            pack_prefix: other.pack_prefix.or(self.pack_prefix),
        }
    }
}

impl GenerationConfig {
    /// Apply overrides onto these values. Only `Some` values override.
    pub fn apply(self, o: GenerationConfigOverrides) -> Self {
        Self {
            batch_size: o.batch_size.unwrap_or(self.batch_size),
            max_bundle_bytes: o.max_bundle_bytes.unwrap_or(self.max_bundle_bytes),
            max_rules_per_bundle: o.max_rules_per_bundle.unwrap_or(self.max_rules_per_bundle),
            max_concurrent_batches: o
                .max_concurrent_batches
                .unwrap_or(self.max_concurrent_batches),
            max_concurrent_rules_per_batch: o
                .max_concurrent_rules_per_batch
                .unwrap_or(self.max_concurrent_rules_per_batch),
            enrichment_timeout: o
                .enrichment_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.enrichment_timeout),
            batch_timeout: o
                .batch_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.batch_timeout),
            enrichment_max_retries: o
                .enrichment_max_retries
                .unwrap_or(self.enrichment_max_retries),
            retry_base_delay: o
                .retry_base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.retry_base_delay),
            retry_max_delay: o
                .retry_max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.retry_max_delay),
            max_output_tokens: o.max_output_tokens.unwrap_or(self.max_output_tokens),
            max_corpus_bytes: o.max_corpus_bytes.unwrap_or(self.max_corpus_bytes),
            assembly_wait: o
                .assembly_wait_secs
                .map(Duration::from_secs)
                .unwrap_or(self.assembly_wait),
            assembly_poll_interval: o
                .assembly_poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(self.assembly_poll_interval),
            pack_prefix: o.pack_prefix.unwrap_or(self.pack_prefix),
        }
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().apply(GenerationConfigOverrides::from_env())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
            Ok(())
        }

        positive("batch_size", self.batch_size)?;
        positive("max_bundle_bytes", self.max_bundle_bytes)?;
        positive("max_rules_per_bundle", self.max_rules_per_bundle)?;
        positive("max_concurrent_batches", self.max_concurrent_batches)?;
        positive(
            "max_concurrent_rules_per_batch",
            self.max_concurrent_rules_per_batch,
        )?;
        positive("max_corpus_bytes", self.max_corpus_bytes)?;

        if self.enrichment_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "enrichment_timeout",
                "must be greater than zero",
            ));
        }
        if self.enrichment_timeout >= self.batch_timeout {
            return Err(ConfigError::invalid(
                "enrichment_timeout",
                format!(
                    "must be shorter than batch_timeout ({:?} >= {:?})",
                    self.enrichment_timeout, self.batch_timeout
                ),
            ));
        }
        if self.retry_base_delay > self.retry_max_delay {
            return Err(ConfigError::invalid(
                "retry_base_delay",
                "must not exceed retry_max_delay",
            ));
        }
        if self.assembly_poll_interval.is_zero() {
            return Err(ConfigError::invalid(
                "assembly_poll_interval",
                "must be greater than zero",
            ));
        }
        if self.pack_prefix.trim().is_empty() {
            return Err(ConfigError::invalid("pack_prefix", "must not be empty"));
        }
        if self.pack_prefix.len() > MAX_PACK_PREFIX_LEN {
            return Err(ConfigError::invalid(
                "pack_prefix",
                format!("must be at most {MAX_PACK_PREFIX_LEN} characters"),
            ));
        }
        if !self
            .pack_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::invalid(
                "pack_prefix",
                "must contain only alphanumeric characters, hyphens, and underscores",
            ));
        }
        Ok(())
    }
}
