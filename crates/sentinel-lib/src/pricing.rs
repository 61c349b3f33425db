//! Pure pricing resolver
//!
//! Maps a resource descriptor to a USD amount using injected rate tables.
//! Rates are loaded once at startup and immutable thereafter; tests inject
//! their own tables instead of mutating process-wide state.

use crate::error::CostError;
use crate::models::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-1k-token USD rates for one LLM model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRate {
    pub input_per_1k_usd: f64,
    pub output_per_1k_usd: f64,
}

impl ModelRate {
    pub fn new(input_per_1k_usd: f64, output_per_1k_usd: f64) -> Self {
        Self {
            input_per_1k_usd,
            output_per_1k_usd,
        }
    }
}

/// Injected rate tables consumed by the resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Per-model LLM token rates
    #[serde(default = "default_llm_rates")]
    pub llm_rates: HashMap<String, ModelRate>,

    /// Optional fallback rate for unmapped models. When absent, an unmapped
    /// model fails with `UnknownPricing`.
    #[serde(default)]
    pub default_llm_rate: Option<ModelRate>,

    /// USD per CPU core-hour
    #[serde(default = "default_cpu_core_hour")]
    pub cpu_core_hour_usd: f64,

    /// USD per GB of memory per hour
    #[serde(default = "default_memory_gb_hour")]
    pub memory_gb_hour_usd: f64,

    /// USD per query, keyed by vector collection class
    #[serde(default)]
    pub vector_query_rates: HashMap<String, f64>,

    /// USD per query for collections without a class-specific rate
    #[serde(default = "default_vector_query_rate")]
    pub default_vector_query_rate: f64,
}

fn default_llm_rates() -> HashMap<String, ModelRate> {
    HashMap::from([
        ("gpt-4o".to_string(), ModelRate::new(0.0025, 0.010)),
        ("gpt-4o-mini".to_string(), ModelRate::new(0.00015, 0.0006)),
        ("gpt-4-turbo".to_string(), ModelRate::new(0.010, 0.030)),
    ])
}

fn default_cpu_core_hour() -> f64 {
    0.048
}

fn default_memory_gb_hour() -> f64 {
    0.0065
}

fn default_vector_query_rate() -> f64 {
    0.0001
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            llm_rates: default_llm_rates(),
            default_llm_rate: None,
            cpu_core_hour_usd: default_cpu_core_hour(),
            memory_gb_hour_usd: default_memory_gb_hour(),
            vector_query_rates: HashMap::new(),
            default_vector_query_rate: default_vector_query_rate(),
        }
    }
}

/// Stateless mapping from resource descriptors to USD amounts
#[derive(Debug, Clone)]
pub struct PricingResolver {
    config: PricingConfig,
}

impl PricingResolver {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Price an LLM call from its token usage
    ///
    /// Unmapped models fail with `UnknownPricing` unless a fallback rate is
    /// configured - the caller may substitute a default rate, but a zero-cost
    /// event is never produced silently.
    pub fn price_llm(&self, model: &str, usage: TokenUsage) -> Result<f64, CostError> {
        let rate = self
            .config
            .llm_rates
            .get(model)
            .copied()
            .or(self.config.default_llm_rate)
            .ok_or_else(|| CostError::UnknownPricing {
                resource: "llm model",
                key: model.to_string(),
            })?;

        Ok((usage.input_tokens as f64 / 1000.0) * rate.input_per_1k_usd
            + (usage.output_tokens as f64 / 1000.0) * rate.output_per_1k_usd)
    }

    /// Price compute usage from cores, memory, and duration
    pub fn price_infra(&self, cpu_cores: f64, memory_gb: f64, duration_minutes: f64) -> f64 {
        let hours = duration_minutes / 60.0;
        cpu_cores * self.config.cpu_core_hour_usd * hours
            + memory_gb * self.config.memory_gb_hour_usd * hours
    }

    /// Price vector-store queries, falling back to the default per-query rate
    /// for collections without a class-specific entry
    pub fn price_vector(&self, query_count: u64, collection: &str) -> f64 {
        let rate = self
            .config
            .vector_query_rates
            .get(collection)
            .copied()
            .unwrap_or(self.config.default_vector_query_rate);
        query_count as f64 * rate
    }
}

impl Default for PricingResolver {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_pricing_known_model() {
        let resolver = PricingResolver::default();
        let amount = resolver
            .price_llm("gpt-4o", TokenUsage::new(1000, 150))
            .unwrap();

        // 1.0 * 0.0025 + 0.15 * 0.010
        assert!((amount - 0.004).abs() < 1e-9);
    }

    #[test]
    fn test_llm_pricing_unknown_model_fails() {
        let resolver = PricingResolver::default();
        let result = resolver.price_llm("unknown-model", TokenUsage::new(100, 100));

        assert!(matches!(
            result,
            Err(CostError::UnknownPricing { key, .. }) if key == "unknown-model"
        ));
    }

    #[test]
    fn test_llm_pricing_fallback_rate() {
        let config = PricingConfig {
            default_llm_rate: Some(ModelRate::new(0.001, 0.002)),
            ..Default::default()
        };
        let resolver = PricingResolver::new(config);

        let amount = resolver
            .price_llm("brand-new-model", TokenUsage::new(2000, 500))
            .unwrap();
        assert!((amount - (2.0 * 0.001 + 0.5 * 0.002)).abs() < 1e-9);
    }

    #[test]
    fn test_infra_pricing() {
        let config = PricingConfig {
            cpu_core_hour_usd: 0.06,
            memory_gb_hour_usd: 0.01,
            ..Default::default()
        };
        let resolver = PricingResolver::new(config);

        // 0.5 cores, 1 GB, 30 minutes
        let amount = resolver.price_infra(0.5, 1.0, 30.0);
        assert!((amount - (0.5 * 0.06 * 0.5 + 1.0 * 0.01 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_vector_pricing_class_rate_and_fallback() {
        let config = PricingConfig {
            vector_query_rates: HashMap::from([("premium".to_string(), 0.001)]),
            default_vector_query_rate: 0.0001,
            ..Default::default()
        };
        let resolver = PricingResolver::new(config);

        assert!((resolver.price_vector(10, "premium") - 0.01).abs() < 1e-9);
        assert!((resolver.price_vector(10, "standard") - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_zero_usage_is_zero_cost() {
        let resolver = PricingResolver::default();
        let amount = resolver.price_llm("gpt-4o", TokenUsage::new(0, 0)).unwrap();
        assert_eq!(amount, 0.0);
        assert_eq!(resolver.price_infra(0.0, 0.0, 0.0), 0.0);
        assert_eq!(resolver.price_vector(0, "any"), 0.0);
    }
}
