//! Per-model token pricing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Price per 1,000 tokens, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl ModelPricing {
    pub const fn new(input_cost_per_1k: f64, output_cost_per_1k: f64) -> Self {
        Self {
            input_cost_per_1k,
            output_cost_per_1k,
        }
    }

    /// Cost of a call with the given token counts.
    pub fn cost_for(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        let input = (prompt_tokens as f64 / 1000.0) * self.input_cost_per_1k;
        let output = (completion_tokens as f64 / 1000.0) * self.output_cost_per_1k;
        input + output
    }
}

/// Tier used for any model missing from the table.
pub const DEFAULT_PRICING: ModelPricing = ModelPricing::new(0.00015, 0.0006);

/// Model name to pricing, with a fallback tier for unknown models.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    fallback: ModelPricing,
}

impl PricingTable {
    pub fn new(fallback: ModelPricing) -> Self {
        Self {
            models: HashMap::new(),
            fallback,
        }
    }

    /// Table pre-populated with common OpenAI chat models.
    pub fn with_known_models() -> Self {
        let mut table = Self::default();
        table.insert("gpt-4o-mini", ModelPricing::new(0.00015, 0.0006));
        table.insert("gpt-4o", ModelPricing::new(0.0025, 0.01));
        table.insert("gpt-4.1", ModelPricing::new(0.002, 0.008));
        table.insert("gpt-4.1-mini", ModelPricing::new(0.0004, 0.0016));
        table.insert("gpt-4.1-nano", ModelPricing::new(0.0001, 0.0004));
        table
    }

    pub fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.models.insert(model.into(), pricing);
    }

    /// Merge entries from `overrides`, replacing existing models.
    pub fn extend(&mut self, overrides: &HashMap<String, ModelPricing>) {
        for (model, pricing) in overrides {
            self.models.insert(model.clone(), *pricing);
        }
    }

    /// Pricing for `model`, or the fallback tier when unknown.
    pub fn get(&self, model: &str) -> ModelPricing {
        self.models.get(model).copied().unwrap_or(self.fallback)
    }

    pub fn is_known(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new(DEFAULT_PRICING)
    }
}
