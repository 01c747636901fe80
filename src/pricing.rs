//! Per-model quota weights.
//!
//! Quota is the billable cost of a request: input quota is fixed when the
//! buffer is created (history tokens × input weight), output quota grows by one
//! output weight per written chunk.

use crate::token_counting::TokenEstimator;
use crate::types::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TokenWeight {
    /// Quota per prompt token.
    pub input: f32,
    /// Quota per streamed chunk.
    pub output: f32,
}

impl Default for TokenWeight {
    fn default() -> Self {
        Self {
            input: 0.001,
            output: 0.002,
        }
    }
}

/// Read-only model → weight table. Built once and shared behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotaTable {
    pub default: TokenWeight,
    pub models: HashMap<String, TokenWeight>,
}

impl Default for QuotaTable {
    fn default() -> Self {
        let models = [
            ("gpt-3.5-turbo", 0.0005, 0.0015),
            ("gpt-3.5-turbo-instruct", 0.0015, 0.002),
            ("gpt-4", 0.03, 0.06),
            ("gpt-4-turbo", 0.01, 0.03),
            ("gpt-4-vision-preview", 0.01, 0.03),
            ("gpt-4o", 0.005, 0.015),
        ]
        .into_iter()
        .map(|(id, input, output)| (id.to_string(), TokenWeight { input, output }))
        .collect();

        Self {
            default: TokenWeight::default(),
            models,
        }
    }
}

impl QuotaTable {
    /// Exact match first, then the longest configured prefix, then the default.
    pub fn weight(&self, model: &str) -> TokenWeight {
        if let Some(weight) = self.models.get(model) {
            return *weight;
        }
        self.models
            .iter()
            .filter(|(id, _)| model.starts_with(id.as_str()))
            .max_by_key(|(id, _)| id.len())
            .map(|(_, weight)| *weight)
            .unwrap_or(self.default)
    }

    pub fn input_quota(&self, model: &str, history: &[Message]) -> f32 {
        let tokens = TokenEstimator::estimate_history_tokens(model, history);
        tokens as f32 * self.weight(model).input
    }

    pub fn output_quota(&self, model: &str, writes: usize) -> f32 {
        writes as f32 * self.weight(model).output
    }

    /// Merges an OpenRouter-style `/models` listing into the table. Prices may
    /// be numbers or numeric strings; entries without pricing are skipped.
    pub fn merge_pricing_json(&mut self, json: &serde_json::Value) -> usize {
        let mut merged = 0;
        if let Some(models) = json.get("data").and_then(|d| d.as_array()) {
            for m in models {
                if let (Some(id), Some(p)) = (m.get("id").and_then(|v| v.as_str()), m.get("pricing")) {
                    self.models.insert(id.to_string(), parse_single_model_pricing(p));
                    merged += 1;
                }
            }
        }
        merged
    }
}

fn parse_single_model_pricing(p: &serde_json::Value) -> TokenWeight {
    let parse_f32 = |key: &str| -> f32 {
        match p.get(key) {
            Some(val) => {
                if let Some(f) = val.as_f64() {
                    return f as f32;
                }
                val.as_str()
                    .and_then(|s| s.parse::<f32>().ok())
                    .unwrap_or(0.0)
            }
            None => 0.0,
        }
    };

    TokenWeight {
        input: parse_f32("prompt"),
        output: parse_f32("completion"),
    }
}
