//! Cost accounting: turns a model id and token usage into a dollar cost.
//!
//! Supplements the distilled spec (which tracks `total_cost` on `Goal` and
//! `Execution` but never says how it's computed) with the pricing table
//! the original Python orchestrator keeps alongside its cost-tracking
//! logic — per-model dollars-per-million-tokens, looked up by prefix match
//! the same way `AgentAdapter` picks a back-end.

use crate::domain::models::TokenUsage;

#[derive(Debug, Clone, Copy)]
struct Pricing {
    prefix: &'static str,
    input_per_million: f64,
    output_per_million: f64,
}

const PRICING_TABLE: &[Pricing] = &[
    Pricing { prefix: "opus", input_per_million: 15.0, output_per_million: 75.0 },
    Pricing { prefix: "sonnet", input_per_million: 3.0, output_per_million: 15.0 },
    Pricing { prefix: "haiku", input_per_million: 0.80, output_per_million: 4.0 },
    Pricing { prefix: "gemini", input_per_million: 1.25, output_per_million: 5.0 },
    Pricing { prefix: "gpt", input_per_million: 2.50, output_per_million: 10.0 },
];

/// Fallback pricing applied when `model` doesn't match any known prefix,
/// so an unrecognized model id still produces a conservative non-zero
/// estimate rather than silently reporting free usage.
const FALLBACK: Pricing = Pricing { prefix: "unknown", input_per_million: 5.0, output_per_million: 20.0 };

pub fn estimate_cost(model: &str, usage: TokenUsage) -> f64 {
    let pricing = PRICING_TABLE
        .iter()
        .find(|p| model.starts_with(p.prefix))
        .unwrap_or(&FALLBACK);

    let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * pricing.input_per_million;
    let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * pricing.output_per_million;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_prefix_is_matched() {
        let cost = estimate_cost("sonnet-default", TokenUsage::new(1_000_000, 0));
        assert!((cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_conservative_pricing() {
        let cost = estimate_cost("some-experimental-model", TokenUsage::new(1_000_000, 0));
        assert!((cost - 5.0).abs() < 1e-9);
    }

    #[test]
    fn zero_usage_is_free() {
        assert_eq!(estimate_cost("opus-4", TokenUsage::default()), 0.0);
    }
}
