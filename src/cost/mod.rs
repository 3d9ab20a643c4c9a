//! Cost accounting and budget enforcement
//!
//! Per-model USD rates are a static lookup; the tracker accumulates cost
//! across every model invocation in a workflow and gates phases on the
//! configured budget. Budget exhaustion is never recoverable.

use thiserror::Error;

use crate::llm::TokenUsage;

/// Model pricing tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Sonnet,
    Opus,
    Haiku,
}

impl ModelTier {
    /// Classify a model identifier string
    pub fn from_model(model: &str) -> Self {
        if model.contains("opus") {
            Self::Opus
        } else if model.contains("haiku") {
            Self::Haiku
        } else {
            Self::Sonnet
        }
    }

    /// (input, output) USD per million tokens
    pub fn rates(&self) -> (f64, f64) {
        match self {
            Self::Opus => (15.0, 75.0),
            Self::Sonnet => (3.0, 15.0),
            Self::Haiku => (0.25, 1.25),
        }
    }
}

/// Cost of one invocation in USD
pub fn invocation_cost(usage: TokenUsage, model: &str) -> f64 {
    let (input_rate, output_rate) = ModelTier::from_model(model).rates();
    (usage.input_tokens as f64 * input_rate + usage.output_tokens as f64 * output_rate) / 1e6
}

/// Raised when the cumulative cost reaches the budget
#[derive(Debug, Error)]
#[error("Budget exceeded: ${spent:.2} of ${budget:.2} spent")]
pub struct BudgetExceeded {
    pub spent: f64,
    pub budget: f64,
}

/// Cumulative cost accounting for one workflow
#[derive(Debug, Clone)]
pub struct CostTracker {
    cumulative_usd: f64,
    max_budget_usd: f64,
}

impl CostTracker {
    /// Tracker with the given budget; +inf means unlimited
    pub fn new(max_budget_usd: f64) -> Self {
        Self {
            cumulative_usd: 0.0,
            max_budget_usd,
        }
    }

    /// Record one model invocation, returning its cost
    pub fn record(&mut self, usage: TokenUsage, model: &str) -> f64 {
        let cost = invocation_cost(usage, model);
        self.cumulative_usd += cost;
        cost
    }

    /// Fold an already-computed cost in (e.g. from a restored session)
    pub fn add_cost(&mut self, cost_usd: f64) {
        self.cumulative_usd += cost_usd;
    }

    /// Total spent so far
    pub fn cumulative_usd(&self) -> f64 {
        self.cumulative_usd
    }

    /// Budget gate, checked pre-phase and pre-iteration
    pub fn check_budget(&self) -> Result<(), BudgetExceeded> {
        if self.cumulative_usd >= self.max_budget_usd {
            Err(BudgetExceeded {
                spent: self.cumulative_usd,
                budget: self.max_budget_usd,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_model() {
        assert_eq!(ModelTier::from_model("claude-opus-4"), ModelTier::Opus);
        assert_eq!(ModelTier::from_model("claude-sonnet-4-20250514"), ModelTier::Sonnet);
        assert_eq!(ModelTier::from_model("claude-haiku-3-5"), ModelTier::Haiku);
        // Unknown models are priced as sonnet
        assert_eq!(ModelTier::from_model("mystery"), ModelTier::Sonnet);
    }

    #[test]
    fn test_invocation_cost_sonnet() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
        };
        // $3 input + $1.50 output
        let cost = invocation_cost(usage, "claude-sonnet-4");
        assert!((cost - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_invocation_cost_opus() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
        };
        // $15 input + $7.50 output
        let cost = invocation_cost(usage, "claude-opus-4");
        assert!((cost - 22.5).abs() < 1e-9);
    }

    #[test]
    fn test_tracker_accumulates() {
        let mut tracker = CostTracker::new(10.0);
        tracker.record(
            TokenUsage {
                input_tokens: 500_000,
                output_tokens: 200_000,
            },
            "claude-sonnet-4",
        );
        // $1.50 + $3.00
        assert!((tracker.cumulative_usd() - 4.5).abs() < 1e-9);

        tracker.add_cost(0.5);
        assert!((tracker.cumulative_usd() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_budget_gate() {
        let mut tracker = CostTracker::new(1.0);
        assert!(tracker.check_budget().is_ok());

        tracker.add_cost(0.99);
        assert!(tracker.check_budget().is_ok());

        tracker.add_cost(0.01);
        let err = tracker.check_budget().unwrap_err();
        assert!(err.to_string().contains("Budget exceeded"));
    }

    #[test]
    fn test_zero_budget_fails_immediately() {
        let tracker = CostTracker::new(0.0);
        assert!(tracker.check_budget().is_err());
    }

    #[test]
    fn test_unlimited_budget_never_fails() {
        let mut tracker = CostTracker::new(f64::INFINITY);
        tracker.add_cost(1e9);
        assert!(tracker.check_budget().is_ok());
    }
}
