//! Cycle metrics
//!
//! Records per-cycle timings and quality flags for automation around the
//! orchestrator. Observational only; no part of the state machine reads
//! these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded polling/processing cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub items_discovered: usize,
    pub success: bool,
}

/// Collector for cycle records
#[derive(Debug, Clone, Default)]
pub struct CycleMetrics {
    cycles: Vec<CycleRecord>,
}

impl CycleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, started_at: DateTime<Utc>, duration_ms: u64, items_discovered: usize, success: bool) {
        self.cycles.push(CycleRecord {
            started_at,
            duration_ms,
            items_discovered,
            success,
        });
    }

    pub fn cycles(&self) -> &[CycleRecord] {
        &self.cycles
    }

    /// Total items discovered across all cycles
    pub fn total_items(&self) -> usize {
        self.cycles.iter().map(|c| c.items_discovered).sum()
    }

    /// Fraction of cycles that succeeded, 1.0 when none ran
    pub fn success_rate(&self) -> f64 {
        if self.cycles.is_empty() {
            return 1.0;
        }
        let ok = self.cycles.iter().filter(|c| c.success).count();
        ok as f64 / self.cycles.len() as f64
    }

    /// Mean cycle duration in milliseconds, 0 when none ran
    pub fn mean_duration_ms(&self) -> f64 {
        if self.cycles.is_empty() {
            return 0.0;
        }
        let total: u64 = self.cycles.iter().map(|c| c.duration_ms).sum();
        total as f64 / self.cycles.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let metrics = CycleMetrics::new();
        assert_eq!(metrics.total_items(), 0);
        assert_eq!(metrics.success_rate(), 1.0);
        assert_eq!(metrics.mean_duration_ms(), 0.0);
    }

    #[test]
    fn test_aggregates() {
        let mut metrics = CycleMetrics::new();
        metrics.record(Utc::now(), 100, 2, true);
        metrics.record(Utc::now(), 300, 0, true);
        metrics.record(Utc::now(), 200, 1, false);

        assert_eq!(metrics.cycles().len(), 3);
        assert_eq!(metrics.total_items(), 3);
        assert!((metrics.success_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.mean_duration_ms() - 200.0).abs() < 1e-9);
    }
}
