//! Per-call metrics and run-level aggregation
//!
//! Metrics are observational: they are aggregated for the report and never
//! feed back into scheduling or dedup.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::finding::AgentId;
use crate::registry::CallRole;

/// Position of a chunk inside an agent's fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPosition {
    pub index: usize,
    pub total: usize,
}

impl ChunkPosition {
    pub fn new(index: usize, total: usize) -> Self {
        Self { index, total }
    }
}

/// One completion call's accounting record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunMetrics {
    pub agent_id: AgentId,
    pub role: CallRole,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_total: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl AgentRunMetrics {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn chunk(&self) -> Option<ChunkPosition> {
        match (self.chunk_index, self.chunk_total) {
            (Some(index), Some(total)) => Some(ChunkPosition { index, total }),
            _ => None,
        }
    }
}

/// Totals for one model across a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
    pub cost_usd: f64,
}

impl ModelUsage {
    fn record(&mut self, m: &AgentRunMetrics) {
        self.calls += 1;
        self.input_tokens += m.input_tokens;
        self.output_tokens += m.output_tokens;
        self.latency_ms += m.latency_ms;
        self.cost_usd += m.cost_usd;
    }
}

/// Aggregated run metadata attached to the final report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub by_model: BTreeMap<String, ModelUsage>,
    pub total_cost_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Sum of call latencies; calls overlap, so this exceeds wall time.
    pub total_latency_ms: u64,
    /// Agents with at least one recorded call. Disabled agents never appear.
    pub agents_run: Vec<AgentId>,
}

impl RunMetadata {
    /// Sums in a canonical record order, so float totals do not depend on
    /// the order calls completed in.
    pub fn aggregate(metrics: &[AgentRunMetrics]) -> Self {
        let mut ordered: Vec<&AgentRunMetrics> = metrics.iter().collect();
        ordered.sort_by(|a, b| canonical_cmp(a, b));

        let mut by_model: BTreeMap<String, ModelUsage> = BTreeMap::new();
        let mut agents = BTreeSet::new();
        let mut totals = ModelUsage::default();

        for m in ordered {
            by_model.entry(m.model.clone()).or_default().record(m);
            totals.record(m);
            agents.insert(m.agent_id);
        }

        Self {
            by_model,
            total_cost_usd: totals.cost_usd,
            total_input_tokens: totals.input_tokens,
            total_output_tokens: totals.output_tokens,
            total_latency_ms: totals.latency_ms,
            agents_run: agents.into_iter().collect(),
        }
    }
}

fn canonical_cmp(a: &AgentRunMetrics, b: &AgentRunMetrics) -> Ordering {
    a.agent_id
        .cmp(&b.agent_id)
        .then(a.role.cmp(&b.role))
        .then_with(|| a.model.cmp(&b.model))
        .then(a.chunk_index.cmp(&b.chunk_index))
        .then(a.timestamp.cmp(&b.timestamp))
        .then(a.input_tokens.cmp(&b.input_tokens))
        .then(a.output_tokens.cmp(&b.output_tokens))
        .then(a.latency_ms.cmp(&b.latency_ms))
        .then(a.cost_usd.total_cmp(&b.cost_usd))
}

/// Cost of a batch of metrics records.
pub fn total_cost(metrics: &[AgentRunMetrics]) -> f64 {
    metrics.iter().map(|m| m.cost_usd).sum()
}


#[cfg(test)]
mod tests {
    use super::fixtures::metrics;
    use super::*;

    #[test]
    fn test_aggregate_groups_by_model() {
        let records = vec![
            metrics(AgentId::Clarity, CallRole::Clarity, "haiku", 0.01),
            metrics(AgentId::Clarity, CallRole::Clarity, "haiku", 0.02),
            metrics(AgentId::Adversary, CallRole::Adversary, "sonnet", 0.10),
        ];
        let meta = RunMetadata::aggregate(&records);

        assert_eq!(meta.by_model["haiku"].calls, 2);
        assert_eq!(meta.by_model["sonnet"].input_tokens, 100);
        assert!((meta.total_cost_usd - 0.13).abs() < 1e-9);
        assert_eq!(meta.total_input_tokens, 300);
        assert_eq!(meta.agents_run, vec![AgentId::Clarity, AgentId::Adversary]);
    }

    #[test]
    fn test_aggregate_empty() {
        let meta = RunMetadata::aggregate(&[]);
        assert!(meta.agents_run.is_empty());
        assert_eq!(meta.total_cost_usd, 0.0);
    }

    #[test]
    fn test_aggregate_ignores_completion_order() {
        let ts = Utc::now();
        let records: Vec<_> = [0.1, 0.2, 0.3]
            .into_iter()
            .enumerate()
            .map(|(i, cost)| {
                let mut m = metrics(AgentId::Clarity, CallRole::Clarity, "haiku", cost);
                m.chunk_index = Some(i);
                m.chunk_total = Some(3);
                m.timestamp = ts;
                m
            })
            .collect();
        let mut reversed = records.clone();
        reversed.reverse();

        let forward = serde_json::to_string(&RunMetadata::aggregate(&records)).unwrap();
        let backward = serde_json::to_string(&RunMetadata::aggregate(&reversed)).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_chunk_position() {
        let mut m = metrics(AgentId::Clarity, CallRole::Clarity, "haiku", 0.0);
        assert!(m.chunk().is_none());
        m.chunk_index = Some(1);
        m.chunk_total = Some(3);
        assert_eq!(m.chunk(), Some(ChunkPosition::new(1, 3)));
    }
}
