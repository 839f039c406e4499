//! Review agents.
//!
//! Each agent wraps one or more completion calls made through the shared
//! [`AgentCallSubstrate`] and turns structured model output into
//! [`Finding`]s. Agents know nothing about scheduling; the orchestrator
//! decides when each one runs and what it receives.
//!
//! Model output arrives as [`DraftFinding`]s: a flat shape that is easy for
//! a model to fill in. Drafts with an empty quote are discarded here;
//! drafts pointing at unknown paragraphs survive until assembly.

pub mod adversary;
pub mod briefing;
pub mod clarity;
pub mod domain;
pub mod fan_out;
pub mod rigor;

use std::sync::Arc;

use review_coordination::{
    AgentCallSubstrate, AgentId, AgentRunMetrics, Anchor, Category, CompletionError, Document,
    EditKind, Finding, ProposedEdit, Severity,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use fan_out::{ChunkReport, FanOut};

/// Error type for agent runs
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("{agent}: all {total} chunks failed")]
    AllChunksFailed { agent: AgentId, total: usize },

    #[error("Every panel seat failed: {0}")]
    PanelExhausted(String),
}

/// Result type for agent runs
pub type AgentResult<T> = Result<T, AgentError>;

/// What an agent hands back to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    pub findings: Vec<Finding>,
    pub metrics: Vec<AgentRunMetrics>,
}

impl AgentOutput {
    pub fn cost_usd(&self) -> f64 {
        review_coordination::metrics::total_cost(&self.metrics)
    }
}

/// Everything an agent needs for one run. Cheap to clone.
#[derive(Clone)]
pub struct AgentContext {
    pub substrate: AgentCallSubstrate,
    pub document: Arc<Document>,
    pub steering: Option<Arc<str>>,
}

impl AgentContext {
    pub fn new(substrate: AgentCallSubstrate, document: Arc<Document>) -> Self {
        Self {
            substrate,
            document,
            steering: None,
        }
    }

    pub fn with_steering(mut self, memo: Option<&str>) -> Self {
        self.steering = memo.map(Arc::from);
        self
    }

    pub fn steering(&self) -> Option<&str> {
        self.steering.as_deref()
    }
}

// ── Model-facing shapes ─────────────────────────────────────────────

/// Edit as proposed by a model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DraftEdit {
    pub kind: EditKind,
    /// Text the edit applies to; defaults to the finding's quote.
    #[serde(default)]
    pub quoted_text: Option<String>,
    #[serde(default)]
    pub new_text: Option<String>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub suggestion: Option<String>,
}

impl DraftEdit {
    fn into_edit(self, finding_anchor: &Anchor) -> ProposedEdit {
        let anchor = match self.quoted_text.filter(|q| !q.trim().is_empty()) {
            Some(quoted_text) => Anchor {
                paragraph_id: finding_anchor.paragraph_id.clone(),
                sentence_id: finding_anchor.sentence_id.clone(),
                quoted_text,
            },
            None => finding_anchor.clone(),
        };
        ProposedEdit {
            kind: self.kind,
            anchor,
            new_text: self.new_text,
            rationale: self.rationale,
            suggestion: self.suggestion,
        }
    }
}

/// A finding as a model reports it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DraftFinding {
    pub category: Category,
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub paragraph_id: String,
    #[serde(default)]
    pub sentence_id: Option<String>,
    pub quoted_text: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub proposed_edit: Option<DraftEdit>,
    /// Panel reconciliation only: reviewers who raised the point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<u8>,
}

impl DraftFinding {
    pub fn into_finding(self, agent: AgentId) -> Option<Finding> {
        let anchor = match Anchor::new(&self.paragraph_id, self.sentence_id.clone(), &self.quoted_text) {
            Ok(anchor) => anchor,
            Err(err) => {
                debug!(agent = %agent, error = %err, "Discarding draft finding");
                return None;
            }
        };
        let mut finding = Finding::new(
            agent,
            self.category,
            self.severity,
            self.title,
            self.description,
            vec![anchor.clone()],
        )
        .ok()?;
        if let Some(confidence) = self.confidence {
            finding = finding.with_confidence(confidence);
        }
        if let Some(edit) = self.proposed_edit {
            finding = finding.with_edit(edit.into_edit(&anchor));
        }
        if let Some(votes) = self.votes {
            finding = finding.with_votes(votes);
        }
        Some(finding)
    }
}

/// Output schema for finding-producing calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FindingBatch {
    #[serde(default)]
    pub findings: Vec<DraftFinding>,
}

impl FindingBatch {
    pub fn into_findings(self, agent: AgentId) -> Vec<Finding> {
        self.findings
            .into_iter()
            .filter_map(|draft| draft.into_finding(agent))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(quote: &str) -> DraftFinding {
        serde_json::from_value(serde_json::json!({
            "category": "clarity_sentence",
            "severity": "minor",
            "title": "Dense sentence",
            "paragraph_id": "p_001",
            "quoted_text": quote,
            "proposed_edit": {"kind": "replace", "new_text": "Shorter."}
        }))
        .unwrap()
    }

    #[test]
    fn test_draft_conversion() {
        let finding = draft("long winded").into_finding(AgentId::Clarity).unwrap();
        assert_eq!(finding.agent_id, AgentId::Clarity);
        assert_eq!(finding.confidence, review_coordination::finding::DEFAULT_CONFIDENCE);
        let edit = finding.proposed_edit.unwrap();
        assert_eq!(edit.anchor.quoted_text, "long winded");
        assert_eq!(edit.kind, EditKind::Replace);
    }

    #[test]
    fn test_blank_quote_discarded() {
        let batch = FindingBatch {
            findings: vec![draft("  "), draft("kept")],
        };
        assert_eq!(batch.into_findings(AgentId::Clarity).len(), 1);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let raw = serde_json::json!({
            "category": "vibes",
            "severity": "minor",
            "title": "t",
            "paragraph_id": "p",
            "quoted_text": "q"
        });
        assert!(serde_json::from_value::<DraftFinding>(raw).is_err());
    }

    #[test]
    fn test_empty_batch_from_empty_object() {
        let batch: FindingBatch = serde_json::from_str("{}").unwrap();
        assert!(batch.findings.is_empty());
    }
}
