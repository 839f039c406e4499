//! Event types for review progress
//!
//! These events are the only thing a caller observes while a run is in
//! flight. They serialize as `{"type": "...", ...}` objects.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assembler::ReviewReport;
use crate::finding::{AgentId, Finding};

/// A schedulable stage of the review graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Briefing,
    Domain,
    Clarity,
    RigorFind,
    RigorRewrite,
    Adversary,
    Assembler,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Briefing => "briefing",
            Stage::Domain => "domain",
            Stage::Clarity => "clarity",
            Stage::RigorFind => "rigor_find",
            Stage::RigorRewrite => "rigor_rewrite",
            Stage::Adversary => "adversary",
            Stage::Assembler => "assembler",
        }
    }

    /// The agent whose profile labels this stage. The assembler has none.
    pub fn agent(self) -> Option<AgentId> {
        match self {
            Stage::Briefing => Some(AgentId::Briefing),
            Stage::Domain => Some(AgentId::Domain),
            Stage::Clarity => Some(AgentId::Clarity),
            Stage::RigorFind => Some(AgentId::RigorFind),
            Stage::RigorRewrite => Some(AgentId::RigorRewrite),
            Stage::Adversary => Some(AgentId::Adversary),
            Stage::Assembler => None,
        }
    }

    /// UI title and subtitle for the stage.
    pub fn labels(self) -> (&'static str, &'static str) {
        match self.agent() {
            Some(agent) => {
                let profile = agent.profile();
                (profile.title, profile.subtitle)
            }
            None => ("Synthesizing results", "Validating, deduplicating and ordering"),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one fan-out chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkOutcome {
    Succeeded { findings_count: usize },
    Failed { error: String },
}

/// All review progress events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewEvent {
    /// A stage began work
    StageStarted {
        stage: Stage,
        title: String,
        subtitle: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage finished, possibly with zero findings
    StageCompleted {
        stage: Stage,
        findings_count: usize,
        elapsed_ms: u64,
        cost_usd: f64,
        timestamp: DateTime<Utc>,
    },

    /// One chunk of a fan-out agent finished
    ChunkCompleted {
        agent: AgentId,
        chunk_index: usize,
        chunk_total: usize,
        outcome: ChunkOutcome,
        timestamp: DateTime<Utc>,
    },

    /// A finding entered the run accumulator
    FindingDiscovered {
        finding: Box<Finding>,
        timestamp: DateTime<Utc>,
    },

    /// The assembled report; always the last event of a successful run
    RunCompleted {
        report: Box<ReviewReport>,
        timestamp: DateTime<Utc>,
    },

    /// A stage failed. Non-recoverable errors end the run.
    RunError {
        message: String,
        recoverable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
        timestamp: DateTime<Utc>,
    },
}

impl ReviewEvent {
    pub fn stage_started(stage: Stage) -> Self {
        let (title, subtitle) = stage.labels();
        Self::started_with(stage, title, subtitle)
    }

    /// Stage start labelled by the agent actually running it, e.g. the
    /// adversary panel in panel mode.
    pub fn stage_started_by(stage: Stage, agent: AgentId) -> Self {
        let profile = agent.profile();
        Self::started_with(stage, profile.title, profile.subtitle)
    }

    fn started_with(stage: Stage, title: &str, subtitle: &str) -> Self {
        Self::StageStarted {
            stage,
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn stage_completed(stage: Stage, findings_count: usize, elapsed_ms: u64, cost_usd: f64) -> Self {
        Self::StageCompleted {
            stage,
            findings_count,
            elapsed_ms,
            cost_usd,
            timestamp: Utc::now(),
        }
    }

    pub fn chunk_completed(agent: AgentId, index: usize, total: usize, outcome: ChunkOutcome) -> Self {
        Self::ChunkCompleted {
            agent,
            chunk_index: index,
            chunk_total: total,
            outcome,
            timestamp: Utc::now(),
        }
    }

    pub fn finding_discovered(finding: Finding) -> Self {
        Self::FindingDiscovered {
            finding: Box::new(finding),
            timestamp: Utc::now(),
        }
    }

    pub fn run_completed(report: ReviewReport) -> Self {
        Self::RunCompleted {
            report: Box::new(report),
            timestamp: Utc::now(),
        }
    }

    pub fn run_error(message: impl Into<String>, recoverable: bool, stage: Option<Stage>) -> Self {
        Self::RunError {
            message: message.into(),
            recoverable,
            stage,
            timestamp: Utc::now(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ReviewEvent::StageStarted { timestamp, .. }
            | ReviewEvent::StageCompleted { timestamp, .. }
            | ReviewEvent::ChunkCompleted { timestamp, .. }
            | ReviewEvent::FindingDiscovered { timestamp, .. }
            | ReviewEvent::RunCompleted { timestamp, .. }
            | ReviewEvent::RunError { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ReviewEvent::StageStarted { .. } => "stage_started",
            ReviewEvent::StageCompleted { .. } => "stage_completed",
            ReviewEvent::ChunkCompleted { .. } => "chunk_completed",
            ReviewEvent::FindingDiscovered { .. } => "finding_discovered",
            ReviewEvent::RunCompleted { .. } => "run_completed",
            ReviewEvent::RunError { .. } => "run_error",
        }
    }

    /// Whether the event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReviewEvent::RunCompleted { .. } | ReviewEvent::RunError { recoverable: false, .. }
        )
    }
}
