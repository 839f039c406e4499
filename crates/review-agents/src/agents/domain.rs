//! Domain agent: external-evidence pipeline.
//!
//! ```text
//! document ─▶ targets ─▶ queries ─▶ searches (concurrent) ─▶ synthesis ─▶ EvidencePack
//! ```
//!
//! The pipeline produces no findings of its own. Its evidence pack grounds
//! the adversary's objections. Individual search failures are tolerated;
//! a failure in any other stage fails the agent.

use review_coordination::{AgentRunMetrics, CallRole, ChunkPosition};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{AgentContext, AgentResult};
use crate::prompts;

/// Default cap on search queries per run.
pub const DEFAULT_MAX_QUERIES: usize = 6;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DomainTargets {
    pub field: String,
    pub claims: Vec<String>,
    pub methods: Vec<String>,
    pub keywords: Vec<String>,
}

impl DomainTargets {
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty() && self.methods.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct QueryPlan {
    #[serde(default)]
    pub queries: Vec<SearchQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Source {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SearchAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceItem {
    pub point: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceConfidence {
    High,
    Medium,
    #[default]
    Low,
}

impl EvidenceConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Literature evidence handed to the adversary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EvidencePack {
    pub design_limitations: Vec<EvidenceItem>,
    pub prior_work: Vec<EvidenceItem>,
    pub contradictions: Vec<EvidenceItem>,
    pub field_consensus: Vec<EvidenceItem>,
    pub method_context: Vec<EvidenceItem>,
    pub failed_attempts: Vec<EvidenceItem>,
    pub sources: Vec<Source>,
    pub confidence: EvidenceConfidence,
    pub gaps: Vec<String>,
}

impl EvidencePack {
    /// An empty pack that records why it is empty.
    pub fn with_gap(gap: impl Into<String>) -> Self {
        Self {
            gaps: vec![gap.into()],
            ..Default::default()
        }
    }

    fn buckets(&self) -> [(&'static str, &[EvidenceItem]); 6] {
        [
            ("Design limitations", &self.design_limitations),
            ("Prior work", &self.prior_work),
            ("Contradictions", &self.contradictions),
            ("Field consensus", &self.field_consensus),
            ("Method context", &self.method_context),
            ("Failed attempts", &self.failed_attempts),
        ]
    }

    pub fn has_content(&self) -> bool {
        self.buckets().iter().any(|(_, items)| !items.is_empty())
    }

    pub fn format_for_prompt(&self) -> String {
        let mut out = format!("## Evidence pack (confidence: {})", self.confidence.as_str());
        for (heading, items) in self.buckets() {
            if items.is_empty() {
                continue;
            }
            out.push_str(&format!("\n\n**{heading}:**"));
            for item in items {
                match &item.source {
                    Some(source) => out.push_str(&format!("\n- {} [{}]", item.point, source)),
                    None => out.push_str(&format!("\n- {}", item.point)),
                }
            }
        }
        if !self.gaps.is_empty() {
            out.push_str(&format!("\n\n**Gaps:** {}", self.gaps.join("; ")));
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DomainPipeline {
    pub max_queries: usize,
}

impl Default for DomainPipeline {
    fn default() -> Self {
        Self {
            max_queries: DEFAULT_MAX_QUERIES,
        }
    }
}

impl DomainPipeline {
    pub fn new(max_queries: usize) -> Self {
        Self { max_queries }
    }

    #[instrument(skip_all, fields(document = %ctx.document.document_id))]
    pub async fn run(&self, ctx: &AgentContext) -> AgentResult<(EvidencePack, Vec<AgentRunMetrics>)> {
        let mut metrics = Vec::new();

        let (targets, m) = ctx
            .substrate
            .call::<DomainTargets>(
                CallRole::DomainTargets,
                prompts::DOMAIN_TARGETS_PREAMBLE,
                &prompts::briefing_user(&ctx.document),
                None,
            )
            .await?;
        metrics.push(m);
        if targets.is_empty() {
            info!("No domain targets identified");
            return Ok((
                EvidencePack::with_gap("No claims needing outside evidence were identified"),
                metrics,
            ));
        }

        let (plan, m) = ctx
            .substrate
            .call::<QueryPlan>(
                CallRole::DomainQueries,
                prompts::DOMAIN_QUERIES_PREAMBLE,
                &targets_prompt(&targets),
                None,
            )
            .await?;
        metrics.push(m);
        let queries: Vec<SearchQuery> = plan
            .queries
            .into_iter()
            .filter(|q| !q.query.trim().is_empty())
            .take(self.max_queries)
            .collect();
        if queries.is_empty() {
            return Ok((EvidencePack::with_gap("No search queries were generated"), metrics));
        }

        let total = queries.len();
        let searches = queries.iter().enumerate().map(|(index, query)| {
            let ctx = ctx.clone();
            let user = format!("{}\n\nPurpose: {}", query.query, query.purpose);
            async move {
                ctx.substrate
                    .call::<SearchAnswer>(
                        CallRole::DomainSearch,
                        prompts::DOMAIN_SEARCH_PREAMBLE,
                        &user,
                        Some(ChunkPosition::new(index, total)),
                    )
                    .await
            }
        });
        let results = futures::future::join_all(searches).await;

        let mut answers = Vec::new();
        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok((answer, m)) => {
                    metrics.push(m);
                    answers.push((query, answer));
                }
                Err(err) => warn!(query = %query.query, error = %err, "Search failed, continuing"),
            }
        }
        info!(queries = total, answered = answers.len(), "Domain searches finished");
        if answers.is_empty() {
            return Ok((EvidencePack::with_gap("All literature searches failed"), metrics));
        }

        let (pack, m) = ctx
            .substrate
            .call::<EvidencePack>(
                CallRole::DomainSynthesis,
                prompts::DOMAIN_SYNTHESIS_PREAMBLE,
                &synthesis_prompt(&targets, &answers),
                None,
            )
            .await?;
        metrics.push(m);
        Ok((pack, metrics))
    }
}

fn targets_prompt(targets: &DomainTargets) -> String {
    let list = |items: &[String]| {
        items
            .iter()
            .map(|i| format!("- {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Field: {}\n\nClaims:\n{}\n\nMethods:\n{}\n\nKeywords: {}",
        targets.field,
        list(&targets.claims),
        list(&targets.methods),
        targets.keywords.join(", ")
    )
}

fn synthesis_prompt(targets: &DomainTargets, answers: &[(&SearchQuery, SearchAnswer)]) -> String {
    let mut out = targets_prompt(targets);
    for (query, answer) in answers {
        out.push_str(&format!("\n\n## Query: {}\n{}", query.query, answer.answer));
        for source in &answer.sources {
            match &source.url {
                Some(url) => out.push_str(&format!("\n- {} ({url})", source.title)),
                None => out.push_str(&format!("\n- {}", source.title)),
            }
        }
    }
    out
}
