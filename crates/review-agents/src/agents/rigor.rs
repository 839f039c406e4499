//! Rigor agents: a per-section finder and a single-call rewriter.
//!
//! The finder's raw output is not reported directly. It feeds the rewriter
//! and the adversary; the rewriter attaches concrete edits and re-attributes
//! the findings to itself. If the rewrite fails, the orchestrator reports the
//! raw findings instead.

use std::collections::HashMap;
use std::sync::Arc;

use review_coordination::{
    chunk_by_section, AgentId, CallRole, ChunkDescriptor, ChunkPosition, Document, Finding,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::briefing::Briefing;
use super::fan_out::{review_chunk, FanOut};
use super::{AgentContext, AgentOutput, AgentResult, DraftEdit};
use crate::prompts;

#[derive(Debug, Clone, Copy)]
pub struct RigorFinder {
    pub context_sentences: usize,
}

impl RigorFinder {
    pub fn new(context_sentences: usize) -> Self {
        Self { context_sentences }
    }

    pub fn chunks(&self, document: &Document) -> Vec<ChunkDescriptor> {
        chunk_by_section(document, self.context_sentences)
    }

    /// Launch one review call per section.
    pub fn fan_out(&self, ctx: &AgentContext, briefing: Arc<Briefing>) -> FanOut {
        let chunks = self.chunks(&ctx.document);
        let system: Arc<str> = prompts::steer(
            prompts::with_finding_rules(prompts::RIGOR_FIND_PREAMBLE),
            ctx.steering(),
        )
        .into();

        FanOut::spawn(chunks, |chunk| {
            let user = prompts::chunk_user(&briefing, &ctx.document, &chunk);
            review_chunk(
                ctx.clone(),
                CallRole::RigorFind,
                system.clone(),
                user,
                ChunkPosition::new(chunk.index, chunk.total),
            )
        })
    }
}

/// One rewrite keyed by the finding it fixes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Rewrite {
    pub finding_id: String,
    pub edit: DraftEdit,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RewriteBatch {
    #[serde(default)]
    pub rewrites: Vec<Rewrite>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RigorRewriter;

impl RigorRewriter {
    #[instrument(skip_all, fields(findings = raw.len()))]
    pub async fn run(&self, ctx: &AgentContext, raw: &[Finding]) -> AgentResult<AgentOutput> {
        let system = prompts::steer(prompts::RIGOR_REWRITE_PREAMBLE.to_string(), ctx.steering());
        let user = rewrite_prompt(&ctx.document, raw);
        let (batch, metrics) = ctx
            .substrate
            .call::<RewriteBatch>(CallRole::RigorRewrite, &system, &user, None)
            .await?;

        Ok(AgentOutput {
            findings: apply_rewrites(raw, batch),
            metrics: vec![metrics],
        })
    }
}

fn rewrite_prompt(document: &Document, raw: &[Finding]) -> String {
    let mut out = String::from("# Rigor findings to fix\n");
    for finding in raw {
        let Some(anchor) = finding.anchors.first() else {
            continue;
        };
        let paragraph = document
            .paragraph(&anchor.paragraph_id)
            .map(|p| p.text.as_str())
            .unwrap_or("(paragraph not found)");
        out.push_str(&format!(
            "\n## Finding {}\n**Issue:** {} ({})\n{}\n**Quote:** \"{}\"\n**Paragraph [{}]:** {}\n",
            finding.id,
            finding.title,
            finding.severity,
            finding.description,
            anchor.quoted_text,
            anchor.paragraph_id,
            paragraph
        ));
    }
    out
}

/// Attach edits to the raw findings they name; every finding moves to the
/// rewrite agent whether or not it received an edit.
fn apply_rewrites(raw: &[Finding], batch: RewriteBatch) -> Vec<Finding> {
    let mut edits: HashMap<String, DraftEdit> = HashMap::new();
    for rewrite in batch.rewrites {
        edits.entry(rewrite.finding_id).or_insert(rewrite.edit);
    }

    raw.iter()
        .cloned()
        .map(|mut finding| {
            finding.agent_id = AgentId::RigorRewrite;
            let anchor = finding.anchors.first().cloned();
            if let (Some(edit), Some(anchor)) = (edits.remove(&finding.id), anchor) {
                finding.proposed_edit = Some(edit.into_edit(&anchor));
            }
            finding
        })
        .inspect(|f| debug!(finding = %f.id, edited = f.proposed_edit.is_some(), "Rewrite applied"))
        .collect()
}
