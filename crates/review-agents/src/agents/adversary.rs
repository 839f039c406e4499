//! Adversary agent: strongest objections to the argument.
//!
//! In panel mode three seats review independently on different models and
//! a reconcile call merges their objections, recording how many seats raised
//! each one. A failed reconcile falls back to the seat findings, each with a
//! single vote.

use std::fmt::Write as _;

use review_coordination::{AgentId, CallRole, Finding};
use tracing::{info, instrument, warn};

use super::briefing::Briefing;
use super::domain::EvidencePack;
use super::{AgentContext, AgentError, AgentOutput, AgentResult, FindingBatch};
use crate::prompts;

#[derive(Debug, Default, Clone, Copy)]
pub struct AdversaryAgent {
    pub panel_mode: bool,
}

impl AdversaryAgent {
    pub fn new(panel_mode: bool) -> Self {
        Self { panel_mode }
    }

    /// `raw_rigor` is the unrewritten rigor list; its titles steer the
    /// adversary away from repeating them.
    #[instrument(skip_all, fields(panel = self.panel_mode))]
    pub async fn run(
        &self,
        ctx: &AgentContext,
        briefing: &Briefing,
        evidence: &EvidencePack,
        raw_rigor: &[Finding],
    ) -> AgentResult<AgentOutput> {
        let system = prompts::steer(
            prompts::with_finding_rules(prompts::ADVERSARY_PREAMBLE),
            ctx.steering(),
        );
        let titles: Vec<String> = raw_rigor.iter().map(|f| f.title.clone()).collect();
        let user = prompts::adversary_user(briefing, evidence, &titles, &ctx.document);

        if self.panel_mode {
            return run_panel(ctx, &system, &user).await;
        }

        let (batch, metrics) = ctx
            .substrate
            .call::<FindingBatch>(CallRole::Adversary, &system, &user, None)
            .await?;
        Ok(AgentOutput {
            findings: batch.into_findings(AgentId::Adversary),
            metrics: vec![metrics],
        })
    }
}

async fn run_panel(ctx: &AgentContext, system: &str, user: &str) -> AgentResult<AgentOutput> {
    let seats = CallRole::panel_seats().map(|role| {
        let ctx = ctx.clone();
        async move {
            let result = ctx
                .substrate
                .call::<FindingBatch>(role, system, user, None)
                .await;
            (role, result)
        }
    });
    let results = futures::future::join_all(seats).await;

    let mut metrics = Vec::new();
    let mut seat_findings: Vec<(CallRole, Vec<Finding>)> = Vec::new();
    let mut last_error = None;
    for (role, result) in results {
        match result {
            Ok((batch, m)) => {
                metrics.push(m);
                seat_findings.push((role, batch.into_findings(AgentId::AdversaryPanel)));
            }
            Err(err) => {
                warn!(seat = role.as_str(), error = %err, "Panel seat failed");
                last_error = Some(err);
            }
        }
    }
    if seat_findings.is_empty() {
        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        return Err(AgentError::PanelExhausted(reason));
    }
    info!(seats = seat_findings.len(), "Panel seats finished");

    let reconcile_system = prompts::steer(
        prompts::with_finding_rules(prompts::PANEL_RECONCILE_PREAMBLE),
        ctx.steering(),
    );
    let reconcile_user = format!(
        "{}\n\n# Document\n\n{}",
        reconcile_prompt(&seat_findings),
        ctx.document.render_all()
    );
    match ctx
        .substrate
        .call::<FindingBatch>(CallRole::PanelReconcile, &reconcile_system, &reconcile_user, None)
        .await
    {
        Ok((batch, m)) => {
            metrics.push(m);
            Ok(AgentOutput {
                findings: batch
                    .into_findings(AgentId::AdversaryPanel)
                    .into_iter()
                    .map(|f| {
                        let votes = f.votes.unwrap_or(1);
                        f.with_votes(votes)
                    })
                    .collect(),
                metrics,
            })
        }
        Err(err) => {
            warn!(error = %err, "Panel reconcile failed, keeping seat findings");
            Ok(AgentOutput {
                findings: seat_findings
                    .into_iter()
                    .flat_map(|(_, findings)| findings)
                    .map(|f| f.with_votes(1))
                    .collect(),
                metrics,
            })
        }
    }
}

fn reconcile_prompt(seats: &[(CallRole, Vec<Finding>)]) -> String {
    let mut out = String::from("# Panel objections\n");
    for (role, findings) in seats {
        let _ = write!(out, "\n## Seat {}\n", role.as_str());
        if findings.is_empty() {
            out.push_str("(no objections)\n");
        }
        for finding in findings {
            let Some(anchor) = finding.anchors.first() else {
                continue;
            };
            let _ = writeln!(
                out,
                "- [{}] {} ({}, {}): {} | [{}] \"{}\"",
                finding.category.dimension(),
                finding.title,
                finding.severity,
                finding.confidence,
                finding.description,
                anchor.paragraph_id,
                anchor.quoted_text
            );
        }
    }
    out
}
