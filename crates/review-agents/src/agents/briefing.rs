//! Briefing agent: one read of the whole document.
//!
//! Every other agent except the domain pipeline waits for the briefing, and
//! a failed briefing ends the run.

use review_coordination::{AgentRunMetrics, CallRole};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{AgentContext, AgentResult};
use crate::prompts;

/// Compact description of the document shared with downstream agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Briefing {
    pub summary: String,
    pub main_claims: Vec<String>,
    pub stated_scope: String,
    pub stated_limitations: Vec<String>,
    pub methodology_summary: String,
    pub domain_keywords: Vec<String>,
}

impl Briefing {
    pub fn is_empty(&self) -> bool {
        self == &Briefing::default()
    }

    /// Markdown block for downstream prompts.
    pub fn format_for_prompt(&self) -> String {
        if self.is_empty() {
            return "## Document briefing\n(not available)".to_string();
        }
        let mut out = format!("## Document briefing\n{}", self.summary);
        push_list(&mut out, "Main claims", &self.main_claims);
        if !self.stated_scope.is_empty() {
            out.push_str(&format!("\n\n**Stated scope:** {}", self.stated_scope));
        }
        push_list(&mut out, "Stated limitations", &self.stated_limitations);
        if !self.methodology_summary.is_empty() {
            out.push_str(&format!("\n\n**Methodology:** {}", self.methodology_summary));
        }
        if !self.domain_keywords.is_empty() {
            out.push_str(&format!("\n\n**Keywords:** {}", self.domain_keywords.join(", ")));
        }
        out
    }
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n\n**{heading}:**"));
    for item in items {
        out.push_str(&format!("\n- {item}"));
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BriefingAgent;

impl BriefingAgent {
    #[instrument(skip_all, fields(document = %ctx.document.document_id))]
    pub async fn run(&self, ctx: &AgentContext) -> AgentResult<(Briefing, AgentRunMetrics)> {
        let system = prompts::steer(prompts::BRIEFING_PREAMBLE.to_string(), ctx.steering());
        let user = prompts::briefing_user(&ctx.document);
        let (briefing, metrics) = ctx
            .substrate
            .call::<Briefing>(CallRole::Briefing, &system, &user, None)
            .await?;
        Ok((briefing, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_briefing_renders_placeholder() {
        assert!(Briefing::default().format_for_prompt().contains("not available"));
    }

    #[test]
    fn test_briefing_renders_sections() {
        let briefing = Briefing {
            summary: "A small trial.".into(),
            main_claims: vec!["It works".into()],
            domain_keywords: vec!["rct".into(), "pilot".into()],
            ..Default::default()
        };
        let text = briefing.format_for_prompt();
        assert!(text.contains("**Main claims:**\n- It works"));
        assert!(text.contains("**Keywords:** rct, pilot"));
        assert!(!text.contains("Stated scope"));
    }

    #[test]
    fn test_partial_model_output_parses() {
        let briefing: Briefing = serde_json::from_str(r#"{"summary": "S"}"#).unwrap();
        assert_eq!(briefing.summary, "S");
        assert!(briefing.main_claims.is_empty());
    }
}
