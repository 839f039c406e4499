//! Findings and the fixed agent vocabulary
//!
//! Agent ids, categories and tracks are closed enums with lookup tables so
//! that an unknown identifier fails when a finding is built or parsed, never
//! later during priority or track lookup.
//!
//! # Agent table
//!
//! ```text
//! agent            track          priority  rank
//! ───────────────  ─────────────  ────────  ────
//! briefing         writing           4       5
//! clarity          writing           3       1
//! rigor_find       argumentation     2       2
//! rigor_rewrite    methodology       2       2
//! domain           argumentation     2       3
//! adversary        argumentation     1       4
//! adversary_panel  argumentation     1       4
//! ```
//!
//! Priority decides dedup conflicts (lower wins), rank decides presentation
//! order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Maximum finding title length in characters.
pub const MAX_TITLE_CHARS: usize = 100;

/// Default confidence when an agent reports none.
pub const DEFAULT_CONFIDENCE: f32 = 0.8;

/// Error type for finding construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FindingError {
    #[error("A finding needs at least one anchor")]
    NoAnchors,

    #[error("Anchor in paragraph {0} has empty quoted text")]
    EmptyQuote(String),

    #[error("Unknown agent id: {0}")]
    UnknownAgent(String),
}

/// Result type for finding construction
pub type FindingResult<T> = Result<T, FindingError>;

// ── Agents and tracks ───────────────────────────────────────────────

/// Coarse classification used only for conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Writing,
    Methodology,
    Argumentation,
}

/// Static properties of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentProfile {
    pub track: Track,
    /// Dedup priority, lower wins.
    pub priority: u8,
    /// Presentation rank, lower sorts first.
    pub rank: u8,
    pub title: &'static str,
    pub subtitle: &'static str,
}

/// Identifier of the agent that produced a finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    Briefing,
    Clarity,
    RigorFind,
    RigorRewrite,
    Domain,
    Adversary,
    AdversaryPanel,
}

impl AgentId {
    pub fn all() -> &'static [AgentId] {
        &[
            AgentId::Briefing,
            AgentId::Clarity,
            AgentId::RigorFind,
            AgentId::RigorRewrite,
            AgentId::Domain,
            AgentId::Adversary,
            AgentId::AdversaryPanel,
        ]
    }

    pub const fn profile(self) -> AgentProfile {
        match self {
            AgentId::Briefing => AgentProfile {
                track: Track::Writing,
                priority: 4,
                rank: 5,
                title: "Reading document",
                subtitle: "Extracting claims, scope and limitations",
            },
            AgentId::Clarity => AgentProfile {
                track: Track::Writing,
                priority: 3,
                rank: 1,
                title: "Reviewing writing clarity",
                subtitle: "Sentence, paragraph and flow issues",
            },
            // Unrewritten rigor output argues about reasoning; only findings
            // that passed the rewrite stage carry the methodology exemption.
            AgentId::RigorFind => AgentProfile {
                track: Track::Argumentation,
                priority: 2,
                rank: 2,
                title: "Finding methodological issues",
                subtitle: "Methods, logic, evidence and statistics",
            },
            AgentId::RigorRewrite => AgentProfile {
                track: Track::Methodology,
                priority: 2,
                rank: 2,
                title: "Generating rewrites",
                subtitle: "Proposing concrete fixes for rigor issues",
            },
            AgentId::Domain => AgentProfile {
                track: Track::Argumentation,
                priority: 2,
                rank: 3,
                title: "Researching domain context",
                subtitle: "Searching prior work and field consensus",
            },
            AgentId::Adversary => AgentProfile {
                track: Track::Argumentation,
                priority: 1,
                rank: 4,
                title: "Challenging arguments",
                subtitle: "Weaknesses, gaps and alternative explanations",
            },
            AgentId::AdversaryPanel => AgentProfile {
                track: Track::Argumentation,
                priority: 1,
                rank: 4,
                title: "Challenging arguments",
                subtitle: "Panel of three reviewers",
            },
        }
    }

    pub const fn track(self) -> Track {
        self.profile().track
    }

    pub const fn priority(self) -> u8 {
        self.profile().priority
    }

    pub const fn rank(self) -> u8 {
        self.profile().rank
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentId::Briefing => "briefing",
            AgentId::Clarity => "clarity",
            AgentId::RigorFind => "rigor_find",
            AgentId::RigorRewrite => "rigor_rewrite",
            AgentId::Domain => "domain",
            AgentId::Adversary => "adversary",
            AgentId::AdversaryPanel => "adversary_panel",
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = FindingError;

    fn from_str(s: &str) -> FindingResult<Self> {
        AgentId::all()
            .iter()
            .copied()
            .find(|agent| agent.as_str() == s)
            .ok_or_else(|| FindingError::UnknownAgent(s.to_string()))
    }
}

// ── Categories and severity ─────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Suggestion,
    Minor,
    Major,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Suggestion => "suggestion",
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ClaritySentence,
    ClarityParagraph,
    ClaritySection,
    ClarityFlow,
    RigorMethodology,
    RigorLogic,
    RigorEvidence,
    RigorStatistics,
    ScopeOverclaim,
    ScopeUnderclaim,
    ScopeMissing,
    DomainConvention,
    DomainTerminology,
    DomainFactual,
    AdversarialWeakness,
    AdversarialGap,
    AdversarialAlternative,
}

impl Category {
    /// Dimension tag seeded onto every finding of this category.
    pub fn dimension(self) -> &'static str {
        match self {
            Category::ClaritySentence
            | Category::ClarityParagraph
            | Category::ClaritySection
            | Category::ClarityFlow => "clarity",
            Category::RigorMethodology
            | Category::RigorLogic
            | Category::RigorEvidence
            | Category::RigorStatistics => "rigor",
            Category::ScopeOverclaim | Category::ScopeUnderclaim | Category::ScopeMissing => {
                "scope"
            }
            Category::DomainConvention | Category::DomainTerminology | Category::DomainFactual => {
                "domain"
            }
            Category::AdversarialWeakness
            | Category::AdversarialGap
            | Category::AdversarialAlternative => "adversarial",
        }
    }
}

// ── Anchors and edits ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Anchor {
    pub paragraph_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_id: Option<String>,
    pub quoted_text: String,
}

impl Anchor {
    pub fn new(
        paragraph_id: impl Into<String>,
        sentence_id: Option<String>,
        quoted_text: impl Into<String>,
    ) -> FindingResult<Self> {
        let paragraph_id = paragraph_id.into();
        let quoted_text = quoted_text.into();
        if quoted_text.trim().is_empty() {
            return Err(FindingError::EmptyQuote(paragraph_id));
        }
        Ok(Self {
            paragraph_id,
            sentence_id,
            quoted_text,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Replace,
    Delete,
    InsertBefore,
    InsertAfter,
    Suggestion,
}

impl EditKind {
    /// Whether applying the edit rewrites the anchored text.
    pub fn replaces_text(self) -> bool {
        !matches!(self, EditKind::Suggestion)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedEdit {
    pub kind: EditKind,
    pub anchor: Anchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_text: Option<String>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ProposedEdit {
    /// Turn a text-replacing edit into a free-form suggestion, keeping the
    /// replacement text as the suggestion body.
    pub fn downgrade(&mut self) {
        if self.suggestion.is_none() {
            self.suggestion = self.new_text.take();
        }
        self.kind = EditKind::Suggestion;
    }
}

// ── Finding ─────────────────────────────────────────────────────────

/// A reported issue anchored to document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub agent_id: AgentId,
    pub category: Category,
    pub severity: Severity,
    pub confidence: f32,
    pub title: String,
    pub description: String,
    #[serde(deserialize_with = "non_empty_anchors")]
    pub anchors: Vec<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_edit: Option<ProposedEdit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

fn non_empty_anchors<'de, D>(deserializer: D) -> Result<Vec<Anchor>, D::Error>
where
    D: Deserializer<'de>,
{
    let anchors = Vec::<Anchor>::deserialize(deserializer)?;
    validate_anchors(&anchors).map_err(serde::de::Error::custom)?;
    Ok(anchors)
}

fn validate_anchors(anchors: &[Anchor]) -> FindingResult<()> {
    if anchors.is_empty() {
        return Err(FindingError::NoAnchors);
    }
    if let Some(blank) = anchors.iter().find(|a| a.quoted_text.trim().is_empty()) {
        return Err(FindingError::EmptyQuote(blank.paragraph_id.clone()));
    }
    Ok(())
}

impl Finding {
    pub fn new(
        agent_id: AgentId,
        category: Category,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        anchors: Vec<Anchor>,
    ) -> FindingResult<Self> {
        validate_anchors(&anchors)?;
        let title: String = title.into();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            agent_id,
            category,
            severity,
            confidence: DEFAULT_CONFIDENCE,
            title: title.chars().take(MAX_TITLE_CHARS).collect(),
            description: description.into(),
            anchors,
            proposed_edit: None,
            votes: None,
            tags: vec![category.dimension().to_string()],
            metadata: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_edit(mut self, edit: ProposedEdit) -> Self {
        self.proposed_edit = Some(edit);
        self
    }

    pub fn with_votes(mut self, votes: u8) -> Self {
        self.votes = Some(votes.clamp(1, 3));
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn track(&self) -> Track {
        self.agent_id.track()
    }

    /// Anchors that point into the given paragraph.
    pub fn anchors_in<'a>(&'a self, paragraph_id: &'a str) -> impl Iterator<Item = &'a Anchor> {
        self.anchors
            .iter()
            .filter(move |a| a.paragraph_id == paragraph_id)
    }

    /// Add tags not already present, keeping insertion order.
    pub fn merge_tags<'a>(&mut self, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            if !self.tags.contains(tag) {
                self.tags.push(tag.clone());
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_table_ordering() {
        assert!(AgentId::Adversary.priority() < AgentId::RigorFind.priority());
        assert!(AgentId::RigorFind.priority() < AgentId::Clarity.priority());
        assert!(AgentId::Clarity.priority() < AgentId::Briefing.priority());
        assert!(AgentId::Clarity.rank() < AgentId::RigorRewrite.rank());
        assert!(AgentId::Domain.rank() < AgentId::AdversaryPanel.rank());
        assert_eq!(AgentId::RigorRewrite.track(), Track::Methodology);
    }

    #[test]
    fn test_agent_id_parse() {
        assert_eq!("rigor_find".parse::<AgentId>().unwrap(), AgentId::RigorFind);
        assert!(matches!(
            "editor".parse::<AgentId>(),
            Err(FindingError::UnknownAgent(_))
        ));
        let err = serde_json::from_str::<AgentId>("\"editor\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Critical > Severity::Major);
        assert!(Severity::Major > Severity::Minor);
        assert!(Severity::Minor > Severity::Suggestion);
    }

    #[test]
    fn test_finding_requires_anchor() {
        let err = Finding::new(
            AgentId::Clarity,
            Category::ClarityFlow,
            Severity::Minor,
            "t",
            "d",
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, FindingError::NoAnchors);
        assert!(Anchor::new("p1", None, "   ").is_err());
    }

    #[test]
    fn test_finding_defaults() {
        let long_title = "x".repeat(150);
        let f = Finding::new(
            AgentId::Clarity,
            Category::ClarityFlow,
            Severity::Minor,
            long_title,
            "d",
            vec![Anchor::new("p1", None, "quote").unwrap()],
        )
        .unwrap()
        .with_confidence(1.7)
        .with_votes(9);
        assert_eq!(f.title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(f.confidence, 1.0);
        assert_eq!(f.votes, Some(3));
        assert_eq!(f.tags, vec!["clarity".to_string()]);
    }

    #[test]
    fn test_deserialize_rejects_empty_anchors() {
        let raw = serde_json::json!({
            "id": "f1",
            "agent_id": "clarity",
            "category": "clarity_flow",
            "severity": "minor",
            "confidence": 0.5,
            "title": "t",
            "description": "d",
            "anchors": [],
            "created_at": "2024-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<Finding>(raw).is_err());
    }

    #[test]
    fn test_merge_tags_dedups() {
        let mut f = fixtures::finding("a", AgentId::Adversary, "p1", "q");
        f.merge_tags(&["clarity".to_string(), "adversarial".to_string()]);
        assert_eq!(f.tags, vec!["adversarial".to_string(), "clarity".to_string()]);
    }

    #[test]
    fn test_edit_downgrade_keeps_text() {
        let mut edit = ProposedEdit {
            kind: EditKind::Replace,
            anchor: Anchor::new("p1", None, "old").unwrap(),
            new_text: Some("new".into()),
            rationale: "r".into(),
            suggestion: None,
        };
        edit.downgrade();
        assert_eq!(edit.kind, EditKind::Suggestion);
        assert!(!edit.kind.replaces_text());
        assert_eq!(edit.suggestion.as_deref(), Some("new"));
    }
}
