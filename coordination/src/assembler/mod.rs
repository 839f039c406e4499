//! Assembler: validate, deduplicate and order a run's findings
//!
//! [`Assembler::assemble`] is a pure function of the document and the
//! accumulated findings and metrics. Input is first put into a canonical
//! order, so completion timing and chunk interleaving cannot change the
//! output.
//!
//! ```text
//! raw findings
//!     │ canonical order (document position, agent, id)
//!     ▼
//! A  validation ── unknown paragraph ─────────────▶ dropped
//!     │          ── ungrounded edit, argumentation ▶ downgraded to suggestion
//!     │          ── ungrounded edit, other tracks ─▶ dropped
//!     ▼
//! B  methodology findings ─────────────────────────────────┐
//!     │ (never deduplicated)                               │
//!     ▼                                                    │
//! C  group by paragraph, pairwise overlap, loser removed   │
//!     │ and its tags merged onto the winner                │
//!     ▼                                                    ▼
//! D  stable sort by presentation rank ◀────────────────────┘
//! ```

pub mod overlap;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::Document;
use crate::finding::{Finding, Severity, Track};
use crate::metrics::{AgentRunMetrics, RunMetadata};

pub use overlap::{OverlapDetector, TextOverlap};

/// Counts describing the assembled finding set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total_findings: usize,
    pub by_track: BTreeMap<Track, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_dimension: BTreeMap<String, usize>,
    /// Dropped during validation.
    pub rejected: usize,
    /// Removed as duplicates of a higher-priority finding.
    pub merged: usize,
    /// Kept with their edit turned into a suggestion.
    pub downgraded: usize,
}

/// Final output of a review run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub findings: Vec<Finding>,
    pub summary: ReviewSummary,
    pub metadata: RunMetadata,
}

/// Deterministic post-processor for a run's findings.
pub struct Assembler {
    detector: Box<dyn OverlapDetector>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(TextOverlap::default())
    }
}

impl Assembler {
    pub fn new(detector: impl OverlapDetector + 'static) -> Self {
        Self {
            detector: Box::new(detector),
        }
    }

    pub fn assemble(
        &self,
        document: &Document,
        findings: &[Finding],
        metrics: &[AgentRunMetrics],
    ) -> ReviewReport {
        let mut summary = ReviewSummary::default();

        let ordered = canonical_order(document, findings);
        let mut kept = validate(document, ordered, &mut summary);
        let removed = self.resolve_overlaps(&mut kept, &mut summary);

        let mut survivors: Vec<Finding> = kept
            .into_iter()
            .zip(removed)
            .filter_map(|(finding, removed)| (!removed).then_some(finding))
            .collect();
        survivors.sort_by_key(|f| f.agent_id.rank());

        for f in &survivors {
            *summary.by_track.entry(f.track()).or_default() += 1;
            *summary.by_severity.entry(f.severity).or_default() += 1;
            *summary
                .by_dimension
                .entry(f.category.dimension().to_string())
                .or_default() += 1;
        }
        summary.total_findings = survivors.len();

        info!(
            input = findings.len(),
            output = survivors.len(),
            rejected = summary.rejected,
            merged = summary.merged,
            downgraded = summary.downgraded,
            "Assembly complete"
        );

        ReviewReport {
            findings: survivors,
            summary,
            metadata: RunMetadata::aggregate(metrics),
        }
    }

    /// Stage B and C. Returns a removal mask parallel to `findings`.
    fn resolve_overlaps(&self, findings: &mut [Finding], summary: &mut ReviewSummary) -> Vec<bool> {
        let mut removed = vec![false; findings.len()];

        // Groups keyed by paragraph, in first-appearance order.
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        let mut slot: HashMap<String, usize> = HashMap::new();
        for (idx, finding) in findings.iter().enumerate() {
            if finding.track() == Track::Methodology {
                continue;
            }
            for anchor in &finding.anchors {
                let position = *slot.entry(anchor.paragraph_id.clone()).or_insert_with(|| {
                    groups.push((anchor.paragraph_id.clone(), Vec::new()));
                    groups.len() - 1
                });
                let members = &mut groups[position].1;
                if !members.contains(&idx) {
                    members.push(idx);
                }
            }
        }

        for (paragraph_id, members) in &groups {
            for (i, &a) in members.iter().enumerate() {
                if removed[a] {
                    continue;
                }
                for &b in &members[i + 1..] {
                    if removed[b] || !self.overlap_in(&findings[a], &findings[b], paragraph_id) {
                        continue;
                    }
                    let (winner, loser) = if first_wins(&findings[a], &findings[b]) {
                        (a, b)
                    } else {
                        (b, a)
                    };
                    let tags = findings[loser].tags.clone();
                    findings[winner].merge_tags(&tags);
                    removed[loser] = true;
                    summary.merged += 1;
                    info!(
                        paragraph = %paragraph_id,
                        winner = %findings[winner].agent_id,
                        loser = %findings[loser].agent_id,
                        winner_id = %findings[winner].id,
                        loser_id = %findings[loser].id,
                        "Merged overlapping findings"
                    );
                    if loser == a {
                        break;
                    }
                }
            }
        }
        removed
    }

    fn overlap_in(&self, a: &Finding, b: &Finding, paragraph_id: &str) -> bool {
        a.anchors_in(paragraph_id)
            .any(|x| b.anchors_in(paragraph_id).any(|y| self.detector.overlaps(x, y)))
    }
}

/// Argumentation beats Writing outright; otherwise lower priority wins and
/// the earlier finding wins a tie.
fn first_wins(a: &Finding, b: &Finding) -> bool {
    match (a.track(), b.track()) {
        (Track::Argumentation, Track::Writing) => true,
        (Track::Writing, Track::Argumentation) => false,
        _ => a.agent_id.priority() <= b.agent_id.priority(),
    }
}

/// Sort by first anchor position, then agent, then id. Findings sharing an
/// id fall back to their serialized content.
fn canonical_order(document: &Document, findings: &[Finding]) -> Vec<Finding> {
    let mut ordered = findings.to_vec();
    ordered.sort_by_cached_key(|f| {
        (
            first_position(document, f),
            f.agent_id,
            f.id.clone(),
            serde_json::to_string(f).unwrap_or_default(),
        )
    });
    ordered
}

fn first_position(document: &Document, finding: &Finding) -> usize {
    finding
        .anchors
        .first()
        .and_then(|a| document.position(&a.paragraph_id))
        .unwrap_or(usize::MAX)
}

/// Stage A.
fn validate(document: &Document, findings: Vec<Finding>, summary: &mut ReviewSummary) -> Vec<Finding> {
    let mut kept = Vec::with_capacity(findings.len());
    for mut finding in findings {
        if let Some(anchor) = finding
            .anchors
            .iter()
            .find(|a| !document.contains_paragraph(&a.paragraph_id))
        {
            warn!(
                finding = %finding.id,
                agent = %finding.agent_id,
                paragraph = %anchor.paragraph_id,
                "Dropping finding: anchor paragraph not in document"
            );
            summary.rejected += 1;
            continue;
        }

        let ungrounded = finding.proposed_edit.as_ref().is_some_and(|edit| {
            edit.kind.replaces_text()
                && !document
                    .paragraph(&edit.anchor.paragraph_id)
                    .is_some_and(|p| p.text.contains(&edit.anchor.quoted_text))
        });
        if ungrounded {
            if finding.track() == Track::Argumentation {
                if let Some(edit) = finding.proposed_edit.as_mut() {
                    edit.downgrade();
                }
                info!(
                    finding = %finding.id,
                    agent = %finding.agent_id,
                    "Downgraded ungrounded edit to suggestion"
                );
                summary.downgraded += 1;
            } else {
                warn!(
                    finding = %finding.id,
                    agent = %finding.agent_id,
                    "Dropping finding: edit quote not found in paragraph"
                );
                summary.rejected += 1;
                continue;
            }
        }

        kept.push(finding);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fixtures::sample_document;
    use crate::finding::fixtures::finding;
    use crate::finding::{AgentId, Anchor, EditKind, ProposedEdit};

    fn edit(kind: EditKind, paragraph: &str, quote: &str) -> ProposedEdit {
        ProposedEdit {
            kind,
            anchor: Anchor::new(paragraph, None, quote).unwrap(),
            new_text: Some("replacement".into()),
            rationale: "because".into(),
            suggestion: None,
        }
    }

    fn assemble(findings: &[Finding]) -> ReviewReport {
        Assembler::default().assemble(&sample_document(), findings, &[])
    }

    fn ids(report: &ReviewReport) -> Vec<&str> {
        report.findings.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn test_unknown_paragraph_dropped() {
        let report = assemble(&[
            finding("ok", AgentId::Clarity, "p_001", "local clinic"),
            finding("ghost", AgentId::Adversary, "p_404", "anything"),
        ]);
        assert_eq!(ids(&report), vec!["ok"]);
        assert_eq!(report.summary.rejected, 1);
    }

    #[test]
    fn test_rigor_beats_clarity_on_substring() {
        let report = assemble(&[
            finding("c", AgentId::Clarity, "p_002", "sample size of 10"),
            finding("r", AgentId::RigorFind, "p_002", "sample size of 10 participants"),
        ]);
        assert_eq!(ids(&report), vec!["r"]);
        assert_eq!(report.summary.merged, 1);
    }

    #[test]
    fn test_argumentation_wins_and_tags_union() {
        let report = assemble(&[
            finding("w", AgentId::Clarity, "p_004", "prove the intervention works"),
            finding("a", AgentId::Adversary, "p_004", "results prove the intervention works"),
        ]);
        assert_eq!(ids(&report), vec!["a"]);
        assert_eq!(
            report.findings[0].tags,
            vec!["adversarial".to_string(), "clarity".to_string()]
        );
    }

    #[test]
    fn test_lower_priority_number_wins_within_track() {
        let report = assemble(&[
            finding("d", AgentId::Domain, "p_003", "improved by 40 percent"),
            finding("x", AgentId::Adversary, "p_003", "improved by 40 percent"),
        ]);
        assert_eq!(ids(&report), vec!["x"]);
    }

    #[test]
    fn test_methodology_never_deduplicated() {
        let report = assemble(&[
            finding("m1", AgentId::RigorRewrite, "p_002", "sample size of 10"),
            finding("m2", AgentId::RigorRewrite, "p_002", "sample size of 10"),
            finding("a", AgentId::Adversary, "p_002", "sample size of 10"),
        ]);
        let mut got = ids(&report);
        got.sort();
        assert_eq!(got, vec!["a", "m1", "m2"]);
        assert_eq!(report.summary.by_track[&Track::Methodology], 2);
    }

    #[test]
    fn test_ungrounded_edit_downgraded_for_argumentation() {
        let f = finding("a", AgentId::Adversary, "p_004", "prove")
            .with_edit(edit(EditKind::Replace, "p_004", "text that is not there"));
        let report = assemble(&[f]);

        assert_eq!(report.summary.downgraded, 1);
        let kept = report.findings[0].proposed_edit.as_ref().unwrap();
        assert_eq!(kept.kind, EditKind::Suggestion);
        assert_eq!(kept.suggestion.as_deref(), Some("replacement"));
    }

    #[test]
    fn test_ungrounded_edit_dropped_for_writing() {
        let bad = finding("c", AgentId::Clarity, "p_001", "local clinic")
            .with_edit(edit(EditKind::Replace, "p_001", "a regional hospital"));
        let good = finding("g", AgentId::Clarity, "p_003", "The effect was large")
            .with_edit(edit(EditKind::Replace, "p_003", "The effect was large"));
        let report = assemble(&[bad, good]);

        assert_eq!(ids(&report), vec!["g"]);
        assert_eq!(report.summary.rejected, 1);
    }

    #[test]
    fn test_suggestion_edits_need_no_grounding() {
        let f = finding("c", AgentId::Clarity, "p_001", "local clinic")
            .with_edit(edit(EditKind::Suggestion, "p_001", "not in text"));
        assert_eq!(ids(&assemble(&[f])), vec!["c"]);
    }

    #[test]
    fn test_presentation_order() {
        let report = assemble(&[
            finding("adv", AgentId::Adversary, "p_001", "volunteers"),
            finding("dom", AgentId::Domain, "p_002", "two sites"),
            finding("rig", AgentId::RigorRewrite, "p_003", "40 percent"),
            finding("cla", AgentId::Clarity, "p_004", "for everyone"),
        ]);
        assert_eq!(ids(&report), vec!["cla", "rig", "dom", "adv"]);
    }

    #[test]
    fn test_output_independent_of_input_order() {
        let input = vec![
            finding("c1", AgentId::Clarity, "p_002", "sample size of 10"),
            finding("r1", AgentId::RigorFind, "p_002", "sample size of 10 participants"),
            finding("c2", AgentId::Clarity, "p_003", "The effect was large"),
            finding("c3", AgentId::Clarity, "p_003", "effect was large indeed"),
            finding("m1", AgentId::RigorRewrite, "p_001", "local clinic"),
            finding("a1", AgentId::Adversary, "p_004", "prove the intervention"),
        ];
        let mut reversed = input.clone();
        reversed.reverse();

        let forward = serde_json::to_string(&assemble(&input)).unwrap();
        let backward = serde_json::to_string(&assemble(&reversed)).unwrap();
        let again = serde_json::to_string(&assemble(&input)).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward, again);
    }

    #[test]
    fn test_duplicate_ids_ordered_by_content() {
        let mut first = finding("dup", AgentId::Adversary, "p_004", "prove the intervention");
        first.merge_tags(&["scope".to_string()]);
        let mut second = finding("dup", AgentId::Adversary, "p_004", "prove the intervention");
        second.merge_tags(&["evidence".to_string()]);

        let forward = assemble(&[first.clone(), second.clone()]);
        let backward = assemble(&[second, first]);

        assert_eq!(
            serde_json::to_string(&forward).unwrap(),
            serde_json::to_string(&backward).unwrap()
        );
        assert_eq!(forward.findings.len(), 1);
    }

    #[test]
    fn test_metadata_independent_of_metrics_order() {
        use crate::metrics::fixtures::metrics;
        use crate::registry::CallRole;

        let records: Vec<_> = [0.1, 0.2, 0.3]
            .into_iter()
            .enumerate()
            .map(|(i, cost)| {
                let mut m = metrics(AgentId::RigorFind, CallRole::RigorFind, "sonnet", cost);
                m.chunk_index = Some(i);
                m.chunk_total = Some(3);
                m
            })
            .collect();
        let mut reversed = records.clone();
        reversed.reverse();

        let doc = sample_document();
        let forward = Assembler::default().assemble(&doc, &[], &records);
        let backward = Assembler::default().assemble(&doc, &[], &reversed);

        assert_eq!(
            serde_json::to_string(&forward).unwrap(),
            serde_json::to_string(&backward).unwrap()
        );
    }

    #[test]
    fn test_summary_and_metadata() {
        use crate::metrics::fixtures::metrics;
        use crate::registry::CallRole;

        let report = Assembler::default().assemble(
            &sample_document(),
            &[
                finding("c", AgentId::Clarity, "p_001", "local clinic"),
                finding("a", AgentId::Adversary, "p_004", "prove"),
            ],
            &[metrics(AgentId::Clarity, CallRole::Clarity, "haiku", 0.5)],
        );

        assert_eq!(report.summary.total_findings, 2);
        assert_eq!(report.summary.by_track[&Track::Writing], 1);
        assert_eq!(report.summary.by_severity[&Severity::Major], 2);
        assert_eq!(report.summary.by_dimension["adversarial"], 1);
        assert_eq!(report.metadata.agents_run, vec![AgentId::Clarity]);
    }
}
