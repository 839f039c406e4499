//! System prompt constants for each review role.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes
//! so a report can be traced back to the prompts that produced it.

use review_coordination::{ChunkDescriptor, Document};

use crate::agents::briefing::Briefing;
use crate::agents::domain::EvidencePack;

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.3.0";

/// Shared output rules appended to every finding-producing preamble.
const FINDING_RULES: &str = "\
## Output rules
- Anchor every finding to one paragraph id exactly as shown in brackets, e.g. p_003.
- `quoted_text` must be copied verbatim from that paragraph. Never paraphrase it.
- Text marked [CONTEXT ONLY - DO NOT CRITIQUE: ...] is there for orientation. \
Never report findings on it.
- Prefer fewer, well-supported findings over many weak ones.
- Severity is one of critical, major, minor, suggestion.";

pub const BRIEFING_PREAMBLE: &str = "\
You are the first reader of an academic or technical document. Produce a compact \
briefing that later reviewers rely on instead of re-reading the whole text.

Extract: a two-to-four sentence summary, the main claims as the authors state them, \
the stated scope, the limitations the authors acknowledge, a one-paragraph summary \
of the methodology (empty if there is none), and up to eight domain keywords.

Report only what the document says. Do not evaluate it.";

pub const CLARITY_PREAMBLE: &str = "\
You review writing clarity. You see one slice of a larger document together with a \
briefing about the whole.

Look for: sentences that are hard to parse, ambiguous references, undefined jargon, \
paragraphs without a clear point, and broken flow between paragraphs. Do not comment \
on methodology or on whether claims are true.

Use categories clarity_sentence, clarity_paragraph, clarity_section or clarity_flow. \
When a concrete rewrite exists, include a proposed edit of kind replace whose anchor \
quotes the exact text being replaced.";

pub const RIGOR_FIND_PREAMBLE: &str = "\
You review methodological rigor, one section at a time.

Look for: unjustified methodological choices, logical gaps between evidence and \
conclusion, missing or weak evidence, statistical problems (sample size, multiple \
comparisons, inappropriate tests), and claims that exceed the stated scope.

Use categories rigor_methodology, rigor_logic, rigor_evidence, rigor_statistics, \
scope_overclaim, scope_underclaim or scope_missing. Do not propose edits; a later \
stage writes them.";

pub const RIGOR_REWRITE_PREAMBLE: &str = "\
You turn rigor findings into concrete fixes. For each finding you receive its id, \
the anchored quote and the surrounding paragraph.

For each finding you can fix, return one edit keyed by the finding id. Use kind \
replace, delete, insert_before or insert_after when you can rewrite the quoted text \
itself; the edit anchor must quote text that appears verbatim in the paragraph. Use \
kind suggestion when the fix needs new work (more data, another analysis) rather \
than new wording. Skip findings you cannot improve.";

pub const ADVERSARY_PREAMBLE: &str = "\
You are a demanding peer reviewer whose job is to find the strongest objections to \
the document's argument.

Look for: weaknesses in the central argument, gaps the authors do not address, and \
alternative explanations for their results. Use the evidence pack, when present, to \
ground objections in prior work and known contradictions. Do not repeat issues listed \
under known rigor findings unless you have a materially different objection.

Use categories adversarial_weakness, adversarial_gap or adversarial_alternative.";

pub const PANEL_RECONCILE_PREAMBLE: &str = "\
You chair a panel of three independent reviewers. You receive each reviewer's \
objections, tagged with the reviewer seat.

Merge objections that make the same point, keeping the clearest wording and the most \
precise quote. Set `votes` to the number of reviewers (1 to 3) who raised that point. \
Drop objections that are not supported by the document text. Return the merged list.";

pub const DOMAIN_TARGETS_PREAMBLE: &str = "\
You prepare an external literature check. From the briefing and document, list the \
claims and methods that most need outside evidence: claims that contradict common \
findings, methods with known pitfalls, and results whose novelty is asserted.";

pub const DOMAIN_QUERIES_PREAMBLE: &str = "\
You write web search queries for a literature check. Each query targets one claim or \
method and says what you hope to learn (prior work, contradictions, field consensus, \
known failure modes). Write at most six queries.";

pub const DOMAIN_SEARCH_PREAMBLE: &str = "\
Answer the research query from published sources. Be concise and cite sources with \
title and URL where possible. If nothing relevant exists, say so plainly.";

pub const DOMAIN_SYNTHESIS_PREAMBLE: &str = "\
You condense literature search results into an evidence pack for a reviewer. Sort \
each relevant point into design limitations, prior work, contradictions, field \
consensus, method context or failed attempts. Keep each point to one or two sentences \
and attach the source. Rate overall confidence high, medium or low and list the gaps \
the searches could not close.";

/// Preamble plus the shared finding rules.
pub fn with_finding_rules(preamble: &str) -> String {
    format!("{preamble}\n\n{FINDING_RULES}")
}

/// Append a steering memo, if any, to a system prompt.
pub fn steer(system: String, steering: Option<&str>) -> String {
    match steering.map(str::trim).filter(|s| !s.is_empty()) {
        Some(memo) => format!("{system}\n\n## Reviewer steering\n{memo}"),
        None => system,
    }
}

pub fn briefing_user(document: &Document) -> String {
    let title = document.title.as_deref().unwrap_or("(untitled)");
    format!("# {title}\n\n{}", document.render_all())
}

pub fn chunk_user(briefing: &Briefing, document: &Document, chunk: &ChunkDescriptor) -> String {
    format!(
        "{}\n\n# Slice {} of {}\n\n{}",
        briefing.format_for_prompt(),
        chunk.index + 1,
        chunk.total,
        chunk.render(document)
    )
}

pub fn adversary_user(
    briefing: &Briefing,
    evidence: &EvidencePack,
    rigor_titles: &[String],
    document: &Document,
) -> String {
    let mut parts = vec![briefing.format_for_prompt()];
    if evidence.has_content() {
        parts.push(evidence.format_for_prompt());
    }
    if !rigor_titles.is_empty() {
        let list = rigor_titles
            .iter()
            .map(|t| format!("- {t}"))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!("## Known rigor findings\n{list}"));
    }
    parts.push(format!("# Document\n\n{}", document.render_all()));
    parts.join("\n\n")
}
