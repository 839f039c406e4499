//! Chunk descriptors for fan-out agents
//!
//! Two strategies, both pure functions of the document:
//!
//! - [`chunk_by_words`]: greedy word-bounded chunks that never split a
//!   paragraph (clarity review).
//! - [`chunk_by_section`]: one chunk per non-empty section (rigor review).
//!
//! Each chunk carries up to `context_sentences` sentences before and after
//! it. Context is rendered as a marked block that agents must not critique.

use serde::{Deserialize, Serialize};

use crate::document::{Document, Paragraph};

/// Default word target for clarity chunks.
pub const DEFAULT_CHUNK_WORDS: usize = 400;

/// Default number of context sentences on each side of a chunk.
pub const DEFAULT_CONTEXT_SENTENCES: usize = 3;

/// A contiguous slice of the document dispatched to one agent call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub index: usize,
    pub total: usize,
    pub paragraph_ids: Vec<String>,
    pub heading: Option<String>,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
    pub word_count: usize,
}

impl ChunkDescriptor {
    /// Prompt body: context blocks around `[p_id] text` lines.
    pub fn render(&self, document: &Document) -> String {
        let mut parts = Vec::new();
        if let Some(block) = context_block(&self.context_before) {
            parts.push(block);
        }
        if let Some(heading) = &self.heading {
            parts.push(format!("## {heading}"));
        }
        parts.push(document.render_with_ids(&self.paragraph_ids));
        if let Some(block) = context_block(&self.context_after) {
            parts.push(block);
        }
        parts.join("\n\n")
    }
}

fn context_block(sentences: &[String]) -> Option<String> {
    if sentences.is_empty() {
        return None;
    }
    Some(format!(
        "[CONTEXT ONLY - DO NOT CRITIQUE: {}]",
        sentences.join(" ")
    ))
}

/// Greedy word-bounded chunks over paragraphs in reading order.
pub fn chunk_by_words(
    document: &Document,
    target_words: usize,
    context_sentences: usize,
) -> Vec<ChunkDescriptor> {
    let mut groups: Vec<Vec<&Paragraph>> = Vec::new();
    let mut current: Vec<&Paragraph> = Vec::new();
    let mut current_words = 0;

    for paragraph in &document.paragraphs {
        let words = paragraph.word_count();
        if !current.is_empty() && current_words + words > target_words {
            groups.push(std::mem::take(&mut current));
            current_words = 0;
        }
        current.push(paragraph);
        current_words += words;
    }
    if !current.is_empty() {
        groups.push(current);
    }

    build(groups, context_sentences, |_| None)
}

/// One chunk per section that has at least one paragraph.
pub fn chunk_by_section(document: &Document, context_sentences: usize) -> Vec<ChunkDescriptor> {
    let sections: Vec<_> = document
        .sections
        .iter()
        .filter(|s| document.paragraphs_in(s).next().is_some())
        .collect();
    let groups = sections
        .iter()
        .map(|s| document.paragraphs_in(s).collect())
        .collect();

    build(groups, context_sentences, |i| {
        sections.get(i).and_then(|s| s.title.clone())
    })
}

fn build(
    groups: Vec<Vec<&Paragraph>>,
    context_sentences: usize,
    heading: impl Fn(usize) -> Option<String>,
) -> Vec<ChunkDescriptor> {
    let total = groups.len();
    groups
        .iter()
        .enumerate()
        .map(|(index, paragraphs)| {
            let before = index
                .checked_sub(1)
                .and_then(|i| groups.get(i))
                .map(|prev| trailing_sentences(prev, context_sentences))
                .unwrap_or_default();
            let after = groups
                .get(index + 1)
                .map(|next| leading_sentences(next, context_sentences))
                .unwrap_or_default();
            ChunkDescriptor {
                index,
                total,
                paragraph_ids: paragraphs.iter().map(|p| p.paragraph_id.clone()).collect(),
                heading: heading(index),
                context_before: before,
                context_after: after,
                word_count: paragraphs.iter().map(|p| p.word_count()).sum(),
            }
        })
        .collect()
}

fn trailing_sentences(paragraphs: &[&Paragraph], n: usize) -> Vec<String> {
    let all: Vec<String> = paragraphs.iter().flat_map(|p| p.sentence_texts()).collect();
    let skip = all.len().saturating_sub(n);
    all.into_iter().skip(skip).collect()
}

fn leading_sentences(paragraphs: &[&Paragraph], n: usize) -> Vec<String> {
    paragraphs
        .iter()
        .flat_map(|p| p.sentence_texts())
        .take(n)
        .collect()
}
