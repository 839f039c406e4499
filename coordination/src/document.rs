//! Structured, id-indexed document
//!
//! A [`Document`] is produced once by an external parser and is read-only
//! afterwards. Agents, the chunker and the assembler all reference its
//! paragraphs by stable string id; nothing copies paragraph text around
//! except when rendering a prompt.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Error type for document construction
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Duplicate paragraph id: {0}")]
    DuplicateParagraph(String),

    #[error("Section {section} references unknown paragraph {paragraph}")]
    UnknownSectionMember { section: String, paragraph: String },

    #[error("Failed to parse document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;

/// One sentence inside a paragraph, with character offsets into the
/// paragraph text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub sentence_id: String,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub paragraph_id: String,
    #[serde(default)]
    pub section_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
}

impl Paragraph {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Sentence texts, falling back to a naive split when the parser
    /// produced no sentence records.
    pub fn sentence_texts(&self) -> Vec<String> {
        if !self.sentences.is_empty() {
            return self.sentences.iter().map(|s| s.text.clone()).collect();
        }
        self.text
            .split(". ")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub section_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_level")]
    pub level: u8,
    #[serde(default)]
    pub paragraph_ids: Vec<String>,
}

fn default_level() -> u8 {
    1
}

/// Wire shape, validated into a [`Document`].
#[derive(Deserialize)]
struct DocumentParts {
    document_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    sections: Vec<Section>,
    paragraphs: Vec<Paragraph>,
}

/// Immutable structured document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DocumentParts")]
pub struct Document {
    pub document_id: String,
    pub title: Option<String>,
    pub sections: Vec<Section>,
    pub paragraphs: Vec<Paragraph>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TryFrom<DocumentParts> for Document {
    type Error = DocumentError;

    fn try_from(parts: DocumentParts) -> DocumentResult<Self> {
        Document::new(parts.document_id, parts.title, parts.sections, parts.paragraphs)
    }
}

impl Document {
    /// Build a document, checking id uniqueness and section membership.
    pub fn new(
        document_id: impl Into<String>,
        title: Option<String>,
        sections: Vec<Section>,
        paragraphs: Vec<Paragraph>,
    ) -> DocumentResult<Self> {
        let mut index = HashMap::with_capacity(paragraphs.len());
        for (position, paragraph) in paragraphs.iter().enumerate() {
            if index
                .insert(paragraph.paragraph_id.clone(), position)
                .is_some()
            {
                return Err(DocumentError::DuplicateParagraph(
                    paragraph.paragraph_id.clone(),
                ));
            }
        }

        for section in &sections {
            if let Some(missing) = section
                .paragraph_ids
                .iter()
                .find(|id| !index.contains_key(id.as_str()))
            {
                return Err(DocumentError::UnknownSectionMember {
                    section: section.section_id.clone(),
                    paragraph: missing.clone(),
                });
            }
        }

        Ok(Self {
            document_id: document_id.into(),
            title,
            sections,
            paragraphs,
            index,
        })
    }

    pub fn from_json(raw: &str) -> DocumentResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn paragraph(&self, paragraph_id: &str) -> Option<&Paragraph> {
        self.index
            .get(paragraph_id)
            .and_then(|&position| self.paragraphs.get(position))
    }

    pub fn contains_paragraph(&self, paragraph_id: &str) -> bool {
        self.index.contains_key(paragraph_id)
    }

    /// Position of a paragraph in reading order.
    pub fn position(&self, paragraph_id: &str) -> Option<usize> {
        self.index.get(paragraph_id).copied()
    }

    /// Paragraphs belonging to a section, in section order.
    pub fn paragraphs_in<'a>(&'a self, section: &'a Section) -> impl Iterator<Item = &'a Paragraph> {
        section
            .paragraph_ids
            .iter()
            .filter_map(move |id| self.paragraph(id))
    }

    pub fn word_count(&self) -> usize {
        self.paragraphs.iter().map(Paragraph::word_count).sum()
    }

    /// Render paragraphs as `[p_id] text` lines for prompts.
    pub fn render_with_ids<'a, I>(&self, paragraph_ids: I) -> String
    where
        I: IntoIterator<Item = &'a String>,
    {
        paragraph_ids
            .into_iter()
            .filter_map(|id| self.paragraph(id))
            .map(|p| format!("[{}] {}", p.paragraph_id, p.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Render the whole document with paragraph ids.
    pub fn render_all(&self) -> String {
        let ids: Vec<&String> = self.paragraphs.iter().map(|p| &p.paragraph_id).collect();
        self.render_with_ids(ids)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn paragraph(id: &str, section: &str, text: &str) -> Paragraph {
        Paragraph {
            paragraph_id: id.to_string(),
            section_id: Some(section.to_string()),
            text: text.to_string(),
            sentences: Vec::new(),
        }
    }

    pub fn section(id: &str, title: &str, members: &[&str]) -> Section {
        Section {
            section_id: id.to_string(),
            title: Some(title.to_string()),
            level: 1,
            paragraph_ids: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Two sections, four paragraphs.
    pub fn sample_document() -> Document {
        Document::new(
            "doc-1",
            Some("Sample".to_string()),
            vec![
                section("s1", "Methods", &["p_001", "p_002"]),
                section("s2", "Results", &["p_003", "p_004"]),
            ],
            vec![
                paragraph("p_001", "s1", "We recruited volunteers from a local clinic. Recruitment ran for two months."),
                paragraph("p_002", "s1", "The study used a sample size of 10 participants across two sites."),
                paragraph("p_003", "s2", "Scores improved by 40 percent. The effect was large."),
                paragraph("p_004", "s2", "These results prove the intervention works for everyone."),
            ],
        )
        .expect("fixture document is valid")
    }
}
