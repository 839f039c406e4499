//! Clarity agent: writing review over word-bounded chunks.

use std::sync::Arc;

use review_coordination::{
    chunk_by_words, CallRole, ChunkDescriptor, ChunkPosition, Document,
};

use super::briefing::Briefing;
use super::fan_out::{review_chunk, FanOut};
use super::AgentContext;
use crate::prompts;

#[derive(Debug, Clone, Copy)]
pub struct ClarityAgent {
    pub target_words: usize,
    pub context_sentences: usize,
}

impl ClarityAgent {
    pub fn new(target_words: usize, context_sentences: usize) -> Self {
        Self {
            target_words,
            context_sentences,
        }
    }

    pub fn chunks(&self, document: &Document) -> Vec<ChunkDescriptor> {
        chunk_by_words(document, self.target_words, self.context_sentences)
    }

    /// Launch one review call per chunk.
    pub fn fan_out(&self, ctx: &AgentContext, briefing: Arc<Briefing>) -> FanOut {
        let chunks = self.chunks(&ctx.document);
        let system: Arc<str> = prompts::steer(
            prompts::with_finding_rules(prompts::CLARITY_PREAMBLE),
            ctx.steering(),
        )
        .into();

        FanOut::spawn(chunks, |chunk| {
            let user = prompts::chunk_user(&briefing, &ctx.document, &chunk);
            review_chunk(
                ctx.clone(),
                CallRole::Clarity,
                system.clone(),
                user,
                ChunkPosition::new(chunk.index, chunk.total),
            )
        })
    }
}
