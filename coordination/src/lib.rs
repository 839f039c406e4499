//! Review Coordination Library
//!
//! The deterministic core of the multi-agent document review service:
//! everything except the agents themselves and the network clients.
//!
//! # Modules
//!
//! ## Data model
//! - `document`: immutable, id-indexed structured document
//! - `finding`: findings, anchors, edits and the fixed agent/track table
//! - `metrics`: per-call metrics and run-level aggregation
//!
//! ## Call substrate
//! - `registry`: call roles, role → model routing, model prices
//! - `substrate`: the Completion Service boundary plus bounded, retrying,
//!   timing-out calls
//!
//! ## Coordination primitives
//! - `latch`: one-shot broadcast latches for dependency edges
//! - `events`: progress events and the ordered per-run feed
//! - `chunker`: word-bounded and per-section chunk descriptors
//!
//! ## Assembly
//! - `assembler`: validation, overlap dedup and presentation ordering
//!
//! # Usage
//!
//! ```ignore
//! use review_coordination::{Assembler, Document};
//!
//! let document = Document::from_json(&raw)?;
//! let report = Assembler::default().assemble(&document, &findings, &metrics);
//! println!("{} findings", report.summary.total_findings);
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod assembler;
pub mod chunker;
pub mod document;
pub mod events;
pub mod finding;
pub mod latch;
pub mod metrics;
pub mod registry;
pub mod substrate;

// Re-export document types
pub use document::{Document, DocumentError, DocumentResult, Paragraph, Section, Sentence};

// Re-export finding types
pub use finding::{
    AgentId, AgentProfile, Anchor, Category, EditKind, Finding, FindingError, FindingResult,
    ProposedEdit, Severity, Track,
};

// Re-export metrics types
pub use metrics::{AgentRunMetrics, ChunkPosition, ModelUsage, RunMetadata};

// Re-export substrate types
pub use registry::{CallRole, ModelPrice, ModelRegistry};
pub use substrate::{
    AgentCallSubstrate, CompletionError, CompletionRequest, CompletionResponse, CompletionResult,
    CompletionService, SubstrateSettings,
};

// Re-export coordination primitives
pub use chunker::{chunk_by_section, chunk_by_words, ChunkDescriptor};
pub use events::{event_feed, ChunkOutcome, EventFeed, EventStream, ReviewEvent, Stage};
pub use latch::{latch, Latch, LatchAbandoned, LatchWaiter};

// Re-export assembler types
pub use assembler::{Assembler, OverlapDetector, ReviewReport, ReviewSummary, TextOverlap};
