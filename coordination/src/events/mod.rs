//! Progress events for a review run
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): the six progress events, from
//!    stage start to the terminal run result.
//!
//! 2. **Event Feed** (`feed.rs`): one ordered, append-only queue per run,
//!    shared by every task and sealed by the terminal event.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐
//! │ agent tasks  │──emit()──┐
//! └──────────────┘          ▼
//! ┌──────────────┐    ┌──────────────┐     ┌──────────────┐
//! │ chunk drains │───▶│  EventFeed   │────▶│  ReviewRun   │
//! └──────────────┘    │  (ordered)   │     │ (next_event) │
//! ┌──────────────┐    └──────────────┘     └──────────────┘
//! │  assembler   │──finish()──▲
//! └──────────────┘
//! ```

pub mod feed;
pub mod types;

pub use feed::{event_feed, EventFeed, EventStream};
pub use types::{ChunkOutcome, ReviewEvent, Stage};
