//! Review Agents
//!
//! The agent layer of the document review service: the six review agents,
//! their prompts, the orchestrator that schedules them over one document,
//! and an Anthropic-backed Completion Service.
//!
//! ```ignore
//! use review_agents::{AnthropicCompletions, AnthropicConfig, Orchestrator, PipelineSettings, ReviewConfig};
//!
//! let service = Arc::new(AnthropicCompletions::new(AnthropicConfig::from_env()?)?);
//! let orchestrator = Orchestrator::new(service, PipelineSettings::default());
//! let mut run = orchestrator.start(Arc::new(document), ReviewConfig::default());
//! while let Some(event) = run.next_event().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod agents;
pub mod anthropic;
pub mod config;
pub mod orchestrator;
pub mod prompts;

pub use agents::{AgentContext, AgentError, AgentOutput, AgentResult};
pub use anthropic::{AnthropicCompletions, AnthropicConfig};
pub use config::{AgentToggles, PipelineSettings, ReviewConfig, SettingsError, SettingsResult};
pub use orchestrator::{Orchestrator, ReviewRun};
