//! Process-wide pipeline settings and per-run review options.
//!
//! Defaults come from `REVIEW_*` environment variables with built-in
//! fallbacks; a TOML file can override any subset of keys.

use std::path::Path;
use std::str::FromStr;

use review_coordination::chunker::{DEFAULT_CHUNK_WORDS, DEFAULT_CONTEXT_SENTENCES};
use review_coordination::{ModelRegistry, Stage, SubstrateSettings};
use serde::{Deserialize, Serialize};

use crate::agents::domain::DEFAULT_MAX_QUERIES;

/// Error type for settings loading
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for settings loading
pub type SettingsResult<T> = Result<T, SettingsError>;

fn env_or<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

fn env_flag(key: &str) -> bool {
    match std::env::var(key) {
        Ok(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"),
        Err(_) => true,
    }
}

/// Which agents this process runs at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentToggles {
    pub briefing: bool,
    pub clarity: bool,
    pub rigor_find: bool,
    pub rigor_rewrite: bool,
    pub domain: bool,
    pub adversary: bool,
}

impl Default for AgentToggles {
    fn default() -> Self {
        Self {
            briefing: env_flag("REVIEW_ENABLE_BRIEFING"),
            clarity: env_flag("REVIEW_ENABLE_CLARITY"),
            rigor_find: env_flag("REVIEW_ENABLE_RIGOR_FIND"),
            rigor_rewrite: env_flag("REVIEW_ENABLE_RIGOR_REWRITE"),
            domain: env_flag("REVIEW_ENABLE_DOMAIN"),
            adversary: env_flag("REVIEW_ENABLE_ADVERSARY"),
        }
    }
}

impl AgentToggles {
    pub fn all_enabled() -> Self {
        Self {
            briefing: true,
            clarity: true,
            rigor_find: true,
            rigor_rewrite: true,
            domain: true,
            adversary: true,
        }
    }

    pub fn enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Briefing => self.briefing,
            Stage::Clarity => self.clarity,
            Stage::RigorFind => self.rigor_find,
            Stage::RigorRewrite => self.rigor_rewrite,
            Stage::Domain => self.domain,
            Stage::Adversary => self.adversary,
            Stage::Assembler => true,
        }
    }

    pub fn set(&mut self, stage: Stage, enabled: bool) {
        match stage {
            Stage::Briefing => self.briefing = enabled,
            Stage::Clarity => self.clarity = enabled,
            Stage::RigorFind => self.rigor_find = enabled,
            Stage::RigorRewrite => self.rigor_rewrite = enabled,
            Stage::Domain => self.domain = enabled,
            Stage::Adversary => self.adversary = enabled,
            Stage::Assembler => {}
        }
    }
}

/// Settings shared by every run in the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub agents: AgentToggles,
    /// Target words per clarity chunk.
    pub chunk_words: usize,
    /// Context sentences before and after each chunk.
    pub context_sentences: usize,
    pub max_domain_queries: usize,
    pub substrate: SubstrateSettings,
    pub models: ModelRegistry,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let base = SubstrateSettings::default();
        let substrate = SubstrateSettings {
            max_in_flight: env_or("REVIEW_MAX_CONCURRENT_CALLS", base.max_in_flight),
            timeout_ms: env_or("REVIEW_CALL_TIMEOUT_SECS", base.timeout_ms / 1_000)
                .saturating_mul(1_000),
            max_retries: env_or("REVIEW_MAX_RETRIES", base.max_retries),
            ..base
        };
        Self {
            agents: AgentToggles::default(),
            chunk_words: env_or("REVIEW_CHUNK_WORDS", DEFAULT_CHUNK_WORDS),
            context_sentences: env_or("REVIEW_CONTEXT_SENTENCES", DEFAULT_CONTEXT_SENTENCES),
            max_domain_queries: env_or("REVIEW_MAX_DOMAIN_QUERIES", DEFAULT_MAX_QUERIES),
            substrate,
            models: ModelRegistry::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_toml_str(raw: &str) -> SettingsResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

/// Options for a single review run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Three-seat adversary panel instead of a single adversary call.
    pub panel_mode: bool,
    pub enable_domain: bool,
    /// Free-text guidance appended to every agent's system prompt.
    pub steering_memo: Option<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            panel_mode: false,
            enable_domain: true,
            steering_memo: None,
        }
    }
}

impl ReviewConfig {
    pub fn panel(mut self) -> Self {
        self.panel_mode = true;
        self
    }

    pub fn without_domain(mut self) -> Self {
        self.enable_domain = false;
        self
    }

    pub fn with_steering(mut self, memo: impl Into<String>) -> Self {
        self.steering_memo = Some(memo.into());
        self
    }
}
