//! Model Registry — which model serves each call role, and what it costs
//!
//! Every completion call is made under a [`CallRole`]. The registry maps each
//! role to a model id and each model id to a per-million-token price, so the
//! call substrate can stamp cost onto the metrics it records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::finding::AgentId;

/// Default model for most roles.
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5";

/// Role under which a completion call is made.
///
/// Roles are finer than agents: the domain pipeline and the adversary panel
/// each make several kinds of call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallRole {
    Briefing,
    Clarity,
    RigorFind,
    RigorRewrite,
    DomainTargets,
    DomainQueries,
    DomainSearch,
    DomainSynthesis,
    Adversary,
    PanelSeatA,
    PanelSeatB,
    PanelSeatC,
    PanelReconcile,
}

impl CallRole {
    pub fn all() -> &'static [CallRole] {
        &[
            CallRole::Briefing,
            CallRole::Clarity,
            CallRole::RigorFind,
            CallRole::RigorRewrite,
            CallRole::DomainTargets,
            CallRole::DomainQueries,
            CallRole::DomainSearch,
            CallRole::DomainSynthesis,
            CallRole::Adversary,
            CallRole::PanelSeatA,
            CallRole::PanelSeatB,
            CallRole::PanelSeatC,
            CallRole::PanelReconcile,
        ]
    }

    /// Agent the role's metrics are attributed to.
    pub fn agent(self) -> AgentId {
        match self {
            CallRole::Briefing => AgentId::Briefing,
            CallRole::Clarity => AgentId::Clarity,
            CallRole::RigorFind => AgentId::RigorFind,
            CallRole::RigorRewrite => AgentId::RigorRewrite,
            CallRole::DomainTargets
            | CallRole::DomainQueries
            | CallRole::DomainSearch
            | CallRole::DomainSynthesis => AgentId::Domain,
            CallRole::Adversary => AgentId::Adversary,
            CallRole::PanelSeatA
            | CallRole::PanelSeatB
            | CallRole::PanelSeatC
            | CallRole::PanelReconcile => AgentId::AdversaryPanel,
        }
    }

    /// The three panel seats, in seat order.
    pub fn panel_seats() -> [CallRole; 3] {
        [CallRole::PanelSeatA, CallRole::PanelSeatB, CallRole::PanelSeatC]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallRole::Briefing => "briefing",
            CallRole::Clarity => "clarity",
            CallRole::RigorFind => "rigor_find",
            CallRole::RigorRewrite => "rigor_rewrite",
            CallRole::DomainTargets => "domain_targets",
            CallRole::DomainQueries => "domain_queries",
            CallRole::DomainSearch => "domain_search",
            CallRole::DomainSynthesis => "domain_synthesis",
            CallRole::Adversary => "adversary",
            CallRole::PanelSeatA => "panel_seat_a",
            CallRole::PanelSeatB => "panel_seat_b",
            CallRole::PanelSeatC => "panel_seat_c",
            CallRole::PanelReconcile => "panel_reconcile",
        }
    }
}

impl fmt::Display for CallRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for registry construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown call role: {0}")]
    UnknownRole(String),
}

impl FromStr for CallRole {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CallRole::all()
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| RegistryError::UnknownRole(s.to_string()))
    }
}

/// USD price per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPrice {
    pub const fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_mtok
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_mtok
    }
}

/// TOML/JSON shape; role keys are checked on load.
#[derive(Deserialize)]
struct RegistryParts {
    #[serde(default)]
    models: BTreeMap<String, String>,
    #[serde(default)]
    prices: BTreeMap<String, ModelPrice>,
    #[serde(default)]
    default_price: Option<ModelPrice>,
}

/// Role → model routing plus the price table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegistryParts")]
pub struct ModelRegistry {
    models: BTreeMap<CallRole, String>,
    prices: BTreeMap<String, ModelPrice>,
    default_price: ModelPrice,
}

impl TryFrom<RegistryParts> for ModelRegistry {
    type Error = RegistryError;

    /// Missing roles and prices keep their defaults.
    fn try_from(parts: RegistryParts) -> Result<Self, Self::Error> {
        let mut registry = ModelRegistry::default();
        for (role, model) in parts.models {
            registry.models.insert(role.parse()?, model);
        }
        registry.prices.extend(parts.prices);
        if let Some(price) = parts.default_price {
            registry.default_price = price;
        }
        Ok(registry)
    }
}

impl ModelRegistry {
    /// Model serving a role.
    pub fn model_for(&self, role: CallRole) -> &str {
        self.models
            .get(&role)
            .map(String::as_str)
            .unwrap_or(DEFAULT_MODEL)
    }

    pub fn set_model(&mut self, role: CallRole, model: impl Into<String>) {
        self.models.insert(role, model.into());
    }

    /// Price for a model; unknown models use the default price.
    pub fn price(&self, model: &str) -> ModelPrice {
        self.prices.get(model).copied().unwrap_or(self.default_price)
    }

    pub fn cost_usd(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.price(model).cost(input_tokens, output_tokens)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let mut models: BTreeMap<CallRole, String> = CallRole::all()
            .iter()
            .map(|role| (*role, DEFAULT_MODEL.to_string()))
            .collect();
        // Panel seats sit on different models so their critiques diverge.
        models.insert(CallRole::PanelSeatA, "claude-sonnet-4".to_string());
        models.insert(CallRole::PanelSeatB, "claude-opus-4".to_string());
        models.insert(CallRole::PanelReconcile, "claude-sonnet-4".to_string());

        let prices = [
            ("claude-haiku-4-5", ModelPrice::new(0.80, 4.00)),
            ("claude-sonnet-4", ModelPrice::new(3.00, 15.00)),
            ("claude-opus-4", ModelPrice::new(15.00, 75.00)),
        ]
        .into_iter()
        .map(|(model, price)| (model.to_string(), price))
        .collect();

        Self {
            models,
            prices,
            default_price: ModelPrice::new(3.00, 15.00),
        }
    }
}
