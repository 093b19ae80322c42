use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;
use crate::scene::{AccountId, EntityId, ScriptId};

/// Risk classification of a scripted operation, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    #[default]
    None,
    Nuisance,
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
    Severe,
}

impl ThreatLevel {
    pub const ALL: [ThreatLevel; 8] = [
        ThreatLevel::None,
        ThreatLevel::Nuisance,
        ThreatLevel::VeryLow,
        ThreatLevel::Low,
        ThreatLevel::Moderate,
        ThreatLevel::High,
        ThreatLevel::VeryHigh,
        ThreatLevel::Severe,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ThreatLevel::None => "none",
            ThreatLevel::Nuisance => "nuisance",
            ThreatLevel::VeryLow => "very_low",
            ThreatLevel::Low => "low",
            ThreatLevel::Moderate => "moderate",
            ThreatLevel::High => "high",
            ThreatLevel::VeryHigh => "very_high",
            ThreatLevel::Severe => "severe",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|level| level.label() == value)
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Who is asking: the scripted entity, its owner, and the script item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerContext {
    pub entity: EntityId,
    pub owner: AccountId,
    pub script: ScriptId,
}

/// Authorization check run before any state-mutating navigation call.
pub trait PermissionGate: Send + Sync {
    fn check_threat_level(&self, level: ThreatLevel, function: &str, caller: &CallerContext) -> bool;
}

impl<F> PermissionGate for F
where
    F: Fn(ThreatLevel, &str, &CallerContext) -> bool + Send + Sync,
{
    fn check_threat_level(&self, level: ThreatLevel, function: &str, caller: &CallerContext) -> bool {
        self(level, function, caller)
    }
}

/// Allows an operation when its level does not exceed the configured ceiling or the
/// caller's owner is trusted. Blocked functions are denied for everyone.
#[derive(Debug, Clone, Default)]
pub struct ThreatLevelGate {
    max_allowed: ThreatLevel,
    trusted_owners: HashSet<AccountId>,
    blocked_functions: HashSet<String>,
}

impl ThreatLevelGate {
    pub fn new(max_allowed: ThreatLevel) -> Self {
        Self { max_allowed, ..Self::default() }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            max_allowed: config.max_threat_level,
            trusted_owners: config.trusted_owners.iter().copied().map(AccountId).collect(),
            blocked_functions: config.blocked_functions.iter().cloned().collect(),
        }
    }

    pub fn trust_owner(mut self, owner: AccountId) -> Self {
        self.trusted_owners.insert(owner);
        self
    }

    pub fn block_function(mut self, function: impl Into<String>) -> Self {
        self.blocked_functions.insert(function.into());
        self
    }

    pub fn max_allowed(&self) -> ThreatLevel {
        self.max_allowed
    }
}

impl PermissionGate for ThreatLevelGate {
    fn check_threat_level(&self, level: ThreatLevel, function: &str, caller: &CallerContext) -> bool {
        if self.blocked_functions.contains(function) {
            return false;
        }
        level <= self.max_allowed || self.trusted_owners.contains(&caller.owner)
    }
}
