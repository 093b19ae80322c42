use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::gate::ThreatLevel;
use crate::geometry::DEFAULT_CLOSEST_POINT_OFFSET;
use crate::options::NavOptionFlags;
use crate::waypoints::TravelMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationConfig {
    #[serde(default = "NavigationConfig::default_patrol_flags")]
    pub patrol_flags: u32,
    #[serde(default)]
    pub default_travel_mode: TravelMode,
    #[serde(default = "NavigationConfig::default_closest_point_offset")]
    pub closest_point_offset: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "GateConfig::default_max_threat_level")]
    pub max_threat_level: ThreatLevel,
    #[serde(default)]
    pub trusted_owners: Vec<Uuid>,
    #[serde(default)]
    pub blocked_functions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatLevelConfig {
    #[serde(default = "ThreatLevelConfig::default_navigation")]
    pub navigation: ThreatLevel,
    #[serde(default = "ThreatLevelConfig::default_move_to_target")]
    pub move_to_target: ThreatLevel,
    #[serde(default = "ThreatLevelConfig::default_volume_detect")]
    pub volume_detect: ThreatLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NavConfig {
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub threat_levels: ThreatLevelConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavConfigOverrides {
    pub patrol_flags: Option<u32>,
    pub max_threat_level: Option<ThreatLevel>,
    pub closest_point_offset: Option<f32>,
}

impl NavigationConfig {
    const fn default_patrol_flags() -> u32 {
        NavOptionFlags::LOOP.bits()
    }

    const fn default_closest_point_offset() -> f32 {
        DEFAULT_CLOSEST_POINT_OFFSET
    }

    pub fn patrol_flags(&self) -> NavOptionFlags {
        NavOptionFlags::from_raw(self.patrol_flags)
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            patrol_flags: Self::default_patrol_flags(),
            default_travel_mode: TravelMode::default(),
            closest_point_offset: Self::default_closest_point_offset(),
        }
    }
}

impl GateConfig {
    fn default_max_threat_level() -> ThreatLevel {
        ThreatLevel::Moderate
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_threat_level: Self::default_max_threat_level(),
            trusted_owners: Vec::new(),
            blocked_functions: Vec::new(),
        }
    }
}

impl ThreatLevelConfig {
    fn default_navigation() -> ThreatLevel {
        ThreatLevel::Moderate
    }

    fn default_move_to_target() -> ThreatLevel {
        ThreatLevel::Low
    }

    fn default_volume_detect() -> ThreatLevel {
        ThreatLevel::Low
    }
}

impl Default for ThreatLevelConfig {
    fn default() -> Self {
        Self {
            navigation: Self::default_navigation(),
            move_to_target: Self::default_move_to_target(),
            volume_detect: Self::default_volume_detect(),
        }
    }
}

impl NavConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = ?err, "navigation config load failed, falling back to defaults");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &NavConfigOverrides) {
        if let Some(flags) = overrides.patrol_flags {
            self.navigation.patrol_flags = flags;
        }
        if let Some(level) = overrides.max_threat_level {
            self.gate.max_threat_level = level;
        }
        if let Some(offset) = overrides.closest_point_offset {
            self.navigation.closest_point_offset = offset;
        }
    }
}

impl NavConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.patrol_flags.is_none() && self.max_threat_level.is_none() && self.closest_point_offset.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.patrol_flags.is_some() {
            fields.push("patrol_flags");
        }
        if self.max_threat_level.is_some() {
            fields.push("max_threat_level");
        }
        if self.closest_point_offset.is_some() {
            fields.push("closest_point_offset");
        }
        fields
    }
}
