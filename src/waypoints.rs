use glam::Vec3;
use rhai::Dynamic;
use serde::{Deserialize, Serialize};
use std::fmt;

/// World-space position. No unit conversion happens in this layer.
pub type Position = Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    #[default]
    Walk,
    Run,
    Fly,
}

impl TravelMode {
    pub fn label(self) -> &'static str {
        match self {
            TravelMode::Walk => "walk",
            TravelMode::Run => "run",
            TravelMode::Fly => "fly",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Chooses how a bot travels toward each waypoint.
pub trait TravelModePolicy: Send + Sync {
    fn mode_for(&self, position: Position) -> TravelMode;
}

impl<F> TravelModePolicy for F
where
    F: Fn(Position) -> TravelMode + Send + Sync,
{
    fn mode_for(&self, position: Position) -> TravelMode {
        self(position)
    }
}

/// Assigns the same mode to every waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConstantMode(pub TravelMode);

impl TravelModePolicy for ConstantMode {
    fn mode_for(&self, _position: Position) -> TravelMode {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub position: Position,
    pub mode: TravelMode,
}

/// Ordered traversal path. Each position carries exactly one travel mode, so the
/// position and mode sequences handed to the bot subsystem always have equal length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaypointList {
    waypoints: Vec<Waypoint>,
}

impl WaypointList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: Vec<Position>, policy: &dyn TravelModePolicy) -> Self {
        let waypoints =
            positions.into_iter().map(|position| Waypoint { position, mode: policy.mode_for(position) }).collect();
        Self { waypoints }
    }

    pub fn single(position: Position, policy: &dyn TravelModePolicy) -> Self {
        Self::from_positions(vec![position], policy)
    }

    pub fn push(&mut self, waypoint: Waypoint) {
        self.waypoints.push(waypoint);
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.iter()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.waypoints.iter().map(|w| w.position).collect()
    }

    pub fn modes(&self) -> Vec<TravelMode> {
        self.waypoints.iter().map(|w| w.mode).collect()
    }

    pub fn into_parts(self) -> (Vec<Position>, Vec<TravelMode>) {
        self.waypoints.into_iter().map(|w| (w.position, w.mode)).unzip()
    }
}

/// Parallel travel modes for `positions`, one per entry.
pub fn assign_travel_modes(positions: &[Position], policy: &dyn TravelModePolicy) -> Vec<TravelMode> {
    positions.iter().map(|p| policy.mode_for(*p)).collect()
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedPoints {
    pub positions: Vec<Position>,
    pub dropped: usize,
}

/// Keeps the elements of a script list that are finite vectors, in order.
pub fn normalize_waypoints(items: &[Dynamic]) -> NormalizedPoints {
    let mut out = NormalizedPoints { positions: Vec::with_capacity(items.len()), dropped: 0 };
    for item in items {
        match as_position(item) {
            Some(position) => out.positions.push(position),
            None => out.dropped += 1,
        }
    }
    out
}

pub(crate) fn as_position(item: &Dynamic) -> Option<Position> {
    if !item.is::<Vec3>() {
        return None;
    }
    item.clone().try_cast::<Vec3>().filter(|v| v.is_finite())
}
