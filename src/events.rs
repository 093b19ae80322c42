use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::gate::ThreatLevel;
use crate::options::NavOptionFlags;
use crate::scene::EntityId;

/// Script-facing navigation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavOp {
    PatrolPoints,
    NavigateTo,
    Pursue,
    FleeFrom,
    GetClosestNavPoint,
    MoveToTarget,
    StopMoveToTarget,
    SetVolumeDetect,
}

impl NavOp {
    /// Name scripts call the operation by; also the function name the gate sees.
    pub fn script_name(self) -> &'static str {
        match self {
            NavOp::PatrolPoints => "patrol_points",
            NavOp::NavigateTo => "navigate_to",
            NavOp::Pursue => "pursue",
            NavOp::FleeFrom => "flee_from",
            NavOp::GetClosestNavPoint => "get_closest_nav_point",
            NavOp::MoveToTarget => "move_to_target",
            NavOp::StopMoveToTarget => "stop_move_to_target",
            NavOp::SetVolumeDetect => "set_volume_detect",
        }
    }
}

impl fmt::Display for NavOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.script_name())
    }
}

/// Conditions the navigation layer absorbs instead of surfacing to scripts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavRejection {
    #[error("permission denied at threat level {level}")]
    PermissionDenied { level: ThreatLevel },
    #[error("bot movement subsystem unavailable")]
    SubsystemUnavailable,
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavEvent {
    Forwarded { op: NavOp, bot: EntityId, waypoints: usize, flags: NavOptionFlags },
    Applied { op: NavOp, entity: EntityId },
    Absorbed { op: NavOp, reason: NavRejection },
}

impl fmt::Display for NavEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavEvent::Forwarded { op, bot, waypoints, flags } => {
                write!(f, "forwarded {op} bot={bot} waypoints={waypoints} flags={}", flags.bits())
            }
            NavEvent::Applied { op, entity } => write!(f, "applied {op} entity={entity}"),
            NavEvent::Absorbed { op, reason } => write!(f, "absorbed {op}: {reason}"),
        }
    }
}

/// Receives every outcome the navigation layer would otherwise swallow silently.
pub trait NavObserver: Send + Sync {
    fn record(&self, event: NavEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavCounterSnapshot {
    pub forwarded: u64,
    pub applied: u64,
    pub denied: u64,
    pub unavailable: u64,
    pub malformed: u64,
    pub unknown_entity: u64,
}

#[derive(Debug, Default)]
struct NavCounters {
    forwarded: AtomicU64,
    applied: AtomicU64,
    denied: AtomicU64,
    unavailable: AtomicU64,
    malformed: AtomicU64,
    unknown_entity: AtomicU64,
}

impl NavCounters {
    fn register(&self, event: &NavEvent) {
        let counter = match event {
            NavEvent::Forwarded { .. } => &self.forwarded,
            NavEvent::Applied { .. } => &self.applied,
            NavEvent::Absorbed { reason, .. } => match reason {
                NavRejection::PermissionDenied { .. } => &self.denied,
                NavRejection::SubsystemUnavailable => &self.unavailable,
                NavRejection::MalformedInput(_) | NavRejection::InvalidArgument(_) => &self.malformed,
                NavRejection::UnknownEntity(_) => &self.unknown_entity,
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> NavCounterSnapshot {
        NavCounterSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unknown_entity: self.unknown_entity.load(Ordering::Relaxed),
        }
    }
}

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Event log with per-kind counters. Also emits each event through `tracing`.
///
/// A bounded log evicts its oldest entry when full; an unbounded one keeps everything
/// until drained.
#[derive(Debug)]
pub struct NavEventLog {
    events: Mutex<VecDeque<NavEvent>>,
    capacity: Option<usize>,
    counters: NavCounters,
}

impl Default for NavEventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl NavEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
            counters: NavCounters::default(),
        }
    }

    pub fn unbounded() -> Self {
        Self { events: Mutex::new(VecDeque::new()), capacity: None, counters: NavCounters::default() }
    }

    pub fn drain(&self) -> Vec<NavEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).drain(..).collect()
    }

    pub fn recent(&self) -> Vec<NavEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    pub fn counters(&self) -> NavCounterSnapshot {
        self.counters.snapshot()
    }
}

impl NavObserver for NavEventLog {
    fn record(&self, event: NavEvent) {
        trace_event(&event);
        self.counters.register(&event);
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if self.capacity == Some(events.len()) {
            events.pop_front();
        }
        events.push_back(event);
    }
}

fn trace_event(event: &NavEvent) {
    match event {
        NavEvent::Forwarded { op, bot, waypoints, flags } => {
            tracing::debug!(op = %op, bot = %bot, waypoints = *waypoints, flags = flags.bits(), "navigation forwarded");
        }
        NavEvent::Applied { op, entity } => {
            tracing::debug!(op = %op, entity = %entity, "navigation applied");
        }
        NavEvent::Absorbed { op, reason } => match reason {
            NavRejection::PermissionDenied { .. } | NavRejection::SubsystemUnavailable => {
                tracing::warn!(op = %op, reason = %reason, "navigation dropped");
            }
            _ => tracing::debug!(op = %op, reason = %reason, "navigation input absorbed"),
        },
    }
}
