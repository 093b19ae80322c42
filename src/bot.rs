use std::sync::{Mutex, PoisonError};

use crate::options::NavOptionFlags;
use crate::scene::{AccountId, EntityId};
use crate::waypoints::{Position, TravelMode};

/// The external bot-movement subsystem.
///
/// It owns pathfinding and per-tick motion. Whether a new map supersedes or queues
/// behind one already running for the same bot is its decision.
pub trait BotMovement: Send + Sync {
    fn set_bot_map(
        &self,
        bot: EntityId,
        positions: Vec<Position>,
        modes: Vec<TravelMode>,
        flags: NavOptionFlags,
        owner: AccountId,
    );
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotMapRequest {
    pub bot: EntityId,
    pub positions: Vec<Position>,
    pub modes: Vec<TravelMode>,
    pub flags: NavOptionFlags,
    pub owner: AccountId,
}

/// Records every map it receives instead of moving anything.
#[derive(Debug, Default)]
pub struct BotMapRecorder {
    requests: Mutex<Vec<BotMapRequest>>,
}

impl BotMapRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<BotMapRequest> {
        std::mem::take(&mut *self.requests.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BotMovement for BotMapRecorder {
    fn set_bot_map(
        &self,
        bot: EntityId,
        positions: Vec<Position>,
        modes: Vec<TravelMode>,
        flags: NavOptionFlags,
        owner: AccountId,
    ) {
        let request = BotMapRequest { bot, positions, modes, flags, owner };
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request);
    }
}
