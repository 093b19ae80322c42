use std::sync::Arc;

use crate::bot::BotMovement;
use crate::events::{NavEvent, NavObserver, NavOp, NavRejection};
use crate::options::NavOptionFlags;
use crate::scene::{AccountId, EntityId};
use crate::waypoints::{Position, TravelModePolicy, WaypointList};

/// One request for the bot-movement subsystem, built fresh per script call.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationCommand {
    pub bot: EntityId,
    pub waypoints: WaypointList,
    pub flags: NavOptionFlags,
    pub issuer: AccountId,
}

impl NavigationCommand {
    /// Multi-point patrol; the flags are the configured patrol constant.
    pub fn patrol(bot: EntityId, waypoints: WaypointList, patrol_flags: NavOptionFlags, issuer: AccountId) -> Self {
        Self { bot, waypoints, flags: patrol_flags, issuer }
    }

    /// Single-point move with caller-supplied flags.
    pub fn navigate_to(
        bot: EntityId,
        point: Position,
        policy: &dyn TravelModePolicy,
        flags: NavOptionFlags,
        issuer: AccountId,
    ) -> Self {
        Self { bot, waypoints: WaypointList::single(point, policy), flags, issuer }
    }
}

/// Hands commands to the bot-movement subsystem, if one was provided.
///
/// Fire-and-forget: no retries, no handle to the outcome.
#[derive(Clone)]
pub struct NavigationDispatcher {
    bots: Option<Arc<dyn BotMovement>>,
    observer: Arc<dyn NavObserver>,
}

impl NavigationDispatcher {
    pub fn new(bots: Option<Arc<dyn BotMovement>>, observer: Arc<dyn NavObserver>) -> Self {
        Self { bots, observer }
    }

    pub fn is_available(&self) -> bool {
        self.bots.is_some()
    }

    /// Either forwards the command or records why it was dropped; the outcome only
    /// reaches the observer.
    pub fn dispatch(&self, op: NavOp, command: NavigationCommand) {
        let Some(bots) = &self.bots else {
            self.observer.record(NavEvent::Absorbed { op, reason: NavRejection::SubsystemUnavailable });
            return;
        };
        let NavigationCommand { bot, waypoints, flags, issuer } = command;
        let count = waypoints.len();
        let (positions, modes) = waypoints.into_parts();
        bots.set_bot_map(bot, positions, modes, flags, issuer);
        self.observer.record(NavEvent::Forwarded { op, bot, waypoints: count, flags });
    }
}
