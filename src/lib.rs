pub mod bot;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod gate;
pub mod geometry;
pub mod options;
pub mod scene;
pub mod script_harness;
pub mod scripts;
pub mod waypoints;

pub use bot::{BotMapRecorder, BotMapRequest, BotMovement};
pub use config::{NavConfig, NavConfigOverrides};
pub use dispatch::{NavigationCommand, NavigationDispatcher};
pub use events::{NavEvent, NavEventLog, NavObserver, NavOp, NavRejection};
pub use gate::{CallerContext, PermissionGate, ThreatLevel, ThreatLevelGate};
pub use options::NavOptionFlags;
pub use scene::{AccountId, EntityId, SceneAccess, SceneEntity, SceneGraph, ScriptId};
pub use scripts::{NavServices, ScriptApi, ScriptHost};
pub use waypoints::{Position, TravelMode, TravelModePolicy, Waypoint, WaypointList};
