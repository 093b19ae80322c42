use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use glam::{Quat, Vec3};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Scope, AST, FLOAT, INT};

use crate::bot::BotMovement;
use crate::config::{NavConfig, ThreatLevelConfig};
use crate::dispatch::{NavigationCommand, NavigationDispatcher};
use crate::events::{NavEvent, NavObserver, NavOp, NavRejection};
use crate::gate::{CallerContext, PermissionGate, ThreatLevel};
use crate::geometry::{closest_nav_point, flee_point};
use crate::options::{try_decode_option_flags, NavOptionFlags};
use crate::scene::{EntityId, SceneAccess, ScriptId};
use crate::waypoints::{normalize_waypoints, ConstantMode, Position, TravelModePolicy, WaypointList};

/// Collaborators shared by every script that issues navigation requests.
#[derive(Clone)]
pub struct NavServices {
    config: Arc<NavConfig>,
    scene: Arc<dyn SceneAccess>,
    gate: Arc<dyn PermissionGate>,
    dispatcher: NavigationDispatcher,
    observer: Arc<dyn NavObserver>,
    travel_policy: Arc<dyn TravelModePolicy>,
}

impl NavServices {
    pub fn new(
        config: NavConfig,
        scene: Arc<dyn SceneAccess>,
        gate: Arc<dyn PermissionGate>,
        bots: Option<Arc<dyn BotMovement>>,
        observer: Arc<dyn NavObserver>,
    ) -> Self {
        let travel_policy: Arc<dyn TravelModePolicy> = Arc::new(ConstantMode(config.navigation.default_travel_mode));
        let dispatcher = NavigationDispatcher::new(bots, observer.clone());
        Self { config: Arc::new(config), scene, gate, dispatcher, observer, travel_policy }
    }

    pub fn with_travel_policy(mut self, policy: Arc<dyn TravelModePolicy>) -> Self {
        self.travel_policy = policy;
        self
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &NavigationDispatcher {
        &self.dispatcher
    }

    /// API handle for the script `script` running inside `host`.
    pub fn api(&self, host: EntityId, script: ScriptId) -> ScriptApi {
        ScriptApi { services: self.clone(), host, script, logs: Arc::new(Mutex::new(Vec::new())) }
    }
}

/// Resolved target of a state-mutating call.
struct Commanded {
    bot: EntityId,
    caller: CallerContext,
}

/// The navigation functions a script can call.
///
/// Nothing here returns an error to the script: denied, unavailable and malformed
/// requests are reported to the observer and otherwise do nothing.
#[derive(Clone)]
pub struct ScriptApi {
    services: NavServices,
    host: EntityId,
    script: ScriptId,
    logs: Arc<Mutex<Vec<String>>>,
}

impl ScriptApi {
    pub fn host(&self) -> EntityId {
        self.host
    }

    pub fn script(&self) -> ScriptId {
        self.script
    }

    pub fn patrol_points(&self, points: &[Dynamic], _options: &[Dynamic]) {
        let op = NavOp::PatrolPoints;
        self.run(op, |api| {
            let target = api.authorize(op, api.levels().navigation)?;
            let normalized = normalize_waypoints(points);
            if normalized.dropped > 0 {
                let detail = format!("dropped {} non-position waypoint(s)", normalized.dropped);
                api.absorb(op, NavRejection::MalformedInput(detail));
            }
            let waypoints = WaypointList::from_positions(normalized.positions, api.services.travel_policy.as_ref());
            let flags = api.services.config.navigation.patrol_flags();
            api.services.dispatcher.dispatch(op, NavigationCommand::patrol(target.bot, waypoints, flags, target.caller.owner));
            Ok(())
        });
    }

    pub fn navigate_to(&self, point: Position, options: &[Dynamic]) {
        let op = NavOp::NavigateTo;
        self.run(op, |api| {
            let target = api.authorize(op, api.levels().navigation)?;
            let point = finite(point, "navigation point")?;
            api.send_single(op, &target, point, options);
            Ok(())
        });
    }

    /// Navigate toward another entity's current position.
    pub fn pursue(&self, key: &str, options: &[Dynamic]) {
        let op = NavOp::Pursue;
        self.run(op, |api| {
            let target = api.authorize(op, api.levels().navigation)?;
            let quarry = EntityId::parse(key)
                .ok_or_else(|| NavRejection::MalformedInput(format!("'{key}' is not an entity key")))?;
            let point = api.services.scene.absolute_position(quarry).ok_or(NavRejection::UnknownEntity(quarry))?;
            api.send_single(op, &target, point, options);
            Ok(())
        });
    }

    /// Navigate `distance` units directly away from `source`.
    pub fn flee_from(&self, source: Position, distance: f32, options: &[Dynamic]) {
        let op = NavOp::FleeFrom;
        self.run(op, |api| {
            let target = api.authorize(op, api.levels().navigation)?;
            let source = finite(source, "flee source")?;
            if !(distance.is_finite() && distance > 0.0) {
                return Err(NavRejection::MalformedInput(format!("flee distance {distance} must be positive")));
            }
            let scene = &api.services.scene;
            let origin = scene.absolute_position(target.bot).ok_or(NavRejection::UnknownEntity(target.bot))?;
            let facing = scene.rotation(target.bot).unwrap_or(Quat::IDENTITY);
            api.send_single(op, &target, flee_point(origin, facing, source, distance), options);
            Ok(())
        });
    }

    /// Always a single point; never gated.
    pub fn get_closest_nav_point(&self, point: Position, _options: &[Dynamic]) -> Vec<Position> {
        let op = NavOp::GetClosestNavPoint;
        match self.services.scene.absolute_position(self.host) {
            Some(caller) => closest_nav_point(caller, point, self.services.config.navigation.closest_point_offset),
            None => {
                self.absorb(op, NavRejection::UnknownEntity(self.host));
                vec![point]
            }
        }
    }

    pub fn move_to_target(&self, target: Position, tau: f32) {
        let op = NavOp::MoveToTarget;
        self.run(op, |api| {
            let commanded = api.authorize(op, api.levels().move_to_target)?;
            let target = finite(target, "move target")?;
            if !tau.is_finite() {
                return Err(NavRejection::MalformedInput(format!("tau {tau} is not finite")));
            }
            api.services.scene.set_move_target(commanded.bot, target, tau);
            api.applied(op, commanded.bot);
            Ok(())
        });
    }

    pub fn stop_move_to_target(&self) {
        let op = NavOp::StopMoveToTarget;
        self.run(op, |api| {
            let commanded = api.authorize(op, api.levels().move_to_target)?;
            api.services.scene.clear_move_target(commanded.bot);
            api.applied(op, commanded.bot);
            Ok(())
        });
    }

    pub fn set_volume_detect(&self, enabled: bool) {
        let op = NavOp::SetVolumeDetect;
        self.run(op, |api| {
            let commanded = api.authorize(op, api.levels().volume_detect)?;
            api.services.scene.set_volume_detect(commanded.bot, enabled);
            api.applied(op, commanded.bot);
            Ok(())
        });
    }

    pub fn log(&self, message: &str) {
        tracing::info!(script = %self.script, "{message}");
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).push(message.to_string());
    }

    pub fn take_logs(&self) -> Vec<String> {
        std::mem::take(&mut *self.logs.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn levels(&self) -> &ThreatLevelConfig {
        &self.services.config.threat_levels
    }

    fn run(&self, op: NavOp, body: impl FnOnce(&Self) -> Result<(), NavRejection>) {
        if let Err(reason) = body(self) {
            self.absorb(op, reason);
        }
    }

    fn absorb(&self, op: NavOp, reason: NavRejection) {
        self.services.observer.record(NavEvent::Absorbed { op, reason });
    }

    fn applied(&self, op: NavOp, entity: EntityId) {
        self.services.observer.record(NavEvent::Applied { op, entity });
    }

    /// Resolves the commanded root entity and its owner, then consults the gate.
    /// Nothing is mutated before this returns `Ok`.
    fn authorize(&self, op: NavOp, level: ThreatLevel) -> Result<Commanded, NavRejection> {
        let scene = &self.services.scene;
        let bot = scene.root(self.host).ok_or(NavRejection::UnknownEntity(self.host))?;
        let owner = scene.owner(bot).ok_or(NavRejection::UnknownEntity(bot))?;
        let caller = CallerContext { entity: self.host, owner, script: self.script };
        if !self.services.gate.check_threat_level(level, op.script_name(), &caller) {
            return Err(NavRejection::PermissionDenied { level });
        }
        Ok(Commanded { bot, caller })
    }

    fn decode_flags(&self, op: NavOp, options: &[Dynamic]) -> NavOptionFlags {
        match try_decode_option_flags(options) {
            Ok(flags) => flags.unwrap_or_default(),
            Err(reason) => {
                self.absorb(op, reason);
                NavOptionFlags::empty()
            }
        }
    }

    fn send_single(&self, op: NavOp, target: &Commanded, point: Position, options: &[Dynamic]) {
        let flags = self.decode_flags(op, options);
        let command = NavigationCommand::navigate_to(
            target.bot,
            point,
            self.services.travel_policy.as_ref(),
            flags,
            target.caller.owner,
        );
        self.services.dispatcher.dispatch(op, command);
    }
}

fn finite(position: Position, what: &str) -> Result<Position, NavRejection> {
    if position.is_finite() {
        Ok(position)
    } else {
        Err(NavRejection::MalformedInput(format!("{what} {position} is not finite")))
    }
}

pub fn format_vector(v: Vec3) -> String {
    format!("<{}, {}, {}>", v.x, v.y, v.z)
}

/// Loads a rhai script and drives its `init(nav)` / `update(nav, dt)` lifecycle.
pub struct ScriptHost {
    engine: Engine,
    ast: Option<AST>,
    scope: Scope<'static>,
    script_path: PathBuf,
    last_modified: Option<SystemTime>,
    error: Option<String>,
    enabled: bool,
    initialized: bool,
}

impl ScriptHost {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            engine: nav_engine(),
            ast: None,
            scope: Scope::new(),
            script_path: path.as_ref().to_path_buf(),
            last_modified: None,
            error: None,
            enabled: true,
            initialized: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enable: bool) {
        self.enabled = enable;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn force_reload(&mut self) -> Result<()> {
        self.load_script()
    }

    pub fn update(&mut self, api: &ScriptApi, dt: f32) -> Result<()> {
        if let Err(err) = self.reload_if_needed() {
            self.error = Some(err.to_string());
            return Err(err);
        }

        if !self.enabled {
            return Ok(());
        }
        let Some(ast) = &self.ast else {
            return Ok(());
        };

        if !self.initialized {
            match self.engine.call_fn::<Dynamic>(&mut self.scope, ast, "init", (api.clone(),)) {
                Ok(_) => {
                    self.initialized = true;
                    self.error = None;
                }
                Err(err) if is_missing(&err, "init") => self.initialized = true,
                Err(err) => {
                    let message = err.to_string();
                    self.error = Some(message.clone());
                    return Err(anyhow!("script init failed: {message}"));
                }
            }
        }

        match self.engine.call_fn::<Dynamic>(&mut self.scope, ast, "update", (api.clone(), dt as FLOAT)) {
            Ok(_) => {
                self.error = None;
                Ok(())
            }
            Err(err) if is_missing(&err, "update") => {
                self.error = None;
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.error = Some(message.clone());
                Err(anyhow!("script update failed: {message}"))
            }
        }
    }

    fn reload_if_needed(&mut self) -> Result<()> {
        let metadata = match fs::metadata(&self.script_path) {
            Ok(meta) => meta,
            Err(err) => {
                return Err(anyhow!("Script file not accessible: {err}"));
            }
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if self.ast.is_none() || self.last_modified.map_or(true, |prev| modified > prev) {
            self.load_script()?;
        }
        Ok(())
    }

    fn load_script(&mut self) -> Result<()> {
        let source = fs::read_to_string(&self.script_path)
            .with_context(|| format!("Reading {}", self.script_path.display()))?;
        let ast = self.engine.compile(source).with_context(|| "Compiling Rhai script")?;
        self.scope = Scope::new();
        self.last_modified = fs::metadata(&self.script_path).ok().and_then(|meta| meta.modified().ok());
        self.initialized = false;
        self.error = None;
        self.ast = Some(ast);
        Ok(())
    }
}

fn is_missing(err: &EvalAltResult, name: &str) -> bool {
    matches!(err, EvalAltResult::ErrorFunctionNotFound(signature, _) if signature.starts_with(name))
}

/// A rhai engine with the navigation API registered.
pub fn nav_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_fast_operators(true);
    register_api(&mut engine);
    engine
}

pub fn register_api(engine: &mut Engine) {
    engine
        .register_type_with_name::<Vec3>("Vector")
        .register_fn("vec3", |x: FLOAT, y: FLOAT, z: FLOAT| Vec3::new(x as f32, y as f32, z as f32))
        .register_fn("vec3", |x: INT, y: INT, z: INT| Vec3::new(x as f32, y as f32, z as f32))
        .register_get("x", |v: &mut Vec3| v.x as FLOAT)
        .register_get("y", |v: &mut Vec3| v.y as FLOAT)
        .register_get("z", |v: &mut Vec3| v.z as FLOAT)
        .register_fn("to_string", |v: &mut Vec3| format_vector(*v));

    engine
        .register_type_with_name::<ScriptApi>("Nav")
        .register_fn("patrol_points", |api: &mut ScriptApi, points: Array, options: Array| {
            api.patrol_points(&points, &options)
        })
        .register_fn("patrol_points", |api: &mut ScriptApi, points: Array| api.patrol_points(&points, &[]))
        .register_fn("navigate_to", |api: &mut ScriptApi, point: Vec3, options: Array| {
            api.navigate_to(point, &options)
        })
        .register_fn("navigate_to", |api: &mut ScriptApi, point: Vec3| api.navigate_to(point, &[]))
        .register_fn("pursue", |api: &mut ScriptApi, key: &str, options: Array| api.pursue(key, &options))
        .register_fn("pursue", |api: &mut ScriptApi, key: &str| api.pursue(key, &[]))
        .register_fn("flee_from", |api: &mut ScriptApi, source: Vec3, distance: FLOAT, options: Array| {
            api.flee_from(source, distance as f32, &options)
        })
        .register_fn("flee_from", |api: &mut ScriptApi, source: Vec3, distance: FLOAT| {
            api.flee_from(source, distance as f32, &[])
        })
        .register_fn("get_closest_nav_point", |api: &mut ScriptApi, point: Vec3, options: Array| {
            to_array(api.get_closest_nav_point(point, &options))
        })
        .register_fn("get_closest_nav_point", |api: &mut ScriptApi, point: Vec3| {
            to_array(api.get_closest_nav_point(point, &[]))
        })
        .register_fn("move_to_target", |api: &mut ScriptApi, target: Vec3, tau: FLOAT| {
            api.move_to_target(target, tau as f32)
        })
        .register_fn("stop_move_to_target", |api: &mut ScriptApi| api.stop_move_to_target())
        .register_fn("set_volume_detect", |api: &mut ScriptApi, enabled: bool| api.set_volume_detect(enabled))
        .register_fn("log", |api: &mut ScriptApi, message: &str| api.log(message));
}

fn to_array(points: Vec<Position>) -> Array {
    points.into_iter().map(Dynamic::from).collect()
}
