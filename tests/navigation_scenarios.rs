use std::sync::Arc;

use glam::{Quat, Vec3};
use kestrel_nav::bot::BotMapRecorder;
use kestrel_nav::config::NavConfig;
use kestrel_nav::events::{NavEvent, NavEventLog, NavOp, NavRejection};
use kestrel_nav::gate::{CallerContext, PermissionGate, ThreatLevel, ThreatLevelGate};
use kestrel_nav::options::NavOptionFlags;
use kestrel_nav::scene::{AccountId, EntityId, SceneEntity, SceneGraph, ScriptId};
use kestrel_nav::scripts::{NavServices, ScriptApi};
use kestrel_nav::waypoints::{Position, TravelMode};
use rhai::Dynamic;

struct Rig {
    scene: Arc<SceneGraph>,
    recorder: Arc<BotMapRecorder>,
    log: Arc<NavEventLog>,
    services: NavServices,
    api: ScriptApi,
    host: EntityId,
    owner: AccountId,
}

fn rig(gate: Arc<dyn PermissionGate>, with_subsystem: bool) -> Rig {
    let scene = Arc::new(SceneGraph::new());
    let host = EntityId::new_v4();
    let owner = AccountId::new_v4();
    scene.insert(host, SceneEntity::new(Vec3::new(1.0, 2.0, 3.0), owner));

    let recorder = Arc::new(BotMapRecorder::new());
    let log = Arc::new(NavEventLog::new());
    let bots = with_subsystem.then(|| recorder.clone() as Arc<dyn kestrel_nav::BotMovement>);
    let services = NavServices::new(NavConfig::default(), scene.clone(), gate, bots, log.clone());
    let api = services.api(host, ScriptId::default());
    Rig { scene, recorder, log, services, api, host, owner }
}

fn open_rig() -> Rig {
    rig(Arc::new(ThreatLevelGate::new(ThreatLevel::Severe)), true)
}

fn point(x: f32, y: f32, z: f32) -> Dynamic {
    Dynamic::from(Vec3::new(x, y, z))
}

#[test]
fn navigate_to_forwards_single_walk_waypoint_with_zero_flags() {
    let rig = open_rig();
    rig.api.navigate_to(Vec3::new(10.0, 0.0, 0.0), &[]);

    let requests = rig.recorder.take();
    assert_eq!(requests.len(), 1, "expected one bot map");
    let request = &requests[0];
    assert_eq!(request.bot, rig.host);
    assert_eq!(request.owner, rig.owner);
    assert_eq!(request.positions, vec![Vec3::new(10.0, 0.0, 0.0)]);
    assert_eq!(request.modes, vec![TravelMode::Walk]);
    assert_eq!(request.flags, NavOptionFlags::empty());
}

#[test]
fn navigate_to_passes_option_flags_through() {
    let rig = open_rig();
    rig.api.navigate_to(Vec3::new(10.0, 0.0, 0.0), &[Dynamic::from_int(4)]);

    let requests = rig.recorder.take();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].flags.bits(), 4);
}

#[test]
fn navigate_to_with_unusable_flags_defaults_to_zero() {
    let rig = open_rig();
    rig.api.navigate_to(Vec3::new(1.0, 1.0, 1.0), &[Dynamic::from_float(4.0)]);
    rig.api.navigate_to(Vec3::new(1.0, 1.0, 1.0), &[Dynamic::from_int(-3)]);

    let requests = rig.recorder.take();
    assert_eq!(requests.len(), 2, "malformed flags must not stop the request");
    assert!(requests.iter().all(|r| r.flags.is_empty()));
    assert_eq!(rig.log.counters().malformed, 2);
}

#[test]
fn patrol_drops_malformed_entries_and_tags_walk() {
    let rig = open_rig();
    let points = vec![point(0.0, 0.0, 0.0), Dynamic::from("not-a-point".to_string()), point(5.0, 5.0, 0.0)];
    rig.api.patrol_points(&points, &[]);

    let requests = rig.recorder.take();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.positions, vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(5.0, 5.0, 0.0)]);
    assert_eq!(request.modes, vec![TravelMode::Walk, TravelMode::Walk]);
    assert_eq!(request.flags, NavOptionFlags::LOOP, "patrol uses the configured constant");

    let events = rig.log.drain();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        NavEvent::Absorbed { op: NavOp::PatrolPoints, reason: NavRejection::MalformedInput(_) }
    ));
    assert!(matches!(&events[1], NavEvent::Forwarded { op: NavOp::PatrolPoints, waypoints: 2, .. }));
}

#[test]
fn patrol_ignores_caller_options() {
    let rig = open_rig();
    rig.api.patrol_points(&[point(1.0, 0.0, 0.0)], &[Dynamic::from_int(8)]);
    let requests = rig.recorder.take();
    assert_eq!(requests[0].flags, NavOptionFlags::LOOP);
    assert_eq!(requests[0].flags, rig.services.config().navigation.patrol_flags());
}

#[test]
fn empty_patrol_is_forwarded_as_empty_map() {
    let rig = open_rig();
    rig.api.patrol_points(&[], &[]);
    let requests = rig.recorder.take();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].positions.is_empty());
    assert!(requests[0].modes.is_empty());
}

#[test]
fn denied_move_to_target_leaves_motion_state_untouched() {
    let rig = rig(Arc::new(ThreatLevelGate::new(ThreatLevel::None)), true);
    rig.api.move_to_target(Vec3::new(4.0, 4.0, 4.0), 0.2);
    rig.api.stop_move_to_target();
    rig.api.set_volume_detect(true);

    assert_eq!(rig.scene.mutation_count(), 0, "no mutation may reach the scene on denial");
    let state = rig.scene.get(rig.host).expect("host entity");
    assert_eq!(state.move_target, None);
    assert!(!state.volume_detect);
    assert_eq!(rig.log.counters().denied, 3);
}

#[test]
fn allowed_move_to_target_sets_and_clears_target() {
    let rig = open_rig();
    rig.api.move_to_target(Vec3::new(4.0, 4.0, 4.0), 0.2);
    let state = rig.scene.get(rig.host).expect("host entity");
    let target = state.move_target.expect("move target set");
    assert_eq!(target.target, Vec3::new(4.0, 4.0, 4.0));
    assert_eq!(target.tau, 0.2);

    rig.api.stop_move_to_target();
    assert_eq!(rig.scene.get(rig.host).and_then(|s| s.move_target), None);
    assert_eq!(rig.log.counters().applied, 2);
}

#[test]
fn non_finite_move_target_is_absorbed() {
    let rig = open_rig();
    rig.api.move_to_target(Vec3::new(f32::NAN, 0.0, 0.0), 1.0);
    rig.api.move_to_target(Vec3::ONE, f32::INFINITY);
    assert_eq!(rig.scene.mutation_count(), 0);
    assert_eq!(rig.log.counters().malformed, 2);
}

#[test]
fn non_finite_navigation_points_are_absorbed() {
    let rig = open_rig();
    rig.api.navigate_to(Vec3::new(f32::NAN, 0.0, 0.0), &[]);
    rig.api.navigate_to(Vec3::new(0.0, f32::INFINITY, 0.0), &[Dynamic::from_int(1)]);
    rig.api.flee_from(Vec3::new(0.0, 0.0, f32::NEG_INFINITY), 5.0, &[]);
    rig.api.flee_from(Vec3::new(f32::NAN, 1.0, 1.0), 5.0, &[]);

    assert!(rig.recorder.is_empty());
    let events = rig.log.drain();
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| matches!(e, NavEvent::Absorbed { reason: NavRejection::MalformedInput(_), .. })));
    assert_eq!(rig.log.counters().forwarded, 0);
}

#[test]
fn missing_subsystem_drops_patrol_silently() {
    let rig = rig(Arc::new(ThreatLevelGate::new(ThreatLevel::Severe)), false);
    assert!(!rig.services.dispatcher().is_available());

    rig.api.patrol_points(&[point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0)], &[]);

    assert!(rig.recorder.is_empty());
    assert_eq!(rig.scene.mutation_count(), 0);
    let events = rig.log.drain();
    assert_eq!(
        events,
        vec![NavEvent::Absorbed { op: NavOp::PatrolPoints, reason: NavRejection::SubsystemUnavailable }]
    );
}

#[test]
fn denied_navigation_never_reaches_the_subsystem() {
    let rig = rig(Arc::new(ThreatLevelGate::new(ThreatLevel::Low)), true);
    rig.api.navigate_to(Vec3::X, &[]);
    rig.api.patrol_points(&[point(0.0, 0.0, 0.0), Dynamic::UNIT], &[]);

    assert!(rig.recorder.is_empty());
    let counters = rig.log.counters();
    assert_eq!(counters.denied, 2);
    assert_eq!(counters.malformed, 0, "input is not inspected after a denial");
}

#[test]
fn commands_target_linkset_root_and_its_owner() {
    let scene = Arc::new(SceneGraph::new());
    let root = EntityId::new_v4();
    let child = EntityId::new_v4();
    let root_owner = AccountId::new_v4();
    scene.insert(root, SceneEntity::new(Vec3::ZERO, root_owner));
    scene.insert(child, SceneEntity::new(Vec3::Z, AccountId::new_v4()).with_parent(root));

    let recorder = Arc::new(BotMapRecorder::new());
    let services = NavServices::new(
        NavConfig::default(),
        scene.clone(),
        Arc::new(ThreatLevelGate::new(ThreatLevel::Severe)),
        Some(recorder.clone()),
        Arc::new(NavEventLog::new()),
    );
    services.api(child, ScriptId::default()).navigate_to(Vec3::X, &[]);

    let requests = recorder.take();
    assert_eq!(requests[0].bot, root);
    assert_eq!(requests[0].owner, root_owner);
}

#[test]
fn unknown_host_is_absorbed() {
    let rig = open_rig();
    let stranger = rig.services.api(EntityId::new_v4(), ScriptId::default());
    stranger.navigate_to(Vec3::X, &[]);
    let fallback = stranger.get_closest_nav_point(Vec3::new(3.0, 3.0, 3.0), &[]);

    assert!(rig.recorder.is_empty());
    assert_eq!(fallback, vec![Vec3::new(3.0, 3.0, 3.0)]);
    assert_eq!(rig.log.counters().unknown_entity, 2);
}

#[test]
fn closest_nav_point_is_ungated_and_single() {
    let rig = rig(Arc::new(ThreatLevelGate::new(ThreatLevel::None).block_function("get_closest_nav_point")), true);
    let points = rig.api.get_closest_nav_point(Vec3::new(1.0, 2.0, 3.0), &[]);
    assert_eq!(points.len(), 1);
    assert!(points[0].abs_diff_eq(Vec3::new(1.0, 2.0, 3.1), 1e-5), "got {:?}", points[0]);
    assert_eq!(rig.log.counters(), Default::default(), "a read-only query records nothing");
}

#[test]
fn pursue_navigates_to_target_entity_position() {
    let rig = open_rig();
    let quarry = EntityId::new_v4();
    rig.scene.insert(quarry, SceneEntity::new(Vec3::new(3.0, 4.0, 0.0), AccountId::new_v4()));

    rig.api.pursue(&quarry.to_string(), &[Dynamic::from_int(2)]);

    let requests = rig.recorder.take();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].positions, vec![Vec3::new(3.0, 4.0, 0.0)]);
    assert_eq!(requests[0].flags.bits(), 2);
}

#[test]
fn pursue_rejects_bad_and_unknown_keys() {
    let rig = open_rig();
    rig.api.pursue("definitely not a key", &[]);
    rig.api.pursue(&EntityId::new_v4().to_string(), &[]);

    assert!(rig.recorder.is_empty());
    let counters = rig.log.counters();
    assert_eq!(counters.malformed, 1);
    assert_eq!(counters.unknown_entity, 1);
}

#[test]
fn flee_from_heads_directly_away() {
    let rig = open_rig();
    rig.scene.insert(rig.host, SceneEntity::new(Vec3::new(5.0, 0.0, 0.0), rig.owner));
    rig.api.flee_from(Vec3::ZERO, 10.0, &[]);

    let requests = rig.recorder.take();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].positions[0].abs_diff_eq(Vec3::new(15.0, 0.0, 0.0), 1e-5));
}

#[test]
fn flee_from_own_position_uses_facing() {
    let rig = open_rig();
    let facing = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
    rig.scene.insert(rig.host, SceneEntity::new(Vec3::ZERO, rig.owner).with_rotation(facing));
    rig.api.flee_from(Vec3::ZERO, 3.0, &[]);

    let requests = rig.recorder.take();
    assert!(requests[0].positions[0].abs_diff_eq(Vec3::new(0.0, 3.0, 0.0), 1e-5));
}

#[test]
fn flee_rejects_non_positive_distance() {
    let rig = open_rig();
    rig.api.flee_from(Vec3::ZERO, 0.0, &[]);
    rig.api.flee_from(Vec3::ZERO, -2.0, &[]);
    assert!(rig.recorder.is_empty());
    assert_eq!(rig.log.counters().malformed, 2);
}

#[test]
fn custom_travel_policy_assigns_per_waypoint_modes() {
    let rig = open_rig();
    let services = rig.services.clone().with_travel_policy(Arc::new(|p: Position| {
        if p.z > 1.0 {
            TravelMode::Fly
        } else {
            TravelMode::Walk
        }
    }));
    services.api(rig.host, ScriptId::default()).patrol_points(&[point(0.0, 0.0, 0.0), point(0.0, 0.0, 8.0)], &[]);

    let requests = rig.recorder.take();
    assert_eq!(requests[0].modes, vec![TravelMode::Walk, TravelMode::Fly]);
}

#[test]
fn gate_sees_operation_name_and_caller() {
    let rig = open_rig();
    let owner = rig.owner;
    let gate: Arc<dyn PermissionGate> = Arc::new(move |level: ThreatLevel, function: &str, caller: &CallerContext| {
        caller.owner == owner && function == "navigate_to" && level == ThreatLevel::Moderate
    });
    let services = NavServices::new(
        NavConfig::default(),
        rig.scene.clone(),
        gate,
        Some(rig.recorder.clone()),
        rig.log.clone(),
    );
    let api = services.api(rig.host, ScriptId::default());
    api.navigate_to(Vec3::X, &[]);
    api.pursue(&rig.host.to_string(), &[]);

    assert_eq!(rig.recorder.len(), 1, "only navigate_to passes this gate");
}
