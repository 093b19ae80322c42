use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bot::{BotMapRecorder, BotMapRequest, BotMovement};
use crate::config::{NavConfig, NavConfigOverrides};
use crate::events::NavEventLog;
use crate::gate::ThreatLevelGate;
use crate::scene::{AccountId, EntityId, SceneEntity, SceneGraph, ScriptId};
use crate::scripts::{NavServices, ScriptHost};
use crate::waypoints::TravelMode;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessFixture {
    pub main_script: String,
    #[serde(default = "default_steps")]
    pub steps: usize,
    #[serde(default = "default_dt")]
    pub dt: f32,
    pub host: String,
    #[serde(default)]
    pub script_id: Uuid,
    #[serde(default = "default_subsystem_present")]
    pub subsystem_present: bool,
    #[serde(default)]
    pub config: Option<NavConfig>,
    pub entities: Vec<FixtureEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureEntity {
    pub name: String,
    pub id: Uuid,
    pub owner: Uuid,
    pub position: [f32; 3],
    #[serde(default)]
    pub rotation: Option<[f32; 4]>,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessOutput {
    pub steps: usize,
    pub dt: f32,
    pub host: String,
    pub results: Vec<StepResult>,
    pub final_entities: Vec<EntitySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step: usize,
    pub logs: Vec<String>,
    pub commands: Vec<CommandSummary>,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandSummary {
    pub bot: String,
    pub positions: Vec<[f32; 3]>,
    pub modes: Vec<TravelMode>,
    pub flags: u32,
    pub owner: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySummary {
    pub name: String,
    pub position: [f32; 3],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_target: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tau: Option<f32>,
    pub volume_detect: bool,
}

fn default_steps() -> usize {
    1
}

fn default_dt() -> f32 {
    1.0 / 60.0
}

fn default_subsystem_present() -> bool {
    true
}

pub fn run_fixture(fixture: &HarnessFixture) -> Result<HarnessOutput> {
    run_fixture_with_overrides(fixture, &NavConfigOverrides::default())
}

pub fn run_fixture_with_overrides(fixture: &HarnessFixture, overrides: &NavConfigOverrides) -> Result<HarnessOutput> {
    let mut config = fixture.config.clone().unwrap_or_default();
    config.apply_overrides(overrides);

    let scene = Arc::new(SceneGraph::new());
    let labels = populate_scene(&scene, &fixture.entities)?;
    let host = *labels.get(&fixture.host).ok_or_else(|| anyhow!("host entity '{}' not in fixture", fixture.host))?;

    let recorder = Arc::new(BotMapRecorder::new());
    let bots = fixture.subsystem_present.then(|| recorder.clone() as Arc<dyn BotMovement>);
    // Drained every step, so nothing a single step records may be evicted.
    let observer = Arc::new(NavEventLog::unbounded());
    let gate = Arc::new(ThreatLevelGate::from_config(&config.gate));
    let services = NavServices::new(config, scene.clone(), gate, bots, observer.clone());
    let api = services.api(host, ScriptId(fixture.script_id));

    let names: HashMap<EntityId, &str> = labels.iter().map(|(name, id)| (*id, name.as_str())).collect();
    let mut script = ScriptHost::new(&fixture.main_script);
    let mut results = Vec::new();
    for step in 0..fixture.steps {
        script.update(&api, fixture.dt).with_context(|| format!("running step {step}"))?;
        let commands = recorder.take().iter().map(|request| summarize_request(request, &names)).collect();
        let events = observer.drain().iter().map(ToString::to_string).collect();
        results.push(StepResult { step, logs: api.take_logs(), commands, events });
    }

    let final_entities = fixture
        .entities
        .iter()
        .filter_map(|entity| scene.get(EntityId(entity.id)).map(|state| summarize_entity(&entity.name, &state)))
        .collect();

    Ok(HarnessOutput { steps: fixture.steps, dt: fixture.dt, host: fixture.host.clone(), results, final_entities })
}

pub fn load_fixture<P: AsRef<Path>>(path: P) -> Result<HarnessFixture> {
    let file = File::open(path.as_ref()).with_context(|| format!("opening fixture '{}'", path.as_ref().display()))?;
    serde_json::from_reader(file).with_context(|| "parsing fixture JSON")
}

fn populate_scene(scene: &SceneGraph, entities: &[FixtureEntity]) -> Result<HashMap<String, EntityId>> {
    let mut labels = HashMap::with_capacity(entities.len());
    for entity in entities {
        if labels.insert(entity.name.clone(), EntityId(entity.id)).is_some() {
            bail!("duplicate entity name '{}' in fixture", entity.name);
        }
    }
    for entity in entities {
        let mut state = SceneEntity::new(Vec3::from_array(entity.position), AccountId(entity.owner));
        if let Some(rotation) = entity.rotation {
            state = state.with_rotation(Quat::from_array(rotation).normalize());
        }
        if let Some(parent) = &entity.parent {
            let parent_id =
                *labels.get(parent).ok_or_else(|| anyhow!("entity '{}' has unknown parent '{parent}'", entity.name))?;
            state = state.with_parent(parent_id);
        }
        scene.insert(EntityId(entity.id), state);
    }
    Ok(labels)
}

fn summarize_request(request: &BotMapRequest, names: &HashMap<EntityId, &str>) -> CommandSummary {
    let bot = names.get(&request.bot).map(|name| name.to_string()).unwrap_or_else(|| request.bot.to_string());
    CommandSummary {
        bot,
        positions: request.positions.iter().map(|p| p.to_array()).collect(),
        modes: request.modes.clone(),
        flags: request.flags.bits(),
        owner: request.owner.0,
    }
}

fn summarize_entity(name: &str, state: &SceneEntity) -> EntitySummary {
    EntitySummary {
        name: name.to_string(),
        position: state.position.to_array(),
        move_target: state.move_target.map(|m| m.target.to_array()),
        tau: state.move_target.map(|m| m.tau),
        volume_detect: state.volume_detect,
    }
}
