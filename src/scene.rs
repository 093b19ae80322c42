use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use glam::Quat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::waypoints::Position;

/// Identity of an in-world object (a prim, a bot, an avatar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

/// Identity of the account that owns an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

/// Identity of the script item running inside an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ScriptId(pub Uuid);

impl EntityId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(key: &str) -> Option<Self> {
        Uuid::parse_str(key.trim()).ok().map(Self)
    }
}

impl AccountId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Entity accessor consumed by the navigation layer.
///
/// Reads are side-effect free. The three mutators are only ever reached after the
/// permission gate has allowed the calling operation.
pub trait SceneAccess: Send + Sync {
    fn absolute_position(&self, entity: EntityId) -> Option<Position>;
    fn rotation(&self, entity: EntityId) -> Option<Quat>;
    fn owner(&self, entity: EntityId) -> Option<AccountId>;
    /// Root of the entity's linkset; an unparented entity is its own root.
    fn root(&self, entity: EntityId) -> Option<EntityId>;

    fn set_move_target(&self, entity: EntityId, target: Position, tau: f32);
    fn clear_move_target(&self, entity: EntityId);
    fn set_volume_detect(&self, entity: EntityId, enabled: bool);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveTarget {
    pub target: Position,
    pub tau: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneEntity {
    pub position: Position,
    pub rotation: Quat,
    pub owner: AccountId,
    pub parent: Option<EntityId>,
    pub move_target: Option<MoveTarget>,
    pub volume_detect: bool,
}

impl SceneEntity {
    pub fn new(position: Position, owner: AccountId) -> Self {
        Self { position, rotation: Quat::IDENTITY, owner, parent: None, move_target: None, volume_detect: false }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }
}

// Linksets nest shallowly; anything deeper is treated as a broken parent chain.
const MAX_LINK_DEPTH: usize = 256;

/// In-memory scene shared between scripts running on different threads.
#[derive(Debug, Default)]
pub struct SceneGraph {
    entities: RwLock<HashMap<EntityId, SceneEntity>>,
    mutations: AtomicU64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: EntityId, entity: SceneEntity) {
        self.entities.write().unwrap_or_else(PoisonError::into_inner).insert(id, entity);
    }

    pub fn get(&self, id: EntityId) -> Option<SceneEntity> {
        self.entities.read().unwrap_or_else(PoisonError::into_inner).get(&id).cloned()
    }

    /// Number of motion/volume mutations applied through [`SceneAccess`].
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::Relaxed)
    }

    fn mutate(&self, entity: EntityId, apply: impl FnOnce(&mut SceneEntity)) {
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = entities.get_mut(&entity) {
            apply(state);
            self.mutations.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl SceneAccess for SceneGraph {
    fn absolute_position(&self, entity: EntityId) -> Option<Position> {
        self.entities.read().unwrap_or_else(PoisonError::into_inner).get(&entity).map(|e| e.position)
    }

    fn rotation(&self, entity: EntityId) -> Option<Quat> {
        self.entities.read().unwrap_or_else(PoisonError::into_inner).get(&entity).map(|e| e.rotation)
    }

    fn owner(&self, entity: EntityId) -> Option<AccountId> {
        self.entities.read().unwrap_or_else(PoisonError::into_inner).get(&entity).map(|e| e.owner)
    }

    fn root(&self, entity: EntityId) -> Option<EntityId> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        let mut current = entity;
        for _ in 0..=MAX_LINK_DEPTH {
            match entities.get(&current)?.parent {
                Some(parent) if entities.contains_key(&parent) => current = parent,
                _ => return Some(current),
            }
        }
        None
    }

    fn set_move_target(&self, entity: EntityId, target: Position, tau: f32) {
        self.mutate(entity, |state| state.move_target = Some(MoveTarget { target, tau }));
    }

    fn clear_move_target(&self, entity: EntityId) {
        self.mutate(entity, |state| state.move_target = None);
    }

    fn set_volume_detect(&self, entity: EntityId, enabled: bool) {
        self.mutate(entity, |state| state.volume_detect = enabled);
    }
}
