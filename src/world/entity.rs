use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Server-assigned entity identity, unique per runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Continuous position plus look direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EntityPos {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl EntityPos {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Pickup,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub pos: EntityPos,
    despawned: bool,
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityKind, pos: EntityPos) -> Self {
        Self {
            id,
            kind,
            pos,
            despawned: false,
        }
    }

    pub fn is_despawned(&self) -> bool {
        self.despawned
    }
}

/// World-owned set of live entities, keyed by id.
///
/// Guarded by its own lock, independent from the chunk table's. Code that
/// needs both acquires chunk-table-read before entity-read, in that order,
/// everywhere. Despawn only marks; the tick loop's prune phase removes
/// marked entities, so an id stays valid for the remainder of the tick that
/// despawned it.
///
/// Entities never migrate between worlds by reference: a cross-world move
/// is a despawn here followed by a spawn there under a fresh registry entry.
pub struct EntityRegistry {
    entities: RwLock<FxHashMap<u32, Entity>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(FxHashMap::default()),
        }
    }

    /// Insert a live entity. Returns false if the id is already present.
    pub fn spawn(&self, entity: Entity) -> bool {
        let mut entities = self.entities.write();
        if entities.contains_key(&entity.id.0) {
            return false;
        }
        entities.insert(entity.id.0, entity);
        true
    }

    /// Mark an entity for removal at the next prune. Returns false if the
    /// id is unknown or already marked.
    pub fn despawn(&self, id: EntityId) -> bool {
        let mut entities = self.entities.write();
        match entities.get_mut(&id.0) {
            Some(e) if !e.despawned => {
                e.despawned = true;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: EntityId) -> Option<Entity> {
        self.entities.read().get(&id.0).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.read().contains_key(&id.0)
    }

    pub fn update_pos(&self, id: EntityId, pos: EntityPos) -> bool {
        match self.entities.write().get_mut(&id.0) {
            Some(e) => {
                e.pos = pos;
                true
            }
            None => false,
        }
    }

    /// Clone of all live (unmarked) entities, taken under the read lock.
    /// Callers iterate the snapshot without holding any registry lock, so
    /// processing an entity may freely call back into the registry.
    pub fn snapshot(&self) -> Vec<Entity> {
        self.entities
            .read()
            .values()
            .filter(|e| !e.despawned)
            .cloned()
            .collect()
    }

    /// Drop entities marked by `despawn`. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut entities = self.entities.write();
        let before = entities.len();
        entities.retain(|_, e| !e.despawned);
        before - entities.len()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: u32) -> Entity {
        Entity::new(EntityId(id), EntityKind::Player, EntityPos::new(0.0, 64.0, 0.0))
    }

    #[test]
    fn spawn_is_unique_per_id() {
        let reg = EntityRegistry::new();
        assert!(reg.spawn(player(1)));
        assert!(!reg.spawn(player(1)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn despawn_marks_and_prune_removes() {
        let reg = EntityRegistry::new();
        reg.spawn(player(1));
        reg.spawn(player(2));
        assert!(reg.despawn(EntityId(1)));
        assert!(!reg.despawn(EntityId(1)));

        // Still present until the prune phase runs.
        assert!(reg.contains(EntityId(1)));
        assert_eq!(reg.snapshot().len(), 1);

        assert_eq!(reg.prune(), 1);
        assert!(!reg.contains(EntityId(1)));
        assert!(reg.contains(EntityId(2)));
    }

    #[test]
    fn snapshot_excludes_marked_entities() {
        let reg = EntityRegistry::new();
        reg.spawn(player(7));
        reg.despawn(EntityId(7));
        assert!(reg.snapshot().is_empty());
    }
}
