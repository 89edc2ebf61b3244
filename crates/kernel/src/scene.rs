use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use regionsync_common::{ActorRole, AvatarId, ObjectId, Region, RegionId};

/// Objects sitting above this height are treated as out of bounds.
pub const MAX_OBJECT_HEIGHT: f64 = 10_000.0;

/// Where a creation notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreationOrigin {
    /// Authored in this region.
    Local,
    /// Replicated from another actor's sync stream.
    Sync,
}

/// A scene object (linkset) as held by one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: ObjectId,
    pub region: RegionId,
    pub name: String,
    pub description: String,
    pub owner: AvatarId,
    pub creator: AvatarId,
    /// Region-local position of the root part.
    pub position: DVec3,
    pub part_count: u32,
    pub is_attachment: bool,
    persist_pending: bool,
    backed_up: bool,
}

impl SceneObject {
    pub fn new(region: RegionId, name: impl Into<String>, owner: AvatarId, position: DVec3) -> Self {
        Self {
            id: ObjectId::new(),
            region,
            name: name.into(),
            description: String::new(),
            owner,
            creator: owner,
            position,
            part_count: 1,
            is_attachment: false,
            persist_pending: false,
            backed_up: false,
        }
    }

    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = id;
        self
    }

    pub fn with_creator(mut self, creator: AvatarId) -> Self {
        self.creator = creator;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parts(mut self, part_count: u32) -> Self {
        self.part_count = part_count;
        self
    }

    pub fn as_attachment(mut self) -> Self {
        self.is_attachment = true;
        self
    }

    /// Flagged for durability tracking.
    pub fn persist_pending(&self) -> bool {
        self.persist_pending
    }

    /// Accepted by the backup subsystem.
    pub fn backed_up(&self) -> bool {
        self.backed_up
    }

    fn reset_durability(&mut self) {
        self.persist_pending = false;
        self.backed_up = false;
    }
}

/// Selects scene objects for inspection or removal.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectFilter {
    Id(ObjectId),
    Name(String),
    Owner(AvatarId),
    Creator(AvatarId),
    /// Inclusive box in the region-local frame.
    Within { min: DVec3, max: DVec3 },
    /// Below ground, above [`MAX_OBJECT_HEIGHT`], or off the region footprint.
    OutsideBounds,
}

/// A record produced by every mutation of the scene-object set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneEvent {
    Created { id: ObjectId, origin: CreationOrigin },
    Deleted { id: ObjectId },
}

/// Errors from scene mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("object {0} already exists")]
    Duplicate(ObjectId),
    #[error("object {id} belongs to region {owner}, not this one")]
    WrongRegion { id: ObjectId, owner: RegionId },
}

/// The authoritative scene-object set of one region.
///
/// Every actor role reads it; only the scene-persistence role may touch the
/// durability flags, through [`SceneStore::persistence`].
#[derive(Debug, Clone)]
pub struct SceneStore {
    region: Region,
    objects: BTreeMap<ObjectId, SceneObject>,
    tick: u64,
    events: Vec<SceneEvent>,
}

impl SceneStore {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            objects: BTreeMap::new(),
            tick: 0,
            events: Vec::new(),
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    /// World-update ticks completed by this region.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn step(&mut self) {
        self.tick += 1;
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.values()
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[SceneEvent] {
        &self.events
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    /// Add an object authored in this region.
    pub fn create_local(&mut self, mut object: SceneObject) -> Result<ObjectId, SceneError> {
        let id = object.id;
        if self.objects.contains_key(&id) {
            return Err(SceneError::Duplicate(id));
        }
        if object.region != self.region.id() {
            return Err(SceneError::WrongRegion {
                id,
                owner: object.region,
            });
        }
        object.reset_durability();
        self.objects.insert(id, object);
        self.events.push(SceneEvent::Created {
            id,
            origin: CreationOrigin::Local,
        });
        Ok(id)
    }

    /// Add an object received from another actor's sync stream.
    ///
    /// Returns `Ok(false)` when the object is already present; the duplicate
    /// is absorbed and the local copy, durability flags included, is kept.
    /// Objects of another region are refused, their positions are in that
    /// region's frame.
    pub fn insert_replicated(&mut self, mut object: SceneObject) -> Result<bool, SceneError> {
        let id = object.id;
        if object.region != self.region.id() {
            return Err(SceneError::WrongRegion {
                id,
                owner: object.region,
            });
        }
        if self.objects.contains_key(&id) {
            tracing::debug!(%id, "replicated creation already present");
            return Ok(false);
        }
        object.reset_durability();
        self.objects.insert(id, object);
        self.events.push(SceneEvent::Created {
            id,
            origin: CreationOrigin::Sync,
        });
        Ok(true)
    }

    /// Objects whose name equals `name` exactly.
    pub fn find_by_name(&self, name: &str) -> Vec<&SceneObject> {
        self.find(|o| o.name == name)
    }

    pub fn find(&self, mut predicate: impl FnMut(&SceneObject) -> bool) -> Vec<&SceneObject> {
        self.objects.values().filter(|o| predicate(o)).collect()
    }

    /// Every object matching `filter`, attachments included.
    pub fn select(&self, filter: &ObjectFilter) -> Vec<&SceneObject> {
        self.find(|o| self.matches(o, filter))
    }

    /// Objects that a removal with `filter` would delete. Attachments are
    /// never candidates; they belong to their wearer.
    pub fn deletion_candidates(&self, filter: &ObjectFilter) -> Vec<ObjectId> {
        self.objects
            .values()
            .filter(|o| !o.is_attachment && self.matches(o, filter))
            .map(|o| o.id)
            .collect()
    }

    /// Remove the given objects, returning those that existed.
    pub fn delete(&mut self, ids: &[ObjectId]) -> Vec<SceneObject> {
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(obj) = self.objects.remove(id) {
                self.events.push(SceneEvent::Deleted { id: *id });
                removed.push(obj);
            }
        }
        if !removed.is_empty() {
            tracing::info!(
                region = self.region.name(),
                count = removed.len(),
                "deleted scene objects"
            );
        }
        removed
    }

    /// Role-scoped write access to durability flags. Only the
    /// scene-persistence role gets one.
    pub fn persistence(&mut self, role: ActorRole) -> Option<PersistenceAccess<'_>> {
        (role == ActorRole::ScenePersistence).then(|| PersistenceAccess {
            objects: &mut self.objects,
        })
    }

    fn matches(&self, o: &SceneObject, filter: &ObjectFilter) -> bool {
        match filter {
            ObjectFilter::Id(id) => o.id == *id,
            ObjectFilter::Name(name) => o.name == *name,
            ObjectFilter::Owner(owner) => o.owner == *owner,
            ObjectFilter::Creator(creator) => o.creator == *creator,
            ObjectFilter::Within { min, max } => inside_box(o.position, *min, *max),
            ObjectFilter::OutsideBounds => {
                o.position.z < 0.0
                    || o.position.z > MAX_OBJECT_HEIGHT
                    || !self.region.contains_local(o.position)
            }
        }
    }
}

/// Inclusive on every axis.
fn inside_box(p: DVec3, min: DVec3, max: DVec3) -> bool {
    p.cmpge(min).all() && p.cmple(max).all()
}

/// Durability-flag accessor handed to the scene-persistence role.
#[derive(Debug)]
pub struct PersistenceAccess<'a> {
    objects: &'a mut BTreeMap<ObjectId, SceneObject>,
}

impl PersistenceAccess<'_> {
    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn is_persist_pending(&self, id: ObjectId) -> bool {
        self.objects.get(&id).is_some_and(|o| o.persist_pending)
    }

    /// Set the persist-pending flag. Returns `Some(true)` if this call set
    /// it, `Some(false)` if it was already set, `None` for unknown objects.
    pub fn mark_persist_pending(&mut self, id: ObjectId) -> Option<bool> {
        let obj = self.objects.get_mut(&id)?;
        let newly = !obj.persist_pending;
        obj.persist_pending = true;
        Some(newly)
    }

    pub fn mark_backed_up(&mut self, id: ObjectId) -> bool {
        match self.objects.get_mut(&id) {
            Some(obj) => {
                obj.backed_up = true;
                true
            }
            None => false,
        }
    }
}
