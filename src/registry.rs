use crate::object::SceneObject;
use std::fmt;
use thiserror::Error;

/// Generation-checked arena index. The generation bumps every time a slot
/// is freed, so a handle that outlives its object resolves to an error
/// instead of whatever object reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    slot: u32,
    generation: u32,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.slot, self.generation)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    #[error("object {0} was destroyed but is still referenced")]
    UseAfterFree(ObjectId),
    #[error("handle {0} does not match any live slot")]
    StaleHandle(ObjectId),
    #[error("object {0} was already destroyed")]
    AlreadyDestroyed(ObjectId),
}

pub type DeleteHook = Box<dyn FnMut(ObjectId, &SceneObject)>;

struct Slot {
    generation: u32,
    refs: u32,
    object: Option<SceneObject>,
}

/// Owner of every scene object. Holding scopes (the live tree's tracked
/// list, history snapshots, the scene root) share one reference count per
/// id via `retain`/`release`; the hosted object is destroyed exactly once —
/// on the release that reaches zero, on `destroy_object`, or when `rehost`
/// replaces it — and the delete hook observes each destruction.
#[derive(Default)]
pub struct ObjectRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    delete_hook: Option<DeleteHook>,
}

impl ObjectRegistry {
    /// Hook invoked once per hosted object right before it is dropped,
    /// e.g. to release GPU buffers owned by a renderer collaborator.
    pub fn set_delete_hook(&mut self, hook: impl FnMut(ObjectId, &SceneObject) + 'static) {
        self.delete_hook = Some(Box::new(hook));
    }

    pub fn insert(&mut self, object: SceneObject) -> ObjectId {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.refs = 1;
            entry.object = Some(object);
            ObjectId { slot, generation: entry.generation }
        } else {
            let slot = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, refs: 1, object: Some(object) });
            ObjectId { slot, generation: 0 }
        }
    }

    fn slot(&self, id: ObjectId) -> Result<&Slot, IdentityError> {
        self.slots
            .get(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)
            .ok_or(IdentityError::StaleHandle(id))
    }

    fn slot_mut(&mut self, id: ObjectId) -> Result<&mut Slot, IdentityError> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)
            .ok_or(IdentityError::StaleHandle(id))
    }

    pub fn get(&self, id: ObjectId) -> Result<&SceneObject, IdentityError> {
        self.slot(id)?.object.as_ref().ok_or(IdentityError::UseAfterFree(id))
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut SceneObject, IdentityError> {
        self.slot_mut(id)?.object.as_mut().ok_or(IdentityError::UseAfterFree(id))
    }

    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.slot(id).map(|slot| slot.object.is_some()).unwrap_or(false)
    }

    pub fn retain(&mut self, id: ObjectId) -> Result<(), IdentityError> {
        let slot = self.slot_mut(id);
        debug_assert!(slot.is_ok(), "retain on dead slot {id}");
        slot?.refs += 1;
        Ok(())
    }

    /// Drops one reference. At zero the object (if still hosted) is
    /// destroyed and the slot is freed, invalidating every copy of the id.
    pub fn release(&mut self, id: ObjectId) -> Result<(), IdentityError> {
        let slot = self.slot_mut(id);
        debug_assert!(slot.is_ok(), "release on dead slot {id}");
        let slot = slot?;
        debug_assert!(slot.refs > 0, "release without a matching retain on {id}");
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs > 0 {
            return Ok(());
        }
        let object = slot.object.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot);
        if let Some(object) = object {
            self.destroyed(id, object);
        }
        Ok(())
    }

    /// Destroys the hosted object while references remain, leaving a
    /// tombstone: reads fail with `UseAfterFree` until the id is rehosted
    /// or the last reference is released.
    pub fn destroy_object(&mut self, id: ObjectId) -> Result<(), IdentityError> {
        let slot = self.slot_mut(id)?;
        let object = slot.object.take();
        debug_assert!(object.is_some(), "double destroy of {id}");
        match object {
            Some(object) => {
                self.destroyed(id, object);
                Ok(())
            }
            None => Err(IdentityError::AlreadyDestroyed(id)),
        }
    }

    /// Replaces the hosted object, redirecting every existing handle to the
    /// replacement. The previous object (if any) is destroyed first. Used
    /// when undo/redo re-hosts an id onto a freshly cloned object.
    pub fn rehost(&mut self, id: ObjectId, object: SceneObject) -> Result<(), IdentityError> {
        let slot = self.slot_mut(id);
        debug_assert!(slot.is_ok(), "rehost on dead slot {id}");
        let previous = slot?.object.replace(object);
        match previous {
            // One object out, one in: the slot stays hosted and the live
            // count is unchanged.
            Some(previous) => {
                if let Some(hook) = self.delete_hook.as_mut() {
                    hook(id, &previous);
                }
            }
            None => self.live += 1,
        }
        Ok(())
    }

    pub fn ref_count(&self, id: ObjectId) -> Result<u32, IdentityError> {
        Ok(self.slot(id)?.refs)
    }

    /// Hosted objects currently alive, tombstones excluded.
    pub fn live_objects(&self) -> usize {
        self.live
    }

    fn destroyed(&mut self, id: ObjectId, object: SceneObject) {
        self.live -= 1;
        if let Some(hook) = self.delete_hook.as_mut() {
            hook(id, &object);
        }
    }
}
