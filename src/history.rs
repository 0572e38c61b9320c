use crate::object::SceneObject;
use crate::registry::{IdentityError, ObjectId, ObjectRegistry};
use crate::selection::Selection;
use log::warn;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ApplyError {
    #[error("snapshot has no clone for its root")]
    MissingRoot,
    #[error("snapshot has no clone for referenced object {0}")]
    MissingClone(ObjectId),
    #[error("object {0} is linked from more than one parent in the snapshot")]
    DoublyLinked(ObjectId),
    #[error("snapshot references freed slot {0}")]
    DeadSlot(ObjectId),
}

/// A self-contained copy of the scene at one point in time: a clone of the
/// root and of every tracked object, the tracked order, and the selected
/// ids. Capturing retains every cloned id so the slots outlive the live
/// tree; `dispose` gives those references back.
pub struct Snapshot {
    root: ObjectId,
    clones: HashMap<ObjectId, SceneObject>,
    tracked: Vec<ObjectId>,
    selected: Vec<ObjectId>,
}

impl Snapshot {
    pub(crate) fn capture(
        registry: &mut ObjectRegistry,
        root: ObjectId,
        tracked: &[ObjectId],
        selection: &Selection,
    ) -> Result<Self, IdentityError> {
        let mut clones = HashMap::with_capacity(tracked.len() + 1);
        clones.insert(root, registry.get(root)?.clone());
        for &id in tracked {
            clones.insert(id, registry.get(id)?.clone());
        }
        for &id in clones.keys() {
            registry.retain(id)?;
        }
        Ok(Self { root, clones, tracked: tracked.to_vec(), selected: selection.ids().to_vec() })
    }

    pub(crate) fn dispose(self, registry: &mut ObjectRegistry) {
        for &id in self.clones.keys() {
            registry.release(id).ok();
        }
    }

    pub(crate) fn object_count(&self) -> usize {
        self.clones.len()
    }
}

/// Restores a snapshot with all-or-nothing semantics. Phase one builds and
/// fully validates a temporary set of fresh clones; any dangling child
/// reference aborts before the live tree is touched, and the temporaries
/// just drop. Phase two cannot fail: every id is rehosted onto its fresh
/// clone, the tracked list is swapped, and the selection is rebuilt.
pub(crate) fn apply_snapshot(
    registry: &mut ObjectRegistry,
    tracked: &mut Vec<ObjectId>,
    selection: &mut Selection,
    snapshot: &Snapshot,
) -> Result<(), ApplyError> {
    let mut fresh: HashMap<ObjectId, SceneObject> =
        snapshot.clones.iter().map(|(id, object)| (*id, object.clone())).collect();
    if !fresh.contains_key(&snapshot.root) {
        return Err(ApplyError::MissingRoot);
    }

    let mut visited: HashSet<ObjectId> = HashSet::with_capacity(fresh.len());
    let mut stack: SmallVec<[(ObjectId, Option<ObjectId>); 64]> = SmallVec::new();
    stack.push((snapshot.root, None));
    while let Some((id, parent)) = stack.pop() {
        if !visited.insert(id) {
            return Err(ApplyError::DoublyLinked(id));
        }
        let object = fresh.get_mut(&id).ok_or(ApplyError::MissingClone(id))?;
        object.parent = parent;
        object.cache_dirty = true;
        object.cached_world.clear();
        for &child in &object.children {
            stack.push((child, Some(id)));
        }
    }
    for &id in &snapshot.tracked {
        if !fresh.contains_key(&id) {
            return Err(ApplyError::MissingClone(id));
        }
    }
    for &id in fresh.keys() {
        if registry.ref_count(id).is_err() {
            return Err(ApplyError::DeadSlot(id));
        }
    }

    // Validated; from here every step succeeds. Old objects are destroyed
    // as their ids are rehosted, objects created after the snapshot die
    // with the tracked-list swap.
    for (id, object) in fresh {
        registry.rehost(id, object).ok();
    }
    for &id in &snapshot.tracked {
        registry.retain(id).ok();
    }
    for id in std::mem::replace(tracked, snapshot.tracked.clone()) {
        if !snapshot.clones.contains_key(&id) {
            // Live but unknown to the snapshot: the object leaves the world
            // now; a redo snapshot still holding the id may revive it.
            registry.destroy_object(id).ok();
        }
        registry.release(id).ok();
    }
    selection.clear();
    for &id in &snapshot.selected {
        if registry.contains_object(id) {
            selection.add(id);
        } else {
            warn!("[history] selected object {id} no longer exists; dropping from selection");
        }
    }
    Ok(())
}

/// Bounded undo/redo stacks plus the backup of the present state. The
/// bookkeeping follows one rule everywhere: a snapshot leaving the stacks
/// is disposed, never leaked and never double-released.
pub struct History {
    past: VecDeque<Snapshot>,
    future: Vec<Snapshot>,
    present: Option<Snapshot>,
    limit: usize,
    suppress_commits: bool,
}

impl History {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: Vec::new(),
            present: None,
            limit: limit.max(1),
            suppress_commits: false,
        }
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    pub fn commits_suppressed(&self) -> bool {
        self.suppress_commits
    }

    pub(crate) fn set_commits_suppressed(&mut self, suppressed: bool) {
        self.suppress_commits = suppressed;
    }

    /// Archives the previous present backup and installs `snapshot` as the
    /// new one. A commit after an undo discards the redo branch.
    pub(crate) fn record(&mut self, registry: &mut ObjectRegistry, snapshot: Snapshot) {
        self.clear_future(registry);
        if let Some(previous) = self.present.take() {
            self.past.push_back(previous);
            while self.past.len() > self.limit {
                if let Some(oldest) = self.past.pop_front() {
                    oldest.dispose(registry);
                }
            }
        }
        self.present = Some(snapshot);
    }

    pub(crate) fn rollback(
        &mut self,
        registry: &mut ObjectRegistry,
        tracked: &mut Vec<ObjectId>,
        selection: &mut Selection,
    ) -> Result<Option<usize>, ApplyError> {
        let Some(snapshot) = self.past.pop_back() else {
            return Ok(None);
        };
        let parked_present = self.present.is_some();
        if let Some(present) = self.present.take() {
            self.future.push(present);
        }
        match apply_snapshot(registry, tracked, selection, &snapshot) {
            Ok(()) => {
                let restored = snapshot.object_count();
                self.present = Some(snapshot);
                Ok(Some(restored))
            }
            Err(error) => {
                snapshot.dispose(registry);
                if parked_present {
                    self.present = self.future.pop();
                }
                self.clear_past(registry);
                warn!("[history] rollback failed: {error}; undo stack cleared");
                Err(error)
            }
        }
    }

    pub(crate) fn repeat(
        &mut self,
        registry: &mut ObjectRegistry,
        tracked: &mut Vec<ObjectId>,
        selection: &mut Selection,
    ) -> Result<Option<usize>, ApplyError> {
        let Some(snapshot) = self.future.pop() else {
            return Ok(None);
        };
        let parked_present = self.present.is_some();
        if let Some(present) = self.present.take() {
            self.past.push_back(present);
        }
        match apply_snapshot(registry, tracked, selection, &snapshot) {
            Ok(()) => {
                let restored = snapshot.object_count();
                self.present = Some(snapshot);
                while self.past.len() > self.limit {
                    if let Some(oldest) = self.past.pop_front() {
                        oldest.dispose(registry);
                    }
                }
                Ok(Some(restored))
            }
            Err(error) => {
                snapshot.dispose(registry);
                if parked_present {
                    self.present = self.past.pop_back();
                }
                self.clear_future(registry);
                warn!("[history] redo failed: {error}; redo stack cleared");
                Err(error)
            }
        }
    }

    pub(crate) fn clear(&mut self, registry: &mut ObjectRegistry) {
        self.clear_past(registry);
        self.clear_future(registry);
        if let Some(present) = self.present.take() {
            present.dispose(registry);
        }
    }

    fn clear_past(&mut self, registry: &mut ObjectRegistry) {
        for snapshot in self.past.drain(..) {
            snapshot.dispose(registry);
        }
    }

    fn clear_future(&mut self, registry: &mut ObjectRegistry) {
        for snapshot in self.future.drain(..) {
            snapshot.dispose(registry);
        }
    }
}
