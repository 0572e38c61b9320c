use crate::commands::{CommandFate, CommandQueue, CommandToken};
use crate::config::{ReparentCoordinates, SceneConfig};
use crate::events::{HistoryEvent, PropertyEvent, SceneEvents, StructureEvent, SubscriberToken};
use crate::history::{History, Snapshot};
use crate::object::{InsertPosition, ObjectKind, ObjectPayload, SceneObject};
use crate::property::SourcePriority;
use crate::registry::{IdentityError, ObjectId, ObjectRegistry};
use crate::selection::Selection;
use crate::time::FrameClock;
use anyhow::{bail, Result};
use glam::{Quat, Vec3};
use log::{debug, warn};
use smallvec::SmallVec;
use std::collections::HashSet;

// ---------- Scene container ----------

/// Owner of the whole editing core: the object registry, the tracked-object
/// list, the root group, selection, the deferred command queue, undo/redo
/// history, and the event channels. All mutation of the graph goes through
/// this type; `flush_frame` is the one per-frame safe point.
pub struct Scene {
    registry: ObjectRegistry,
    objects: Vec<ObjectId>,
    root: ObjectId,
    selection: Selection,
    commands: CommandQueue,
    history: History,
    pub events: SceneEvents,
    clock: FrameClock,
    config: SceneConfig,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}

impl Scene {
    pub fn new(config: SceneConfig) -> Self {
        let mut registry = ObjectRegistry::default();
        let mut root_object = SceneObject::new(ObjectKind::Group, config.curve_resolution);
        root_object.name = "Root".to_string();
        let root = registry.insert(root_object);

        let mut commands = CommandQueue::default();
        // End-of-frame pump delivering the coalesced property notifications.
        commands.schedule(true, |scene: &mut Scene| {
            scene.pump_deferred_notifications();
            Ok(CommandFate::Retain)
        });

        let history = History::new(config.history_limit);
        Self {
            registry,
            objects: Vec::new(),
            root,
            selection: Selection::default(),
            commands,
            history,
            events: SceneEvents::default(),
            clock: FrameClock::new(),
            config,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn root(&self) -> ObjectId {
        self.root
    }

    /// Tracked objects in insertion order; the root is not tracked.
    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    pub fn object(&self, id: ObjectId) -> Result<&SceneObject, IdentityError> {
        self.registry.get(id)
    }

    pub fn object_count(&self) -> usize {
        self.registry.live_objects()
    }

    pub fn set_delete_hook(&mut self, hook: impl FnMut(ObjectId, &SceneObject) + 'static) {
        self.registry.set_delete_hook(hook);
    }

    /// Re-validates a handle: fails on unknown, stale, or tombstoned ids.
    pub fn resolve(&self, id: ObjectId) -> Result<ObjectId, IdentityError> {
        self.registry.get(id).map(|_| id)
    }

    // ---------- structural operations ----------

    pub fn create_object(&mut self, kind: ObjectKind, parent: Option<ObjectId>) -> Result<ObjectId> {
        let parent = parent.unwrap_or(self.root);
        self.registry.get(parent)?;
        let id = self.registry.insert(SceneObject::new(kind, self.config.curve_resolution));
        self.objects.push(id);
        self.registry.get_mut(id)?.parent = Some(parent);
        self.registry.get_mut(parent)?.children.push(id);
        self.events.structure.publish(&StructureEvent::Created { object: id });
        Ok(id)
    }

    /// Moves `child` into `new_parent`'s children. The node is removed from
    /// its current list first; `index` then addresses the remaining
    /// siblings, adjusted by `position` (TOP before it, BOTTOM after it,
    /// CENTER appends and ignores the index).
    pub fn set_parent(
        &mut self,
        child: ObjectId,
        new_parent: ObjectId,
        index: usize,
        position: InsertPosition,
    ) -> Result<()> {
        self.registry.get(new_parent)?;
        if child == self.root {
            bail!("the root cannot be reparented");
        }
        if child == new_parent || self.is_ancestor_of(child, new_parent)? {
            bail!("cannot reparent {child} under its own subtree");
        }
        self.force_update_cache(child)?;
        let preserved = match self.config.reparent_coordinates {
            ReparentCoordinates::Adapt => {
                Some((self.world_position(child)?, self.world_rotation(child)?))
            }
            ReparentCoordinates::Keep => None,
        };

        let old_parent = self.registry.get(child)?.parent;
        if let Some(parent) = old_parent {
            self.registry.get_mut(parent)?.children.retain(|&existing| existing != child);
        }
        {
            let children = &mut self.registry.get_mut(new_parent)?.children;
            let at = insertion_index(index, position, children.len());
            children.insert(at, child);
        }
        self.registry.get_mut(child)?.parent = Some(new_parent);

        if let Some((world_position, world_rotation)) = preserved {
            self.set_world_position(child, world_position, SourcePriority::Input)?;
            self.set_world_rotation(child, world_rotation, SourcePriority::Input)?;
        }
        self.events.structure.publish(&StructureEvent::Reparented { object: child });
        Ok(())
    }

    /// Deletes the node and its whole subtree. Snapshots still holding the
    /// ids keep the slots alive as tombstones, which is what lets an undo
    /// revive the objects later.
    pub fn delete_object(&mut self, id: ObjectId) -> Result<()> {
        self.registry.get(id)?;
        if id == self.root {
            bail!("the root cannot be deleted");
        }
        if let Some(parent) = self.registry.get(id)?.parent {
            self.registry.get_mut(parent)?.children.retain(|&existing| existing != id);
        }

        let mut doomed: Vec<ObjectId> = Vec::new();
        let mut stack: SmallVec<[ObjectId; 32]> = SmallVec::new();
        stack.push(id);
        while let Some(current) = stack.pop() {
            doomed.push(current);
            stack.extend(self.registry.get(current)?.children.iter().copied());
        }
        for &node in doomed.iter().rev() {
            self.selection.remove(node);
            self.registry.destroy_object(node)?;
            if let Some(slot) = self.objects.iter().position(|&tracked| tracked == node) {
                self.objects.remove(slot);
                self.registry.release(node)?;
            } else {
                warn!("[scene] deleted object {node} was not tracked");
            }
            self.events.structure.publish(&StructureEvent::Deleted { object: node });
        }
        Ok(())
    }

    /// Clears every tracked object. Published first so collaborators can
    /// drop their references before the objects disappear.
    pub fn delete_all(&mut self) -> Result<()> {
        self.events.structure.publish(&StructureEvent::Cleared);
        self.selection.clear();
        for id in std::mem::take(&mut self.objects) {
            self.registry.destroy_object(id)?;
            self.registry.release(id)?;
        }
        self.registry.get_mut(self.root)?.children.clear();
        Ok(())
    }

    /// Moves the selected set under `destination` while preserving the tree
    /// structure across unselected links: a selected node whose nearest
    /// moved ancestor is also moving stays attached to it, and an
    /// unselected child of a moved node is handed to its nearest unselected
    /// ancestor.
    pub fn move_selection_to(
        &mut self,
        destination: ObjectId,
        index: usize,
        position: InsertPosition,
    ) -> Result<()> {
        let selected: HashSet<ObjectId> = self.selection.ids().iter().copied().collect();
        if selected.is_empty() {
            return Ok(());
        }
        let walk_root = self.find_root(destination)?;

        let mut moved_roots: Vec<ObjectId> = Vec::new();
        let mut carried: HashSet<ObjectId> = HashSet::new();
        let mut strays: Vec<(ObjectId, ObjectId)> = Vec::new();

        let mut stack: SmallVec<[(ObjectId, Option<ObjectId>); 32]> = SmallVec::new();
        stack.push((walk_root, None));
        while let Some((node, parent)) = stack.pop() {
            if let Some(parent) = parent {
                if selected.contains(&node) {
                    let parent_moves = carried.contains(&parent) || moved_roots.contains(&parent);
                    if parent_moves {
                        carried.insert(node);
                    } else if let Some(anchor) = self.nearest_in(parent, &moved_roots)? {
                        strays.push((node, anchor));
                    } else {
                        moved_roots.push(node);
                    }
                } else if selected.contains(&parent) {
                    let new_parent = self.nearest_unselected_ancestor(parent, &selected)?;
                    strays.push((node, new_parent));
                }
            }
            let object = self.registry.get(node)?;
            for &child in object.children.iter().rev() {
                stack.push((child, Some(node)));
            }
        }

        if position.contains(InsertPosition::BOTTOM) {
            for &node in &moved_roots {
                self.set_parent(node, destination, index, position)?;
            }
        } else {
            for &node in moved_roots.iter().rev() {
                self.set_parent(node, destination, index, position)?;
            }
        }
        for (node, new_parent) in strays {
            // Stray nodes always keep their world placement, whatever the
            // configured reparent mode.
            let world_position = self.world_position(node)?;
            let world_rotation = self.world_rotation(node)?;
            self.set_parent(node, new_parent, 0, InsertPosition::CENTER)?;
            self.set_world_position(node, world_position, SourcePriority::Input)?;
            self.set_world_rotation(node, world_rotation, SourcePriority::Input)?;
        }
        Ok(())
    }

    fn find_root(&self, id: ObjectId) -> Result<ObjectId, IdentityError> {
        let mut current = id;
        while let Some(parent) = self.registry.get(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    fn nearest_in(
        &self,
        start: ObjectId,
        candidates: &[ObjectId],
    ) -> Result<Option<ObjectId>, IdentityError> {
        let mut current = Some(start);
        while let Some(node) = current {
            if candidates.contains(&node) {
                return Ok(Some(node));
            }
            current = self.registry.get(node)?.parent;
        }
        Ok(None)
    }

    fn nearest_unselected_ancestor(
        &self,
        start: ObjectId,
        selected: &HashSet<ObjectId>,
    ) -> Result<ObjectId, IdentityError> {
        let mut current = start;
        while selected.contains(&current) {
            match self.registry.get(current)?.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(current)
    }

    fn is_ancestor_of(&self, candidate: ObjectId, node: ObjectId) -> Result<bool, IdentityError> {
        let mut current = self.registry.get(node)?.parent;
        while let Some(ancestor) = current {
            if ancestor == candidate {
                return Ok(true);
            }
            current = self.registry.get(ancestor)?.parent;
        }
        Ok(false)
    }

    // ---------- transforms & caches ----------

    /// Marks the node and every descendant dirty so world-space vertex
    /// buffers are recomputed on the next read. Called before any
    /// structural or positional change.
    pub fn force_update_cache(&mut self, id: ObjectId) -> Result<(), IdentityError> {
        let mut stack: SmallVec<[ObjectId; 32]> = SmallVec::new();
        stack.push(id);
        while let Some(current) = stack.pop() {
            let object = self.registry.get_mut(current)?;
            object.cache_dirty = true;
            stack.extend(object.children.iter().copied());
        }
        Ok(())
    }

    /// Applies this node's rotation, then translation, then recurses to the
    /// parent — local coordinates in, world coordinates out.
    pub fn cascade_transform(&self, id: ObjectId, points: &mut [Vec3]) -> Result<(), IdentityError> {
        let mut current = Some(id);
        while let Some(node) = current {
            let object = self.registry.get(node)?;
            let rotation = *object.rotation.get();
            let translation = *object.position.get();
            for point in points.iter_mut() {
                *point = rotation * *point + translation;
            }
            current = object.parent;
        }
        Ok(())
    }

    /// Exact inverse of `cascade_transform`: undoes the ancestors first,
    /// then this node's translation and rotation.
    pub fn cascade_transform_inverse(
        &self,
        id: ObjectId,
        points: &mut [Vec3],
    ) -> Result<(), IdentityError> {
        let mut chain: SmallVec<[ObjectId; 32]> = SmallVec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            chain.push(node);
            current = self.registry.get(node)?.parent;
        }
        for &node in chain.iter().rev() {
            let object = self.registry.get(node)?;
            let inverse = object.rotation.get().inverse();
            let translation = *object.position.get();
            for point in points.iter_mut() {
                *point = inverse * (*point - translation);
            }
        }
        Ok(())
    }

    pub fn to_world_position(&self, id: ObjectId, point: Vec3) -> Result<Vec3, IdentityError> {
        let mut points = [point];
        self.cascade_transform(id, &mut points)?;
        Ok(points[0])
    }

    pub fn to_local_position(&self, id: ObjectId, point: Vec3) -> Result<Vec3, IdentityError> {
        let mut points = [point];
        self.cascade_transform_inverse(id, &mut points)?;
        Ok(points[0])
    }

    pub fn world_position(&self, id: ObjectId) -> Result<Vec3, IdentityError> {
        self.to_world_position(id, Vec3::ZERO)
    }

    pub fn world_rotation(&self, id: ObjectId) -> Result<Quat, IdentityError> {
        let mut chain: SmallVec<[ObjectId; 32]> = SmallVec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            chain.push(node);
            current = self.registry.get(node)?.parent;
        }
        let mut rotation = Quat::IDENTITY;
        for &node in chain.iter().rev() {
            rotation *= *self.registry.get(node)?.rotation.get();
        }
        Ok(rotation)
    }

    /// World-space vertices of the node, recomputed lazily after any
    /// structural or positional change.
    pub fn world_vertices(&mut self, id: ObjectId) -> Result<&[Vec3], IdentityError> {
        if self.registry.get(id)?.cache_dirty {
            let mut points = self.registry.get(id)?.local_vertices().into_owned();
            self.cascade_transform(id, &mut points)?;
            let object = self.registry.get_mut(id)?;
            object.cached_world = points;
            object.cache_dirty = false;
        }
        Ok(&self.registry.get(id)?.cached_world)
    }

    // ---------- properties ----------

    pub fn position(&self, id: ObjectId) -> Result<Vec3, IdentityError> {
        Ok(*self.registry.get(id)?.position.get())
    }

    pub fn set_position(
        &mut self,
        id: ObjectId,
        value: Vec3,
        source: SourcePriority,
    ) -> Result<bool, IdentityError> {
        let accepted = self.registry.get_mut(id)?.position.set(value, source);
        if accepted {
            self.force_update_cache(id)?;
        }
        Ok(accepted)
    }

    pub fn rotation(&self, id: ObjectId) -> Result<Quat, IdentityError> {
        Ok(*self.registry.get(id)?.rotation.get())
    }

    pub fn set_rotation(
        &mut self,
        id: ObjectId,
        value: Quat,
        source: SourcePriority,
    ) -> Result<bool, IdentityError> {
        let accepted = self.registry.get_mut(id)?.rotation.set(value, source);
        if accepted {
            self.force_update_cache(id)?;
        }
        Ok(accepted)
    }

    pub fn set_world_position(
        &mut self,
        id: ObjectId,
        value: Vec3,
        source: SourcePriority,
    ) -> Result<bool, IdentityError> {
        let local = match self.registry.get(id)?.parent {
            Some(parent) => self.to_local_position(parent, value)?,
            None => value,
        };
        self.set_position(id, local, source)
    }

    pub fn set_world_rotation(
        &mut self,
        id: ObjectId,
        value: Quat,
        source: SourcePriority,
    ) -> Result<bool, IdentityError> {
        let local = match self.registry.get(id)?.parent {
            Some(parent) => self.world_rotation(parent)?.inverse() * value,
            None => value,
        };
        self.set_rotation(id, local, source)
    }

    // ---------- vertex lists ----------

    pub fn vertices(&self, id: ObjectId) -> Result<Vec<Vec3>, IdentityError> {
        Ok(self.registry.get(id)?.local_vertices().into_owned())
    }

    pub fn set_vertices(
        &mut self,
        id: ObjectId,
        points: Vec<Vec3>,
        source: SourcePriority,
    ) -> Result<bool> {
        self.edit_points(id, source, move |list| {
            *list = points;
            Ok(())
        })
    }

    pub fn add_vertex(&mut self, id: ObjectId, point: Vec3, source: SourcePriority) -> Result<bool> {
        self.edit_points(id, source, move |list| {
            list.push(point);
            Ok(())
        })
    }

    pub fn set_vertex(
        &mut self,
        id: ObjectId,
        index: usize,
        point: Vec3,
        source: SourcePriority,
    ) -> Result<bool> {
        self.edit_points(id, source, move |list| match list.get_mut(index) {
            Some(slot) => {
                *slot = point;
                Ok(())
            }
            None => bail!("vertex index {index} is out of bounds"),
        })
    }

    pub fn remove_last_vertex(&mut self, id: ObjectId, source: SourcePriority) -> Result<bool> {
        let object = self.registry.get(id)?;
        if object.local_vertices().is_empty() {
            return Ok(false);
        }
        self.edit_points(id, source, |list| {
            list.pop();
            Ok(())
        })
    }

    pub fn add_edge(&mut self, id: ObjectId, edge: [u32; 2], source: SourcePriority) -> Result<bool> {
        let object = self.registry.get_mut(id)?;
        let ObjectPayload::Mesh { vertices, .. } = &object.payload else {
            debug!("[scene] object {id} has no edge list; ignoring");
            return Ok(false);
        };
        let limit = vertices.len() as u32;
        if edge[0] >= limit || edge[1] >= limit {
            bail!("edge {edge:?} references a vertex beyond {limit}");
        }
        if !object.geometry_gate.admit(source) {
            return Ok(false);
        }
        if let ObjectPayload::Mesh { edges, .. } = &mut object.payload {
            edges.push(edge);
        }
        self.force_update_cache(id)?;
        Ok(true)
    }

    fn edit_points(
        &mut self,
        id: ObjectId,
        source: SourcePriority,
        edit: impl FnOnce(&mut Vec<Vec3>) -> Result<()>,
    ) -> Result<bool> {
        let object = self.registry.get_mut(id)?;
        if object.editable_points_mut().is_none() {
            debug!("[scene] object {id} has no editable vertex list; ignoring");
            return Ok(false);
        }
        if !object.geometry_gate.admit(source) {
            return Ok(false);
        }
        if let Some(points) = object.editable_points_mut() {
            edit(points)?;
        }
        self.force_update_cache(id)?;
        Ok(true)
    }

    // ---------- selection ----------

    pub fn select(&mut self, id: ObjectId) -> Result<(), IdentityError> {
        self.registry.get(id)?;
        self.selection.set(id);
        Ok(())
    }

    pub fn add_to_selection(&mut self, id: ObjectId) -> Result<(), IdentityError> {
        self.registry.get(id)?;
        self.selection.add(id);
        Ok(())
    }

    pub fn deselect(&mut self, id: ObjectId) {
        self.selection.remove(id);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &[ObjectId] {
        self.selection.ids()
    }

    // ---------- history ----------

    /// Captures the current tree as the new present backup, archiving the
    /// previous one. A no-op while commits are suppressed.
    pub fn commit(&mut self) -> Result<()> {
        if self.history.commits_suppressed() {
            return Ok(());
        }
        let snapshot =
            Snapshot::capture(&mut self.registry, self.root, &self.objects, &self.selection)?;
        self.history.record(&mut self.registry, snapshot);
        Ok(())
    }

    /// Undo. Returns false when there is nothing to undo; a corrupt
    /// snapshot surfaces an error and leaves the live tree untouched.
    pub fn rollback(&mut self) -> Result<bool> {
        match self.history.rollback(&mut self.registry, &mut self.objects, &mut self.selection)? {
            Some(objects) => {
                self.events.history.publish(&HistoryEvent::Restored { objects });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Redo, symmetric to `rollback`.
    pub fn repeat(&mut self) -> Result<bool> {
        match self.history.repeat(&mut self.registry, &mut self.objects, &mut self.selection)? {
            Some(objects) => {
                self.events.history.publish(&HistoryEvent::Restored { objects });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Suppresses nested commits for the duration of one logical action.
    pub fn set_commits_suppressed(&mut self, suppressed: bool) {
        self.history.set_commits_suppressed(suppressed);
    }

    /// Drops every snapshot, releasing the references they hold.
    pub fn clear_history(&mut self) {
        self.history.clear(&mut self.registry);
    }

    pub fn undo_depth(&self) -> usize {
        self.history.past_len()
    }

    pub fn redo_depth(&self) -> usize {
        self.history.future_len()
    }

    pub fn on_state_change(&self, handler: impl FnMut(&HistoryEvent) + 'static) -> SubscriberToken {
        self.events.history.subscribe(handler)
    }

    // ---------- deferred commands & frame flush ----------

    pub fn schedule(
        &mut self,
        persistent: bool,
        action: impl FnMut(&mut Scene) -> Result<CommandFate> + 'static,
    ) -> CommandToken {
        self.commands.schedule(persistent, action)
    }

    pub fn deactivate(&mut self, token: CommandToken) {
        self.commands.deactivate(token);
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.pending()
    }

    pub fn schedule_create(&mut self, kind: ObjectKind, parent: Option<ObjectId>) -> CommandToken {
        self.schedule(false, move |scene| {
            scene.create_object(kind, parent)?;
            Ok(CommandFate::Done)
        })
    }

    pub fn schedule_delete(&mut self, id: ObjectId) -> CommandToken {
        self.schedule(false, move |scene| {
            scene.delete_object(id)?;
            Ok(CommandFate::Done)
        })
    }

    /// Runs every queued action exactly once, in registration order, then
    /// delivers the coalesced property notifications (the pump is itself a
    /// persistent entry). Actions scheduled during the flush wait for the
    /// next one. A failing action aborts the rest of the cycle; what it
    /// already changed stays changed.
    pub fn flush_frame(&mut self) -> Result<()> {
        if self.commands.flushing {
            bail!("flush_frame is not re-entrant");
        }
        self.commands.flushing = true;
        self.clock.tick();

        let batch = self.commands.take_batch();
        let mut survivors = Vec::with_capacity(batch.len());
        let mut failure = None;
        let mut iterator = batch.into_iter();
        while let Some(mut entry) = iterator.next() {
            if self.commands.consume_cancellation(entry.id) {
                continue;
            }
            match (entry.action)(self) {
                Ok(CommandFate::Retain) if entry.persistent => survivors.push(entry),
                Ok(_) => {}
                Err(error) => {
                    if entry.persistent {
                        survivors.push(entry);
                    }
                    failure = Some(error);
                    break;
                }
            }
        }
        survivors.extend(iterator);
        self.commands.restore(survivors);
        self.commands.flushing = false;

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.clock.frame_index()
    }

    pub fn delta_seconds(&self) -> f32 {
        self.clock.delta_seconds()
    }

    fn pump_deferred_notifications(&mut self) {
        let mut ids: SmallVec<[ObjectId; 64]> = SmallVec::new();
        ids.push(self.root);
        ids.extend(self.objects.iter().copied());

        let mut notifications: Vec<PropertyEvent> = Vec::new();
        for id in ids {
            let Ok(object) = self.registry.get_mut(id) else { continue };
            if let Some(value) = object.position.take_notification() {
                notifications.push(PropertyEvent::Position { object: id, value });
            }
            if let Some(value) = object.rotation.take_notification() {
                notifications.push(PropertyEvent::Rotation { object: id, value });
            }
            if object.geometry_gate.take() {
                notifications.push(PropertyEvent::Geometry { object: id });
            }
        }
        for event in &notifications {
            self.events.property.publish(event);
        }
    }
}

/// Target slot for an insertion into a child list of length `len`, after
/// the moved node has already been removed from wherever it was.
fn insertion_index(index: usize, position: InsertPosition, len: usize) -> usize {
    let at = if position.contains(InsertPosition::BOTTOM) {
        index + 1
    } else if position.contains(InsertPosition::TOP) {
        index
    } else {
        len
    };
    at.min(len)
}
