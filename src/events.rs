use crate::registry::ObjectId;
use glam::{Quat, Vec3};
use std::cell::RefCell;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureEvent {
    Created { object: ObjectId },
    Reparented { object: ObjectId },
    Deleted { object: ObjectId },
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyEvent {
    Position { object: ObjectId, value: Vec3 },
    Rotation { object: ObjectId, value: Quat },
    Geometry { object: ObjectId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEvent {
    Restored { objects: usize },
}

impl fmt::Display for StructureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureEvent::Created { object } => write!(f, "Created object={object}"),
            StructureEvent::Reparented { object } => write!(f, "Reparented object={object}"),
            StructureEvent::Deleted { object } => write!(f, "Deleted object={object}"),
            StructureEvent::Cleared => write!(f, "Cleared"),
        }
    }
}

impl fmt::Display for PropertyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyEvent::Position { object, value } => {
                write!(f, "Position object={} value=({:.3},{:.3},{:.3})", object, value.x, value.y, value.z)
            }
            PropertyEvent::Rotation { object, value } => {
                write!(
                    f,
                    "Rotation object={} value=({:.3},{:.3},{:.3},{:.3})",
                    object, value.x, value.y, value.z, value.w
                )
            }
            PropertyEvent::Geometry { object } => write!(f, "Geometry object={object}"),
        }
    }
}

impl fmt::Display for HistoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryEvent::Restored { objects } => write!(f, "Restored objects={objects}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberToken(u64);

type Handler<T> = Box<dyn FnMut(&T)>;

struct ChannelInner<T> {
    handlers: Vec<(u64, Handler<T>)>,
    pending_add: Vec<(u64, Handler<T>)>,
    pending_remove: Vec<u64>,
    next_token: u64,
    depth: u32,
}

impl<T> Default for ChannelInner<T> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
            next_token: 1,
            depth: 0,
        }
    }
}

/// Typed publish/subscribe channel. Subscriber-list mutations requested
/// while a publish is running are buffered and merged when the outermost
/// publish returns, so handlers never observe the list changing under them.
pub struct EventChannel<T> {
    inner: RefCell<ChannelInner<T>>,
}

impl<T> Default for EventChannel<T> {
    fn default() -> Self {
        Self { inner: RefCell::new(ChannelInner::default()) }
    }
}

impl<T> EventChannel<T> {
    pub fn subscribe(&self, handler: impl FnMut(&T) + 'static) -> SubscriberToken {
        let mut inner = self.inner.borrow_mut();
        let token = inner.next_token;
        inner.next_token += 1;
        let entry = (token, Box::new(handler) as Handler<T>);
        if inner.depth > 0 {
            inner.pending_add.push(entry);
        } else {
            inner.handlers.push(entry);
        }
        SubscriberToken(token)
    }

    pub fn unsubscribe(&self, token: SubscriberToken) {
        let mut inner = self.inner.borrow_mut();
        if inner.depth > 0 {
            inner.pending_remove.push(token.0);
        } else {
            inner.handlers.retain(|(id, _)| *id != token.0);
            inner.pending_add.retain(|(id, _)| *id != token.0);
        }
    }

    /// Invokes every handler registered as of the start of the call, in
    /// registration order. Nested publishes on the same channel are no-ops
    /// because the handler list is checked out during delivery.
    pub fn publish(&self, value: &T) {
        let mut handlers = {
            let mut inner = self.inner.borrow_mut();
            inner.depth += 1;
            std::mem::take(&mut inner.handlers)
        };
        for (_, handler) in handlers.iter_mut() {
            handler(value);
        }
        let mut inner = self.inner.borrow_mut();
        inner.handlers = handlers;
        inner.depth -= 1;
        if inner.depth == 0 {
            let added = std::mem::take(&mut inner.pending_add);
            inner.handlers.extend(added);
            let removed = std::mem::take(&mut inner.pending_remove);
            if !removed.is_empty() {
                inner.handlers.retain(|(id, _)| !removed.contains(id));
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().handlers.len()
    }
}

/// The channels the scene publishes on: structural mutations, coalesced
/// property notifications, and history restores (the re-render sink).
#[derive(Default)]
pub struct SceneEvents {
    pub structure: EventChannel<StructureEvent>,
    pub property: EventChannel<PropertyEvent>,
    pub history: EventChannel<HistoryEvent>,
}
