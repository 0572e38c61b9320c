pub mod commands;
pub mod config;
pub mod events;
pub mod history;
pub mod object;
pub mod property;
pub mod registry;
pub mod scene;
pub mod selection;
pub mod time;

pub use commands::{CommandFate, CommandQueue, CommandToken};
pub use config::{ReparentCoordinates, SceneConfig};
pub use events::{EventChannel, HistoryEvent, PropertyEvent, StructureEvent, SubscriberToken};
pub use history::ApplyError;
pub use object::{InsertPosition, ObjectKind, ObjectPayload, SceneObject};
pub use property::{PropertyCell, SourcePriority};
pub use registry::{IdentityError, ObjectId, ObjectRegistry};
pub use scene::Scene;
pub use selection::Selection;
pub use time::FrameClock;
