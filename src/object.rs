use crate::property::{PropertyCell, SourceGate};
use crate::registry::ObjectId;
use bitflags::bitflags;
use glam::{Quat, Vec2, Vec3};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Group,
    PolyLine,
    Mesh,
    Camera,
    Cross,
    Trace,
    SineCurve,
    Point,
}

bitflags! {
    /// Where a moved node lands relative to the sibling index passed to
    /// `set_parent`: TOP inserts before the index, BOTTOM after it, CENTER
    /// ignores the index and appends (drop-onto-node semantics).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InsertPosition: u8 {
        const TOP = 0b001;
        const BOTTOM = 0b010;
        const CENTER = 0b100;
        const ANY = Self::TOP.bits() | Self::BOTTOM.bits() | Self::CENTER.bits();
    }
}

/// Per-variant payload. The variant set is closed; clone, vertex access and
/// default naming are match-based so a new variant fails to compile until
/// every visitor handles it.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectPayload {
    Group,
    PolyLine { points: Vec<Vec3> },
    Mesh { vertices: Vec<Vec3>, edges: Vec<[u32; 2]> },
    Camera { eye_separation: f32, view_center: Vec2 },
    Cross { size: f32 },
    Trace { points: Vec<Vec3> },
    SineCurve { control: Vec<Vec3>, resolution: u32 },
    Point,
}

impl ObjectPayload {
    fn new(kind: ObjectKind, curve_resolution: u32) -> Self {
        match kind {
            ObjectKind::Group => ObjectPayload::Group,
            ObjectKind::PolyLine => ObjectPayload::PolyLine { points: Vec::new() },
            ObjectKind::Mesh => ObjectPayload::Mesh { vertices: Vec::new(), edges: Vec::new() },
            ObjectKind::Camera => {
                ObjectPayload::Camera { eye_separation: 0.5, view_center: Vec2::ZERO }
            }
            ObjectKind::Cross => ObjectPayload::Cross { size: 0.1 },
            ObjectKind::Trace => ObjectPayload::Trace { points: Vec::new() },
            ObjectKind::SineCurve => {
                ObjectPayload::SineCurve { control: Vec::new(), resolution: curve_resolution }
            }
            ObjectKind::Point => ObjectPayload::Point,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectPayload::Group => ObjectKind::Group,
            ObjectPayload::PolyLine { .. } => ObjectKind::PolyLine,
            ObjectPayload::Mesh { .. } => ObjectKind::Mesh,
            ObjectPayload::Camera { .. } => ObjectKind::Camera,
            ObjectPayload::Cross { .. } => ObjectKind::Cross,
            ObjectPayload::Trace { .. } => ObjectKind::Trace,
            ObjectPayload::SineCurve { .. } => ObjectKind::SineCurve,
            ObjectPayload::Point => ObjectKind::Point,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub(crate) parent: Option<ObjectId>,
    pub(crate) children: Vec<ObjectId>,
    pub(crate) position: PropertyCell<Vec3>,
    pub(crate) rotation: PropertyCell<Quat>,
    pub(crate) geometry_gate: SourceGate,
    pub(crate) cache_dirty: bool,
    pub(crate) cached_world: Vec<Vec3>,
    pub(crate) payload: ObjectPayload,
}

impl SceneObject {
    pub(crate) fn new(kind: ObjectKind, curve_resolution: u32) -> Self {
        Self {
            name: default_name(kind).to_string(),
            parent: None,
            children: Vec::new(),
            position: PropertyCell::new(Vec3::ZERO),
            rotation: PropertyCell::new(Quat::IDENTITY),
            geometry_gate: SourceGate::default(),
            cache_dirty: true,
            cached_world: Vec::new(),
            payload: ObjectPayload::new(kind, curve_resolution),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.payload.kind()
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    pub fn payload(&self) -> &ObjectPayload {
        &self.payload
    }

    /// Untransformed vertices for this node. Stored lists are borrowed;
    /// derived shapes (cross arms, curve samples, the point marker) are
    /// generated on the fly.
    pub fn local_vertices(&self) -> Cow<'_, [Vec3]> {
        match &self.payload {
            ObjectPayload::Group | ObjectPayload::Camera { .. } => Cow::Borrowed(&[]),
            ObjectPayload::PolyLine { points } | ObjectPayload::Trace { points } => {
                Cow::Borrowed(points.as_slice())
            }
            ObjectPayload::Mesh { vertices, .. } => Cow::Borrowed(vertices.as_slice()),
            ObjectPayload::Cross { size } => Cow::Owned(cross_arms(*size)),
            ObjectPayload::SineCurve { control, resolution } => {
                Cow::Owned(sample_curve(control, *resolution))
            }
            ObjectPayload::Point => Cow::Owned(vec![Vec3::ZERO]),
        }
    }

    /// The vertex list a tool may edit directly, if this variant has one.
    pub(crate) fn editable_points_mut(&mut self) -> Option<&mut Vec<Vec3>> {
        match &mut self.payload {
            ObjectPayload::PolyLine { points } | ObjectPayload::Trace { points } => Some(points),
            ObjectPayload::Mesh { vertices, .. } => Some(vertices),
            ObjectPayload::SineCurve { control, .. } => Some(control),
            _ => None,
        }
    }
}

fn default_name(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Group => "Group",
        ObjectKind::PolyLine => "PolyLine",
        ObjectKind::Mesh => "Mesh",
        ObjectKind::Camera => "Camera",
        ObjectKind::Cross => "Cross",
        ObjectKind::Trace => "Trace",
        ObjectKind::SineCurve => "SineCurve",
        ObjectKind::Point => "Point",
    }
}

// Three axis-aligned arms centered on the local origin, as start/end pairs.
fn cross_arms(size: f32) -> Vec<Vec3> {
    vec![
        Vec3::new(-size, 0.0, 0.0),
        Vec3::new(size, 0.0, 0.0),
        Vec3::new(0.0, -size, 0.0),
        Vec3::new(0.0, size, 0.0),
        Vec3::new(0.0, 0.0, -size),
        Vec3::new(0.0, 0.0, size),
    ]
}

// Cosine-eased samples through the control points. Endpoints are preserved
// exactly; `resolution` is the sample count per segment.
fn sample_curve(control: &[Vec3], resolution: u32) -> Vec<Vec3> {
    if control.len() < 2 || resolution == 0 {
        return control.to_vec();
    }
    let mut samples = Vec::with_capacity(1 + (control.len() - 1) * resolution as usize);
    samples.push(control[0]);
    for pair in control.windows(2) {
        for step in 1..=resolution {
            let t = step as f32 / resolution as f32;
            let eased = (1.0 - (std::f32::consts::PI * t).cos()) * 0.5;
            samples.push(pair[0].lerp(pair[1], eased));
        }
    }
    samples
}
