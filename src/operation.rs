//! Operation model: the drawing actions that make up a room's history.
//!
//! This module defines what lives in the log (`Operation`, `OperationBody`),
//! what a client proposes before an id exists (`OperationDraft`), and the
//! closed set of partial updates an operation can receive after creation
//! (`OperationUpdate`). The server store and the client replica share these
//! types so both sides agree on the wire shape.
//!
//! DESIGN
//! ======
//! - `kind` is the serde tag of `OperationBody` and never changes once the
//!   operation exists.
//! - Stroke `points` only grow. Removal happens at whole-operation
//!   granularity (undo, clear).
//! - Updates are tagged variants rather than object merges, so every field a
//!   client may touch after creation is listed here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable identifier allocated by the operation store.
pub type OperationId = Uuid;

/// Identity of one websocket connection.
pub type ConnectionId = Uuid;

/// Open-ended shape geometry/content (`x1,y1,x2,y2`, `text`, `src`, ...).
pub type Properties = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_COLOR: &str = "#000000";
pub const DEFAULT_STROKE_THICKNESS: f64 = 4.0;
pub const DEFAULT_SHAPE_THICKNESS: f64 = 2.0;

// =============================================================================
// GEOMETRY
// =============================================================================

/// One sampled pointer position in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// =============================================================================
// KINDS
// =============================================================================

/// Ink behavior of a freehand stroke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeMode {
    #[default]
    Brush,
    Eraser,
}

/// Geometry family of a shape operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeVariant {
    Line,
    Arrow,
    Rect,
    Ellipse,
    Text,
    Image,
}

/// Freehand ink or eraser path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    #[serde(default)]
    pub mode: StrokeMode,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_stroke_thickness")]
    pub thickness: f64,
    /// Temporal drawing order. Append-only.
    #[serde(default)]
    pub points: Vec<Point>,
}

/// Line, arrow, rectangle, ellipse, text, or image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub variant: ShapeVariant,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_shape_thickness")]
    pub thickness: f64,
    #[serde(default)]
    pub properties: Properties,
}

/// Kind-specific payload. Serialized with a `kind` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OperationBody {
    Stroke(Stroke),
    Shape(Shape),
}

fn default_color() -> String {
    DEFAULT_COLOR.to_owned()
}

fn default_stroke_thickness() -> f64 {
    DEFAULT_STROKE_THICKNESS
}

fn default_shape_thickness() -> f64 {
    DEFAULT_SHAPE_THICKNESS
}

// =============================================================================
// OPERATION
// =============================================================================

/// One committed drawing action as stored in the log and sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    /// Connection that created the operation.
    pub author: ConnectionId,
    #[serde(flatten)]
    pub body: OperationBody,
}

/// What a client proposes in `stroke:start`. Any `id` the client sends is
/// ignored; the store allocates one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    #[serde(flatten)]
    pub body: OperationBody,
}

impl Operation {
    /// Materialize a draft under a store-allocated id.
    #[must_use]
    pub fn from_draft(id: OperationId, author: ConnectionId, draft: OperationDraft) -> Self {
        Self { id, author, body: draft.body }
    }

    /// Wire name of the discriminator.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    /// Stroke points, or an empty slice for shapes.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        self.body.points()
    }

    /// Apply one partial update. Returns false when the update does not
    /// apply to this kind (e.g. points on a shape); the operation is then
    /// left unchanged.
    pub fn apply(&mut self, update: &OperationUpdate) -> bool {
        self.body.apply(update)
    }
}

impl OperationBody {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stroke(_) => "stroke",
            Self::Shape(_) => "shape",
        }
    }

    #[must_use]
    pub fn points(&self) -> &[Point] {
        match self {
            Self::Stroke(stroke) => &stroke.points,
            Self::Shape(_) => &[],
        }
    }

    pub fn apply(&mut self, update: &OperationUpdate) -> bool {
        match (self, update) {
            (Self::Stroke(stroke), OperationUpdate::PointsAppended(points)) => {
                stroke.points.extend_from_slice(points);
                true
            }
            (Self::Shape(shape), OperationUpdate::PropertiesMerged(props)) => {
                for (key, value) in props {
                    shape.properties.insert(key.clone(), value.clone());
                }
                true
            }
            (Self::Stroke(stroke), OperationUpdate::MetadataReplaced(meta)) => {
                if let Some(color) = &meta.color {
                    stroke.color.clone_from(color);
                }
                if let Some(thickness) = meta.thickness {
                    stroke.thickness = thickness;
                }
                if let Some(mode) = meta.mode {
                    stroke.mode = mode;
                }
                true
            }
            (Self::Shape(shape), OperationUpdate::MetadataReplaced(meta)) => {
                if let Some(color) = &meta.color {
                    shape.color.clone_from(color);
                }
                if let Some(thickness) = meta.thickness {
                    shape.thickness = thickness;
                }
                if let Some(variant) = meta.variant {
                    shape.variant = variant;
                }
                true
            }
            (Self::Stroke(_), OperationUpdate::PropertiesMerged(_))
            | (Self::Shape(_), OperationUpdate::PointsAppended(_)) => false,
        }
    }
}

// =============================================================================
// UPDATES
// =============================================================================

/// Partial update to an existing operation. Each variant is last-write-wins
/// per field it carries; fields it does not carry are retained.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationUpdate {
    /// Concatenate points onto a stroke, preserving order.
    PointsAppended(Vec<Point>),
    /// Overwrite the listed shape property keys.
    PropertiesMerged(Properties),
    /// Overwrite the listed top-level style fields.
    MetadataReplaced(OperationMetadata),
}

/// Top-level style fields. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationMetadata {
    pub color: Option<String>,
    pub thickness: Option<f64>,
    pub mode: Option<StrokeMode>,
    pub variant: Option<ShapeVariant>,
}

impl OperationMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.thickness.is_none() && self.mode.is_none() && self.variant.is_none()
    }
}

/// Terminal fields carried by `stroke:end`. Points are not accepted here:
/// they arrive through `stroke:points` so the append-only rule holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<StrokeMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<ShapeVariant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
}

impl FinalFields {
    /// Translate into the tagged update list, skipping empty groups.
    #[must_use]
    pub fn to_updates(&self) -> Vec<OperationUpdate> {
        let mut updates = Vec::new();
        let meta = OperationMetadata {
            color: self.color.clone(),
            thickness: self.thickness,
            mode: self.mode,
            variant: self.variant,
        };
        if !meta.is_empty() {
            updates.push(OperationUpdate::MetadataReplaced(meta));
        }
        if let Some(props) = &self.properties {
            updates.push(OperationUpdate::PropertiesMerged(props.clone()));
        }
        updates
    }
}

#[cfg(test)]
#[path = "operation_test.rs"]
mod tests;
