use crate::{Segment, UserIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeStyle {
    #[serde(default)]
    pub segments: Vec<Segment>,
    pub color: String,
    pub brush_size: f64,
    #[serde(default)]
    pub is_eraser: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundFill {
    pub color: String,
}

/// What a client asked to draw. Tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommandPayload {
    Stroke(StrokeStyle),
    Shape(StrokeStyle),
    Background(BackgroundFill),
}

/// One entry of the command log.
///
/// Everything but `active` is fixed once the command is appended. `active` is
/// flipped only by the owner's undo/redo through [`crate::CursorIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(flatten)]
    pub payload: CommandPayload,
    pub user_index: UserIndex,
    pub active: bool,
}

impl Command {
    pub fn new(user_index: UserIndex, payload: CommandPayload) -> Self {
        Self {
            payload,
            user_index,
            active: true,
        }
    }
}
