use serde::{Deserialize, Serialize};

/// Opaque session identifier. The transport addresses a session by it.
pub type SessionId = String;
pub type ConnectionId = u64;
/// Index of a participant in the session's participant list.
pub type UserIndex = usize;
/// Permanent 0-based position of a command in a session's command log.
pub type Position = usize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
}
