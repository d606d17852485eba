use crate::{Command, CommandPayload, Position, UserIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("not a json object: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("message has no action")]
    MissingAction,
    #[error("invalid {action} message: {source}")]
    InvalidFields {
        action: &'static str,
        source: serde_json::Error,
    },
}

/// Inbound frame of a connection, after parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Draw {
        user_index: UserIndex,
        payload: CommandPayload,
    },
    Undo {
        user_index: UserIndex,
    },
    Redo {
        user_index: UserIndex,
    },
    /// An action this server does not interpret. Relayed to the session as the
    /// original text.
    Passthrough { action: String, raw: String },
}

#[derive(Deserialize)]
struct DrawFields {
    #[serde(rename = "userIndex")]
    user_index: UserIndex,
    command: CommandPayload,
}

#[derive(Deserialize)]
struct UserFields {
    #[serde(rename = "userIndex")]
    user_index: UserIndex,
}

impl SessionCommand {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingAction)?;

        match action {
            "draw" => {
                let DrawFields {
                    user_index,
                    command,
                } = DrawFields::deserialize(&value).map_err(invalid("draw"))?;
                Ok(SessionCommand::Draw {
                    user_index,
                    payload: command,
                })
            }
            "undo" => {
                let UserFields { user_index } =
                    UserFields::deserialize(&value).map_err(invalid("undo"))?;
                Ok(SessionCommand::Undo { user_index })
            }
            "redo" => {
                let UserFields { user_index } =
                    UserFields::deserialize(&value).map_err(invalid("redo"))?;
                Ok(SessionCommand::Redo { user_index })
            }
            other => Ok(SessionCommand::Passthrough {
                action: other.to_owned(),
                raw: text.to_owned(),
            }),
        }
    }
}

fn invalid(action: &'static str) -> impl FnOnce(serde_json::Error) -> ProtocolError {
    move |source| ProtocolError::InvalidFields { action, source }
}

/// Outbound message, serialized once per broadcast.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum SessionEvent {
    Sync(SyncSnapshot),
    UndoOperation {
        #[serde(rename = "userIndex")]
        user_index: UserIndex,
        #[serde(rename = "cmdIndex")]
        cmd_index: Position,
    },
    RedoOperation {
        #[serde(rename = "userIndex")]
        user_index: UserIndex,
        #[serde(rename = "cmdIndex")]
        cmd_index: Position,
    },
}

impl SessionEvent {
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// The whole replicated state of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSnapshot {
    pub stack: Vec<Command>,
    #[serde(rename = "pointerMap")]
    pub pointer_map: BTreeMap<UserIndex, usize>,
}
