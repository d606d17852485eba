use crate::{
    CommandLog, CommandPayload, CursorIndex, Position, SessionEvent, SyncSnapshot, UserIndex,
};

/// Authoritative drawing state of one session: the command log plus every
/// participant's cursor. Each mutation returns the events that must be
/// broadcast to converge the clients, in order.
#[derive(Debug, Default)]
pub struct ServerLeaderDocument {
    log: CommandLog,
    cursors: CursorIndex,
}

impl ServerLeaderDocument {
    pub fn new() -> Self {
        Self {
            log: CommandLog::new(),
            cursors: CursorIndex::new(),
        }
    }

    pub fn draw(&mut self, user_index: UserIndex, payload: CommandPayload) -> Vec<SessionEvent> {
        let position = self.log.append(user_index, payload);
        self.cursors.record_own(user_index, position);
        log::debug!("user {} drew command {}", user_index, position);
        vec![SessionEvent::Sync(self.snapshot())]
    }

    pub fn undo(&mut self, user_index: UserIndex) -> Vec<SessionEvent> {
        match self.cursors.undo(&mut self.log, user_index) {
            Some(cmd_index) => vec![
                SessionEvent::UndoOperation {
                    user_index,
                    cmd_index,
                },
                SessionEvent::Sync(self.snapshot()),
            ],
            None => {
                log::debug!("nothing to undo for user {}", user_index);
                Vec::new()
            }
        }
    }

    pub fn redo(&mut self, user_index: UserIndex) -> Vec<SessionEvent> {
        match self.cursors.redo(&mut self.log, user_index) {
            Some(cmd_index) => vec![
                SessionEvent::RedoOperation {
                    user_index,
                    cmd_index,
                },
                SessionEvent::Sync(self.snapshot()),
            ],
            None => {
                log::debug!("nothing to redo for user {}", user_index);
                Vec::new()
            }
        }
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            stack: self.log.commands().to_vec(),
            pointer_map: self.cursors.pointer_map(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    pub fn cursors(&self) -> &CursorIndex {
        &self.cursors
    }

    pub fn is_active(&self, position: Position) -> Option<bool> {
        self.log.get(position).map(|command| command.active)
    }
}
