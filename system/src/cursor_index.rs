use crate::{CommandLog, Position, UserIndex};
use std::collections::BTreeMap;

/// Undo/redo state of one participant.
///
/// `positions[i]` is active in the log iff `i < cursor`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UserCursor {
    positions: Vec<Position>,
    cursor: usize,
}

impl UserCursor {
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Per-participant view into a [`CommandLog`].
///
/// Every participant only ever moves their own cursor, and only the commands
/// behind their own cursor get their `active` flag flipped.
#[derive(Debug, Default, Clone)]
pub struct CursorIndex {
    users: BTreeMap<UserIndex, UserCursor>,
}

impl CursorIndex {
    pub fn new() -> Self {
        Self {
            users: BTreeMap::new(),
        }
    }

    /// Records a freshly appended command. Anything that was undone and not
    /// redone stays inactive in the log but can no longer be redone.
    pub fn record_own(&mut self, user_index: UserIndex, position: Position) {
        let user = self.users.entry(user_index).or_default();
        user.positions.truncate(user.cursor);
        user.positions.push(position);
        user.cursor = user.positions.len();
    }

    /// Returns the log position that became inactive, or `None` when there is
    /// nothing to undo.
    pub fn undo(&mut self, log: &mut CommandLog, user_index: UserIndex) -> Option<Position> {
        let user = self.users.get_mut(&user_index)?;
        if user.cursor == 0 {
            return None;
        }
        user.cursor -= 1;
        let position = user.positions[user.cursor];
        debug_assert_eq!(log.get(position).map(|c| c.user_index), Some(user_index));
        log.set_active(position, false);
        Some(position)
    }

    /// Returns the log position that became active again, or `None` when there
    /// is nothing to redo.
    pub fn redo(&mut self, log: &mut CommandLog, user_index: UserIndex) -> Option<Position> {
        let user = self.users.get_mut(&user_index)?;
        let position = *user.positions.get(user.cursor)?;
        debug_assert_eq!(log.get(position).map(|c| c.user_index), Some(user_index));
        log.set_active(position, true);
        user.cursor += 1;
        Some(position)
    }

    pub fn get(&self, user_index: UserIndex) -> Option<&UserCursor> {
        self.users.get(&user_index)
    }

    pub fn cursor(&self, user_index: UserIndex) -> usize {
        self.users.get(&user_index).map_or(0, |u| u.cursor)
    }

    /// Cursor of every participant that has drawn at least once.
    pub fn pointer_map(&self) -> BTreeMap<UserIndex, usize> {
        self.users
            .iter()
            .map(|(user_index, user)| (*user_index, user.cursor))
            .collect()
    }
}
