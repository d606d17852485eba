use crate::{Command, CommandPayload, Position, UserIndex};

/// Append-only sequence of the commands drawn in one session.
///
/// Positions are permanent. Nothing is removed while the session lives, so the
/// log grows with every draw.
#[derive(Debug, Default, Clone)]
pub struct CommandLog {
    commands: Vec<Command>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    pub fn append(&mut self, user_index: UserIndex, payload: CommandPayload) -> Position {
        self.commands.push(Command::new(user_index, payload));
        self.commands.len() - 1
    }

    pub fn get(&self, position: Position) -> Option<&Command> {
        self.commands.get(position)
    }

    /// Returns `false` when there is no command at `position`.
    pub(crate) fn set_active(&mut self, position: Position, active: bool) -> bool {
        if let Some(command) = self.commands.get_mut(position) {
            command.active = active;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}
