use std::collections::HashSet;
use system::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// At least one connection is open.
    Active,
    /// No connection is open and a deletion timer is pending.
    Draining,
    Deleted,
}

/// Connection accounting of one session.
///
/// Every armed deletion timer carries the generation it was armed with. A
/// connect bumps the generation, so a timer armed before it is stale by the
/// time it fires.
#[derive(Debug)]
pub struct Lifecycle {
    connections: HashSet<ConnectionId>,
    generation: u64,
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            connections: HashSet::new(),
            generation: 0,
            state: LifecycleState::Active,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` when the connect cancelled a pending deletion.
    pub fn connect(&mut self, connection_id: ConnectionId) -> bool {
        debug_assert_ne!(self.state, LifecycleState::Deleted);
        self.connections.insert(connection_id);
        if self.state == LifecycleState::Draining {
            self.generation += 1;
            self.state = LifecycleState::Active;
            true
        } else {
            false
        }
    }

    /// Returns the generation of the deletion timer to arm, if the last
    /// connection just left.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<u64> {
        if !self.connections.remove(&connection_id) {
            return None;
        }
        if self.connections.is_empty() && self.state == LifecycleState::Active {
            self.generation += 1;
            self.state = LifecycleState::Draining;
            Some(self.generation)
        } else {
            None
        }
    }

    /// Returns `true` when the session must be deleted now.
    pub fn expire(&mut self, generation: u64) -> bool {
        if self.state == LifecycleState::Draining
            && self.generation == generation
            && self.connections.is_empty()
        {
            self.state = LifecycleState::Deleted;
            true
        } else {
            false
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
