//! Versioned component state and the save/restore protocol.
//!
//! A component keeps its mutable state in a [`StateCell`]. The solver
//! restores every component to its last committed state before each
//! iteration pass and commits once per timestep, so trial mutations made
//! during unconverged passes never leak into the next timestep.

use crate::error::StateError;
use crate::sim::component::Component;
use crate::sim::port::ComponentId;

/// Identifies one committed snapshot of a component's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotToken {
    generation: u64,
}

impl SnapshotToken {
    /// Token returned by components without internal state.
    pub const fn stateless() -> Self {
        Self { generation: 0 }
    }

    pub fn generation(self) -> u64 {
        self.generation
    }
}

/// Double-buffered state: a working copy and the last committed copy.
///
/// # Examples
///
/// ```
/// use homesim::sim::state::StateCell;
///
/// let mut soc = StateCell::new(50.0_f64);
/// let token = soc.commit();
/// *soc.get_mut() = 60.0;
/// soc.rollback(Some(token)).unwrap();
/// assert_eq!(*soc.get(), 50.0);
/// ```
#[derive(Debug, Clone)]
pub struct StateCell<T: Clone> {
    current: T,
    committed: Option<T>,
    generation: u64,
}

impl<T: Clone> StateCell<T> {
    /// Wraps an initial state. Nothing is committed yet.
    pub fn new(initial: T) -> Self {
        Self {
            current: initial,
            committed: None,
            generation: 0,
        }
    }

    /// Working state.
    pub fn get(&self) -> &T {
        &self.current
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.current
    }

    pub fn set(&mut self, value: T) {
        self.current = value;
    }

    /// Last committed state, if any.
    pub fn committed(&self) -> Option<&T> {
        self.committed.as_ref()
    }

    /// Freezes the working state and returns a token for it.
    pub fn commit(&mut self) -> SnapshotToken {
        self.generation += 1;
        self.committed = Some(self.current.clone());
        SnapshotToken {
            generation: self.generation,
        }
    }

    /// Resets the working state to the last commit.
    ///
    /// With `Some(token)`, the token must belong to the last commit.
    ///
    /// # Errors
    ///
    /// [`StateError::NeverSaved`] if nothing was committed yet,
    /// [`StateError::StaleSnapshot`] if `token` is older than the last commit.
    pub fn rollback(&mut self, token: Option<SnapshotToken>) -> Result<(), StateError> {
        let committed = self.committed.as_ref().ok_or(StateError::NeverSaved)?;
        if let Some(token) = token {
            if token.generation != self.generation {
                return Err(StateError::StaleSnapshot {
                    requested: token.generation,
                    current: self.generation,
                });
            }
        }
        self.current.clone_from(committed);
        Ok(())
    }
}

/// Tracks the last snapshot token of every component in a system.
#[derive(Debug, Clone)]
pub struct StateManager {
    tokens: Vec<Option<SnapshotToken>>,
}

impl StateManager {
    pub fn new(component_count: usize) -> Self {
        Self {
            tokens: vec![None; component_count],
        }
    }

    /// Commits the component's state and remembers the token.
    pub fn save(&mut self, id: ComponentId, component: &mut dyn Component) -> SnapshotToken {
        let token = component.save_state();
        self.tokens[id.index()] = Some(token);
        token
    }

    /// Restores the component to a saved state.
    ///
    /// Without an explicit `token` the one recorded by the last `save` is used.
    ///
    /// # Errors
    ///
    /// [`StateError::NeverSaved`] if no token is given and `save` was never
    /// called for `id`, plus whatever the component reports (for example
    /// [`StateError::StaleSnapshot`] for an outdated token).
    pub fn restore(
        &self,
        id: ComponentId,
        component: &mut dyn Component,
        token: Option<SnapshotToken>,
    ) -> Result<(), StateError> {
        let token = token
            .or_else(|| self.token(id))
            .ok_or(StateError::NeverSaved)?;
        component.restore_state(Some(token))
    }

    /// Last token recorded for `id`.
    pub fn token(&self, id: ComponentId) -> Option<SnapshotToken> {
        self.tokens.get(id.index()).copied().flatten()
    }
}
