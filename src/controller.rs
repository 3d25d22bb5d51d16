//! Table driven finite state controller.
//!
//! A [Controller] knows nothing about cryptography. It is built from an ordered list of events,
//! an ordered list of states (the first is the initial state) and a `states × events` transition
//! table whose cells are either `Some(next_state)` or `None` for an invalid transition.
//!
//! The table is checked once at construction, so a malformed table is an error instead of a
//! panic at call time.

use crate::errors::{NotaryError, Result};
use std::fmt::Debug;

/// Generic table driven state machine.
///
/// # Examples
///
/// ```
/// use zf_notary::Controller;
///
/// let table = [[Some("on"), None], [None, Some("off")]];
/// let mut switch = Controller::new(&["flip", "flop"], &["off", "on"], &table).unwrap();
/// assert_eq!(switch.get_state(), Some("off"));
/// assert!(switch.is_valid("flip"));
/// assert!(!switch.is_valid("flop"));
/// assert_eq!(switch.transition_state("flip"), Some("on"));
/// assert_eq!(switch.transition_state("flip"), None); // Dead state
/// switch.reset_state();
/// assert_eq!(switch.get_state(), Some("off"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Controller<S, E> {
    events: Vec<E>,
    states: Vec<S>,
    table: Vec<Vec<Option<S>>>,
    current: Option<S>,
}

impl<S, E> Controller<S, E>
where
    S: Copy + PartialEq + Debug,
    E: Copy + PartialEq + Debug,
{
    /// Build a controller, validating the shape and contents of `table`.
    pub fn new<R: AsRef<[Option<S>]>>(events: &[E], states: &[S], table: &[R]) -> Result<Self> {
        if events.is_empty() || states.is_empty() {
            return Err(NotaryError::Construction(
                "controller needs at least one event and one state".to_string(),
            ));
        }
        if has_duplicates(events) {
            return Err(NotaryError::Construction(format!(
                "duplicate event in {events:?}"
            )));
        }
        if has_duplicates(states) {
            return Err(NotaryError::Construction(format!(
                "duplicate state in {states:?}"
            )));
        }
        if table.len() != states.len() {
            return Err(NotaryError::Construction(format!(
                "transition table has {} rows; expected {}",
                table.len(),
                states.len()
            )));
        }
        let mut rows = Vec::with_capacity(table.len());
        for (i, row) in table.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != events.len() {
                return Err(NotaryError::Construction(format!(
                    "transition table row {i} has {} columns; expected {}",
                    row.len(),
                    events.len()
                )));
            }
            for next in row.iter().flatten() {
                if !states.contains(next) {
                    return Err(NotaryError::Construction(format!(
                        "transition table row {i} names unknown state {next:?}"
                    )));
                }
            }
            rows.push(row.to_vec());
        }
        Ok(Self {
            events: events.to_vec(),
            states: states.to_vec(),
            table: rows,
            current: Some(states[0]),
        })
    }

    /// The current state, or `None` if an invalid transition was applied.
    pub fn get_state(&self) -> Option<S> {
        self.current
    }

    fn lookup(&self, event: E) -> Option<S> {
        let row = self.states.iter().position(|s| Some(*s) == self.current)?;
        let col = self.events.iter().position(|e| *e == event)?;
        self.table[row][col]
    }

    /// Whether `event` has a valid transition from the current state.
    pub fn is_valid(&self, event: E) -> bool {
        self.lookup(event).is_some()
    }

    /// Apply `event`, returning the new state.
    ///
    /// This does not reject invalid events: the controller moves into the dead state (`None`),
    /// from which nothing is valid. Callers check [Controller::is_valid()] first.
    pub fn transition_state(&mut self, event: E) -> Option<S> {
        self.current = self.lookup(event);
        self.current
    }

    /// Force the controller back to the initial state.
    pub fn reset_state(&mut self) {
        self.current = Some(self.states[0]);
    }

    /// Force the controller into `state` (used when restoring persisted state).
    pub fn restore_state(&mut self, state: S) -> Result<()> {
        if self.states.contains(&state) {
            self.current = Some(state);
            Ok(())
        } else {
            Err(NotaryError::Construction(format!(
                "cannot restore unknown state {state:?}"
            )))
        }
    }
}

fn has_duplicates<T: PartialEq>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .any(|(i, a)| items[i + 1..].iter().any(|b| a == b))
}
