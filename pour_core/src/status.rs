//! Result of a single step of the pour state machine.

use crate::error::PourError;

#[derive(Debug, Clone, PartialEq)]
pub enum PourStatus {
    /// Keep stepping.
    Running,
    /// Pumping finished; waiting for the operator to add the post-add ingredient.
    AwaitingPostAdd,
    /// Recipe served; all pumps off.
    Complete,
    /// Session ended with an error; relays are in the safe state.
    Aborted(PourError),
}
