//! Hierarchical mission state machine: the stage/state tree, the machine that walks it, and
//! the mode controller that turns state entries into guidance and estimation mode commands.

mod mode_controller;
mod state_machine;
mod state_tree;
#[cfg(test)]
mod tests;

pub use mode_controller::{ModeController, ModeSpec};
pub use state_machine::{Effects, MissionContext, Outcome, StateMachine, StateMemory, Transition};
pub use state_tree::{Node, Stage, State, TreeError};
