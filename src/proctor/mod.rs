pub mod commands;
pub mod controller;
pub mod engine;
pub mod state;

pub use commands::{dispatch, spawn_command_listener, ProctorCommand};
pub use controller::ProctorController;
pub use engine::{ControlLoop, StepOutcome};
pub use state::{ProctorState, Severity, StatusSnapshot};
