//! Recording session control.

pub mod controller;
pub mod runner;
pub mod scheduler;

pub use controller::{SessionController, SessionPhase, SessionSnapshot, StartTicket};
pub use runner::{RunnerCommand, RunnerHandle, SessionRunner};
pub use scheduler::{Scheduler, TimerId, TimerName};
