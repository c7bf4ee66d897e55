pub mod controller;
pub mod state;

pub use controller::{AttemptOutcome, InjectionCoordinator, InjectionSnapshot};
pub use state::{AttemptGate, InjectionPhase, InjectionState, OwnedResources, Trigger};
