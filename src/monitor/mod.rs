// Monitoring: evaluation engine, polling scheduler and operator controls
pub mod control;
pub mod engine;
pub mod scheduler;
pub mod state;

pub use control::{ControlResponse, ControlSurface, ResponseStatus};
pub use engine::{Engine, EngineConfig, EvaluationOutcome, SkipReason};
pub use scheduler::Scheduler;
pub use state::{EvaluationClaim, InstrumentState, InstrumentStates};
