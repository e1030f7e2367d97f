pub mod runner;
pub mod state;

pub use runner::IsolationOrchestrator;
pub use state::{LabelStatus, PipelineStage, ProgramOutcome, RunEvent, RunResult};
