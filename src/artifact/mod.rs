//! Everything an export run leaves on disk.

pub mod diagnostics;
pub mod summary;
pub mod workout;

pub use diagnostics::DiagnosticsSink;
pub use summary::{ProgramSummary, RunSummary, list_runs};
pub use workout::{artifact_path, read_artifact, write_artifact, write_run_artifacts};
