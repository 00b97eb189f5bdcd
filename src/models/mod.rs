pub mod job;
pub mod loaders;
pub mod outcome;

pub use job::{validate_batch, JobMode, JobRequest, JobSpec};
pub use loaders::{load_jobs_from_file, load_jobs_from_stdin};
pub use outcome::{FailureKind, JobOutcome, JobStatus, Stage, StageFailure, StageResult};
