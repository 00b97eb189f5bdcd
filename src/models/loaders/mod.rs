pub mod job_loader;

pub use job_loader::{
    load_jobs_from_file, load_jobs_from_stdin, merge_prompt_file, parse_json_batch,
};
