pub mod converter;
pub mod download_watcher;
pub mod output_writer;

pub use converter::{HtmdConverter, TextConverter};
pub use download_watcher::{relocate, DownloadWatcher};
pub use output_writer::OutputWriter;
