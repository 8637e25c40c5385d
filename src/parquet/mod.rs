//! Handles serialising and saving data to disk in the _parquet_ file format.

pub mod summary;

pub use summary::{save_summary, summary_path};
