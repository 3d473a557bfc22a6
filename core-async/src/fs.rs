//! Async filesystem helpers.
//!
//! Whole-file operations (index load, atomic rename, delete). Positional reads
//! and writes on the scratch data file go through `task::spawn_blocking`.

pub use tokio::fs::{
    create_dir_all, metadata, read, remove_file, rename, try_exists, write, File, OpenOptions,
};
