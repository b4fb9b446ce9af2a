//! Shared filesystem helpers.
//!
//! Output directories and result files are regenerated, never patched in
//! place: directories are cleared by renaming them aside first, files are
//! written to a temporary sibling and renamed over the target.

pub mod fs;

pub use fs::{copy_dir_recursive, is_newer, reset_dir, write_atomic};
