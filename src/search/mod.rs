//! Search module
//!
//! Recursive, name-only lookup under a resolved directory.

mod operations;

pub use operations::search_files;
