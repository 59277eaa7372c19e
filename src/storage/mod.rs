//! File system storage management
//!
//! Path confinement and the file operations performed against the shared root.

pub mod filesystem;
pub mod operations;
pub mod results;
pub mod validation;

pub use operations::FileOperations;
pub use results::{DownloadResult, FileEntry, Listing, RenameResult, StarResult, UploadResult};
pub use validation::SharedRoot;
