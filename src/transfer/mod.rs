//! Transfer module
//!
//! Streams file bodies in from uploads and out to downloads.

pub mod file_ops;
pub mod stream;

pub use file_ops::{BUFFER_SIZE, download_stream, store_stream};
pub use stream::CompletionStream;
