//! Utility functions

pub mod network;

pub use network::{bind_first_available, local_ip};
