//! Server core
//!
//! Router assembly, listener binding and graceful shutdown.

pub mod core;
pub mod state;

pub use self::core::{Server, router};
pub use state::AppState;
