//! Request middleware

pub mod logging;

pub use logging::track_request;
