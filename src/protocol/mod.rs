//! HTTP protocol surface
//!
//! Request payloads, JSON response bodies and the axum handlers that bind
//! them to the file operations engine and the stats stream.

pub mod handlers;
pub mod requests;
pub mod responses;
