//! HTTP and WebSocket surface of the publishing service.

pub mod config;
pub mod error;
pub mod response;
pub mod routes;
pub mod state;
pub mod ws;
