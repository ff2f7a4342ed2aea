//! HTTP API: routing, request/response mapping and server configuration.

pub mod app;
pub mod config;
pub mod middleware;
