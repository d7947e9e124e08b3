//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with the file, playlist and redirect routes
//! - Basic authentication in front of every route
//! - Static file serving with byte ranges

pub mod auth;
pub mod handlers;
pub mod routes;

pub use routes::create_router;
