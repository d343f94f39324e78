//! # LockerZ Backend Library
//!
//! The HTTP backend of LockerZ, a local image library. A library is a
//! folder on disk whose subfolders are categories; this crate lists,
//! aggregates, moves and deletes the files in it over a JSON API.
//!
//! ## Core Components
//!
//! - [`cache`]: TTL response cache with tag-based invalidation
//! - [`config`]: Server configuration (`config/default.toml`, files, env)
//! - [`error`]: Centralized error handling and HTTP error responses
//! - [`library`]: Listings, category management, file moves, aggregation
//! - [`metrics`]: Atomic operation counters
//! - [`middleware`]: Request validation and security headers
//! - [`routes`]: HTTP API endpoint handlers and the router
//! - [`settings`]: The persisted per-user settings document
//! - [`state`]: Shared application state
//! - [`types`]: Request and response bodies

pub mod cache;
pub mod config;
pub mod error;
pub mod library;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod settings;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;
