//! partsbin — inventory and project tracking for maker workshops.
//!
//! A single-binary HTTP service around a SQLite database. Workshop members
//! track parts (stock levels, locations, low-stock thresholds), group them
//! into projects, and move those projects through a lifecycle that reserves
//! and releases stock:
//!
//! - `PLANNING` → `ACTIVE` deducts every project line from stock in one
//!   transaction; the move fails atomically if any line falls short.
//! - `ACTIVE` → `COMPLETED` optionally returns the reserved stock.
//! - `COMPLETED` is terminal.
//!
//! Stock can never go negative; every mutation lands in an append-only
//! activity log.
//!
//! # Module map
//!
//! - [`models`] — wire/storage types: items, projects, users, activity
//! - [`engine`] — the pure project status transition rules
//! - [`db`] — SQLite persistence and the async [`db::DbHandle`]
//! - [`auth`] — password hashing, session tokens, request extractors
//! - [`api`] — axum handlers and the HTTP error surface
//! - [`server`] — router assembly and the listener loop
//! - [`config`] — `partsbin.toml` loading
//! - [`errors`] — the storage-layer error type

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod models;
pub mod server;
