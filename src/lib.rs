//! lms_api: course platform backend in Rust
//!
//! CRUD over courses, lessons, payments and course subscriptions on an
//! Axum/Tokio REST layer, backed by Sled storage, with JWT auth, per-request
//! permission predicates and a fire-and-forget notification queue.
//!
//! This lib exposes the storage handle and all platform modules.

pub mod models;
pub mod storage;
pub mod auth;
// Permission predicates evaluated per request (staff/owner composition)
pub mod permissions;
// Page-size policies and the {count, next, previous, results} envelope
pub mod pagination;
// Payment gateway client: trait seam + reqwest implementation
pub mod payments;
// Fire-and-forget background tasks (course update notifications)
pub mod tasks;
// REST API module: Axum router, handlers, error taxonomy
pub mod rest;
