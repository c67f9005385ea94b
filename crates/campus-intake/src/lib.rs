//! Enrollment lifecycle engine for a training institute.
//!
//! The crate owns the record store adapter, the document slot manager, the
//! status engine, batch overrides, and the access guard. HTTP routers are
//! exported per workflow so the API service can compose them.

pub mod auth;
pub mod config;
pub mod error;
pub mod notifications;
pub mod ratelimit;
pub mod store;
pub mod telemetry;
pub mod workflows;
