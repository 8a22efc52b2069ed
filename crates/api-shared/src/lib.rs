//! # API Shared
//!
//! Shared wire definitions for the LIS bridge APIs.
//!
//! Contains:
//! - The fixed acknowledgement envelope returned to HIS and LIS callers
//! - Inbound request bodies (order, patient, result queries, LIS webhook)
//! - Shared services like `HealthService`
//! - Authentication utilities (API key check)
//!
//! Used by `bridge-core`, `api-rest` and the CLI for common functionality.

pub mod auth;
pub mod envelope;
pub mod health;
pub mod requests;
pub mod webhook;

pub use envelope::{EnvelopeBody, ResponseEnvelope, ValidationErrorBody};
pub use health::{HealthRes, HealthService};
