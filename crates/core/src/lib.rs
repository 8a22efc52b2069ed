//! # Bridge Core
//!
//! Core logic of the HIS to LIS bridge.
//!
//! This crate turns HIS lab registrations into LIS order messages and applies LIS result
//! callbacks back to the HIS:
//! - Field normalisation and payload building for the LIS wire format
//! - Record fetching over the HIS database (`repositories`)
//! - Outbound delivery with retry on transport failure
//! - Transactional result reconciliation with an audit trail
//!
//! **No HTTP server concerns**: routing, authentication and response mapping belong in
//! `api-rest`.

pub mod audit;
pub mod config;
pub mod constants;
pub mod delivery;
pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod payload;
pub mod records;
pub mod repositories;
pub mod service;
pub mod status_control;
pub mod validation;
pub mod webhook;

pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use service::{BridgeService, RelayBody, RelayReply};
pub use status_control::StatusControl;
