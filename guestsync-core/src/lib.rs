//! Core library for the guestsync ecosystem.
//!
//! This crate provides everything the CLI drives:
//! - `client`: rate-limited HTTP access to the events API
//! - `source`: cursor-paginated event and guest listings
//! - `sink`: tabular and relational destinations plus the batch writer
//! - `state` / `syncer`: the durable, resumable sync state machine
//! - `status`: progress reporting derived from persisted state

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod sink;
pub mod source;
pub mod state;
pub mod status;
pub mod syncer;

pub use error::{SyncError, SyncResult};
