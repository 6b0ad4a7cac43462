//! # Boxline Common Library
//!
//! Shared code for the Boxline fulfillment engine:
//! - Database schema and row models
//! - Event types (EngineEvent enum) and EventBus
//! - Configuration loading
//! - SSE change feed utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
