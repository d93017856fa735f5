//! # Intel Bridge Library
//!
//! Core functionality for the Intel Bridge service: the OAuth token broker
//! for CRM portals, the encrypted token store, and the report discovery
//! clients and handlers.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod hubspot;
pub mod intel;
pub mod link_token;
pub mod models;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod token_store;
pub use migration;
