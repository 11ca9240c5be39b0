//! Resilient Lead API Gateway Library
//!
//! Client layer between a lead-management UI and an upstream HTTP API whose
//! contract is unstable: field names and nesting vary between backend
//! revisions, and the backend address may move at runtime.
//!
//! # Modules
//!
//! - `address`: base-address resolution and failover candidates.
//! - `analytics`: dashboard statistics derived from local leads.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `gateway_client`: the single HTTP gateway (credentials, failover, session policy).
//! - `handlers`: HTTP handlers of the local facade.
//! - `models`: canonical records and statistics.
//! - `normalizers`: upstream JSON to canonical records.
//! - `services`: per-resource clients (auth, leads, users, districts, dashboard).
//! - `store`: persistent session store.

pub mod address;
pub mod analytics;
pub mod config;
pub mod errors;
pub mod gateway_client;
pub mod handlers;
pub mod models;
pub mod normalizers;
pub mod services;
pub mod store;
