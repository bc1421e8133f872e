//! # Grace Connect
//!
//! Connects Grace to Meta's Graph API: Facebook login with long-lived token
//! exchange, Instagram business account lookup, webhook verification and
//! ingestion, and the demo auto-reply.

pub mod config;
pub mod cookies;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod profile;
pub mod reply;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod webhook;
