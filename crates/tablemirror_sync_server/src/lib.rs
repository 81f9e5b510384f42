//! # tablemirror sync server
//!
//! Request handling for the mirror service.
//!
//! This crate provides:
//! - Environment-sourced [`Settings`] and the [`ServerConfig`] builder
//! - Webhook signature verification (HMAC-SHA256 over timestamp and body)
//! - Change-event id derivation for duplicate-delivery detection
//! - Handlers for sync, record queries, webhooks, root and health
//! - Route dispatch through [`MirrorServer::route`]
//!
//! # Architecture
//!
//! The listener is not part of this crate. Any HTTP server mounts
//! [`MirrorServer::route`], which takes an [`ApiRequest`] and always produces
//! an [`ApiResponse`]; the CLI drives the same entry point.
//!
//! # Authentication
//!
//! With a webhook secret configured, deliveries must carry
//! `X-Airtable-Webhook-Signature` and `X-Airtable-Webhook-Timestamp`.
//! Without one, every delivery is accepted unauthenticated:
//!
//! ```rust,ignore
//! use tablemirror_sync_server::ServerConfig;
//!
//! let config = ServerConfig::default().with_webhook_secret("shared-secret");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod event;
mod handler;
mod server;

pub use auth::{
    compute_signature, verify_signature, WebhookVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
pub use config::{EnvFile, ServerConfig, Settings};
pub use error::{ServerError, ServerResult};
pub use event::{derive_event_id, new_change_event, source_identifier, NO_TIMESTAMP};
pub use handler::{
    EventResponse, ListParams, RecordResponse, RequestHandler, SyncResponse, WebhookResponse,
};
pub use server::{ApiRequest, ApiResponse, Method, MirrorServer};
