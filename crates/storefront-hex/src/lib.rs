//! storefront-hex: order lifecycle core, inbound HTTP and outbound notifiers

pub mod auth;
pub mod config;
pub mod errors;

pub mod application;

pub use storefront_types::{domain, ports};

pub mod inbound; // HTTP adapter (server, handlers, dashboard socket)
pub mod outbound; // notification channels
