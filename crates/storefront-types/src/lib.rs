//! storefront-types: domain model and ports shared by every adapter.

pub mod domain;
pub mod ports;
