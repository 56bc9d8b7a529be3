//! MOOD Core - House catalog library.
//!
//! This crate provides the catalog used by the configurator:
//! - `configurator` - Chat widget that narrows the catalog with a hosted model
//! - `integration-tests` - End-to-end tests against the widget router
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no network access,
//! no HTTP clients. Catalogs are parsed from JSON that the caller supplies
//! (or the copy embedded at compile time), so it can be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - House records, identifiers, and image view conventions
//! - [`catalog`] - The immutable catalog, bedroom classifier, and lookups

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod types;

pub use catalog::{Catalog, CatalogError, bedroom_count};
pub use types::*;
