//! Core types and trait definitions for the Lore profile-memory store.
//!
//! This crate is deliberately free of database dependencies. Storage
//! backends implement [`store::MemoryStore`] and
//! [`migration::MigrationLedger`]; everything else depends on those
//! abstractions.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod citation;
pub mod embedding;
pub mod error;
pub mod history;
pub mod index;
pub mod migration;
pub mod profile;
pub mod scope;
pub mod store;
pub mod tagged;

pub use error::{Error, Result, ValidationError};
