//! SQLite backend for the Lore profile-memory store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each store operation is a plain
//! synchronous function over a [`rusqlite::Connection`] (see the `history`,
//! `profile` and `citation` modules); [`SqliteStore`] ships those functions to
//! the connection thread.

mod citation;
mod encode;
mod history;
mod migrate;
mod profile;
mod schema;
mod settings;
mod store;
mod tx;

pub mod config;
pub mod error;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use schema::{MIGRATIONS, Migration};
pub use store::SqliteStore;
