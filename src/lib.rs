//! # Cinder Search
//!
//! Cross-file term search and result fusion for delimited proteomics files.
//!
//! A search expression is matched against the full-text index of every
//! in-scope document. Matches are disambiguated into whole terms, the rows
//! that carry them are located and extracted, and each matched identifier is
//! then correlated with the other files of its analysis group. The fused
//! records of a session are persisted together or not at all.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Config    │──▶│   Catalog   │──▶│    SQLite     │
//! │ groups+docs │   │  (index)    │   │ FTS5 segments │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!                   ┌────────────────────────┤
//!                   ▼                        ▼
//!            ┌─────────────┐          ┌─────────────┐
//!            │ SearchEngine│─────────▶│   results   │
//!            │ (core crate)│          │  sessions   │
//!            └─────────────┘          └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and document catalog |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `Store` and full-text index |
//! | [`catalog`] | Loading documents into the index |
//! | [`line_search`] | Line-search providers |
//! | [`progress`] | Progress reporters |
//! | [`search`] | Running sessions |
//! | [`results`] | Reading sessions back |
//! | [`logging`] | Tracing setup |

pub mod catalog;
pub mod config;
pub mod db;
pub mod line_search;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod results;
pub mod search;
pub mod sqlite_store;
