//! # Cinder Search Core
//!
//! The cross-file term search and result-fusion engine: term normalization,
//! highlight disambiguation, row location inside delimited files, per-category
//! result extraction, and correlation by primary identifier.
//!
//! This crate contains no tokio, sqlx, or network dependencies. Storage, the
//! full-text index, line search, and progress delivery are reached through
//! the traits in [`store`], [`rows`], and [`progress`].

pub mod error;
pub mod extract;
pub mod fusion;
pub mod highlight;
pub mod models;
pub mod progress;
pub mod rows;
pub mod session;
pub mod store;
pub mod terms;

pub use error::SearchError;
pub use session::{CancelToken, SearchEngine, SessionReport};
