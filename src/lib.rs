//! strata - a hierarchical, versioned store for time-indexed report data.
//!
//! Data lives as flat delimited files laid out as
//! `root/<report>/<field>/<file>.<ext>`. On top of that layout the crate
//! provides:
//!
//! - [`tree`]: an addressable, lazily-read node tree over the files
//! - [`status`]: what has been observed, what could be, and what is missing
//! - [`merge`]: reconciling freshly fetched data into the files
//! - [`store`]: one handle per report tying the three together

pub mod cli;
pub mod config;
pub mod error;
pub mod key;
pub mod logger;
pub mod merge;
pub mod node;
pub mod status;
pub mod store;
pub mod tree;
pub mod utils;

pub use config::StrataConfig;
pub use error::{Result, StoreError, Warning};
pub use store::Store;
