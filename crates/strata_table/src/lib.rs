//! Time-indexed tables for the strata store.
//!
//! - [`Table`]: a time index plus named columns of [`Cell`]s
//! - [`codec`]: the delimited-text format the store keeps on disk
//! - [`Step`]: resolutions and publication periods
//! - [`TzPipe`]: timezone conversion on the way out of the store

mod cell;
pub mod codec;
mod error;
mod ops;
mod step;
mod table;
mod tz;

pub use cell::Cell;
pub use codec::{Format, Header};
pub use error::{Result, TableError};
pub use ops::Coercion;
pub use step::Step;
pub use table::{Column, ColumnName, Layout, RowKey, Table, Zone};
pub use tz::{TzPipe, to_utc};

pub use chrono_tz::Tz;
