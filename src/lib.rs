//! shelfwatch - supermarket price dashboard over an Apache Hudi table.
//!
//! The crate splits into two stages. Loading (`credentials`, `source`,
//! `normalize`, `loader`, `cache`) reads the remote table and produces an
//! immutable [`loader::Snapshot`]. Rendering (`aggregation`, `dashboard`,
//! `visualization`, `server`) derives the four charts from a snapshot and a
//! category selection without touching the network.

pub mod aggregation;
pub mod cache;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod error;
pub mod loader;
pub mod normalize;
pub mod schema;
pub mod server;
pub mod source;
pub mod visualization;

pub use dashboard::{CategorySelection, ChartSet};
pub use error::ShelfError;
pub use loader::{Loader, LoaderSettings, Snapshot};
