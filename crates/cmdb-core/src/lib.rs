//! cmdb-core library.
//!
//! Workspace-scoped configuration items, their groups and the dependency
//! graph between them, persisted in SQLite. Items can carry services with
//! their own canvas, and workspaces can be shared read-only through
//! token links.
//!
//! # Conventions
//!
//! - **Errors**: store operations return [`Result`] with a [`CoreError`];
//!   startup glue (config, opening the store) uses `anyhow::Result`.
//! - **Transactions**: module functions take a `&rusqlite::Connection` and
//!   expect the caller to hold the transaction. [`Cmdb`] does that for you.
//! - **Logging**: `tracing` macros only.

pub mod affected;
pub mod clone;
pub mod config;
pub mod connections;
pub mod db;
pub mod error;
pub mod groups;
pub mod items;
pub mod model;
pub mod notify;
pub mod ordering;
pub mod routing;
pub mod service;
pub mod services;
pub mod shares;
pub mod workspaces;

#[cfg(test)]
mod test_support;

pub use clone::CloneReport;
pub use config::{CoreConfig, DuplicatePolicy};
pub use error::{CoreError, Entity, ErrorCode, Result};
pub use notify::{ChangeNotice, ChangeSink, ChannelSink, NoopSink, TracingSink};
pub use ordering::Placement;
pub use service::Cmdb;
