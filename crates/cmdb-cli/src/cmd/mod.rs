//! Command handlers, one module per resource.

pub mod connection;
pub mod group;
pub mod item;
pub mod routing;
pub mod service;
pub mod share;
pub mod workspace;

use std::path::Path;

use anyhow::Context;
use cmdb_core::model::WorkspaceId;
use cmdb_core::{Cmdb, TracingSink, config};

/// Open the store for a process started in `root`.
///
/// `--db` wins over `CMDB_DB` and the config file.
pub fn open_cmdb(root: &Path, db_override: Option<&Path>) -> anyhow::Result<Cmdb> {
    let mut config = config::resolve_config(root).context("load cmdb configuration")?;
    if let Some(db) = db_override {
        config.store.path = db.to_path_buf();
    }
    tracing::debug!(store = %config.store.path.display(), "opening store");
    Cmdb::open(config, Box::new(TracingSink))
}

/// The workspace named by `--workspace`, or the default one (created on
/// first use).
pub fn resolve_workspace(cmdb: &mut Cmdb, explicit: Option<i64>) -> anyhow::Result<WorkspaceId> {
    let workspace = match explicit {
        Some(id) => cmdb.get_workspace(WorkspaceId(id))?,
        None => cmdb.ensure_default_workspace()?,
    };
    Ok(workspace.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn db_flag_overrides_config() {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("flag.sqlite3");
        let cmdb = open_cmdb(dir.path(), Some(&db)).expect("open");
        assert_eq!(cmdb.config().store.path, db);
        assert!(db.exists());
    }

    #[test]
    fn missing_workspace_falls_back_to_default() {
        let dir = TempDir::new().expect("tempdir");
        let mut cmdb = open_cmdb(dir.path(), Some(&dir.path().join("c.sqlite3"))).expect("open");

        let first = resolve_workspace(&mut cmdb, None).expect("default");
        let again = resolve_workspace(&mut cmdb, Some(first.0)).expect("explicit");
        assert_eq!(first, again);

        let err = resolve_workspace(&mut cmdb, Some(9_999)).expect_err("unknown");
        assert!(err.downcast_ref::<cmdb_core::CoreError>().is_some());
    }
}
