//! Change notification after committed writes.
//!
//! After every successful mutation the facade pushes the full item list of
//! the affected workspace to a [`ChangeSink`]. Delivery is best-effort: a
//! failing sink is logged and never turns a committed write into an error.

use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::model::{Item, WorkspaceId};

/// Receiver of post-commit item snapshots.
pub trait ChangeSink: Send + Sync {
    /// Deliver the current items of `workspace_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be handed off.
    fn broadcast(&self, workspace_id: WorkspaceId, items: &[Item]) -> Result<()>;
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ChangeSink for NoopSink {
    fn broadcast(&self, _workspace_id: WorkspaceId, _items: &[Item]) -> Result<()> {
        Ok(())
    }
}

/// Logs each notification at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ChangeSink for TracingSink {
    fn broadcast(&self, workspace_id: WorkspaceId, items: &[Item]) -> Result<()> {
        tracing::debug!(workspace = %workspace_id, items = items.len(), "items changed");
        Ok(())
    }
}

/// Snapshot handed to a transport through [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeNotice {
    pub workspace_id: WorkspaceId,
    pub items: Vec<Item>,
}

/// Forwards notifications over an mpsc channel to a transport thread.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<ChangeNotice>,
}

impl ChannelSink {
    /// Create a sink and the receiving end the transport consumes.
    #[must_use]
    pub fn new() -> (Self, Receiver<ChangeNotice>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl ChangeSink for ChannelSink {
    fn broadcast(&self, workspace_id: WorkspaceId, items: &[Item]) -> Result<()> {
        self.tx
            .send(ChangeNotice {
                workspace_id,
                items: items.to_vec(),
            })
            .ok()
            .context("change receiver disconnected")
    }
}
