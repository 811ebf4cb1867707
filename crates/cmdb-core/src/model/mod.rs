//! Domain types shared by the store modules.

pub mod connection;
pub mod group;
pub mod ids;
pub mod item;
pub mod routing;
pub mod service;
pub mod share;
pub mod workspace;

use serde::{Deserialize, Serialize};

pub use connection::{Connection, EdgeShape, Endpoint};
pub use group::{Group, GroupFields, GroupLink};
pub use ids::{
    ConnectionId, GroupId, ItemId, ServiceGroupId, ServiceId, ServiceItemId, ShareLinkId,
    WorkspaceId,
};
pub use item::{AffectedItem, Item, ItemFields, NewItem};
pub use routing::{EdgeRef, Handles, RoutingRecord};
pub use service::{
    IconType, Service, ServiceConnection, ServiceFields, ServiceGroup, ServiceGroupLink,
    ServiceItem, ServiceItemFields, ServiceLinkTarget, ServiceRouting,
};
pub use share::{
    Expiry, NewShareLink, PasswordChange, ShareAccess, ShareLink, ShareLinkUpdate, ShareStats,
    Visitor,
};
pub use workspace::Workspace;

/// Canvas coordinates of a group or item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Decode a stored position; absent or malformed payloads read as `None`.
    pub(crate) fn from_json(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub(crate) fn to_json(position: Option<&Self>) -> serde_json::Result<Option<String>> {
        position.map(serde_json::to_string).transpose()
    }
}
