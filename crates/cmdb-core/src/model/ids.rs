//! Typed row identifiers.
//!
//! Every entity is keyed by an SQLite `INTEGER PRIMARY KEY AUTOINCREMENT`
//! value. Wrapping them keeps an item id from being passed where a group id
//! is expected, which matters for the four connection shapes where both
//! kinds share the same column types.

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

row_id!(
    /// Identifier of a [`Workspace`](super::workspace::Workspace).
    WorkspaceId
);
row_id!(
    /// Identifier of a [`Group`](super::group::Group).
    GroupId
);
row_id!(
    /// Identifier of an [`Item`](super::item::Item).
    ItemId
);
row_id!(
    /// Identifier of a [`Connection`](super::connection::Connection).
    ConnectionId
);
row_id!(
    /// Identifier of a [`Service`](super::service::Service).
    ServiceId
);
row_id!(
    /// Identifier of a [`ServiceItem`](super::service::ServiceItem).
    ServiceItemId
);
row_id!(
    /// Identifier of a [`ServiceGroup`](super::service::ServiceGroup).
    ServiceGroupId
);
row_id!(
    /// Identifier of a [`ShareLink`](super::share::ShareLink).
    ShareLinkId
);
