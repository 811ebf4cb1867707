use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{ShareLinkId, WorkspaceId};
use crate::error::CoreError;

const HOUR_US: i64 = 60 * 60 * 1_000_000;

/// Lifetime chosen when a share link is created or renewed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expiry {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[default]
    #[serde(rename = "never")]
    Never,
}

impl Expiry {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::OneDay => "1d",
            Self::SevenDays => "7d",
            Self::ThirtyDays => "30d",
            Self::Never => "never",
        }
    }

    /// Absolute expiry for a link created at `now_us`; `None` never expires.
    #[must_use]
    pub const fn expires_at(self, now_us: i64) -> Option<i64> {
        let hours = match self {
            Self::OneHour => 1,
            Self::OneDay => 24,
            Self::SevenDays => 7 * 24,
            Self::ThirtyDays => 30 * 24,
            Self::Never => return None,
        };
        Some(now_us.saturating_add(hours * HOUR_US))
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Expiry {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1h" => Ok(Self::OneHour),
            "1d" | "24h" => Ok(Self::OneDay),
            "7d" => Ok(Self::SevenDays),
            "30d" => Ok(Self::ThirtyDays),
            "never" => Ok(Self::Never),
            other => Err(CoreError::Validation(format!(
                "unknown expiration '{other}': expected 1h, 1d, 7d, 30d or never"
            ))),
        }
    }
}

/// A read-only share of one workspace. The password hash never leaves the
/// store; callers only see whether one is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub id: ShareLinkId,
    pub token: String,
    pub workspace_id: WorkspaceId,
    pub created_by: Option<String>,
    pub created_at_us: i64,
    pub expires_at_us: Option<i64>,
    pub is_active: bool,
    pub has_password: bool,
    pub access_count: i64,
    pub last_accessed_at_us: Option<i64>,
}

impl ShareLink {
    pub(crate) const COLUMNS: &'static str = "share_link_id, token, workspace_id, created_by, \
         created_at_us, expires_at_us, is_active, password_hash IS NOT NULL, access_count, \
         last_accessed_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            token: row.get(1)?,
            workspace_id: row.get(2)?,
            created_by: row.get(3)?,
            created_at_us: row.get(4)?,
            expires_at_us: row.get(5)?,
            is_active: row.get(6)?,
            has_password: row.get(7)?,
            access_count: row.get(8)?,
            last_accessed_at_us: row.get(9)?,
        })
    }

    /// Active and not past its expiry at `now_us`.
    #[must_use]
    pub fn is_open_at(&self, now_us: i64) -> bool {
        self.is_active && self.expires_at_us.is_none_or(|expires| expires > now_us)
    }
}

/// Request to create a share link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShareLink {
    pub workspace_id: Option<WorkspaceId>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub expiration: Expiry,
    #[serde(default)]
    pub password: Option<String>,
}

impl NewShareLink {
    #[must_use]
    pub fn new(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id: Some(workspace_id),
            ..Self::default()
        }
    }
}

/// Password change carried by a [`ShareLinkUpdate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordChange {
    #[default]
    Keep,
    Clear,
    Set(String),
}

impl PasswordChange {
    /// An empty password clears protection, like an explicit clear.
    #[must_use]
    pub fn from_input(password: Option<&str>) -> Self {
        match password {
            None | Some("") => Self::Clear,
            Some(password) => Self::Set(password.to_owned()),
        }
    }
}

/// Partial update of a share link. `None` fields keep the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLinkUpdate {
    #[serde(default)]
    pub expiration: Option<Expiry>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub password: PasswordChange,
}

/// One recorded visit through a share link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAccess {
    pub id: i64,
    pub share_link_id: ShareLinkId,
    pub visitor_ip: Option<String>,
    pub visitor_user_agent: Option<String>,
    pub accessed_at_us: i64,
}

impl ShareAccess {
    pub(crate) const COLUMNS: &'static str =
        "log_id, share_link_id, visitor_ip, visitor_user_agent, accessed_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            share_link_id: row.get(1)?,
            visitor_ip: row.get(2)?,
            visitor_user_agent: row.get(3)?,
            accessed_at_us: row.get(4)?,
        })
    }
}

/// Who is opening a share link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Usage summary of a share link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareStats {
    pub access_count: i64,
    pub created_at_us: i64,
    pub last_accessed_at_us: Option<i64>,
    pub unique_visitors: i64,
    pub total_visits: i64,
}
