use std::fmt;

/// Machine-readable error codes surfaced to callers of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ValidationFailed,
    WorkspaceNotFound,
    GroupNotFound,
    ItemNotFound,
    ConnectionNotFound,
    RoutingNotFound,
    ServiceNotFound,
    ServiceItemNotFound,
    ServiceGroupNotFound,
    ShareLinkNotFound,
    InvalidState,
    DuplicateConnection,
    CorruptRow,
    AccessDenied,
    TransactionFailed,
    PayloadEncoding,
    CredentialHashing,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ValidationFailed => "E1002",
            Self::WorkspaceNotFound => "E2001",
            Self::GroupNotFound => "E2002",
            Self::ItemNotFound => "E2003",
            Self::ConnectionNotFound => "E2004",
            Self::RoutingNotFound => "E2005",
            Self::ServiceNotFound => "E2006",
            Self::ServiceItemNotFound => "E2007",
            Self::ServiceGroupNotFound => "E2008",
            Self::ShareLinkNotFound => "E2009",
            Self::InvalidState => "E3001",
            Self::DuplicateConnection => "E3002",
            Self::CorruptRow => "E3003",
            Self::AccessDenied => "E4001",
            Self::TransactionFailed => "E5001",
            Self::PayloadEncoding => "E5002",
            Self::CredentialHashing => "E5003",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ValidationFailed => "Request validation failed",
            Self::WorkspaceNotFound => "Workspace not found",
            Self::GroupNotFound => "Group not found",
            Self::ItemNotFound => "Item not found",
            Self::ConnectionNotFound => "Connection not found",
            Self::RoutingNotFound => "Edge routing record not found",
            Self::ServiceNotFound => "Service not found",
            Self::ServiceItemNotFound => "Service item not found",
            Self::ServiceGroupNotFound => "Service group not found",
            Self::ShareLinkNotFound => "Share link not found",
            Self::InvalidState => "Operation not valid in current state",
            Self::DuplicateConnection => "Connection already exists",
            Self::CorruptRow => "Stored row violates a store invariant",
            Self::AccessDenied => "Share link password missing or incorrect",
            Self::TransactionFailed => "Store transaction failed",
            Self::PayloadEncoding => "JSON payload could not be encoded",
            Self::CredentialHashing => "Share link password could not be hashed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in cmdb.toml and retry."),
            Self::ValidationFailed => Some("Supply every required field and retry."),
            Self::WorkspaceNotFound
            | Self::GroupNotFound
            | Self::ItemNotFound
            | Self::ConnectionNotFound
            | Self::RoutingNotFound
            | Self::ServiceNotFound
            | Self::ServiceItemNotFound
            | Self::ServiceGroupNotFound
            | Self::ShareLinkNotFound => None,
            Self::InvalidState => Some("Re-read the entity and check its current state."),
            Self::DuplicateConnection => {
                Some("Set connections.duplicate_policy = \"idempotent\" to reuse existing edges.")
            }
            Self::CorruptRow => Some("Inspect the offending row; it was written outside cmdb."),
            Self::AccessDenied => Some("Ask the link owner for the password."),
            Self::TransactionFailed => Some("Retry once. Nothing was applied."),
            Self::PayloadEncoding | Self::CredentialHashing => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Entity kinds named in [`CoreError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Workspace,
    Group,
    Item,
    Connection,
    Routing,
    Service,
    ServiceItem,
    ServiceGroup,
    ShareLink,
}

impl Entity {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Group => "group",
            Self::Item => "item",
            Self::Connection => "connection",
            Self::Routing => "edge routing",
            Self::Service => "service",
            Self::ServiceItem => "service item",
            Self::ServiceGroup => "service group",
            Self::ShareLink => "share link",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by every core operation.
///
/// Any error raised inside a transaction means the transaction was rolled
/// back: callers never observe a partially applied mutation.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A required field is missing or malformed. Raised before the store is
    /// touched.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation target does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    /// The target exists but the operation does not apply to it, e.g.
    /// reordering an ungrouped item or deleting the default workspace.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Uniqueness violation (duplicate connection under the `reject` policy).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row violates an invariant the core relies on.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Underlying store failure; the surrounding transaction was rolled back.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// JSON payload (images, positions) could not be encoded.
    #[error("payload encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// A password-protected share link was opened without the right
    /// password.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A share link password could not be hashed or a stored hash could not
    /// be parsed.
    #[error("credential error: {0}")]
    Credential(String),
}

impl CoreError {
    pub(crate) fn not_found(entity: Entity, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::NotFound { entity, .. } => match entity {
                Entity::Workspace => ErrorCode::WorkspaceNotFound,
                Entity::Group => ErrorCode::GroupNotFound,
                Entity::Item => ErrorCode::ItemNotFound,
                Entity::Connection => ErrorCode::ConnectionNotFound,
                Entity::Routing => ErrorCode::RoutingNotFound,
                Entity::Service => ErrorCode::ServiceNotFound,
                Entity::ServiceItem => ErrorCode::ServiceItemNotFound,
                Entity::ServiceGroup => ErrorCode::ServiceGroupNotFound,
                Entity::ShareLink => ErrorCode::ShareLinkNotFound,
            },
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::Conflict(_) => ErrorCode::DuplicateConnection,
            Self::Corrupt(_) => ErrorCode::CorruptRow,
            Self::AccessDenied(_) => ErrorCode::AccessDenied,
            Self::Store(_) => ErrorCode::TransactionFailed,
            Self::Json(_) => ErrorCode::PayloadEncoding,
            Self::Credential(_) => ErrorCode::CredentialHashing,
        }
    }

    /// `true` for errors the caller caused (4xx-style), `false` for
    /// internal failures.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound { .. }
                | Self::InvalidState(_)
                | Self::Conflict(_)
                | Self::AccessDenied(_)
        )
    }
}

/// Result alias used by all core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::{CoreError, Entity, ErrorCode};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::ValidationFailed,
            ErrorCode::WorkspaceNotFound,
            ErrorCode::GroupNotFound,
            ErrorCode::ItemNotFound,
            ErrorCode::ConnectionNotFound,
            ErrorCode::RoutingNotFound,
            ErrorCode::ServiceNotFound,
            ErrorCode::ServiceItemNotFound,
            ErrorCode::ServiceGroupNotFound,
            ErrorCode::ShareLinkNotFound,
            ErrorCode::InvalidState,
            ErrorCode::DuplicateConnection,
            ErrorCode::CorruptRow,
            ErrorCode::AccessDenied,
            ErrorCode::TransactionFailed,
            ErrorCode::PayloadEncoding,
            ErrorCode::CredentialHashing,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::InvalidState.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn not_found_maps_to_entity_code() {
        let err = CoreError::not_found(Entity::Item, 42);
        assert_eq!(err.code(), ErrorCode::ItemNotFound);
        assert_eq!(err.to_string(), "item 42 not found");
        assert!(err.is_client_error());

        let err = CoreError::not_found(Entity::ServiceItem, 7);
        assert_eq!(err.code(), ErrorCode::ServiceItemNotFound);
        assert_eq!(err.to_string(), "service item 7 not found");
    }

    #[test]
    fn store_errors_are_internal() {
        let err = CoreError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.code(), ErrorCode::TransactionFailed);
        assert!(!err.is_client_error());
    }
}
