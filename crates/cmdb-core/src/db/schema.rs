//! Canonical SQLite schema for the cmdb store.
//!
//! - `workspaces` is the root owner; every other table cascades from it
//! - `cmdb_groups` / `cmdb_items` hold the containers and their members,
//!   with `order_in_group` ranking the members of each group
//! - `connections` stores directed edges in four endpoint shapes, one
//!   populated column per side
//! - `group_connections` keeps legacy group→group links
//! - `edge_routing` stores handle metadata keyed by a structured edge ref
//! - `store_meta` mirrors the schema version for diagnostics
//! - `services` hang off a cmdb item; their canvas lives in
//!   `service_groups`, `service_items`, `service_connections`,
//!   `service_group_connections` and `service_edge_routing`
//! - `share_links` / `share_access_logs` hold read-only workspace shares

/// Migration v1: tables, integrity constraints and uniqueness guards.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS workspaces (
    workspace_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    description TEXT,
    is_default INTEGER NOT NULL DEFAULT 0 CHECK (is_default IN (0, 1)),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_workspaces_single_default
    ON workspaces(is_default) WHERE is_default = 1;

CREATE TABLE IF NOT EXISTS cmdb_groups (
    group_id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    description TEXT,
    color TEXT NOT NULL DEFAULT '#e0e7ff',
    position_json TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS cmdb_items (
    item_id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    group_id INTEGER REFERENCES cmdb_groups(group_id) ON DELETE SET NULL,
    order_in_group INTEGER CHECK (order_in_group IS NULL OR order_in_group >= 0),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    item_type TEXT,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    ip TEXT,
    category TEXT,
    location TEXT,
    env_type TEXT,
    images_json TEXT NOT NULL DEFAULT '[]',
    position_json TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS connections (
    connection_id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    source_id INTEGER REFERENCES cmdb_items(item_id) ON DELETE CASCADE,
    source_group_id INTEGER REFERENCES cmdb_groups(group_id) ON DELETE CASCADE,
    target_id INTEGER REFERENCES cmdb_items(item_id) ON DELETE CASCADE,
    target_group_id INTEGER REFERENCES cmdb_groups(group_id) ON DELETE CASCADE,
    created_at_us INTEGER NOT NULL,
    CHECK ((source_id IS NULL) <> (source_group_id IS NULL)),
    CHECK ((target_id IS NULL) <> (target_group_id IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_connections_item_item
    ON connections(source_id, target_id)
    WHERE source_id IS NOT NULL AND target_id IS NOT NULL;

CREATE UNIQUE INDEX IF NOT EXISTS uq_connections_item_group
    ON connections(source_id, target_group_id)
    WHERE source_id IS NOT NULL AND target_group_id IS NOT NULL;

CREATE UNIQUE INDEX IF NOT EXISTS uq_connections_group_item
    ON connections(source_group_id, target_id)
    WHERE source_group_id IS NOT NULL AND target_id IS NOT NULL;

CREATE UNIQUE INDEX IF NOT EXISTS uq_connections_group_group
    ON connections(source_group_id, target_group_id)
    WHERE source_group_id IS NOT NULL AND target_group_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS group_connections (
    link_id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    source_id INTEGER NOT NULL REFERENCES cmdb_groups(group_id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL REFERENCES cmdb_groups(group_id) ON DELETE CASCADE,
    created_at_us INTEGER NOT NULL,
    UNIQUE (source_id, target_id)
);

CREATE TABLE IF NOT EXISTS edge_routing (
    routing_id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    edge_id TEXT NOT NULL UNIQUE,
    edge_kind TEXT NOT NULL
        CHECK (edge_kind IN ('item-item', 'item-group', 'group-item', 'group-group')),
    a_id INTEGER NOT NULL,
    b_id INTEGER NOT NULL,
    source_handle TEXT NOT NULL,
    target_handle TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path and ordering-path indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_groups_workspace
    ON cmdb_groups(workspace_id);

CREATE INDEX IF NOT EXISTS idx_items_workspace
    ON cmdb_items(workspace_id);

CREATE INDEX IF NOT EXISTS idx_items_group_order
    ON cmdb_items(workspace_id, group_id, order_in_group);

CREATE INDEX IF NOT EXISTS idx_connections_workspace
    ON connections(workspace_id);

CREATE INDEX IF NOT EXISTS idx_connections_source
    ON connections(source_id);

CREATE INDEX IF NOT EXISTS idx_connections_target
    ON connections(target_id);

CREATE INDEX IF NOT EXISTS idx_connections_source_group
    ON connections(source_group_id);

CREATE INDEX IF NOT EXISTS idx_connections_target_group
    ON connections(target_group_id);

CREATE INDEX IF NOT EXISTS idx_group_connections_workspace
    ON group_connections(workspace_id);

CREATE INDEX IF NOT EXISTS idx_edge_routing_workspace
    ON edge_routing(workspace_id);

CREATE INDEX IF NOT EXISTS idx_edge_routing_kind_a
    ON edge_routing(edge_kind, a_id);

CREATE INDEX IF NOT EXISTS idx_edge_routing_kind_b
    ON edge_routing(edge_kind, b_id);
";

/// Migration v3: services with their own canvas, and workspace share links.
pub const MIGRATION_V3_SQL: &str = r"
CREATE TABLE IF NOT EXISTS services (
    service_id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES cmdb_items(item_id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    status TEXT NOT NULL DEFAULT 'active',
    icon_type TEXT NOT NULL DEFAULT 'preset' CHECK (icon_type IN ('preset', 'upload')),
    icon_path TEXT,
    icon_name TEXT,
    description TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS service_groups (
    service_group_id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_id INTEGER NOT NULL REFERENCES services(service_id) ON DELETE CASCADE,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    description TEXT,
    color TEXT NOT NULL DEFAULT '#e0e7ff',
    position_json TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS service_items (
    service_item_id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_id INTEGER NOT NULL REFERENCES services(service_id) ON DELETE CASCADE,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    group_id INTEGER REFERENCES service_groups(service_group_id) ON DELETE SET NULL,
    order_in_group INTEGER CHECK (order_in_group IS NULL OR order_in_group >= 0),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    item_type TEXT,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    ip TEXT,
    category TEXT,
    location TEXT,
    position_json TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS service_connections (
    service_connection_id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_id INTEGER NOT NULL REFERENCES services(service_id) ON DELETE CASCADE,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    source_id INTEGER NOT NULL REFERENCES service_items(service_item_id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL REFERENCES service_items(service_item_id) ON DELETE CASCADE,
    created_at_us INTEGER NOT NULL,
    UNIQUE (service_id, source_id, target_id)
);

CREATE TABLE IF NOT EXISTS service_group_connections (
    link_id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_id INTEGER NOT NULL REFERENCES services(service_id) ON DELETE CASCADE,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    source_group_id INTEGER NOT NULL
        REFERENCES service_groups(service_group_id) ON DELETE CASCADE,
    target_group_id INTEGER REFERENCES service_groups(service_group_id) ON DELETE CASCADE,
    target_item_id INTEGER REFERENCES service_items(service_item_id) ON DELETE CASCADE,
    created_at_us INTEGER NOT NULL,
    CHECK ((target_group_id IS NULL) <> (target_item_id IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_service_group_links_group
    ON service_group_connections(service_id, source_group_id, target_group_id)
    WHERE target_group_id IS NOT NULL;

CREATE UNIQUE INDEX IF NOT EXISTS uq_service_group_links_item
    ON service_group_connections(service_id, source_group_id, target_item_id)
    WHERE target_item_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS service_edge_routing (
    routing_id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_id INTEGER NOT NULL REFERENCES services(service_id) ON DELETE CASCADE,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    edge_id TEXT NOT NULL,
    edge_kind TEXT NOT NULL CHECK (edge_kind IN ('item-item', 'group-item', 'group-group')),
    a_id INTEGER NOT NULL,
    b_id INTEGER NOT NULL,
    source_handle TEXT NOT NULL,
    target_handle TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    UNIQUE (service_id, edge_id)
);

CREATE TABLE IF NOT EXISTS share_links (
    share_link_id INTEGER PRIMARY KEY AUTOINCREMENT,
    token TEXT NOT NULL UNIQUE,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id) ON DELETE CASCADE,
    created_by TEXT,
    created_at_us INTEGER NOT NULL,
    expires_at_us INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    password_hash TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at_us INTEGER
);

CREATE TABLE IF NOT EXISTS share_access_logs (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    share_link_id INTEGER NOT NULL REFERENCES share_links(share_link_id) ON DELETE CASCADE,
    visitor_ip TEXT,
    visitor_user_agent TEXT,
    accessed_at_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_services_item
    ON services(item_id);

CREATE INDEX IF NOT EXISTS idx_service_items_group_order
    ON service_items(service_id, group_id, order_in_group);

CREATE INDEX IF NOT EXISTS idx_service_groups_service
    ON service_groups(service_id);

CREATE INDEX IF NOT EXISTS idx_share_links_workspace
    ON share_links(workspace_id);

CREATE INDEX IF NOT EXISTS idx_share_access_logs_link
    ON share_access_logs(share_link_id, accessed_at_us);
";

/// Indexes expected by the ordering, graph, clone and share query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "uq_workspaces_single_default",
    "uq_connections_item_item",
    "uq_connections_item_group",
    "uq_connections_group_item",
    "uq_connections_group_group",
    "idx_groups_workspace",
    "idx_items_workspace",
    "idx_items_group_order",
    "idx_connections_workspace",
    "idx_connections_source",
    "idx_connections_target",
    "idx_connections_source_group",
    "idx_connections_target_group",
    "idx_group_connections_workspace",
    "idx_edge_routing_workspace",
    "idx_edge_routing_kind_a",
    "idx_edge_routing_kind_b",
    "uq_service_group_links_group",
    "uq_service_group_links_item",
    "idx_services_item",
    "idx_service_items_group_order",
    "idx_service_groups_service",
    "idx_share_links_workspace",
    "idx_share_access_logs_link",
];
