//! The `Cmdb` facade: one store connection, its configuration and a change
//! sink, exposing every operation to outer layers.
//!
//! Each mutating call runs in its own `IMMEDIATE` transaction. Errors drop
//! the transaction, which rolls it back, so callers never observe a partial
//! write. After a successful commit the current item list of the touched
//! workspace is pushed to the [`ChangeSink`].

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::clone::{self, CloneReport};
use crate::config::CoreConfig;
use crate::db;
use crate::error::{CoreError, Entity, Result};
use crate::model::{
    AffectedItem, Connection as Edge, EdgeRef, EdgeShape, Group, GroupFields, GroupId, GroupLink,
    Handles, IconType, Item, ItemFields, ItemId, NewItem, NewShareLink, Position, RoutingRecord,
    Service, ServiceConnection, ServiceFields, ServiceGroup, ServiceGroupId, ServiceGroupLink,
    ServiceId, ServiceItem, ServiceItemFields, ServiceItemId, ServiceLinkTarget, ServiceRouting,
    ShareAccess, ShareLink, ShareLinkId, ShareLinkUpdate, ShareStats, Visitor, Workspace,
    WorkspaceId,
};
use crate::notify::ChangeSink;
use crate::{affected, connections, groups, items, ordering, routing, services, shares, workspaces};

pub struct Cmdb {
    conn: Connection,
    config: CoreConfig,
    sink: Box<dyn ChangeSink>,
}

impl std::fmt::Debug for Cmdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cmdb")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn parse_edge(raw: &str) -> Result<EdgeRef> {
    raw.trim().parse()
}

impl Cmdb {
    /// Open the store named by `config.store.path`, migrating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(config: CoreConfig, sink: Box<dyn ChangeSink>) -> anyhow::Result<Self> {
        let conn = db::open_store(&config.store.path, config.store.busy_timeout())?;
        Ok(Self::from_connection(conn, config, sink))
    }

    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be migrated.
    pub fn in_memory(config: CoreConfig, sink: Box<dyn ChangeSink>) -> anyhow::Result<Self> {
        let conn = db::open_in_memory()?;
        Ok(Self::from_connection(conn, config, sink))
    }

    /// Wrap an already migrated connection.
    #[must_use]
    pub fn from_connection(
        conn: Connection,
        config: CoreConfig,
        sink: Box<dyn ChangeSink>,
    ) -> Self {
        Self { conn, config, sink }
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn write<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&Transaction<'_>, &CoreConfig) -> Result<T>,
    ) -> Result<T> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        match f(&tx, &self.config) {
            Ok(out) => {
                tx.commit()?;
                Ok(out)
            }
            Err(err) => {
                tracing::debug!(op, error = %err, code = %err.code(), "rolled back");
                Err(err)
            }
        }
    }

    fn notify(&self, workspace: WorkspaceId) {
        let snapshot = match items::list(&self.conn, workspace) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(
                    workspace = %workspace,
                    error = %err,
                    "failed to read items for broadcast"
                );
                return;
            }
        };
        if let Err(err) = self.sink.broadcast(workspace, &snapshot) {
            tracing::warn!(workspace = %workspace, error = %err, "change broadcast failed");
        }
    }

    // -----------------------------------------------------------------------
    // Workspaces
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        workspaces::list(&self.conn)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown workspace.
    pub fn get_workspace(&self, id: WorkspaceId) -> Result<Workspace> {
        workspaces::get(&self.conn, id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn default_workspace(&self) -> Result<Option<Workspace>> {
        workspaces::get_default(&self.conn)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for a blank name.
    pub fn create_workspace(&mut self, name: &str, description: Option<&str>) -> Result<Workspace> {
        workspaces::validate_name(name)?;
        self.write("create_workspace", |tx, _| workspaces::create(tx, name, description))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn update_workspace(
        &mut self,
        id: WorkspaceId,
        name: &str,
        description: Option<&str>,
    ) -> Result<Workspace> {
        workspaces::validate_name(name)?;
        self.write("update_workspace", |tx, _| workspaces::update(tx, id, name, description))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] for the default workspace.
    pub fn delete_workspace(&mut self, id: WorkspaceId) -> Result<Workspace> {
        let deleted = self.write("delete_workspace", |tx, _| workspaces::delete(tx, id))?;
        self.notify(id);
        Ok(deleted)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown workspace.
    pub fn set_default_workspace(&mut self, id: WorkspaceId) -> Result<Workspace> {
        self.write("set_default_workspace", |tx, _| workspaces::set_default(tx, id))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn ensure_default_workspace(&mut self) -> Result<Workspace> {
        self.write("ensure_default_workspace", |tx, _| workspaces::ensure_default(tx))
    }

    /// Deep-copy `source` into a new workspace.
    ///
    /// # Errors
    ///
    /// See [`clone::duplicate_workspace`].
    pub fn duplicate_workspace(
        &mut self,
        source: WorkspaceId,
        new_name: Option<&str>,
    ) -> Result<Workspace> {
        self.duplicate_workspace_with_report(source, new_name)
            .map(|report| report.workspace)
    }

    /// [`Self::duplicate_workspace`] returning copy and skip counts.
    ///
    /// # Errors
    ///
    /// See [`clone::duplicate_workspace`].
    pub fn duplicate_workspace_with_report(
        &mut self,
        source: WorkspaceId,
        new_name: Option<&str>,
    ) -> Result<CloneReport> {
        let report = self.write("duplicate_workspace", |tx, _| {
            clone::duplicate_workspace(tx, source, new_name)
        })?;
        self.notify(report.workspace.id);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_groups(&self, workspace: WorkspaceId) -> Result<Vec<Group>> {
        groups::list(&self.conn, workspace)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown group.
    pub fn get_group(&self, id: GroupId) -> Result<Group> {
        groups::get(&self.conn, id)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn create_group(&mut self, workspace: WorkspaceId, fields: &GroupFields) -> Result<Group> {
        let group = self.write("create_group", |tx, _| groups::create(tx, workspace, fields))?;
        self.notify(workspace);
        Ok(group)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn update_group(&mut self, id: GroupId, fields: &GroupFields) -> Result<Group> {
        let group = self.write("update_group", |tx, _| groups::update(tx, id, fields))?;
        self.notify(group.workspace_id);
        Ok(group)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown group.
    pub fn update_group_position(&mut self, id: GroupId, position: Position) -> Result<Group> {
        let group = self.write("update_group_position", |tx, _| {
            groups::update_position(tx, id, position)
        })?;
        self.notify(group.workspace_id);
        Ok(group)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown group.
    pub fn delete_group(&mut self, id: GroupId) -> Result<Group> {
        let group = self.write("delete_group", |tx, _| groups::delete(tx, id))?;
        self.notify(group.workspace_id);
        Ok(group)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] or [`CoreError::Validation`].
    pub fn create_group_link(
        &mut self,
        workspace: WorkspaceId,
        source: GroupId,
        target: GroupId,
    ) -> Result<GroupLink> {
        let link = self.write("create_group_link", |tx, _| {
            groups::create_link(tx, workspace, source, target)
        })?;
        self.notify(workspace);
        Ok(link)
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_group_link(&mut self, source: GroupId, target: GroupId) -> Result<bool> {
        let workspace = groups::find(&self.conn, source)?.map(|group| group.workspace_id);
        let removed = self.write("delete_group_link", |tx, _| {
            groups::delete_link(tx, source, target)
        })?;
        if let (true, Some(workspace)) = (removed, workspace) {
            self.notify(workspace);
        }
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_group_links(&self, workspace: WorkspaceId) -> Result<Vec<GroupLink>> {
        groups::list_links(&self.conn, workspace)
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_items(&self, workspace: WorkspaceId) -> Result<Vec<Item>> {
        items::list(&self.conn, workspace)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown item.
    pub fn get_item(&self, id: ItemId) -> Result<Item> {
        items::get(&self.conn, id)
    }

    /// Create an item, appended to its group when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for a missing workspace id or name,
    /// before the store is touched.
    pub fn create_item(&mut self, request: &NewItem) -> Result<Item> {
        if request.workspace_id.is_none() {
            return Err(CoreError::Validation("workspace_id is required".into()));
        }
        let item = self.write("create_item", |tx, _| items::create(tx, request))?;
        self.notify(item.workspace_id);
        Ok(item)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn update_item(&mut self, id: ItemId, fields: &ItemFields) -> Result<Item> {
        let item = self.write("update_item", |tx, _| items::update(tx, id, fields))?;
        self.notify(item.workspace_id);
        Ok(item)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown item.
    pub fn update_item_position(&mut self, id: ItemId, position: Position) -> Result<Item> {
        let item = self.write("update_item_position", |tx, _| {
            items::update_position(tx, id, position)
        })?;
        self.notify(item.workspace_id);
        Ok(item)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn update_item_status(&mut self, id: ItemId, status: &str) -> Result<Item> {
        let item = self.write("update_item_status", |tx, _| items::update_status(tx, id, status))?;
        self.notify(item.workspace_id);
        Ok(item)
    }

    /// Move an item into `group` (or out of any group), at `desired_order`
    /// or appended.
    ///
    /// # Errors
    ///
    /// See [`ordering::set_group`].
    pub fn update_item_group(
        &mut self,
        id: ItemId,
        group: Option<GroupId>,
        desired_order: Option<i64>,
    ) -> Result<Item> {
        let item = self.write("update_item_group", |tx, config| {
            ordering::set_group(tx, id, group, desired_order, &config.ordering)?;
            items::get(tx, id)
        })?;
        self.notify(item.workspace_id);
        Ok(item)
    }

    /// # Errors
    ///
    /// See [`ordering::reorder`].
    pub fn reorder_item(&mut self, id: ItemId, new_order: i64) -> Result<Item> {
        let item = self.write("reorder_item", |tx, config| {
            ordering::reorder(tx, id, new_order, &config.ordering)?;
            items::get(tx, id)
        })?;
        self.notify(item.workspace_id);
        Ok(item)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown item.
    pub fn delete_item(&mut self, id: ItemId) -> Result<()> {
        let item = self.write("delete_item", |tx, _| items::delete(tx, id))?;
        self.notify(item.workspace_id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Create the `shape` edge from `source` to `target`.
    ///
    /// # Errors
    ///
    /// See [`connections::create`].
    pub fn create_connection(
        &mut self,
        shape: EdgeShape,
        source: i64,
        target: i64,
        workspace: WorkspaceId,
    ) -> Result<Edge> {
        let (source, target) = shape.endpoints(source, target);
        let edge = self.write("create_connection", |tx, config| {
            connections::create(tx, workspace, source, target, config.connections.duplicate_policy)
        })?;
        self.notify(workspace);
        Ok(edge)
    }

    /// Returns the number of connection rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_connection(
        &mut self,
        shape: EdgeShape,
        source: i64,
        target: i64,
    ) -> Result<usize> {
        let workspace =
            connections::find(&self.conn, shape, source, target)?.map(|edge| edge.workspace_id);
        let removed = self.write("delete_connection", |tx, _| {
            connections::delete(tx, shape, source, target)
        })?;
        if let Some(workspace) = workspace {
            self.notify(workspace);
        }
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_connections(&self, workspace: WorkspaceId) -> Result<Vec<Edge>> {
        connections::list_workspace(&self.conn, workspace)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn connections_for_item(&self, item: ItemId) -> Result<Vec<Edge>> {
        connections::list_for_item(&self.conn, item)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn connections_for_group(&self, group: GroupId) -> Result<Vec<Edge>> {
        connections::list_for_group(&self.conn, group)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown item.
    pub fn dependents(&self, item: ItemId) -> Result<Vec<Item>> {
        connections::list_dependents(&self.conn, item)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown item.
    pub fn dependencies(&self, item: ItemId) -> Result<Vec<Item>> {
        connections::list_dependencies(&self.conn, item)
    }

    /// Items transitively reachable from `item`, bounded by
    /// `affected.max_depth`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown item.
    pub fn affected_items(&self, item: ItemId) -> Result<Vec<AffectedItem>> {
        affected::affected_items(&self.conn, item, self.config.affected.effective_depth())
    }

    // -----------------------------------------------------------------------
    // Edge routing
    // -----------------------------------------------------------------------

    /// Insert or update the handles of the edge named `edge_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for an unrecognized edge id or blank
    /// handles.
    pub fn upsert_edge_routing(
        &mut self,
        edge_id: &str,
        source_handle: &str,
        target_handle: &str,
        workspace: WorkspaceId,
    ) -> Result<RoutingRecord> {
        let edge = parse_edge(edge_id)?;
        let handles = Handles {
            source_handle: source_handle.to_owned(),
            target_handle: target_handle.to_owned(),
        };
        let record = self.write("upsert_edge_routing", |tx, _| {
            routing::upsert(tx, workspace, edge, &handles)
        })?;
        self.notify(record.workspace_id);
        Ok(record)
    }

    /// Upsert every entry of `entries` (edge id → handles) in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if any edge id or handle is invalid;
    /// nothing is written in that case.
    pub fn bulk_upsert_edge_routing(
        &mut self,
        workspace: WorkspaceId,
        entries: &BTreeMap<String, Handles>,
    ) -> Result<Vec<RoutingRecord>> {
        let parsed = entries
            .iter()
            .map(|(raw, handles)| Ok((parse_edge(raw)?, handles.clone())))
            .collect::<Result<Vec<_>>>()?;
        let records = self.write("bulk_upsert_edge_routing", |tx, _| {
            routing::bulk_upsert(tx, workspace, &parsed)
        })?;
        self.notify(workspace);
        Ok(records)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no record exists for the edge, or
    /// the edge is no longer drawn.
    pub fn get_edge_routing(&self, edge_id: &str) -> Result<RoutingRecord> {
        let edge = parse_edge(edge_id)?;
        routing::get(&self.conn, edge)?.ok_or_else(|| CoreError::not_found(Entity::Routing, edge))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_edge_routing(&self, workspace: WorkspaceId) -> Result<Vec<RoutingRecord>> {
        routing::list(&self.conn, workspace)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for an unrecognized edge id.
    pub fn delete_edge_routing(&mut self, edge_id: &str) -> Result<bool> {
        let edge = parse_edge(edge_id)?;
        let workspace = routing::find_stored(&self.conn, edge)?.map(|record| record.workspace_id);
        let removed = self.write("delete_edge_routing", |tx, _| routing::delete(tx, edge))?;
        if let Some(workspace) = workspace {
            self.notify(workspace);
        }
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if any edge id is unrecognized;
    /// nothing is deleted in that case.
    pub fn delete_edge_routings(&mut self, edge_ids: &[String]) -> Result<usize> {
        let edges = edge_ids
            .iter()
            .map(|raw| parse_edge(raw))
            .collect::<Result<Vec<_>>>()?;
        let mut touched = BTreeSet::new();
        for edge in &edges {
            if let Some(record) = routing::find_stored(&self.conn, *edge)? {
                touched.insert(record.workspace_id);
            }
        }
        let removed =
            self.write("delete_edge_routings", |tx, _| routing::delete_many(tx, &edges))?;
        for workspace in touched {
            self.notify(workspace);
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_services(&self, item: ItemId) -> Result<Vec<Service>> {
        services::list_for_item(&self.conn, item)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_workspace_services(&self, workspace: WorkspaceId) -> Result<Vec<Service>> {
        services::list_for_workspace(&self.conn, workspace)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown service.
    pub fn get_service(&self, id: ServiceId) -> Result<Service> {
        services::get(&self.conn, id)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn create_service(&mut self, item: ItemId, fields: &ServiceFields) -> Result<Service> {
        self.write("create_service", |tx, _| services::create(tx, item, fields))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn update_service(&mut self, id: ServiceId, fields: &ServiceFields) -> Result<Service> {
        self.write("update_service", |tx, _| services::update(tx, id, fields))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown service.
    pub fn update_service_icon(
        &mut self,
        id: ServiceId,
        icon_type: IconType,
        icon_path: Option<&str>,
        icon_name: Option<&str>,
    ) -> Result<Service> {
        self.write("update_service_icon", |tx, _| {
            services::update_icon(tx, id, icon_type, icon_path, icon_name)
        })
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown service.
    pub fn delete_service(&mut self, id: ServiceId) -> Result<Service> {
        self.write("delete_service", |tx, _| services::delete(tx, id))
    }

    // -----------------------------------------------------------------------
    // Service canvas
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_service_groups(&self, service: ServiceId) -> Result<Vec<ServiceGroup>> {
        services::groups::list(&self.conn, service)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn create_service_group(
        &mut self,
        service: ServiceId,
        fields: &GroupFields,
    ) -> Result<ServiceGroup> {
        self.write("create_service_group", |tx, _| {
            services::groups::create(tx, service, fields)
        })
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn update_service_group(
        &mut self,
        id: ServiceGroupId,
        fields: &GroupFields,
    ) -> Result<ServiceGroup> {
        self.write("update_service_group", |tx, _| services::groups::update(tx, id, fields))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown group.
    pub fn update_service_group_position(
        &mut self,
        id: ServiceGroupId,
        position: Position,
    ) -> Result<ServiceGroup> {
        self.write("update_service_group_position", |tx, _| {
            services::groups::update_position(tx, id, position)
        })
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown group.
    pub fn delete_service_group(&mut self, id: ServiceGroupId) -> Result<ServiceGroup> {
        self.write("delete_service_group", |tx, _| services::groups::delete(tx, id))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_service_items(&self, service: ServiceId) -> Result<Vec<ServiceItem>> {
        services::items::list(&self.conn, service)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown service item.
    pub fn get_service_item(&self, id: ServiceItemId) -> Result<ServiceItem> {
        services::items::get(&self.conn, id)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn create_service_item(
        &mut self,
        service: ServiceId,
        group: Option<ServiceGroupId>,
        fields: &ServiceItemFields,
    ) -> Result<ServiceItem> {
        self.write("create_service_item", |tx, _| {
            services::items::create(tx, service, group, fields)
        })
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] or [`CoreError::NotFound`].
    pub fn update_service_item(
        &mut self,
        id: ServiceItemId,
        fields: &ServiceItemFields,
    ) -> Result<ServiceItem> {
        self.write("update_service_item", |tx, _| services::items::update(tx, id, fields))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown service item.
    pub fn update_service_item_position(
        &mut self,
        id: ServiceItemId,
        position: Position,
    ) -> Result<ServiceItem> {
        self.write("update_service_item_position", |tx, _| {
            services::items::update_position(tx, id, position)
        })
    }

    /// # Errors
    ///
    /// See [`services::items::set_group`].
    pub fn update_service_item_group(
        &mut self,
        id: ServiceItemId,
        group: Option<ServiceGroupId>,
        desired_order: Option<i64>,
    ) -> Result<ServiceItem> {
        self.write("update_service_item_group", |tx, config| {
            services::items::set_group(tx, id, group, desired_order, &config.ordering)
        })
    }

    /// # Errors
    ///
    /// See [`services::items::reorder`].
    pub fn reorder_service_item(
        &mut self,
        id: ServiceItemId,
        new_order: i64,
    ) -> Result<ServiceItem> {
        self.write("reorder_service_item", |tx, config| {
            services::items::reorder(tx, id, new_order, &config.ordering)
        })
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown service item.
    pub fn delete_service_item(&mut self, id: ServiceItemId) -> Result<ServiceItem> {
        self.write("delete_service_item", |tx, _| services::items::delete(tx, id))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] or [`CoreError::Validation`].
    pub fn connect_service_items(
        &mut self,
        service: ServiceId,
        source: ServiceItemId,
        target: ServiceItemId,
    ) -> Result<ServiceConnection> {
        self.write("connect_service_items", |tx, _| {
            services::links::connect_items(tx, service, source, target)
        })
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn disconnect_service_items(
        &mut self,
        service: ServiceId,
        source: ServiceItemId,
        target: ServiceItemId,
    ) -> Result<bool> {
        self.write("disconnect_service_items", |tx, _| {
            services::links::disconnect_items(tx, service, source, target)
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_service_connections(&self, service: ServiceId) -> Result<Vec<ServiceConnection>> {
        services::links::list_connections(&self.conn, service)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] or [`CoreError::Validation`].
    pub fn link_service_group(
        &mut self,
        service: ServiceId,
        source: ServiceGroupId,
        target: ServiceLinkTarget,
    ) -> Result<ServiceGroupLink> {
        self.write("link_service_group", |tx, _| {
            services::links::link_group(tx, service, source, target)
        })
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn unlink_service_group(
        &mut self,
        service: ServiceId,
        source: ServiceGroupId,
        target: ServiceLinkTarget,
    ) -> Result<bool> {
        self.write("unlink_service_group", |tx, _| {
            services::links::unlink_group(tx, service, source, target)
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_service_group_links(&self, service: ServiceId) -> Result<Vec<ServiceGroupLink>> {
        services::links::list_group_links(&self.conn, service)
    }

    /// Insert or update the handles of an edge on a service canvas.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for an unrecognized edge id or blank
    /// handles, [`CoreError::NotFound`] when the edge is not drawn.
    pub fn upsert_service_edge_routing(
        &mut self,
        service: ServiceId,
        edge_id: &str,
        handles: &Handles,
    ) -> Result<ServiceRouting> {
        let edge = parse_edge(edge_id)?;
        self.write("upsert_service_edge_routing", |tx, _| {
            services::routing::upsert(tx, service, edge, handles)
        })
    }

    /// Upsert every entry (edge id → handles) of one service canvas in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if any edge id or handle is invalid;
    /// nothing is written in that case.
    pub fn bulk_upsert_service_edge_routing(
        &mut self,
        service: ServiceId,
        entries: &BTreeMap<String, Handles>,
    ) -> Result<Vec<ServiceRouting>> {
        let parsed = entries
            .iter()
            .map(|(raw, handles)| Ok((parse_edge(raw)?, handles.clone())))
            .collect::<Result<Vec<_>>>()?;
        self.write("bulk_upsert_service_edge_routing", |tx, _| {
            services::routing::bulk_upsert(tx, service, &parsed)
        })
    }

    /// Handles of every drawn edge of a service, keyed by edge id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn service_edge_handles(&self, service: ServiceId) -> Result<BTreeMap<String, Handles>> {
        services::routing::handle_map(&self.conn, service)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for an unrecognized edge id.
    pub fn delete_service_edge_routing(
        &mut self,
        service: ServiceId,
        edge_id: &str,
    ) -> Result<bool> {
        let edge = parse_edge(edge_id)?;
        self.write("delete_service_edge_routing", |tx, _| {
            services::routing::delete(tx, service, edge)
        })
    }

    // -----------------------------------------------------------------------
    // Share links
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// See [`shares::create_with`].
    pub fn create_share_link(&mut self, request: &NewShareLink) -> Result<ShareLink> {
        if request.workspace_id.is_none() {
            return Err(CoreError::Validation("workspace_id is required".into()));
        }
        self.write("create_share_link", |tx, _| shares::create(tx, request))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown link.
    pub fn get_share_link(&self, id: ShareLinkId) -> Result<ShareLink> {
        shares::get(&self.conn, id)
    }

    /// Links of a workspace, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_share_links(&self, workspace: WorkspaceId) -> Result<Vec<ShareLink>> {
        shares::list_for_workspace(&self.conn, workspace)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] or [`CoreError::Credential`].
    pub fn update_share_link(
        &mut self,
        id: ShareLinkId,
        change: &ShareLinkUpdate,
    ) -> Result<ShareLink> {
        self.write("update_share_link", |tx, _| shares::update(tx, id, change))
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_share_link(&mut self, id: ShareLinkId) -> Result<bool> {
        self.write("delete_share_link", |tx, _| shares::delete(tx, id))
    }

    /// Open a link as `visitor`, recording the visit.
    ///
    /// # Errors
    ///
    /// See [`shares::open`].
    pub fn open_share_link(
        &mut self,
        token: &str,
        password: Option<&str>,
        visitor: &Visitor,
    ) -> Result<ShareLink> {
        self.write("open_share_link", |tx, _| {
            shares::open(tx, token.trim(), password, visitor, db::now_us())
        })
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown link.
    pub fn share_access_logs(
        &self,
        id: ShareLinkId,
        limit: Option<usize>,
    ) -> Result<Vec<ShareAccess>> {
        shares::access_logs(&self.conn, id, limit)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown link.
    pub fn share_stats(&self, id: ShareLinkId) -> Result<ShareStats> {
        shares::stats(&self.conn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelSink, NoopSink};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink(Arc<AtomicUsize>);

    impl ChangeSink for FailingSink {
        fn broadcast(&self, _workspace_id: WorkspaceId, _items: &[Item]) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("socket closed")
        }
    }

    fn cmdb() -> Cmdb {
        Cmdb::in_memory(CoreConfig::default(), Box::new(NoopSink)).expect("in-memory cmdb")
    }

    #[test]
    fn broadcast_failure_does_not_fail_the_write() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Box::new(FailingSink(Arc::clone(&calls)));
        let mut cmdb = Cmdb::in_memory(CoreConfig::default(), sink).expect("cmdb");
        let ws = cmdb.ensure_default_workspace().expect("default");
        let item = cmdb.create_item(&NewItem::new(ws.id, "web-01")).expect("create despite sink");
        assert_eq!(cmdb.get_item(item.id).expect("committed").name, "web-01");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mutations_push_the_workspace_item_list() {
        let (sink, rx) = ChannelSink::new();
        let mut cmdb = Cmdb::in_memory(CoreConfig::default(), Box::new(sink)).expect("cmdb");
        let ws = cmdb.create_workspace("ops", None).expect("workspace");
        let group = cmdb.create_group(ws.id, &GroupFields::named("edge")).expect("group");
        let _ = rx.try_recv();

        cmdb.create_item(&NewItem::new(ws.id, "lb-01").in_group(group.id)).expect("item");
        let notice = rx.try_recv().expect("notice after commit");
        assert_eq!(notice.workspace_id, ws.id);
        assert_eq!(notice.items.len(), 1);
        assert_eq!(notice.items[0].order_in_group, Some(0));
    }

    #[test]
    fn failed_writes_do_not_notify_or_persist() {
        let (sink, rx) = ChannelSink::new();
        let mut cmdb = Cmdb::in_memory(CoreConfig::default(), Box::new(sink)).expect("cmdb");
        let ws = cmdb.create_workspace("ops", None).expect("workspace");
        let loose = cmdb.create_item(&NewItem::new(ws.id, "loose")).expect("item");
        while rx.try_recv().is_ok() {}

        let err = cmdb.reorder_item(loose.id, 1).expect_err("ungrouped");
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn create_item_without_workspace_is_rejected_before_store_access() {
        let mut cmdb = cmdb();
        let err = cmdb
            .create_item(&NewItem {
                workspace_id: None,
                group_id: None,
                fields: ItemFields::named("x"),
            })
            .expect_err("validation");
        assert_eq!(err.code(), crate::error::ErrorCode::ValidationFailed);
    }

    #[test]
    fn routing_boundary_parses_edge_ids() {
        let mut cmdb = cmdb();
        let ws = cmdb.ensure_default_workspace().expect("default");
        let a = cmdb.create_group(ws.id, &GroupFields::named("a")).expect("a");
        let b = cmdb.create_group(ws.id, &GroupFields::named("b")).expect("b");
        cmdb.create_group_link(ws.id, a.id, b.id).expect("link");
        let edge_id = format!("group-e{}-{}", a.id, b.id);

        let record = cmdb.upsert_edge_routing(&edge_id, "right", "left", ws.id).expect("upsert");
        assert_eq!(record.edge_id.to_string(), edge_id);
        assert_eq!(cmdb.get_edge_routing(&edge_id).expect("get").id, record.id);

        let err = cmdb.upsert_edge_routing("edge-4-5", "r", "l", ws.id).expect_err("bad id");
        assert!(matches!(err, CoreError::Validation(_)));
        let err = cmdb.get_edge_routing("e1-2").expect_err("missing");
        assert_eq!(err.code(), crate::error::ErrorCode::RoutingNotFound);

        let removed = cmdb
            .delete_edge_routings(&[edge_id, "e1-2".to_owned()])
            .expect("delete");
        assert_eq!(removed, 1);
    }

    #[test]
    fn routing_of_a_removed_link_is_not_served() {
        let mut cmdb = cmdb();
        let ws = cmdb.create_workspace("ops", None).expect("workspace");
        let a = cmdb.create_group(ws.id, &GroupFields::named("a")).expect("a");
        let b = cmdb.create_group(ws.id, &GroupFields::named("b")).expect("b");
        cmdb.create_group_link(ws.id, a.id, b.id).expect("link");
        let edge_id = format!("group-e{}-{}", a.id, b.id);
        cmdb.upsert_edge_routing(&edge_id, "bottom", "top", ws.id).expect("upsert");

        assert!(cmdb.delete_group_link(a.id, b.id).expect("unlink"));
        let err = cmdb.get_edge_routing(&edge_id).expect_err("stale");
        assert_eq!(err.code(), crate::error::ErrorCode::RoutingNotFound);
        assert!(cmdb.list_edge_routing(ws.id).expect("list").is_empty());
        assert!(!cmdb.delete_edge_routing(&edge_id).expect("already gone"));
    }

    #[test]
    fn bulk_routing_delete_notifies_each_workspace() {
        let (sink, rx) = ChannelSink::new();
        let mut cmdb = Cmdb::in_memory(CoreConfig::default(), Box::new(sink)).expect("cmdb");
        let mut edge_ids = Vec::new();
        let mut spaces = Vec::new();
        for name in ["east", "west"] {
            let ws = cmdb.create_workspace(name, None).expect("workspace");
            let a = cmdb.create_item(&NewItem::new(ws.id, "a")).expect("a");
            let b = cmdb.create_item(&NewItem::new(ws.id, "b")).expect("b");
            cmdb.create_connection(EdgeShape::ItemItem, a.id.get(), b.id.get(), ws.id)
                .expect("connect");
            let edge_id = format!("e{}-{}", a.id, b.id);
            cmdb.upsert_edge_routing(&edge_id, "right", "left", ws.id).expect("upsert");
            edge_ids.push(edge_id);
            spaces.push(ws.id);
        }
        while rx.try_recv().is_ok() {}

        assert_eq!(cmdb.delete_edge_routings(&edge_ids).expect("delete"), 2);
        let notified: Vec<_> = rx.try_iter().map(|notice| notice.workspace_id).collect();
        assert_eq!(notified, spaces);

        assert_eq!(cmdb.delete_edge_routings(&edge_ids).expect("again"), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn service_canvas_round_trip() {
        let mut cmdb = cmdb();
        let ws = cmdb.ensure_default_workspace().expect("default");
        let owner = cmdb.create_item(&NewItem::new(ws.id, "api")).expect("item");
        let service = cmdb
            .create_service(owner.id, &ServiceFields::named("billing"))
            .expect("service");
        let tier = cmdb
            .create_service_group(service.id, &GroupFields::named("tier"))
            .expect("group");
        let fields = ServiceItemFields::named("db");
        let db = cmdb.create_service_item(service.id, Some(tier.id), &fields).expect("db");
        let cache = cmdb
            .create_service_item(service.id, Some(tier.id), &ServiceItemFields::named("cache"))
            .expect("cache");
        let moved = cmdb.reorder_service_item(cache.id, 0).expect("reorder");
        assert_eq!(moved.order_in_group, Some(0));
        assert_eq!(cmdb.get_service_item(db.id).expect("db").order_in_group, Some(1));

        cmdb.connect_service_items(service.id, db.id, cache.id).expect("connect");
        let edge_id = format!("e{}-{}", db.id, cache.id);
        let handles = Handles {
            source_handle: "right".into(),
            target_handle: "left".into(),
        };
        cmdb.upsert_service_edge_routing(service.id, &edge_id, &handles).expect("route");
        let map = cmdb.service_edge_handles(service.id).expect("handles");
        assert_eq!(map.get(&edge_id), Some(&handles));

        cmdb.delete_item(owner.id).expect("delete owner");
        let err = cmdb.get_service(service.id).expect_err("cascaded");
        assert_eq!(err.code(), crate::error::ErrorCode::ServiceNotFound);
        assert!(cmdb.service_edge_handles(service.id).expect("handles").is_empty());
    }

    #[test]
    fn share_links_open_and_count_visits() {
        let mut cmdb = cmdb();
        let ws = cmdb.ensure_default_workspace().expect("default");
        let link = cmdb.create_share_link(&NewShareLink::new(ws.id)).expect("link");
        let visitor = Visitor {
            ip: Some("192.0.2.7".into()),
            user_agent: None,
        };

        let opened = cmdb.open_share_link(&link.token, None, &visitor).expect("open");
        assert_eq!(opened.access_count, 1);
        assert_eq!(cmdb.share_stats(link.id).expect("stats").unique_visitors, 1);

        let revoke = ShareLinkUpdate {
            is_active: Some(false),
            ..ShareLinkUpdate::default()
        };
        cmdb.update_share_link(link.id, &revoke).expect("revoke");
        let err = cmdb.open_share_link(&link.token, None, &visitor).expect_err("revoked");
        assert_eq!(err.code(), crate::error::ErrorCode::ShareLinkNotFound);
        assert_eq!(cmdb.share_access_logs(link.id, None).expect("logs").len(), 1);

        let err = cmdb.create_share_link(&NewShareLink::default()).expect_err("no workspace");
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
