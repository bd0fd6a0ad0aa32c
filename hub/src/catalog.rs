//! Per-group tool catalog with TTL-bounded caching.
//!
//! A cache miss aggregates tools from the server pool (restricted to the
//! group's servers, in group order) and the API-tool bridge, both filtered
//! by the group's allow-list when it is non-empty. Entries are invalidated
//! explicitly, when a member server changes connection state, or after the
//! TTL elapses. Freshness decisions use the monotonic clock; wall-clock
//! timestamps are kept alongside for observability.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    access::GroupRegistry,
    bridge::ApiToolBridge,
    config::DEFAULT_GROUP_ID,
    error::{HubError, HubResult},
    pool::ServerPool,
    types::ToolDescriptor,
};

/// Catalog entries older than this are never returned.
pub const CATALOG_TTL: Duration = Duration::from_secs(30);

struct CatalogEntry {
    tools: Vec<ToolDescriptor>,
    fetched_at: Instant,
    fetched_wall: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub cached_groups: usize,
    pub total_tools: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_entry: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_entry: Option<DateTime<Utc>>,
}

pub struct ToolCatalog {
    entries: DashMap<String, CatalogEntry>,
    pool: Arc<ServerPool>,
    bridge: Arc<ApiToolBridge>,
    groups: Arc<GroupRegistry>,
    ttl: Duration,
}

impl ToolCatalog {
    pub fn new(
        pool: Arc<ServerPool>,
        bridge: Arc<ApiToolBridge>,
        groups: Arc<GroupRegistry>,
    ) -> Self {
        Self::with_ttl(pool, bridge, groups, CATALOG_TTL)
    }

    pub fn with_ttl(
        pool: Arc<ServerPool>,
        bridge: Arc<ApiToolBridge>,
        groups: Arc<GroupRegistry>,
        ttl: Duration,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            pool,
            bridge,
            groups,
            ttl,
        }
    }

    /// Tools visible to a group. Cached copies are defensive clones.
    pub fn tools_for_group(&self, group_id: &str) -> HubResult<Vec<ToolDescriptor>> {
        if let Some(entry) = self.entries.get(group_id) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.tools.clone());
            }
        }

        let group = self
            .groups
            .get_group(group_id)
            .ok_or_else(|| HubError::GroupNotFound(group_id.to_string()))?;

        let mut tools = Vec::new();
        for server in &group.servers {
            for tool in self.pool.server_tools(server) {
                if group.allows_tool(&tool.name) {
                    tools.push(tool);
                }
            }
        }
        for tool in self.bridge.tool_descriptors() {
            if group.allows_tool(&tool.name) {
                tools.push(tool);
            }
        }

        debug!(group = group_id, count = tools.len(), "tool catalog refreshed");
        self.entries.insert(
            group_id.to_string(),
            CatalogEntry {
                tools: tools.clone(),
                fetched_at: Instant::now(),
                fetched_wall: Utc::now(),
            },
        );
        Ok(tools)
    }

    /// Drop every cached entry.
    pub fn clear_cache(&self) {
        self.entries.clear();
    }

    /// Drop one group's entry.
    pub fn clear_cache_for_group(&self, group_id: &str) {
        self.entries.remove(group_id);
    }

    /// Force re-aggregation for a group and return the fresh list.
    pub fn refresh_group(&self, group_id: &str) -> HubResult<Vec<ToolDescriptor>> {
        self.clear_cache_for_group(group_id);
        self.tools_for_group(group_id)
    }

    /// Invalidate every cached group that can see the given server.
    ///
    /// The synthesized `default` group tracks connected servers dynamically,
    /// so it is always invalidated.
    pub fn invalidate_for_server(&self, server: &str) {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| {
                entry.key() == DEFAULT_GROUP_ID
                    || self
                        .groups
                        .group_servers(entry.key())
                        .iter()
                        .any(|s| s == server)
            })
            .map(|entry| entry.key().clone())
            .collect();
        for group in stale {
            debug!(group = %group, server, "invalidating catalog entry after server state change");
            self.entries.remove(&group);
        }
    }

    pub fn stats(&self) -> CatalogStats {
        let mut total_tools = 0;
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;
        for entry in self.entries.iter() {
            total_tools += entry.tools.len();
            let wall = entry.fetched_wall;
            oldest = Some(oldest.map_or(wall, |o| o.min(wall)));
            newest = Some(newest.map_or(wall, |n| n.max(wall)));
        }
        CatalogStats {
            cached_groups: self.entries.len(),
            total_tools,
            oldest_entry: oldest,
            newest_entry: newest,
        }
    }
}
