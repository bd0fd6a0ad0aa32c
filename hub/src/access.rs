//! Group and access resolution.
//!
//! Pure lookups over the configured group table, plus the `default` group
//! fallback: when no `default` group is configured the resolver synthesizes
//! one containing every currently connected server with no tool
//! restrictions, so the hub stays usable with an empty group config.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::{GroupConfig, DEFAULT_GROUP_ID},
    pool::ServerPool,
};

pub struct GroupRegistry {
    groups: Vec<GroupConfig>,
    by_id: HashMap<String, usize>,
    pool: Arc<ServerPool>,
}

impl GroupRegistry {
    pub fn new(groups: Vec<GroupConfig>, pool: Arc<ServerPool>) -> Self {
        let by_id = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.id.clone(), i))
            .collect();
        Self {
            groups,
            by_id,
            pool,
        }
    }

    /// Look up a group; `default` is synthesized when not configured.
    pub fn get_group(&self, id: &str) -> Option<GroupConfig> {
        if let Some(&idx) = self.by_id.get(id) {
            return Some(self.groups[idx].clone());
        }
        if id == DEFAULT_GROUP_ID {
            return Some(self.synthesize_default());
        }
        None
    }

    /// Configured groups in order, with the synthesized `default` appended
    /// when no group claims that id.
    pub fn all_groups(&self) -> Vec<GroupConfig> {
        let mut groups = self.groups.clone();
        if !self.by_id.contains_key(DEFAULT_GROUP_ID) {
            groups.push(self.synthesize_default());
        }
        groups
    }

    /// Server ids of a group, preserving configured order.
    pub fn group_servers(&self, id: &str) -> Vec<String> {
        self.get_group(id).map(|g| g.servers).unwrap_or_default()
    }

    /// True when the group exists and permits the named tool.
    pub fn validate_tool_access(&self, group_id: &str, tool_name: &str) -> bool {
        self.get_group(group_id)
            .map(|g| g.allows_tool(tool_name))
            .unwrap_or(false)
    }

    /// First server in configured order that currently owns the tool.
    pub fn find_tool_in_group(&self, group_id: &str, tool_name: &str) -> Option<String> {
        let group = self.get_group(group_id)?;
        group
            .servers
            .into_iter()
            .find(|server| {
                self.pool
                    .server_tools(server)
                    .iter()
                    .any(|t| t.name == tool_name)
            })
    }

    fn synthesize_default(&self) -> GroupConfig {
        GroupConfig {
            id: DEFAULT_GROUP_ID.to_string(),
            name: "Default".to_string(),
            description: Some("All connected servers".to_string()),
            servers: self.pool.connected_servers(),
            allowed_tools: Vec::new(),
        }
    }
}
