//! Routing table: player IP to backend address.

use std::collections::BTreeMap;
use std::net::IpAddr;

use dashmap::DashMap;

/// Concurrent map from player IP to backend `host:port` string.
///
/// Entries never expire. Removing a route does not touch any session for
/// that player; callers close sessions themselves.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: DashMap<IpAddr, String>,
}

impl RoutingTable {
    /// Create an empty routing table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend assigned to a player, if any.
    #[must_use]
    pub fn get(&self, player_ip: &IpAddr) -> Option<String> {
        self.routes
            .get(&player_key(*player_ip))
            .map(|entry| entry.value().clone())
    }

    /// Assign a backend to a player, returning the previous assignment.
    pub fn set(&self, player_ip: IpAddr, backend: impl Into<String>) -> Option<String> {
        self.routes.insert(player_key(player_ip), backend.into())
    }

    /// Remove a player's route. Absent keys are a no-op.
    pub fn delete(&self, player_ip: &IpAddr) -> Option<String> {
        self.routes
            .remove(&player_key(*player_ip))
            .map(|(_, backend)| backend)
    }

    /// Snapshot of every route.
    #[must_use]
    pub fn list(&self) -> BTreeMap<IpAddr, String> {
        self.routes
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Normalise a player IP so IPv4-mapped IPv6 sources share the IPv4 key.
#[must_use]
pub fn player_key(ip: IpAddr) -> IpAddr {
    ip.to_canonical()
}
