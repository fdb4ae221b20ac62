//! Relay statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of relay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    /// Datagrams read from players.
    pub datagrams_received: u64,

    /// Datagrams written to backends.
    pub datagrams_forwarded: u64,

    /// Datagrams written back to players.
    pub datagrams_replied: u64,

    /// Player datagrams dropped for any reason.
    pub datagrams_dropped: u64,

    /// Resolver calls that failed.
    pub resolver_failures: u64,

    /// Sessions registered.
    pub sessions_created: u64,

    /// Sessions removed from the registry.
    pub sessions_closed: u64,

    /// Outbound sockets discarded after losing a creation race.
    pub sockets_discarded: u64,
}

/// Atomic counters shared between the engine, registry and reply loops.
#[derive(Debug, Default)]
pub struct RelayStats {
    datagrams_received: AtomicU64,
    datagrams_forwarded: AtomicU64,
    datagrams_replied: AtomicU64,
    datagrams_dropped: AtomicU64,
    resolver_failures: AtomicU64,
    sessions_created: AtomicU64,
    sessions_closed: AtomicU64,
    sockets_discarded: AtomicU64,
}

impl RelayStats {
    pub(crate) fn record_received(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forwarded(&self) {
        self.datagrams_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replied(&self) {
        self.datagrams_replied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resolver_failure(&self) {
        self.resolver_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_socket_discarded(&self) {
        self.sockets_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_forwarded: self.datagrams_forwarded.load(Ordering::Relaxed),
            datagrams_replied: self.datagrams_replied.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            resolver_failures: self.resolver_failures.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sockets_discarded: self.sockets_discarded.load(Ordering::Relaxed),
        }
    }
}
