//! Relay engine: inbound socket, accept loop and shutdown.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::RelayConfig;
use super::error::{RelayError, RelayResult};
use super::resolver::RouteResolver;
use super::routing::{player_key, RoutingTable};
use super::session::SessionRegistry;
use super::socket::bind_udp;
use super::stats::{RelayStats, RelayStatsSnapshot};

/// The UDP relay.
///
/// One instance per process. [`bind`](Self::bind) opens the player-facing
/// socket, [`run`](Self::run) reads from it until [`stop`](Self::stop) is
/// called. Every datagram is handled on its own task.
pub struct Relay {
    config: RelayConfig,
    local_addr: SocketAddr,
    inbound: RwLock<Option<Arc<UdpSocket>>>,
    routes: RoutingTable,
    sessions: SessionRegistry,
    resolver: Arc<dyn RouteResolver>,
    shutdown: CancellationToken,
    stopped: AtomicBool,
    stats: Arc<RelayStats>,
}

impl Relay {
    /// Bind the inbound socket.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the listen address cannot be bound.
    pub async fn bind(
        config: RelayConfig,
        resolver: Arc<dyn RouteResolver>,
    ) -> RelayResult<Arc<Self>> {
        let address = config.listen_addr;
        let bind_error = |source| RelayError::Bind { address, source };

        let socket = bind_udp(address, config.recv_buffer_size).map_err(bind_error)?;
        let local_addr = socket.local_addr().map_err(bind_error)?;

        info!(address = %local_addr, recv_buffer = config.recv_buffer_size, "UDP relay bound");

        let stats = Arc::new(RelayStats::default());
        let sessions = SessionRegistry::new(config.session_settings(), Arc::clone(&stats));

        Ok(Arc::new(Self {
            config,
            local_addr,
            inbound: RwLock::new(Some(Arc::new(socket))),
            routes: RoutingTable::new(),
            sessions,
            resolver,
            shutdown: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            stats,
        }))
    }

    /// Address the inbound socket is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The routing table.
    #[must_use]
    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// The session registry.
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Snapshot of relay counters.
    #[must_use]
    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Token cancelled when the relay stops.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether [`stop`](Self::stop) has not been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    fn inbound(&self) -> Option<Arc<UdpSocket>> {
        self.inbound.read().clone()
    }

    /// Read player datagrams until the relay is stopped.
    ///
    /// Per-datagram failures are logged and the datagram dropped; they never
    /// end the loop.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok` once stopped.
    pub async fn run(self: Arc<Self>) -> RelayResult<()> {
        let Some(inbound) = self.inbound() else {
            return Ok(());
        };

        info!(address = %self.local_addr, "UDP relay listening");
        let mut buf = vec![0u8; self.config.max_datagram_size];

        loop {
            let received = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                received = inbound.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, peer)) => {
                    self.stats.record_received();
                    let datagram = Bytes::copy_from_slice(&buf[..len]);
                    let relay = Arc::clone(&self);
                    let inbound = Arc::clone(&inbound);
                    tokio::spawn(async move {
                        relay.dispatch(datagram, peer, &inbound).await;
                    });
                },
                Err(e) => {
                    // Windows reports ICMP port-unreachable as a read error.
                    debug!(error = %e, "Receive error on inbound socket");
                },
            }
        }

        info!("UDP relay accept loop stopped");
        Ok(())
    }

    async fn dispatch(&self, datagram: Bytes, peer: SocketAddr, inbound: &Arc<UdpSocket>) {
        match self.handle_datagram(&datagram, peer, inbound).await {
            Ok(_) => self.stats.record_forwarded(),
            Err(RelayError::ShuttingDown) => {
                self.stats.record_dropped();
                debug!(player = %peer, "Dropped datagram during shutdown");
            },
            Err(e) => {
                self.stats.record_dropped();
                warn!(player = %peer, bytes = datagram.len(), error = %e, "Dropped datagram");
            },
        }
    }

    async fn handle_datagram(
        &self,
        datagram: &[u8],
        peer: SocketAddr,
        inbound: &Arc<UdpSocket>,
    ) -> RelayResult<usize> {
        let player_ip = player_key(peer.ip());

        let backend = match self.routes.get(&player_ip) {
            Some(backend) => backend,
            None => {
                let backend = self.resolver.resolve(player_ip).await.map_err(|e| {
                    self.stats.record_resolver_failure();
                    e
                })?;
                self.routes.set(player_ip, backend.clone());
                backend
            },
        };

        let session = self.sessions.get_or_create(peer, &backend, inbound).await?;
        session.forward(datagram).await
    }

    /// Upsert a route, retargeting the player's active session if its
    /// backend differs.
    ///
    /// The route is always stored. A session that cannot be retargeted
    /// (unresolvable backend, other address family) keeps its previous
    /// backend until it is closed and recreated.
    ///
    /// Returns the previous route.
    pub async fn set_route(&self, player_ip: IpAddr, backend: &str) -> Option<String> {
        if let Some(session) = self.sessions.get(&player_ip) {
            if session.backend().address != backend {
                if let Err(e) = self.sessions.update_backend(&player_ip, backend).await {
                    warn!(
                        player = %player_key(player_ip),
                        session = %session.id(),
                        backend,
                        error = %e,
                        "Session kept its previous backend"
                    );
                }
            }
        }

        let previous = self.routes.set(player_ip, backend);
        match previous.as_deref() {
            Some(old) if old != backend => {
                info!(player = %player_key(player_ip), old, new = backend, "Route changed");
            },
            _ => info!(player = %player_key(player_ip), backend, "Route set"),
        }
        previous
    }

    /// Delete a player's route and close any session for it.
    ///
    /// Returns whether a route existed.
    pub async fn delete_route(&self, player_ip: IpAddr) -> bool {
        let removed = self.routes.delete(&player_ip).is_some();
        self.sessions.close(&player_ip).await;
        info!(player = %player_key(player_ip), existed = removed, "Route deleted");
        removed
    }

    /// Close a player's session, leaving the route in place.
    pub async fn close_session(&self, player_ip: IpAddr) -> bool {
        self.sessions.close(&player_ip).await
    }

    /// Retarget a player's active session.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AddressResolution`] if `backend` does not resolve.
    pub async fn update_session_backend(&self, player_ip: IpAddr, backend: &str) -> RelayResult<bool> {
        self.sessions.update_backend(&player_ip, backend).await
    }

    /// Stop the accept loop, close every session and release the inbound
    /// socket. Later calls are no-ops.
    ///
    /// Datagram tasks already in flight are not awaited.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Stopping UDP relay");
        self.shutdown.cancel();

        let closed = self.sessions.close_all().await;
        self.inbound.write().take();

        let stats = self.stats.snapshot();
        info!(
            sessions_closed = closed,
            received = stats.datagrams_received,
            forwarded = stats.datagrams_forwarded,
            replied = stats.datagrams_replied,
            dropped = stats.datagrams_dropped,
            "UDP relay stopped"
        );
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("local_addr", &self.local_addr)
            .field("routes", &self.routes.len())
            .field("sessions", &self.sessions.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
