//! Per-player sessions and the session registry.
//!
//! A [`Session`] owns one outbound UDP socket toward the player's backend and
//! a background task relaying backend replies to the player's latest source
//! address. The [`SessionRegistry`] keeps at most one session per player IP.
//! Creation is optimistic: the socket is opened first and registered with an
//! insert-if-absent, and the loser of a concurrent race discards its socket.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::config::SessionSettings;
use super::error::{RelayError, RelayResult};
use super::routing::player_key;
use super::socket::{bind_udp, ephemeral_for};
use super::stats::RelayStats;

/// Process-unique session identifier, for logs.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Numeric value of the identifier.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A backend as configured and as resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// The `host:port` string from the routing table.
    pub address: String,

    /// The resolved socket address datagrams are sent to.
    pub resolved: SocketAddr,
}

impl Backend {
    /// Resolve a backend string.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AddressResolution`] if the string is malformed
    /// or the host does not resolve.
    pub async fn resolve(address: &str) -> RelayResult<Self> {
        let resolved = resolve_backend(address).await?;
        Ok(Self {
            address: address.to_string(),
            resolved,
        })
    }
}

/// Resolve a `host:port` string to the first socket address it yields.
///
/// # Errors
///
/// Returns [`RelayError::AddressResolution`] on a malformed string or a
/// lookup that yields nothing.
pub async fn resolve_backend(address: &str) -> RelayResult<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let failure = |reason: String| RelayError::AddressResolution {
        backend: address.to_string(),
        reason,
    };

    tokio::net::lookup_host(address)
        .await
        .map_err(|e| failure(e.to_string()))?
        .next()
        .ok_or_else(|| failure("no addresses returned".to_string()))
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Datagrams forwarded player -> backend.
    pub datagrams_sent: u64,

    /// Bytes forwarded player -> backend.
    pub bytes_sent: u64,

    /// Datagrams relayed backend -> player.
    pub datagrams_received: u64,

    /// Bytes relayed backend -> player.
    pub bytes_received: u64,
}

#[derive(Debug, Default)]
struct SessionCounters {
    datagrams_sent: AtomicU64,
    bytes_sent: AtomicU64,
    datagrams_received: AtomicU64,
    bytes_received: AtomicU64,
}

impl SessionCounters {
    fn record_sent(&self, bytes: usize) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_received(&self, bytes: usize) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

/// Live relay state for one player.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    player_ip: IpAddr,
    player_addr: RwLock<SocketAddr>,
    backend: RwLock<Backend>,
    socket: UdpSocket,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    reply_task: Mutex<Option<JoinHandle<()>>>,
    created_at: Instant,
    counters: SessionCounters,
}

impl Session {
    fn new(
        id: SessionId,
        player_addr: SocketAddr,
        backend: Backend,
        socket: UdpSocket,
    ) -> RelayResult<Self> {
        let local_addr = socket.local_addr().map_err(RelayError::SocketAllocation)?;
        Ok(Self {
            id,
            player_ip: player_key(player_addr.ip()),
            player_addr: RwLock::new(player_addr),
            backend: RwLock::new(backend),
            socket,
            local_addr,
            cancel: CancellationToken::new(),
            reply_task: Mutex::new(None),
            created_at: Instant::now(),
            counters: SessionCounters::default(),
        })
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Player IP this session is keyed by.
    #[must_use]
    pub fn player_ip(&self) -> IpAddr {
        self.player_ip
    }

    /// Latest source address seen from the player.
    #[must_use]
    pub fn player_addr(&self) -> SocketAddr {
        *self.player_addr.read()
    }

    fn set_player_addr(&self, addr: SocketAddr) {
        let mut current = self.player_addr.write();
        if *current != addr {
            let old = std::mem::replace(&mut *current, addr);
            debug!(session = %self.id, old = %old, new = %addr, "Player source address changed");
        }
    }

    /// Current backend.
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.backend.read().clone()
    }

    /// Resolved address datagrams are currently sent to.
    #[must_use]
    pub fn backend_addr(&self) -> SocketAddr {
        self.backend.read().resolved
    }

    fn set_backend(&self, backend: Backend) {
        *self.backend.write() = backend;
    }

    /// Local address of the outbound socket.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Time since the session was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether the session has not been closed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Whether the reply loop is still delivering backend replies.
    ///
    /// A loop that hit a read error stays stopped while the session remains
    /// registered; only closing and recreating the session restarts it.
    #[must_use]
    pub fn reply_loop_running(&self) -> bool {
        self.reply_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Per-session counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            datagrams_sent: self.counters.datagrams_sent.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            datagrams_received: self.counters.datagrams_received.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
        }
    }

    /// Send a player datagram to the current backend.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Send`] if the write fails.
    pub async fn forward(&self, datagram: &[u8]) -> RelayResult<usize> {
        let target = self.backend_addr();
        let sent = self
            .socket
            .send_to(datagram, target)
            .await
            .map_err(|source| RelayError::Send {
                address: target,
                source,
            })?;
        self.counters.record_sent(sent);
        trace!(session = %self.id, backend = %target, bytes = sent, "Forwarded datagram");
        Ok(sent)
    }

    fn attach_reply_task(&self, task: JoinHandle<()>) {
        *self.reply_task.lock() = Some(task);
    }

    /// Cancel the reply loop and wait for it to release the socket.
    async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.reply_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(session = %self.id, error = %e, "Reply loop ended abnormally");
            }
        }
    }
}

/// Where a reply loop reads backend datagrams from.
#[async_trait]
trait ReplySource: Send + Sync {
    async fn recv_reply(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl ReplySource for UdpSocket {
    async fn recv_reply(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf).await
    }
}

/// Relay backend replies to the player until cancelled or a read fails.
async fn reply_loop(
    session: Arc<Session>,
    reply_socket: Arc<UdpSocket>,
    max_datagram_size: usize,
    stats: Arc<RelayStats>,
) {
    relay_replies(&session, &session.socket, &reply_socket, max_datagram_size, &stats).await;
}

async fn relay_replies<S: ReplySource + ?Sized>(
    session: &Session,
    source: &S,
    reply_socket: &UdpSocket,
    max_datagram_size: usize,
    stats: &RelayStats,
) {
    let mut buf = vec![0u8; max_datagram_size];

    loop {
        let received = tokio::select! {
            biased;
            () = session.cancel.cancelled() => break,
            received = source.recv_reply(&mut buf) => received,
        };

        match received {
            Ok((len, from)) => {
                let player = session.player_addr();
                match reply_socket.send_to(&buf[..len], player).await {
                    Ok(_) => {
                        session.counters.record_received(len);
                        stats.record_replied();
                        trace!(session = %session.id, from = %from, player = %player, bytes = len, "Relayed reply");
                    },
                    Err(e) => {
                        debug!(session = %session.id, player = %player, error = %e, "Failed to deliver reply");
                    },
                }
            },
            Err(e) => {
                let err = RelayError::ReplyRead(e);
                warn!(
                    session = %session.id,
                    player = %session.player_ip,
                    error = %err,
                    "Reply loop terminated; session stays registered"
                );
                break;
            },
        }
    }

    debug!(session = %session.id, "Reply loop exited");
}

/// Registry of active sessions keyed by player IP.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<IpAddr, Arc<Session>>,
    settings: SessionSettings,
    stats: Arc<RelayStats>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(settings: SessionSettings, stats: Arc<RelayStats>) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
            stats,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Session for a player IP, if one is registered.
    #[must_use]
    pub fn get(&self, player_ip: &IpAddr) -> Option<Arc<Session>> {
        self.sessions
            .get(&player_key(*player_ip))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Player IPs with a registered session.
    #[must_use]
    pub fn player_ips(&self) -> Vec<IpAddr> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Whether [`close_all`](Self::close_all) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Register `session` unless one already exists for `player_ip`.
    ///
    /// Returns the already-registered session on conflict.
    pub fn insert_if_absent(
        &self,
        player_ip: IpAddr,
        session: Arc<Session>,
    ) -> Result<(), Arc<Session>> {
        match self.sessions.entry(player_key(player_ip)) {
            Entry::Occupied(existing) => Err(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            },
        }
    }

    /// Return the player's session, creating it on first use.
    ///
    /// An existing session only has its player address refreshed; its
    /// backend is left alone even if `backend` differs. New sessions get
    /// their reply loop spawned, writing replies through `reply_socket`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend does not resolve, the outbound socket
    /// cannot be opened, or the registry has been shut down.
    pub async fn get_or_create(
        &self,
        player_addr: SocketAddr,
        backend: &str,
        reply_socket: &Arc<UdpSocket>,
    ) -> RelayResult<Arc<Session>> {
        let player_ip = player_key(player_addr.ip());

        if let Some(session) = self.get(&player_ip) {
            session.set_player_addr(player_addr);
            return Ok(session);
        }

        if self.is_closed() {
            return Err(RelayError::ShuttingDown);
        }

        let backend = Backend::resolve(backend).await?;
        let socket = bind_udp(ephemeral_for(backend.resolved), self.settings.recv_buffer_size)
            .map_err(RelayError::SocketAllocation)?;
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session::new(id, player_addr, backend, socket)?);

        if let Err(existing) = self.insert_if_absent(player_ip, Arc::clone(&session)) {
            drop(session);
            self.stats.record_socket_discarded();
            debug!(player = %player_ip, session = %existing.id, "Lost session creation race");
            existing.set_player_addr(player_addr);
            return Ok(existing);
        }

        let task = tokio::spawn(reply_loop(
            Arc::clone(&session),
            Arc::clone(reply_socket),
            self.settings.max_datagram_size,
            Arc::clone(&self.stats),
        ));
        session.attach_reply_task(task);
        self.stats.record_session_created();

        info!(
            session = %session.id,
            player = %player_ip,
            backend = %session.backend().address,
            local = %session.local_addr,
            "Session created"
        );

        // close_all may have drained the map between the check and the insert.
        if self.is_closed() {
            self.close_if_same(&player_ip, &session).await;
            return Err(RelayError::ShuttingDown);
        }

        Ok(session)
    }

    /// Point an active session at a new backend without interrupting it.
    ///
    /// Returns `Ok(false)` if the player has no session.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AddressResolution`] if the new backend does not
    /// resolve or is in a different address family than the session socket;
    /// the session keeps its previous backend in that case.
    pub async fn update_backend(&self, player_ip: &IpAddr, backend: &str) -> RelayResult<bool> {
        let Some(session) = self.get(player_ip) else {
            return Ok(false);
        };

        let backend = Backend::resolve(backend).await?;
        if backend.resolved.is_ipv4() != session.local_addr.is_ipv4() {
            return Err(RelayError::AddressResolution {
                backend: backend.address,
                reason: format!("address family differs from session socket {}", session.local_addr),
            });
        }

        let previous = session.backend();
        session.set_backend(backend.clone());

        info!(
            session = %session.id,
            player = %session.player_ip,
            old = %previous.address,
            new = %backend.address,
            "Session backend updated"
        );
        Ok(true)
    }

    /// Remove and stop a player's session. Absent players are a no-op.
    ///
    /// Returns whether a session was removed.
    pub async fn close(&self, player_ip: &IpAddr) -> bool {
        match self.sessions.remove(&player_key(*player_ip)) {
            Some((_, session)) => {
                self.finish(&session).await;
                true
            },
            None => false,
        }
    }

    async fn close_if_same(&self, player_ip: &IpAddr, session: &Arc<Session>) {
        let removed = self
            .sessions
            .remove_if(player_ip, |_, current| Arc::ptr_eq(current, session));
        if let Some((_, session)) = removed {
            self.finish(&session).await;
        }
    }

    async fn finish(&self, session: &Session) {
        session.shutdown().await;
        self.stats.record_session_closed();
        info!(
            session = %session.id,
            player = %session.player_ip,
            sent = session.counters.datagrams_sent.load(Ordering::Relaxed),
            received = session.counters.datagrams_received.load(Ordering::Relaxed),
            age = ?session.age(),
            "Session closed"
        );
    }

    /// Close every session and refuse new ones.
    ///
    /// Returns the number of sessions closed.
    pub async fn close_all(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);

        let mut closed = 0;
        for player_ip in self.player_ips() {
            if self.close(&player_ip).await {
                closed += 1;
            }
        }
        closed
    }
}
