//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use peel::modules::relay::{
    HttpRouteResolver, Relay, RelayConfig, ResolverConfig, RouteResolver,
};
use serde_json::{json, Value};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;

/// How long a test waits for an expected datagram or state change.
pub const WAIT: Duration = Duration::from_secs(3);

/// In-process stand-in for the route-assignment service.
pub struct AssignmentService {
    pub base_url: String,
    backend: Arc<Mutex<String>>,
    status: Arc<Mutex<StatusCode>>,
    requests: Arc<Mutex<Vec<Value>>>,
    calls: Arc<AtomicUsize>,
}

impl AssignmentService {
    /// Serve `POST /route-request` answering with `backend`.
    pub async fn start(backend: impl Into<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let service = Self {
            base_url,
            backend: Arc::new(Mutex::new(backend.into())),
            status: Arc::new(Mutex::new(StatusCode::OK)),
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        };

        let backend = Arc::clone(&service.backend);
        let status = Arc::clone(&service.status);
        let requests = Arc::clone(&service.requests);
        let calls = Arc::clone(&service.calls);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let backend = Arc::clone(&backend);
                let status = Arc::clone(&status);
                let requests = Arc::clone(&requests);
                let calls = Arc::clone(&calls);

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let backend = Arc::clone(&backend);
                        let status = Arc::clone(&status);
                        let requests = Arc::clone(&requests);
                        let calls = Arc::clone(&calls);
                        async move {
                            let matched = req.method() == Method::POST
                                && req.uri().path() == "/route-request";
                            let body = req.into_body().collect().await?.to_bytes();

                            if !matched {
                                return Ok::<_, hyper::Error>(respond(
                                    StatusCode::NOT_FOUND,
                                    &json!({"error": "not found"}),
                                ));
                            }

                            calls.fetch_add(1, Ordering::SeqCst);
                            if let Ok(value) = serde_json::from_slice::<Value>(&body) {
                                requests.lock().push(value);
                            }

                            let status = *status.lock();
                            let backend = backend.lock().clone();
                            Ok(respond(status, &json!({"backend": backend})))
                        }
                    });

                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        service
    }

    /// Change the backend handed out from now on.
    pub fn set_backend(&self, backend: impl Into<String>) {
        *self.backend.lock() = backend.into();
    }

    /// Change the status code of future answers.
    pub fn set_status(&self, status: StatusCode) {
        *self.status.lock() = status;
    }

    /// Number of route requests served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// JSON bodies of every route request received.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }
}

fn respond(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
}

/// A datagram seen by a [`Backend`].
#[derive(Debug, Clone)]
pub struct Received {
    pub from: SocketAddr,
    pub payload: Vec<u8>,
}

/// A UDP game server that records datagrams and echoes them back prefixed
/// with its name.
pub struct Backend {
    pub addr: SocketAddr,
    rx: mpsc::UnboundedReceiver<Received>,
}

impl Backend {
    pub async fn start(name: &'static str) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let payload = buf[..len].to_vec();

                let mut reply = format!("{name}:").into_bytes();
                reply.extend_from_slice(&payload);
                let _ = socket.send_to(&reply, from).await;

                if tx.send(Received { from, payload }).is_err() {
                    break;
                }
            }
        });

        Self { addr, rx }
    }

    /// Next datagram, failing the test if none arrives in time.
    pub async fn recv(&mut self) -> Received {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("backend timed out waiting for datagram")
            .expect("backend task ended")
    }

    /// Whether a datagram arrives within `wait`.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Received> {
        tokio::time::timeout(wait, self.rx.recv()).await.ok().flatten()
    }
}

/// A player socket on loopback.
pub async fn player() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

/// Receive one datagram on a player socket.
pub async fn player_recv(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = vec![0u8; 65535];
    let (len, _) = tokio::time::timeout(WAIT, socket.recv_from(&mut buf))
        .await
        .expect("player timed out waiting for reply")
        .unwrap();
    buf.truncate(len);
    buf
}

/// Bind a relay on loopback and start its accept loop.
pub async fn start_relay(resolver: ResolverConfig) -> Arc<Relay> {
    let resolver: Arc<dyn RouteResolver> = Arc::new(HttpRouteResolver::new(&resolver).unwrap());
    let config = RelayConfig::new("127.0.0.1:0".parse().unwrap()).with_recv_buffer_size(1 << 20);
    let relay = Relay::bind(config, resolver).await.unwrap();
    tokio::spawn(Arc::clone(&relay).run());
    relay
}

/// Poll `condition` until it holds or the wait expires.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn loopback() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}
