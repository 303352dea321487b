//! UDP transport: one connected socket per resolver, requests retried on a
//! timer until `retries` is exhausted (rfc1035 §4.2.1 leaves retry policy to
//! the resolver).

use super::Pending;
use crate::errors::ResolverError;
use crate::types::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, Mutex};
use tokio::time::interval;

/// Per-transport lifecycle state (§4.2): `Idle` until a send forces a
/// connect, `Ready` while a socket is open.
enum State {
    Idle,
    Ready(Arc<UdpSocket>),
}

pub(crate) struct UdpTransport {
    servers: Vec<SocketAddr>,
    timeout: Duration,
    retries: u32,
    keep_open_for: Duration,
    state: Mutex<State>,
    pending: Arc<Mutex<HashMap<u16, Pending>>>,
}

impl UdpTransport {
    pub fn new(servers: Vec<SocketAddr>, timeout: Duration, retries: u32, keep_open_for: Duration) -> Arc<UdpTransport> {
        let transport = Arc::new(UdpTransport {
            servers,
            timeout,
            retries,
            keep_open_for,
            state: Mutex::new(State::Idle),
            pending: Arc::new(Mutex::new(HashMap::new())),
        });
        Self::spawn_retry_scanner(transport.clone());
        transport
    }

    /// Owns the per-transport retry/timeout scan and the deferred-close
    /// timer; ticks independently of any one request.
    fn spawn_retry_scanner(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(250));
            let mut idle_since: Option<Instant> = None;
            loop {
                ticker.tick().await;
                let now = Instant::now();

                let socket = match &*self.state.lock().await {
                    State::Ready(socket) => Some(socket.clone()),
                    State::Idle => None,
                };

                let mut pending = self.pending.lock().await;
                let mut to_drop = Vec::new();
                for (&id, task) in pending.iter_mut() {
                    if now.duration_since(task.sent_at) < self.timeout {
                        continue;
                    }
                    if task.attempts >= self.retries {
                        to_drop.push(id);
                        continue;
                    }
                    task.attempts += 1;
                    task.sent_at = now;
                    if let Some(socket) = &socket {
                        let _ = socket.send(&task.raw).await;
                    }
                }
                for id in to_drop {
                    // Dropping the responder signals RequestUnanswered to
                    // the caller's `rx.await`.
                    pending.remove(&id);
                }

                if pending.is_empty() {
                    match idle_since {
                        Some(since) if now.duration_since(since) >= self.keep_open_for => {
                            *self.state.lock().await = State::Idle;
                            idle_since = None;
                        }
                        Some(_) => {}
                        None => idle_since = Some(now),
                    }
                } else {
                    idle_since = None;
                }
            }
        });
    }

    async fn ensure_ready(&self) -> std::io::Result<Arc<UdpSocket>> {
        let mut state = self.state.lock().await;
        if let State::Ready(socket) = &*state {
            return Ok(socket.clone());
        }

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.servers[0]).await?;
        let socket = Arc::new(socket);
        *state = State::Ready(socket.clone());

        self.spawn_recv_loop(socket.clone());

        Ok(socket)
    }

    fn spawn_recv_loop(&self, socket: Arc<UdpSocket>) {
        let pending = self.pending.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let len = match socket.recv(&mut buf).await {
                    Ok(len) => len,
                    Err(_) => return,
                };

                let message = match Message::from_slice(&buf[..len]) {
                    Ok(message) => message,
                    Err(_) => continue, // Unparsable datagram; ignore and keep listening.
                };

                let mut pending = pending.lock().await;
                if let Some(task) = pending.remove(&message.id) {
                    let _ = task.responder.send(message);
                }
                // No matching id: an unhandled-error sink, silently dropped.
            }
        });
    }

    /// Sends `raw` (already encoded, carrying id `id`) and awaits the
    /// matching response, retrying up to `self.retries` times.
    pub async fn exchange(&self, id: u16, raw: Vec<u8>) -> Result<Message, ResolverError> {
        let socket = self.ensure_ready().await?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&id) {
                return Err(ResolverError::RequestIDInUse(id));
            }
            pending.insert(
                id,
                Pending {
                    responder: tx,
                    raw: raw.clone(),
                    attempts: 0,
                    sent_at: Instant::now(),
                },
            );
        }

        socket.send(&raw).await?;

        rx.await.map_err(|_| ResolverError::RequestUnanswered(id))
    }
}
