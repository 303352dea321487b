//! TCP transport: a single persistent, length-prefixed connection per
//! resolver (rfc1035 §4.2.2). The read half is owned exclusively by a
//! background loop so a blocked read never stalls a concurrent write.

use super::Pending;
use crate::errors::ResolverError;
use crate::types::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::time::interval;

enum State {
    Idle,
    Ready(Arc<Mutex<OwnedWriteHalf>>),
}

pub(crate) struct TcpTransport {
    servers: Vec<SocketAddr>,
    connect_timeout: Duration,
    timeout: Duration,
    keep_open_for: Duration,
    state: Mutex<State>,
    pending: Arc<Mutex<HashMap<u16, Pending>>>,
}

impl TcpTransport {
    pub fn new(servers: Vec<SocketAddr>, timeout: Duration, keep_open_for: Duration) -> Arc<TcpTransport> {
        let transport = Arc::new(TcpTransport {
            servers,
            connect_timeout: timeout,
            timeout,
            keep_open_for,
            state: Mutex::new(State::Idle),
            pending: Arc::new(Mutex::new(HashMap::new())),
        });
        Self::spawn_timeout_scanner(transport.clone());
        transport
    }

    /// TCP requests are not retransmitted (the stream itself guarantees
    /// delivery); a task stuck past `timeout` is simply failed.
    fn spawn_timeout_scanner(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(250));
            let mut idle_since: Option<Instant> = None;
            loop {
                ticker.tick().await;
                let now = Instant::now();

                let mut pending = self.pending.lock().await;
                let expired: Vec<u16> = pending
                    .iter()
                    .filter(|(_, task)| now.duration_since(task.sent_at) >= self.timeout)
                    .map(|(&id, _)| id)
                    .collect();
                for id in expired {
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

    async fn ensure_ready(&self) -> std::io::Result<Arc<Mutex<OwnedWriteHalf>>> {
        let mut state = self.state.lock().await;
        if let State::Ready(writer) = &*state {
            return Ok(writer.clone());
        }

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.servers[0]))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(Mutex::new(write_half));
        *state = State::Ready(writer.clone());

        self.spawn_recv_loop(read_half);

        Ok(writer)
    }

    fn spawn_recv_loop(&self, mut read_half: OwnedReadHalf) {
        let pending = self.pending.clone();
        tokio::spawn(async move {
            loop {
                let message = match read_one(&mut read_half).await {
                    Ok(message) => message,
                    Err(_) => return,
                };

                let mut pending = pending.lock().await;
                if let Some(task) = pending.remove(&message.id) {
                    let _ = task.responder.send(message);
                }
            }
        });
    }

    /// Sends `raw` length-prefixed and awaits the matching response.
    pub async fn exchange(&self, id: u16, raw: Vec<u8>) -> Result<Message, ResolverError> {
        if raw.len() > u16::MAX as usize {
            return Err(ResolverError::RequestTooLong(raw.len()));
        }

        let writer = self.ensure_ready().await?;

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

        {
            let mut guard = writer.lock().await;
            guard.write_all(&(raw.len() as u16).to_be_bytes()).await?;
            guard.write_all(&raw).await?;
        }

        rx.await.map_err(|_| ResolverError::RequestUnanswered(id))
    }
}

async fn read_one(stream: &mut OwnedReadHalf) -> std::io::Result<Message> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;

    Message::from_slice(&buf)
}
