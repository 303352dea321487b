//! The resolver socket proper: combines the UDP and TCP transports behind
//! one `exchange` call, choosing between them per rfc1035 §4.2 (TCP for
//! UPDATE and any message too large for a UDP datagram).

use super::tcp::TcpTransport;
use super::udp::UdpTransport;
use crate::cfg::ResolverConfig;
use crate::errors::ResolverError;
use crate::types::{Message, Opcode};
use std::sync::Arc;

/// Above this encoded size a message cannot be safely sent without EDNS(0),
/// so the resolver falls back to TCP (rfc1035 §4.2.1).
const MAX_UDP_MESSAGE_SIZE: usize = 512;

/// The async dual-transport resolver socket (§4.2): a UDP transport retried
/// on a timer and a TCP transport relied on for its own delivery guarantee,
/// both opened lazily and closed after `keep_open_for` of inactivity.
pub struct Resolver {
    udp: Arc<UdpTransport>,
    tcp: Arc<TcpTransport>,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Result<Resolver, ResolverError> {
        if config.servers.is_empty() {
            return Err(ResolverError::NoKnownNameServers);
        }

        Ok(Resolver {
            udp: UdpTransport::new(
                config.servers.clone(),
                config.timeout,
                config.retries,
                config.keep_open_for,
            ),
            tcp: TcpTransport::new(config.servers, config.timeout, config.keep_open_for),
        })
    }

    /// Sends `query` and awaits its response, picking UDP or TCP per
    /// message shape. The response's id is checked against the request's.
    pub async fn exchange(&self, query: Message) -> Result<Message, ResolverError> {
        let id = query.id;
        let opcode = query.opcode;
        let raw = query.to_vec()?;

        if raw.len() > u16::MAX as usize {
            return Err(ResolverError::RequestTooLong(raw.len()));
        }

        let response = if opcode == Opcode::Update || raw.len() > MAX_UDP_MESSAGE_SIZE {
            self.tcp.exchange(id, raw).await?
        } else {
            self.udp.exchange(id, raw).await?
        };

        if response.id != id {
            return Err(ResolverError::ResponseIDUnexpected {
                expected: id,
                got: response.id,
            });
        }

        Ok(response)
    }

    /// Sends pre-encoded `raw` bytes (e.g. a TSIG-signed UPDATE) over TCP,
    /// the transport every signed DNS-SD write uses.
    pub async fn exchange_raw_tcp(&self, id: u16, raw: &[u8]) -> Result<Message, ResolverError> {
        if raw.len() > u16::MAX as usize {
            return Err(ResolverError::RequestTooLong(raw.len()));
        }
        self.tcp.exchange(id, raw.to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    #[tokio::test]
    async fn new_rejects_empty_server_list() {
        let config = ResolverConfig {
            servers: vec![],
            ..ResolverConfig::default()
        };
        assert!(matches!(Resolver::new(config), Err(ResolverError::NoKnownNameServers)));
    }

    #[tokio::test]
    async fn new_accepts_a_configured_server() {
        let config = ResolverConfig {
            servers: vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 53)],
            ..ResolverConfig::default()
        };
        assert!(Resolver::new(config).is_ok());
    }
}
