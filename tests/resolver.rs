#![cfg(feature = "clients")]

use ahconfig_core::cfg::ResolverConfig;
use ahconfig_core::clients::Resolver;
use ahconfig_core::types::*;
use ahconfig_core::{Message, Resource};
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};

fn answer_for(query: &Message) -> Message {
    let mut response = query.clone();
    response.qr = QR::Response;
    response.answers = vec![ahconfig_core::Record {
        name: query.questions[0].name.clone(),
        class: Class::Internet,
        ttl: Duration::from_secs(60),
        resource: Resource::A("127.0.0.1".parse().unwrap()),
    }];
    response
}

#[tokio::test]
async fn exchange_round_trips_a_query_over_udp() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
        let query = Message::from_slice(&buf[..len]).unwrap();
        let response = answer_for(&query).to_vec().unwrap();
        socket.send_to(&response, peer).await.unwrap();
    });

    let resolver = Resolver::new(ResolverConfig {
        servers: vec![server_addr],
        timeout: Duration::from_millis(500),
        retries: 2,
        keep_open_for: Duration::from_secs(5),
    })
    .unwrap();

    let mut query = Message::default();
    query.add_question("bramp.net", Type::A, Class::Internet);

    let response = resolver.exchange(query).await.unwrap();
    assert_eq!(response.answers.len(), 1);
    assert!(matches!(response.answers[0].resource, Resource::A(_)));
}

#[tokio::test]
async fn exchange_retries_a_udp_request_that_is_dropped_once() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];

        // Drop the first datagram entirely to force a retry.
        let (_len, _peer) = socket.recv_from(&mut buf).await.unwrap();

        let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
        let query = Message::from_slice(&buf[..len]).unwrap();
        let response = answer_for(&query).to_vec().unwrap();
        socket.send_to(&response, peer).await.unwrap();
    });

    let resolver = Resolver::new(ResolverConfig {
        servers: vec![server_addr],
        timeout: Duration::from_millis(150),
        retries: 3,
        keep_open_for: Duration::from_secs(5),
    })
    .unwrap();

    let mut query = Message::default();
    query.add_question("bramp.net", Type::A, Class::Internet);

    let response = resolver.exchange(query).await.unwrap();
    assert_eq!(response.answers.len(), 1);
}

#[tokio::test]
async fn exchange_gives_up_after_retries_are_exhausted() {
    // Bind but never answer.
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = socket.local_addr().unwrap();
    let _keep_alive = socket; // held so the port stays bound and ICMP refusals don't interfere.

    let resolver = Resolver::new(ResolverConfig {
        servers: vec![server_addr],
        timeout: Duration::from_millis(80),
        retries: 1,
        keep_open_for: Duration::from_secs(5),
    })
    .unwrap();

    let mut query = Message::default();
    query.add_question("bramp.net", Type::A, Class::Internet);

    let result = resolver.exchange(query).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn update_messages_are_sent_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut stream, _) = listener.accept().await.unwrap();

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.unwrap();
        let len = u16::from_be_bytes(len_buf) as usize;

        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.unwrap();

        let query = Message::from_slice(&buf).unwrap();
        assert_eq!(query.opcode, Opcode::Update);

        let mut response = query.clone();
        response.qr = QR::Response;
        response.rcode = Rcode::NoError;

        let encoded = response.to_vec().unwrap();
        stream.write_all(&(encoded.len() as u16).to_be_bytes()).await.unwrap();
        stream.write_all(&encoded).await.unwrap();
    });

    let resolver = Resolver::new(ResolverConfig {
        servers: vec![server_addr],
        timeout: Duration::from_secs(2),
        retries: 0,
        keep_open_for: Duration::from_secs(5),
    })
    .unwrap();

    let mut update = Message::default();
    update.set_zone("example.org", Class::Internet);
    update.add_update(
        "svc.example.org",
        Class::Internet,
        Duration::from_secs(120),
        Resource::A("127.0.0.1".parse().unwrap()),
    );

    let response = resolver.exchange(update).await.unwrap();
    assert_eq!(response.rcode, Rcode::NoError);
}

#[tokio::test]
async fn new_rejects_an_empty_server_list() {
    let result = Resolver::new(ResolverConfig {
        servers: vec![],
        ..ResolverConfig::default()
    });
    assert!(result.is_err());
}
