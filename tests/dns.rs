use ahconfig_core::types::*;
use ahconfig_core::{Extension, Message, Record, Resource};
use pretty_assertions::assert_eq;
use std::time::Duration;

#[test]
fn query_round_trips_through_the_wire() {
    let mut query = Message::default();
    query.id = 0x1234;
    query.add_question("bramp.net", Type::A, Class::Internet);

    let encoded = query.to_vec().expect("failed to encode");
    let decoded = Message::from_slice(&encoded).expect("failed to parse");

    assert_eq!(decoded.id, 0x1234);
    assert_eq!(decoded.questions.len(), 1);
    assert_eq!(decoded.questions[0].name, "bramp.net.");
    assert_eq!(decoded.questions[0].r#type, Type::A);
}

#[test]
fn answer_round_trips_with_a_and_aaaa_records() {
    let mut response = Message::default();
    response.qr = QR::Response;
    response.add_question("bramp.net", Type::A, Class::Internet);
    response.add_answer(
        "bramp.net",
        Class::Internet,
        Duration::from_secs(300),
        Resource::A("127.0.0.1".parse().unwrap()),
    );
    response.add_answer(
        "bramp.net",
        Class::Internet,
        Duration::from_secs(300),
        Resource::AAAA("::1".parse().unwrap()),
    );

    let encoded = response.to_vec().expect("failed to encode");
    let decoded = Message::from_slice(&encoded).expect("failed to parse");

    assert_eq!(decoded.answers.len(), 2);
    assert!(matches!(decoded.answers[0].resource, Resource::A(_)));
    assert!(matches!(decoded.answers[1].resource, Resource::AAAA(_)));
}

#[test]
fn edns_opt_pseudo_record_round_trips() {
    let mut query = Message::default();
    query.add_question("bramp.net", Type::A, Class::Internet);
    query.add_extension(Extension {
        payload_size: 4096,
        ..Default::default()
    });

    let encoded = query.to_vec().expect("failed to encode");
    let decoded = Message::from_slice(&encoded).expect("failed to parse");

    let ext = decoded.extension.expect("expected an OPT record");
    assert_eq!(ext.payload_size, 4096);
}

#[test]
fn update_message_reuses_question_answer_authority_storage() {
    let mut update = Message::default();
    update.set_zone("example.org", Class::Internet);
    update.add_prerequisite("svc.example.org", Class::None, Resource::ANY);
    update.add_update(
        "svc.example.org",
        Class::Internet,
        Duration::from_secs(120),
        Resource::SRV(ahconfig_core::resource::SRV {
            priority: 0,
            weight: 0,
            port: 8080,
            target: "node1.example.org.".to_string(),
        }),
    );

    let encoded = update.to_vec().expect("failed to encode");
    let decoded = Message::from_slice(&encoded).expect("failed to parse");

    assert_eq!(decoded.opcode, Opcode::Update);
    assert_eq!(decoded.zone().unwrap().name, "example.org.");
    assert_eq!(decoded.prerequisites().len(), 1);
    assert_eq!(decoded.updates().len(), 1);
    assert!(matches!(decoded.updates()[0].resource, Resource::SRV(_)));
}

#[test]
fn a_message_with_many_questions_exceeds_the_udp_datagram_limit() {
    // rfc1035 §4.2.1: without EDNS(0) a message over 512 bytes cannot safely
    // travel over UDP; the resolver forces such messages onto TCP (see
    // `ahconfig_core::clients::Resolver::exchange`).
    let mut query = Message::default();
    for i in 0..40 {
        query.add_question(&format!("host{}.bramp.net", i), Type::A, Class::Internet);
    }

    let encoded = query.to_vec().expect("failed to encode");
    assert!(encoded.len() > 512);

    let decoded = Message::from_slice(&encoded).expect("failed to parse");
    assert_eq!(decoded.questions.len(), 40);
}

#[test]
fn record_display_does_not_panic_on_every_resource_kind() {
    let records = vec![
        Record {
            name: "bramp.net.".to_string(),
            class: Class::Internet,
            ttl: Duration::from_secs(60),
            resource: Resource::A("127.0.0.1".parse().unwrap()),
        },
        Record {
            name: "bramp.net.".to_string(),
            class: Class::Internet,
            ttl: Duration::from_secs(60),
            resource: Resource::TXT(vec![b"hello".to_vec()]),
        },
    ];

    for record in &records {
        let _ = format!("{}", record);
    }
}
