use std::time::Duration;

use sluice_codec::ack::AckKind;
use sluice_codec::headers::{decode_envelope, encode_header_block};
use sluice_codec::metadata::{parse_ack_subject, SequencePair};
use sluice_codec::pull::PullRequest;
use sluice_codec::status::{check_response, classify, decode_api_error, ApiError, ControlStatus, Inbound};
use sluice_core::{Envelope, HeaderMap, STATUS_HEADER};

fn read_vector(name: &str) -> String {
    let path = format!("{}/tests/vectors/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(path)
        .expect("vector file must exist")
        .trim()
        .to_string()
}

#[test]
fn pull_request_bodies_match_golden_vectors() {
    let no_wait = PullRequest::no_wait(10).encode().expect("encode");
    assert_eq!(String::from_utf8(no_wait).expect("utf-8"), read_vector("pull_no_wait.json"));

    let expiring = PullRequest::expiring(25, Duration::from_secs(5) - Duration::from_micros(100))
        .encode()
        .expect("encode");
    assert_eq!(
        String::from_utf8(expiring).expect("utf-8"),
        read_vector("pull_expiring.json")
    );
}

#[test]
fn nak_delay_matches_golden_vector() {
    let kind = AckKind::Nak {
        delay: Some(Duration::from_millis(1500)),
    };
    let encoded = kind.encode().expect("encode");
    let golden = read_vector("nak_with_delay.txt");
    assert_eq!(encoded, golden.as_bytes());
    assert_eq!(AckKind::decode(golden.as_bytes()), Some(kind));
}

#[test]
fn full_ack_subject_with_domain_and_suffix() {
    let md = parse_ack_subject(&read_vector("ack_subject_full.txt")).expect("parse");
    assert_eq!(md.domain, "hub");
    assert_eq!(md.stream, "ORDERS");
    assert_eq!(md.consumer, "worker");
    assert_eq!(md.num_delivered, 2);
    assert_eq!(
        md.sequence,
        SequencePair {
            stream: 1_048_576,
            consumer: 77
        }
    );
    assert_eq!(md.num_pending, 12);
    assert_eq!(md.timestamp.seconds, 1_718_000_000);
    assert_eq!(md.timestamp.nanos, 1);
}

#[test]
fn api_error_body_maps_to_consumer_not_found() {
    let body = read_vector("api_error_consumer_not_found.json");
    assert_eq!(
        decode_api_error(body.as_bytes()),
        Some(ApiError::ConsumerNotFound {
            description: "consumer not found".to_string()
        })
    );
    let response = Envelope::new("_INBOX.r", body.into_bytes());
    assert!(matches!(
        check_response(response),
        Err(ApiError::ConsumerNotFound { .. })
    ));
}

#[test]
fn wire_frame_with_inline_status_classifies_as_sentinel() {
    let frame = decode_envelope(
        "_INBOX.abc",
        None,
        Some(b"NATS/1.0 408 Request Timeout\r\nNats-Pending-Messages: 3\r\n\r\n".as_slice()),
        Vec::<u8>::new(),
    )
    .expect("frame should decode");
    match classify(frame) {
        Inbound::Control(ctrl) => {
            assert_eq!(ctrl.status, ControlStatus::RequestTimeout);
            assert_eq!(ctrl.subject, "_INBOX.abc");
            assert_eq!(
                ctrl.headers.get("Nats-Pending-Messages").map(String::as_str),
                Some("3")
            );
        }
        Inbound::Data(_) => panic!("a status frame must be a control message"),
    }
}

#[test]
fn encoded_header_block_is_stable() {
    let mut headers = HeaderMap::new();
    headers.insert(STATUS_HEADER.to_string(), "404".to_string());
    headers.insert("A".to_string(), "1".to_string());
    assert_eq!(
        encode_header_block(&headers),
        b"NATS/1.0\r\nA: 1\r\nStatus: 404\r\n\r\n".to_vec()
    );
}
