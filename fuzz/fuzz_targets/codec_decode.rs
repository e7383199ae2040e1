#![no_main]

use libfuzzer_sys::fuzz_target;
use sluice_codec::ack::AckKind;
use sluice_codec::headers::decode_header_block;
use sluice_codec::metadata::parse_ack_subject;
use sluice_codec::pull::PullRequest;
use sluice_codec::status::{check_response, decode_api_error};
use sluice_core::Envelope;

fuzz_target!(|data: &[u8]| {
    let _ = decode_header_block(data);
    let _ = PullRequest::decode(data);
    let _ = AckKind::decode(data);
    let _ = decode_api_error(data);
    let _ = check_response(Envelope::new("_INBOX.fuzz", data.to_vec()));
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_ack_subject(text);
    }
});
