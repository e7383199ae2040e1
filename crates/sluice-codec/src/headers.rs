use bytes::Bytes;
use sluice_core::{Envelope, HeaderMap, DESCRIPTION_HEADER, STATUS_HEADER};

use crate::error::CodecError;

/// Version line that opens every header block.
pub const HEADER_VERSION_LINE: &str = "NATS/1.0";
const CRLF: &str = "\r\n";

/// Decodes a header block into a [`HeaderMap`].
///
/// An inline status on the version line (`NATS/1.0 404 No Messages`) is
/// lifted into the `Status` and `Description` headers. Later duplicates of a
/// key replace earlier ones.
pub fn decode_header_block(block: &[u8]) -> Result<HeaderMap, CodecError> {
    let text = std::str::from_utf8(block)
        .map_err(|_| CodecError::InvalidHeaderBlock("header block is not utf-8"))?;
    let mut lines = text.split(CRLF);
    let version_line = lines
        .next()
        .ok_or(CodecError::InvalidHeaderBlock("missing version line"))?;
    let inline_status = version_line
        .strip_prefix(HEADER_VERSION_LINE)
        .ok_or(CodecError::InvalidHeaderBlock("missing NATS/1.0 version"))?
        .trim();

    let mut headers = HeaderMap::new();
    if !inline_status.is_empty() {
        let (code, description) = inline_status
            .split_once(' ')
            .unwrap_or((inline_status, ""));
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodecError::InvalidHeaderBlock("malformed inline status"));
        }
        headers.insert(STATUS_HEADER.to_string(), code.to_string());
        let description = description.trim();
        if !description.is_empty() {
            headers.insert(DESCRIPTION_HEADER.to_string(), description.to_string());
        }
    }

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or(CodecError::InvalidHeaderBlock("header line without ':'"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CodecError::InvalidHeaderBlock("empty header key"));
        }
        headers.insert(key.to_string(), value.trim().to_string());
    }
    Ok(headers)
}

/// Encodes headers into a block terminated by an empty line.
pub fn encode_header_block(headers: &HeaderMap) -> Vec<u8> {
    let mut out = String::with_capacity(HEADER_VERSION_LINE.len() + 4 + headers.len() * 16);
    out.push_str(HEADER_VERSION_LINE);
    out.push_str(CRLF);
    for (key, value) in headers {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push_str(CRLF);
    }
    out.push_str(CRLF);
    out.into_bytes()
}

/// Builds an [`Envelope`] from the raw parts of an inbound frame.
pub fn decode_envelope(
    subject: impl Into<String>,
    reply: Option<String>,
    header_block: Option<&[u8]>,
    payload: impl Into<Bytes>,
) -> Result<Envelope, CodecError> {
    let headers = header_block.map(decode_header_block).transpose()?;
    Ok(Envelope {
        subject: subject.into(),
        reply,
        headers,
        payload: payload.into(),
    })
}
