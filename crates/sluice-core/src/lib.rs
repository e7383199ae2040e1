//! Core sluice primitives shared across crates.
//!
//! Includes subject tokenization and validation, the inbound envelope type,
//! and base errors.

pub mod error;
pub mod subject;
pub mod types;

pub use error::SubjectError;
pub use subject::{
    is_literal, subject_matches, tokens, validate_pattern, validate_subject,
    FULL_WILDCARD, MAX_SUBJECT_TOKENS, SINGLE_WILDCARD, TOKEN_SEPARATOR,
};
pub use types::{Envelope, HeaderMap, DESCRIPTION_HEADER, STATUS_HEADER};
