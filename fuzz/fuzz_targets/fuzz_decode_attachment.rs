//! Fuzz target for attachment decoding.
//!
//! This tests that `decode_body` never panics on arbitrary input.

#![no_main]

use bytes::Bytes;
use document_replicator::fetch::decode_body;
use document_replicator::ContentEncoding;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Just call decode_body - it should never panic
    let _ = decode_body(&ContentEncoding::Gzip, Bytes::copy_from_slice(data));
});
