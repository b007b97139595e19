//! Fuzz target for document JSON parsing.
//!
//! Arbitrary bytes must either parse into a Document or fail cleanly.

#![no_main]

use document_replicator::Document;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(doc) = serde_json::from_slice::<Document>(data) {
        // Whatever parsed must serialize again
        let _ = serde_json::to_vec(&doc);
    }
});
