//! Content-addressed storage for stage artifacts.

mod http;
mod memory;

pub use http::HttpContentUploader;
pub use memory::{content_id_for, MemoryUploader};

use async_trait::async_trait;

use crate::error::HauntedResult;

const CID_PREFIXES: [&str; 2] = ["bafy", "bafk"];
const MIN_CID_LEN: usize = 50;

/// Uploads bytes and returns the content identifier they are stored under.
#[async_trait]
pub trait ContentUploader: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, filename: &str, mime_type: &str)
        -> HauntedResult<String>;
}

/// The one predicate used everywhere a content identifier is accepted.
pub fn is_valid_content_id(cid: &str) -> bool {
    cid.len() >= MIN_CID_LEN
        && CID_PREFIXES.iter().any(|prefix| cid.starts_with(prefix))
        && cid
            .bytes()
            .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
}
