use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::ContentUploader;
use crate::error::HauntedResult;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// CIDv1 header: version 1, dag-pb codec, sha2-256 multihash of 32 bytes.
const CID_HEADER: [u8; 4] = [0x01, 0x70, 0x12, 0x20];

/// Derives the CIDv1 (`bafy...`) a content-addressed store would assign to `bytes`.
pub fn content_id_for(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut raw = Vec::with_capacity(CID_HEADER.len() + digest.len());
    raw.extend_from_slice(&CID_HEADER);
    raw.extend_from_slice(&digest);
    format!("b{}", base32_lower(&raw))
}

fn base32_lower(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// In-process uploader that keeps artifacts in memory under their derived CID.
#[derive(Default)]
pub struct MemoryUploader {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, cid: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(cid).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ContentUploader for MemoryUploader {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        _filename: &str,
        _mime_type: &str,
    ) -> HauntedResult<String> {
        let cid = content_id_for(&bytes);
        self.objects.write().await.insert(cid.clone(), bytes);
        Ok(cid)
    }
}
