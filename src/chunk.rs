//! Chunk ID minting (`MessageOptions.chunk`).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

/// Mints a fresh chunk ID: 128 bits of randomness, base64-standard encoded.
pub fn new_chunk_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
