// hash.rs — Message element hash used as the runtime dispatch key
//
// Externally addressable names (receivers, send targets, tables) are
// dispatched by a 32-bit hash, never by string. The algorithm is a
// MurmurHash2 variant seeded with the input length and must stay
// bit-identical with independently generated runtimes.

use serde_json::Value;

/// Reserved hash of the zero-argument `bang` message.
pub const BANG_HASH: u32 = 0xFFFF_FFFF;

const M: u32 = 0x5bd1_e995;
const R: u32 = 24;

/// MurmurHash2 over raw bytes, seeded with the byte length.
pub fn murmur2(bytes: &[u8]) -> u32 {
    let mut h = bytes.len() as u32;
    let mut chunks = bytes.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// Hash of a symbol. `"bang"` maps to the reserved sentinel.
pub fn hash_symbol(symbol: &str) -> u32 {
    if symbol == "bang" {
        BANG_HASH
    } else {
        murmur2(symbol.as_bytes())
    }
}

/// Hash of a numeric literal: the raw IEEE-754 single-precision bit pattern.
pub fn hash_float(value: f32) -> u32 {
    value.to_bits()
}

/// Hash of a message element as found in argument dictionaries.
/// Non-scalar values have no hash.
pub fn hash_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| hash_float(f as f32)),
        Value::String(s) => Some(hash_symbol(s)),
        _ => None,
    }
}

/// Hex rendering used throughout the IR document, e.g. `0x345FC008`.
pub fn hash_hex(hash: u32) -> String {
    format!("0x{:X}", hash)
}
