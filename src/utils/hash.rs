//! Content hashing.
//!
//! Fingerprints are a pure function of bytes: same content, same name,
//! regardless of build time, file path or invocation order.

/// Hex characters kept from the BLAKE3 digest in emitted file names.
pub const FINGERPRINT_LEN: usize = 20;

/// Short hex fingerprint used in asset file names.
pub fn fingerprint(bytes: impl AsRef<[u8]>) -> String {
    let digest = blake3::hash(bytes.as_ref());
    hex::encode(&digest.as_bytes()[..FINGERPRINT_LEN / 2])
}
