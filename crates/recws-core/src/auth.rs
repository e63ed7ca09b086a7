//! Access-key derivation.

use md5::{Digest, Md5};

/// Derives the per-request access key: lowercase-hex MD5 over the caller
/// secret concatenated with request-specific context.
///
/// The remote service recomputes the same digest on its side, so the
/// derivation must stay byte-identical or every request comes back with the
/// invalid-key code. MD5 is weak as a general-purpose hash but is fixed by
/// the wire protocol here.
pub fn derive_key(secret: &str, context: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(secret.as_bytes());
    hasher.update(context.as_bytes());
    hex::encode(hasher.finalize())
}
