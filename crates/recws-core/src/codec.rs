//! Payload codec: the gzip + base64 framing of the webservice wire format.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Compresses an outgoing request body: gzip, then standard base64.
/// Used once per request for the `req` field.
pub fn compress_payload(bytes: &[u8]) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).context("gzip encode failed")?;
    let compressed = encoder.finish().context("gzip finalize failed")?;
    Ok(BASE64.encode(compressed))
}

/// Decodes one response event: base64, then gzip. Applied per element of the
/// `evt` sequence unless the caller asked for compressed passthrough.
pub fn decompress_event(text: &str) -> Result<Vec<u8>> {
    let raw = BASE64
        .decode(text.as_bytes())
        .context("event base64 decode failed")?;
    let mut decoder = GzDecoder::new(raw.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .context("event gzip decode failed")?;
    Ok(out)
}
