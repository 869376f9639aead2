//! `P_SHA1` key derivation (RFC 2246 section 5) used for WS-Trust computed keys.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{StsError, StsResult};

type HmacSha1 = Hmac<Sha1>;

/// Derives `length` bytes from `secret` and `seed`.
///
/// For a computed key request the client entropy is the secret and the server
/// entropy the seed.
pub fn p_sha1(secret: &[u8], seed: &[u8], length: usize) -> StsResult<Vec<u8>> {
    let mac = <HmacSha1 as Mac>::new_from_slice(secret)
        .map_err(|e| StsError::crypto(e.to_string()))?;

    let mut output = Vec::with_capacity(length);
    // A(1) = HMAC(secret, seed)
    let mut a = {
        let mut m = mac.clone();
        m.update(seed);
        m.finalize().into_bytes().to_vec()
    };

    while output.len() < length {
        let mut m = mac.clone();
        m.update(&a);
        m.update(seed);
        output.extend_from_slice(&m.finalize().into_bytes());

        let mut next = mac.clone();
        next.update(&a);
        a = next.finalize().into_bytes().to_vec();
    }

    output.truncate(length);
    Ok(output)
}
