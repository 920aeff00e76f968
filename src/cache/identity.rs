//! Caller identity extraction.
//!
//! Cached data is partitioned per caller, so every credential must resolve
//! to *some* stable identity string. Decoding is claims-only: the
//! surrounding proxy has already authenticated the credential upstream,
//! and a forged claim only ever isolates the forger into their own
//! partition.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use metrics::counter;
use sha2::{Digest, Sha256};
use tracing::warn;

const METRIC_IDENTITY_FALLBACK_TOTAL: &str = "ombra_identity_fallback_total";

/// Claims consulted in priority order.
const IDENTITY_CLAIMS: &[&str] = &["email", "upn", "preferred_username", "sub"];

/// Fallback identities carry a prefix so they can never collide with a
/// claim-derived identity string.
const FALLBACK_PREFIX: &str = "token:";

/// Resolve an opaque bearer credential to a stable per-caller identity.
///
/// Never fails: when the credential is not a decodable token, or carries
/// no usable claim, the identity is a hash of the raw credential. That
/// loses human readability but keeps the isolation guarantee — a
/// different credential still yields a different identity.
pub fn caller_identity(credential: &str) -> String {
    let token = credential
        .trim()
        .strip_prefix("Bearer ")
        .or_else(|| credential.trim().strip_prefix("bearer "))
        .unwrap_or(credential.trim());

    if let Some(identity) = claim_identity(token) {
        return identity;
    }

    counter!(METRIC_IDENTITY_FALLBACK_TOTAL).increment(1);
    warn!(
        credential_len = credential.len(),
        "credential carries no identity claim; using hash fallback (did the upstream token format change?)"
    );
    let digest = Sha256::digest(credential.as_bytes());
    format!("{FALLBACK_PREFIX}{}", hex::encode(digest))
}

/// Decode the payload segment of a JWT and pick the first usable claim.
fn claim_identity(token: &str) -> Option<String> {
    let mut segments = token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);
    // header.payload.signature, nothing more
    if segments.next().is_none() || segments.next().is_some() {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;

    IDENTITY_CLAIMS
        .iter()
        .filter_map(|claim| claims.get(claim).and_then(serde_json::Value::as_str))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) fn test_token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.signature")
}
