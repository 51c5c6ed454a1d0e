//! Twilio webhook signatures.
//!
//! Twilio signs each webhook with HMAC-SHA1 keyed by the account auth token,
//! over the full request URL followed by every form parameter as `key` then
//! `value`, keys in sorted order. The base64 digest arrives in the
//! `X-Twilio-Signature` header.

use axum::http::{HeaderMap, Uri};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::HashMap;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

type HmacSha1 = Hmac<Sha1>;

fn mac(auth_token: &str, url: &str, params: &HashMap<String, String>) -> Option<HmacSha1> {
    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(url.as_bytes());

    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();
    for key in keys {
        mac.update(key.as_bytes());
        mac.update(params[key].as_bytes());
    }
    Some(mac)
}

/// Computes the base64 signature Twilio would send for this request.
#[must_use]
pub fn sign(auth_token: &str, url: &str, params: &HashMap<String, String>) -> String {
    mac(auth_token, url, params)
        .map(|mac| STANDARD.encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Checks a presented signature in constant time.
#[must_use]
pub fn verify(
    auth_token: &str,
    url: &str,
    params: &HashMap<String, String>,
    signature: &str,
) -> bool {
    let Ok(presented) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    mac(auth_token, url, params).is_some_and(|mac| mac.verify_slice(&presented).is_ok())
}

/// Rebuilds the public URL the gateway called.
///
/// Behind a proxy the host and scheme come from `X-Forwarded-Host` (or
/// `X-Original-Host`) and `X-Forwarded-Proto`. The scheme defaults to https.
#[must_use]
pub fn public_url(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let host = header("x-forwarded-host")
        .or_else(|| header("x-original-host"))
        .or_else(|| header("host"))
        .or_else(|| uri.authority().map(|a| a.as_str()))?;
    let scheme = header("x-forwarded-proto").unwrap_or("https");
    let path = uri.path_and_query().map_or("/", |p| p.as_str());

    Some(format!("{scheme}://{host}{path}"))
}
