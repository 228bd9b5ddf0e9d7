use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use sha2::Sha256;
use xxhash_rust::xxh64::xxh64;

type HmacSha256 = Hmac<Sha256>;

/// Characters left untouched when a path is percent-encoded for the wire:
/// unreserved characters and the segment separator.
pub const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// The header values covered by the signature. Field order is part of the
/// wire format and must not change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignedFields {
    #[serde(rename = "AE-VERSION")]
    pub ae_version: String,
    #[serde(rename = "EX-APP-ID")]
    pub app_id: String,
    #[serde(rename = "EX-APP-VERSION")]
    pub app_version: String,
    #[serde(rename = "NC-USER-ID", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(rename = "AE-DATA-HASH")]
    pub data_hash: String,
    #[serde(rename = "AE-SIGN-TIME")]
    pub sign_time: String,
}

/// xxh64 (seed 0) of the body as 16 lowercase hex digits; an absent body
/// hashes like an empty one.
pub fn body_digest(body: Option<&[u8]>) -> String {
    format!("{:016x}", xxh64(body.unwrap_or_default(), 0))
}

pub fn quote_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ENCODE_SET).to_string()
}

/// `METHOD` + path-and-query + compact JSON of the signed fields, with every
/// non-ASCII character escaped.
pub fn canonical_string(method: &str, path_and_query: &str, fields: &SignedFields) -> String {
    // Serializing a struct of strings cannot fail
    let json = serde_json::to_string(fields).unwrap_or_default();
    format!(
        "{}{}{}",
        method.to_ascii_uppercase(),
        path_and_query,
        escape_non_ascii(&json)
    )
}

/// Escape everything outside printable ASCII as `\uXXXX` (UTF-16 code units,
/// lower-case hex), so that both sides agree on the bytes being signed.
fn escape_non_ascii(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    let mut units = [0u16; 2];

    for character in json.chars() {
        if character.is_ascii() && character != '\u{7f}' {
            escaped.push(character);
            continue;
        }
        for unit in character.encode_utf16(&mut units) {
            escaped.push_str(&format!("\\u{:04x}", unit));
        }
    }

    escaped
}

const SIGNATURE_HEX_LEN: usize = 64;

fn keyed_mac(secret: &[u8], canonical: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take a key of any size");
    mac.update(canonical.as_bytes());
    mac
}

/// HMAC-SHA256 of the canonical string as lower-case hex
pub fn compute_signature(secret: &[u8], canonical: &str) -> String {
    hex::encode(keyed_mac(secret, canonical).finalize().into_bytes())
}

/// Compare a hex signature against the expected one in constant time. Only
/// the exact form [compute_signature] produces is accepted: 64 lower-case hex
/// digits.
pub fn signature_matches(secret: &[u8], canonical: &str, signature: &str) -> bool {
    if signature.len() != SIGNATURE_HEX_LEN
        || !signature
            .bytes()
            .all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'))
    {
        return false;
    }
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    keyed_mac(secret, canonical).verify_slice(&provided).is_ok()
}
