//! HMAC-SHA256 request signing for signed REST endpoints.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over `message`, returned as lowercase hex.
pub fn sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Join URL-encoded `(key, value)` pairs with `&`, sign the result, and
/// append `&signature=<hex>`.
pub fn signed_query(params: &[(&str, String)], secret: &str) -> String {
    let query: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let signature = sign(secret, &query);
    format!("{query}&signature={signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_64_hex_chars() {
        let sig = sign("secret", "symbol=BTCUSDT&timestamp=1499827319559");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signed_query_appends_signature() {
        let query = signed_query(
            &[
                ("symbol", "BTCUSDT".to_string()),
                ("timestamp", "1234567890".to_string()),
            ],
            "secret",
        );
        assert!(query.starts_with("symbol=BTCUSDT&timestamp=1234567890&signature="));
    }

    #[test]
    fn signing_is_deterministic() {
        assert_eq!(sign("k", "payload"), sign("k", "payload"));
        assert_ne!(sign("k", "payload"), sign("k2", "payload"));
    }
}
