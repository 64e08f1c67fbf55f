use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value as JsonValue;

use crate::error::Error;

/// Decodes the claims of a JWT-shaped access token without verification.
///
/// The wallet backend is authoritative for token validity; the client only
/// needs the payload for display and bookkeeping (user id, expiry hints).
///
/// # Errors
///
/// Returns `Error::Token` if the token does not have three dot-separated
/// segments or the payload is not base64url-encoded JSON.
pub fn decode_claims(token_str: &str) -> Result<JsonValue, Error> {
    let parts: Vec<&str> = token_str.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::Token("invalid token format".into()));
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| Error::Token("invalid payload encoding".into()))?;
    let payload_str = std::str::from_utf8(&payload_bytes)
        .map_err(|_| Error::Token("payload is not UTF-8".into()))?;

    serde_json::from_str(payload_str).map_err(|_| Error::Token("payload is not JSON".into()))
}

/// Extracts the `sub` claim (user identifier) from an access token.
///
/// # Errors
///
/// Returns `Error::Token` if the token cannot be decoded or carries no
/// string `sub` claim.
pub fn decode_subject(token_str: &str) -> Result<String, Error> {
    let claims = decode_claims(token_str)?;
    claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::Token("missing claim: sub".into()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Unsigned test token: header `{"alg":"none"}` and the given payload.
    pub(crate) fn make_token(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let body = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        format!("{header}.{body}.sig")
    }

    #[test]
    fn decodes_subject() {
        let token = make_token(r#"{"sub":"user-42","iss":"wallet"}"#);
        assert_eq!(decode_subject(&token).unwrap(), "user-42");
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(decode_subject("just-one-part").is_err());
        assert!(decode_subject("two.parts").is_err());
        assert!(decode_subject("a.b.c.d").is_err());
    }

    #[test]
    fn rejects_non_base64_payload() {
        assert!(decode_subject("aGVhZGVy.!!!not-base64!!!.sig").is_err());
    }

    #[test]
    fn rejects_missing_sub() {
        let token = make_token(r#"{"iss":"wallet"}"#);
        assert!(matches!(decode_subject(&token), Err(Error::Token(_))));
    }

    #[test]
    fn claims_expose_other_fields() {
        let token = make_token(r#"{"sub":"u","exp":1700000000}"#);
        let claims = decode_claims(&token).unwrap();
        assert_eq!(
            claims.get("exp").and_then(|v| v.as_i64()),
            Some(1_700_000_000)
        );
    }
}
