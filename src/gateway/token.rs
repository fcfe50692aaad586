//! Bearer token claims checks.
//!
//! Only the structure and the `exp`, `iss` and `aud` claims are checked.
//! The signature is NOT verified against the issuer's public keys, so a
//! forged token with plausible claims passes. Full signature verification
//! must replace this before the gateway is exposed to untrusted clients.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token format")]
    InvalidFormat,
    #[error("Invalid token payload")]
    InvalidPayload,
    #[error("Token expired")]
    Expired,
    #[error("Invalid issuer")]
    InvalidIssuer,
    #[error("Invalid audience")]
    InvalidAudience,
}

/// Claims the gateway reads from the token payload. Other claims are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Checks tokens issued for one project.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    project_id: String,
    issuer: String,
}

impl TokenValidator {
    pub fn new(project_id: &str, issuer_domain: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            issuer: format!("https://{}/{}", issuer_domain, project_id),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Validates `token` at `now` (unix seconds) and returns its claims.
    pub fn validate(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(TokenError::InvalidFormat);
        }

        let claims = decode_claims(segments[1])?;

        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        if claims.iss != self.issuer {
            return Err(TokenError::InvalidIssuer);
        }
        if claims.aud != self.project_id {
            return Err(TokenError::InvalidAudience);
        }

        Ok(claims)
    }
}

fn decode_claims(segment: &str) -> Result<Claims, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| TokenError::InvalidPayload)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::InvalidPayload)
}

/// Strips the `Bearer ` scheme from an Authorization header value. A
/// value without the scheme is taken as the raw token.
pub fn bearer_token(header: &str) -> &str {
    header.strip_prefix("Bearer ").unwrap_or(header).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn validator() -> TokenValidator {
        TokenValidator::new("family-app", "securetoken.google.com")
    }

    fn token(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.signature", header, payload)
    }

    fn valid_claims() -> serde_json::Value {
        json!({
            "exp": NOW + 3600,
            "iss": "https://securetoken.google.com/family-app",
            "aud": "family-app",
            "sub": "uid-1",
            "email": "kid@example.com",
            "auth_time": NOW - 60,
        })
    }

    #[test]
    fn test_valid_token() {
        let claims = validator().validate(&token(valid_claims()), NOW).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("uid-1"));
        assert_eq!(claims.email.as_deref(), Some("kid@example.com"));
    }

    #[test]
    fn test_two_segments_is_invalid_format() {
        let err = validator().validate("header.payload", NOW).unwrap_err();
        assert_eq!(err, TokenError::InvalidFormat);
        assert_eq!(err.to_string(), "Invalid token format");
    }

    #[test]
    fn test_garbage_payload() {
        let err = validator().validate("a.!!!.c", NOW).unwrap_err();
        assert_eq!(err, TokenError::InvalidPayload);

        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("hello"));
        let err = validator().validate(&not_json, NOW).unwrap_err();
        assert_eq!(err, TokenError::InvalidPayload);
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(valid_claims().to_string());
        let padded = format!("h.{}.s", payload);
        assert!(validator().validate(&padded, NOW).is_ok());
    }

    #[test]
    fn test_expired_token() {
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW - 1);
        let err = validator().validate(&token(claims), NOW).unwrap_err();
        assert_eq!(err.to_string(), "Token expired");

        let mut claims = valid_claims();
        claims["exp"] = json!(NOW);
        let err = validator().validate(&token(claims), NOW).unwrap_err();
        assert_eq!(err, TokenError::Expired);
    }

    #[test]
    fn test_wrong_issuer() {
        let mut claims = valid_claims();
        claims["iss"] = json!("https://securetoken.google.com/other-app");
        let err = validator().validate(&token(claims), NOW).unwrap_err();
        assert_eq!(err.to_string(), "Invalid issuer");
    }

    #[test]
    fn test_wrong_audience() {
        let mut claims = valid_claims();
        claims["aud"] = json!("other-app");
        let err = validator().validate(&token(claims), NOW).unwrap_err();
        assert_eq!(err, TokenError::InvalidAudience);
    }

    #[test]
    fn test_missing_exp_is_invalid_payload() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("exp");
        let err = validator().validate(&token(claims), NOW).unwrap_err();
        assert_eq!(err, TokenError::InvalidPayload);
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), "abc.def.ghi");
        assert_eq!(bearer_token("abc.def.ghi"), "abc.def.ghi");
    }

    #[test]
    fn test_issuer() {
        assert_eq!(
            validator().issuer(),
            "https://securetoken.google.com/family-app"
        );
    }
}
