//! Bearer-token verification.
//!
//! Tokens are HMAC-signed JWTs verified against the configured symmetric
//! secret. Verification yields the raw payload object; the handlers turn it
//! into the per-request claim context that the executor binds as session
//! variables.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use sha2::{Sha256, Sha384, Sha512};

use restgate_common::{GatewayError, RequestContext, Result};

use crate::config::GatewayConfig;

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JwtAlgorithm {
    /// HMAC-SHA256
    #[default]
    HS256,
    /// HMAC-SHA384
    HS384,
    /// HMAC-SHA512
    HS512,
}

impl JwtAlgorithm {
    fn as_str(&self) -> &'static str {
        match self {
            JwtAlgorithm::HS256 => "HS256",
            JwtAlgorithm::HS384 => "HS384",
            JwtAlgorithm::HS512 => "HS512",
        }
    }
}

/// Verifies (and, for tests and tooling, signs) HMAC JWTs.
#[derive(Debug, Clone)]
pub struct JwtVerifier {
    secret: Vec<u8>,
    algorithm: JwtAlgorithm,
}

impl JwtVerifier {
    /// A verifier with the default HS256 algorithm.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            algorithm: JwtAlgorithm::HS256,
        }
    }

    /// Set the algorithm.
    pub fn algorithm(mut self, algorithm: JwtAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Signs a payload object into a compact JWT.
    pub fn sign(&self, payload: &JsonMap<String, JsonValue>) -> String {
        let header = serde_json::json!({
            "alg": self.algorithm.as_str(),
            "typ": "JWT",
        });
        let header = URL_SAFE_NO_PAD.encode(header.to_string());
        let payload = URL_SAFE_NO_PAD.encode(JsonValue::Object(payload.clone()).to_string());
        let message = format!("{}.{}", header, payload);
        let signature = self.sign_message(&message);
        format!("{}.{}", message, signature)
    }

    /// Verifies a compact JWT and returns its payload object.
    ///
    /// Checks, in order: structure, header algorithm, signature (constant
    /// time), `exp`, and `nbf`.
    pub fn verify(&self, token: &str) -> Result<JsonMap<String, JsonValue>> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(GatewayError::AuthInvalid("malformed token".to_string()));
        }

        let header = decode_json_segment(parts[0])?;
        match header.get("alg").and_then(JsonValue::as_str) {
            Some(alg) if alg == self.algorithm.as_str() => {}
            _ => {
                return Err(GatewayError::AuthInvalid(
                    "unexpected signing algorithm".to_string(),
                ))
            }
        }

        let message = format!("{}.{}", parts[0], parts[1]);
        let expected = self.sign_message(&message);
        if !constant_time_compare(&expected, parts[2]) {
            return Err(GatewayError::AuthInvalid("signature mismatch".to_string()));
        }

        let payload = decode_json_segment(parts[1])?;

        let now = unix_now();
        if let Some(exp) = payload.get("exp").and_then(JsonValue::as_u64) {
            if exp < now {
                return Err(GatewayError::AuthInvalid("token expired".to_string()));
            }
        }
        if let Some(nbf) = payload.get("nbf").and_then(JsonValue::as_u64) {
            if nbf > now {
                return Err(GatewayError::AuthInvalid("token not yet valid".to_string()));
            }
        }

        Ok(payload)
    }

    fn sign_message(&self, message: &str) -> String {
        macro_rules! hmac_sign {
            ($hash:ty) => {{
                let mut mac = Hmac::<$hash>::new_from_slice(&self.secret)
                    .expect("HMAC can take key of any size");
                mac.update(message.as_bytes());
                URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
            }};
        }

        match self.algorithm {
            JwtAlgorithm::HS256 => hmac_sign!(Sha256),
            JwtAlgorithm::HS384 => hmac_sign!(Sha384),
            JwtAlgorithm::HS512 => hmac_sign!(Sha512),
        }
    }
}

fn decode_json_segment(segment: &str) -> Result<JsonMap<String, JsonValue>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| GatewayError::AuthInvalid("invalid base64 segment".to_string()))?;
    let value: JsonValue = serde_json::from_slice(&bytes)
        .map_err(|_| GatewayError::AuthInvalid("invalid token JSON".to_string()))?;
    match value {
        JsonValue::Object(map) => Ok(map),
        _ => Err(GatewayError::AuthInvalid(
            "token segment is not an object".to_string(),
        )),
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extracts the bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Builds the per-request claim context from the Authorization header.
///
/// Anonymous requests pass with `None` unless `jwt_required` is set; an
/// unverifiable token is always rejected.
pub fn request_context(
    config: &GatewayConfig,
    headers: &HeaderMap,
) -> Result<Option<RequestContext>> {
    match bearer_token(headers) {
        None => {
            if config.jwt_required {
                Err(GatewayError::AuthMissing)
            } else {
                Ok(None)
            }
        }
        Some(token) => {
            let secret = match &config.jwt_secret {
                Some(secret) => secret,
                None => {
                    // without a key the token cannot be verified; a gateway
                    // that demands tokens but has no key rejects everything
                    return if config.jwt_required {
                        Err(GatewayError::AuthInvalid(
                            "no verification key configured".to_string(),
                        ))
                    } else {
                        Ok(None)
                    };
                }
            };
            let payload = JwtVerifier::new(secret).verify(&token)?;
            Ok(Some(RequestContext::from_payload(&payload)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(claims: JsonValue) -> JsonMap<String, JsonValue> {
        claims.as_object().unwrap().clone()
    }

    fn fresh_payload() -> JsonMap<String, JsonValue> {
        payload(json!({
            "sub": "42",
            "role": "WRITE_TABLE",
            "exp": unix_now() + 3600,
        }))
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let verifier = JwtVerifier::new("secret");
        let token = verifier.sign(&fresh_payload());
        let decoded = verifier.verify(&token).unwrap();
        assert_eq!(decoded.get("role"), Some(&json!("WRITE_TABLE")));
    }

    #[test]
    fn test_round_trip_hs512() {
        let verifier = JwtVerifier::new("secret").algorithm(JwtAlgorithm::HS512);
        let token = verifier.sign(&fresh_payload());
        assert!(verifier.verify(&token).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtVerifier::new("secret").sign(&fresh_payload());
        assert!(JwtVerifier::new("other").verify(&token).is_err());
    }

    #[test]
    fn test_algorithm_mismatch_rejected() {
        let token = JwtVerifier::new("secret")
            .algorithm(JwtAlgorithm::HS384)
            .sign(&fresh_payload());
        assert!(JwtVerifier::new("secret").verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = JwtVerifier::new("secret");
        let token = verifier.sign(&payload(json!({"sub": "42", "exp": 1})));
        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, GatewayError::AuthInvalid(_)));
    }

    #[test]
    fn test_not_yet_valid_rejected() {
        let verifier = JwtVerifier::new("secret");
        let token = verifier.sign(&payload(json!({"sub": "42", "nbf": unix_now() + 600})));
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_malformed_token_rejected() {
        let verifier = JwtVerifier::new("secret");
        assert!(verifier.verify("nonsense").is_err());
        assert!(verifier.verify("a.b").is_err());
        assert!(verifier.verify("a.b.c.d").is_err());
    }

    #[test]
    fn test_bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, "Basic dXNlcg==".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_request_context_anonymous() {
        let config = GatewayConfig::default();
        let ctx = request_context(&config, &HeaderMap::new()).unwrap();
        assert!(ctx.is_none());
    }

    #[test]
    fn test_request_context_required_missing() {
        let config = GatewayConfig {
            jwt_required: true,
            jwt_secret: Some("secret".to_string()),
            ..Default::default()
        };
        let err = request_context(&config, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::AuthMissing));
    }

    #[test]
    fn test_request_context_with_token() {
        let config = GatewayConfig {
            jwt_secret: Some("secret".to_string()),
            ..Default::default()
        };
        let token = JwtVerifier::new("secret").sign(&fresh_payload());
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        let ctx = request_context(&config, &headers).unwrap().unwrap();
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn test_request_context_invalid_token() {
        let config = GatewayConfig {
            jwt_secret: Some("secret".to_string()),
            ..Default::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            "Bearer invalid.token.here".parse().unwrap(),
        );
        assert!(request_context(&config, &headers).is_err());
    }
}
