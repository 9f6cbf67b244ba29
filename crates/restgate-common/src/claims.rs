//! Bearer-token claim values and the per-request claim context.
//!
//! Token claims are heterogeneous, so they are modeled as a map from claim
//! name to a small sum type. Object and array claims are carried as JSON and
//! serialized to text before being bound as session variables.

use serde_json::Value as JsonValue;

/// A single claim value extracted from a verified bearer token.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    /// JSON null
    Null,
    /// Boolean claim
    Bool(bool),
    /// Integer claim
    Int(i64),
    /// Floating-point claim
    Float(f64),
    /// String claim
    String(String),
    /// Object or array claim, kept as JSON
    Json(JsonValue),
}

impl ClaimValue {
    /// Returns the value in the form it is bound as a session variable:
    /// scalars stay scalars, JSON claims become their serialized text.
    pub fn to_bind_value(&self) -> JsonValue {
        match self {
            ClaimValue::Null => JsonValue::Null,
            ClaimValue::Bool(v) => JsonValue::Bool(*v),
            ClaimValue::Int(v) => JsonValue::from(*v),
            ClaimValue::Float(v) => JsonValue::from(*v),
            ClaimValue::String(v) => JsonValue::String(v.clone()),
            ClaimValue::Json(v) => JsonValue::String(v.to_string()),
        }
    }
}

impl From<JsonValue> for ClaimValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => ClaimValue::Null,
            JsonValue::Bool(v) => ClaimValue::Bool(v),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ClaimValue::Int(i)
                } else {
                    ClaimValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(v) => ClaimValue::String(v),
            other => ClaimValue::Json(other),
        }
    }
}

/// The claim map derived from a verified bearer token.
///
/// Immutable within a request; absent when the request is anonymous.
/// Iteration order follows the decoded payload map, which keeps the `SET`
/// statement deterministic for a given token.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    claims: Vec<(String, ClaimValue)>,
}

impl RequestContext {
    /// Builds a context from a decoded token payload.
    pub fn from_payload(payload: &serde_json::Map<String, JsonValue>) -> Self {
        let claims = payload
            .iter()
            .map(|(name, value)| (name.clone(), ClaimValue::from(value.clone())))
            .collect();
        Self { claims }
    }

    /// Number of claims carried by this context.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// True when the token carried no claims.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Iterates claims in decoded order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, ClaimValue)> {
        self.claims.iter()
    }

    /// Looks up a claim by name.
    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.claims
            .iter()
            .find(|(claim, _)| claim == name)
            .map(|(_, value)| value)
    }
}

/// Sanitizes a claim name for use in a session variable name.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`.
pub fn sanitize_claim_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claim_value_from_scalars() {
        assert_eq!(ClaimValue::from(json!(null)), ClaimValue::Null);
        assert_eq!(ClaimValue::from(json!(true)), ClaimValue::Bool(true));
        assert_eq!(ClaimValue::from(json!(42)), ClaimValue::Int(42));
        assert_eq!(ClaimValue::from(json!(1.5)), ClaimValue::Float(1.5));
        assert_eq!(
            ClaimValue::from(json!("admin")),
            ClaimValue::String("admin".to_string())
        );
    }

    #[test]
    fn test_claim_value_from_compound() {
        let value = ClaimValue::from(json!({"roles": ["a", "b"]}));
        assert!(matches!(value, ClaimValue::Json(_)));
    }

    #[test]
    fn test_compound_claims_bind_as_text() {
        let value = ClaimValue::from(json!(["a", "b"]));
        assert_eq!(value.to_bind_value(), json!("[\"a\",\"b\"]"));
    }

    #[test]
    fn test_scalar_claims_bind_as_scalars() {
        assert_eq!(ClaimValue::Int(7).to_bind_value(), json!(7));
        assert_eq!(
            ClaimValue::String("x".to_string()).to_bind_value(),
            json!("x")
        );
    }

    #[test]
    fn test_context_preserves_order() {
        let payload = serde_json::from_str::<serde_json::Map<String, JsonValue>>(
            r#"{"sub": "1", "role": "WRITE_TABLE", "exp": 99}"#,
        )
        .unwrap();
        let ctx = RequestContext::from_payload(&payload);
        assert_eq!(ctx.len(), 3);
        assert_eq!(
            ctx.get("role"),
            Some(&ClaimValue::String("WRITE_TABLE".to_string()))
        );
    }

    #[test]
    fn test_sanitize_claim_name() {
        assert_eq!(sanitize_claim_name("role"), "role");
        assert_eq!(sanitize_claim_name("my-claim.v2"), "my_claim_v2");
        assert_eq!(sanitize_claim_name("https://claims/role"), "https___claims_role");
    }
}
