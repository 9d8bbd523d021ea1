// src/model.rs

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Represents the data structure of an OIDC provider's discovery document.
/// Found at the `.well-known/openid-configuration` endpoint.
///
/// Every field is untrusted raw text. Missing or `null` required fields
/// deserialize to an empty string so that validation can name them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderMetadata {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub issuer: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub authorization_endpoint: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub token_endpoint: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub userinfo_endpoint: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub jwks_uri: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Claims returned by a provider's user-info endpoint.
///
/// No schema is imposed; provider claim sets vary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UserAttributes(Map<String, Value>);

impl UserAttributes {
    /// Parses a user-info body. The top-level value must be a JSON object.
    pub fn from_slice(body: &[u8]) -> Result<Self, String> {
        match serde_json::from_slice::<Value>(body).map_err(|e| e.to_string())? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(format!("expected a JSON object, found {}", json_kind(&other))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns the claim only when it is a JSON string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for UserAttributes {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
