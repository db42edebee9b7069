//! Wire conventions for tokens, which differ between deployments.
//!
//! Some servers expect the access token in the `Authorization` header,
//! others as a query parameter, some both. Token responses also disagree on
//! field names (`token` vs `accessToken`) and on whether they are nested.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::ApiError;

use super::session::Credential;

/// Where the access token travels on outgoing requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TokenPlacement {
    #[default]
    Header,
    Query { param: String },
    Both { param: String },
}

impl TokenPlacement {
    pub fn uses_header(&self) -> bool {
        matches!(self, TokenPlacement::Header | TokenPlacement::Both { .. })
    }

    pub fn query_param(&self) -> Option<&str> {
        match self {
            TokenPlacement::Header => None,
            TokenPlacement::Query { param } | TokenPlacement::Both { param } => Some(param.as_str()),
        }
    }

    /// Parse `header`, `query` or `both`; query modes use `param`.
    pub fn from_mode(mode: &str, param: &str) -> Option<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "header" => Some(TokenPlacement::Header),
            "query" => Some(TokenPlacement::Query {
                param: param.to_string(),
            }),
            "both" => Some(TokenPlacement::Both {
                param: param.to_string(),
            }),
            _ => None,
        }
    }
}

/// Field names used by the login and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenFormat {
    /// Key of a nested object holding the token fields, if any.
    pub envelope: Option<String>,
    pub access_token_field: String,
    pub refresh_token_field: String,
    pub expires_field: String,
    /// Name of the field carrying the refresh token in the refresh request.
    /// The user-management backend reads it from `token`.
    pub request_field: String,
}

impl Default for TokenFormat {
    fn default() -> Self {
        Self {
            envelope: None,
            access_token_field: "token".to_string(),
            refresh_token_field: "refreshToken".to_string(),
            expires_field: "expirationToken".to_string(),
            request_field: "refreshToken".to_string(),
        }
    }
}

impl TokenFormat {
    /// `accessToken` / `refreshToken` / `expiresAt` naming.
    pub fn access_token_style() -> Self {
        Self {
            access_token_field: "accessToken".to_string(),
            expires_field: "expiresAt".to_string(),
            ..Self::default()
        }
    }

    /// Body of the refresh request.
    pub fn refresh_request(&self, refresh_token: &str) -> Value {
        let mut body = serde_json::Map::new();
        body.insert(self.request_field.clone(), json!(refresh_token));
        Value::Object(body)
    }

    /// Build a credential from a token response body.
    ///
    /// A non-empty `error` field or a missing access token is a failure. A
    /// response without a refresh token keeps `previous_refresh`.
    pub fn parse_credential(
        &self,
        body: &str,
        previous_refresh: Option<&str>,
    ) -> Result<Credential, ApiError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse token response: {}", e)))?;

        if let Some(error) = value.get("error").and_then(Value::as_str) {
            if !error.trim().is_empty() {
                let status = value
                    .get("status")
                    .or_else(|| value.get("statusCode"))
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok())
                    .unwrap_or(500);
                return Err(ApiError::from_status_message(status, error.to_string()));
            }
        }

        let fields = match &self.envelope {
            Some(key) => value.get(key).ok_or_else(|| {
                ApiError::InvalidResponse(format!("Token response has no '{}' object", key))
            })?,
            None => &value,
        };

        let access_token = string_field(fields, &self.access_token_field)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ApiError::InvalidResponse(format!(
                    "Token response has no '{}' field",
                    self.access_token_field
                ))
            })?;
        let refresh_token = string_field(fields, &self.refresh_token_field)
            .filter(|t| !t.is_empty())
            .or_else(|| previous_refresh.map(str::to_string))
            .unwrap_or_default();
        let expires_at = string_field(fields, &self.expires_field).unwrap_or_default();

        Ok(Credential::new(access_token, refresh_token, expires_at))
    }
}

/// String or number field rendered as a string.
fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
