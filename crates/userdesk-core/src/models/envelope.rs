use serde::Deserialize;

use crate::api::error::GENERIC_ERROR_MESSAGE;
use crate::api::ApiError;

use super::User;

/// Response wrapper used by every endpoint.
///
/// The server reports many failures with HTTP 200 and a non-2xx `status`
/// or a non-empty `error` inside the body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope {
    #[serde(default, alias = "statusCode")]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub our_users: Option<User>,
    #[serde(default)]
    pub our_users_list: Option<Vec<User>>,
}

impl ApiEnvelope {
    /// Fail if the body itself reports an error.
    pub fn into_result(self) -> Result<Self, ApiError> {
        let error = self.error.as_deref().map(str::trim).filter(|e| !e.is_empty());
        let failed_status = self.status.filter(|s| !(200..300).contains(s));

        if error.is_none() && failed_status.is_none() {
            return Ok(self);
        }

        let message = error
            .map(str::to_string)
            .or_else(|| self.message.clone().filter(|m| !m.trim().is_empty()))
            .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());
        Err(ApiError::from_status_message(failed_status.unwrap_or(500), message))
    }

    pub fn user(self) -> Result<User, ApiError> {
        self.our_users
            .ok_or_else(|| ApiError::InvalidResponse("Response has no user".to_string()))
    }

    /// The server omits the list when there are no users.
    pub fn users(self) -> Vec<User> {
        self.our_users_list.unwrap_or_default()
    }
}
