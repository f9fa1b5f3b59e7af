use serde::{Deserialize, Serialize};
use std::fmt;

/// Organization-scoped ticketing API credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub auth_token: String,
    pub api_key: String,
}

// Keep tokens out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_token", &"<redacted>")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Per-property ticket board settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyIntegration {
    pub property_id: String,
    pub organization_id: String,
    #[serde(default)]
    pub board_id: Option<String>,
    #[serde(default)]
    pub open_list: Option<String>,
    /// List a card moves to when its item is closed.
    #[serde(default)]
    pub closed_list: Option<String>,
}

/// Author identity used for comment interpolation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}
