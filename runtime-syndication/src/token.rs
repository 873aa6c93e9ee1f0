//! JWT payload shapes shared by refresh and access tokens: `{username, client, iat, exp?}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub username: String,
    pub client: String,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Access tokens always expire sixty seconds after issuance.
pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 60;
