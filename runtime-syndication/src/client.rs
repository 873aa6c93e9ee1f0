//! The syndication client catalog and token exchange.
//!
//! Two long-lived secrets gate the whole service: a refresh secret signs the long-lived
//! client credential, and a distinct access secret signs short-lived (~60s) access
//! tokens exchanged against it. Holders of the bypass capability skip verification
//! entirely, which is how privileged internal callers reach syndication content
//! endpoints without minting a token of their own.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use runtime_core::RuntimeError;
use runtime_store::document::{DocumentStore, StoreObject};
use serde_json::json;

use crate::token::{TokenClaims, ACCESS_TOKEN_TTL_SECONDS};

const CLASS_NAME: &str = "SyndicationClient";

/// `{objectId, user-ref, clientName, refreshToken}`. Rows are keyed in the document
/// store by the refresh token itself, since that's the only value `Client.token`
/// has to look the row up by.
#[derive(Debug, Clone)]
pub struct SyndicationClient {
    pub object_id: String,
    pub user_ref: String,
    pub client_name: String,
    pub refresh_token: String,
}

impl SyndicationClient {
    fn from_row(data: &serde_json::Value) -> Option<Self> {
        Some(Self {
            object_id: data.get("objectId")?.as_str()?.to_string(),
            user_ref: data.get("userRef")?.as_str()?.to_string(),
            client_name: data.get("clientName")?.as_str()?.to_string(),
            refresh_token: data.get("refreshToken")?.as_str()?.to_string(),
        })
    }
}

/// Issues and verifies syndication tokens. Holds the two signing secrets; registered
/// clients are persisted through the same document store as everything else.
pub struct Client {
    refresh_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
    access_key: EncodingKey,
    access_decoding_key: DecodingKey,
    store: Arc<dyn DocumentStore>,
}

impl Client {
    pub fn new(refresh_secret: &str, access_secret: &str, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            refresh_key: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding_key: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_key: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding_key: DecodingKey::from_secret(access_secret.as_bytes()),
            store,
        }
    }

    /// Issues a refresh token for `client_name`/`user` and persists the resulting
    /// [`SyndicationClient`] row, keyed by the refresh token.
    pub async fn create(&self, client_name: &str, user: &str) -> Result<SyndicationClient, RuntimeError> {
        let claims = TokenClaims {
            username: user.to_string(),
            client: client_name.to_string(),
            iat: Utc::now().timestamp(),
            exp: None,
        };
        let refresh_token = encode(&Header::default(), &claims, &self.refresh_key)
            .map_err(|e| RuntimeError::TokenInvalid(e.to_string()))?;

        let object_id = uuid::Uuid::new_v4().to_string();
        let object = StoreObject {
            class_name: CLASS_NAME.to_string(),
            id: Some(refresh_token.clone()),
            data: json!({
                "objectId": object_id,
                "userRef": user,
                "clientName": client_name,
                "refreshToken": refresh_token,
            }),
        };
        let saved = self
            .store
            .persist(&object)
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))?;
        SyndicationClient::from_row(&saved.data)
            .ok_or_else(|| RuntimeError::Store("malformed SyndicationClient row".to_string()))
    }

    /// Verifies `refresh_token` against the refresh secret, confirms the matching row is
    /// registered, and issues a short-lived access token signed with the access secret.
    pub async fn token(&self, refresh_token: &str) -> Result<String, RuntimeError> {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        let decoded = decode::<TokenClaims>(refresh_token, &self.refresh_decoding_key, &validation)
            .map_err(|e| RuntimeError::TokenInvalid(e.to_string()))?;

        let row = self
            .store
            .find(CLASS_NAME, refresh_token)
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))?;
        if row.is_none() {
            return Err(RuntimeError::TokenInvalid("refresh token is not registered".to_string()));
        }

        let now = Utc::now().timestamp();
        let access_claims = TokenClaims {
            username: decoded.claims.username,
            client: decoded.claims.client,
            iat: now,
            exp: Some(now + ACCESS_TOKEN_TTL_SECONDS),
        };
        encode(&Header::default(), &access_claims, &self.access_key).map_err(|e| RuntimeError::TokenInvalid(e.to_string()))
    }

    /// Decodes and validates `access_token`, returning its claims. `bypass` short-circuits
    /// verification entirely for callers holding the privileged capability.
    pub fn verify(&self, access_token: &str, bypass: bool) -> Option<TokenClaims> {
        if bypass {
            return Some(TokenClaims {
                username: "bypass".to_string(),
                client: "bypass".to_string(),
                iat: Utc::now().timestamp(),
                exp: None,
            });
        }

        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 0;
        decode::<TokenClaims>(access_token, &self.access_decoding_key, &validation)
            .ok()
            .map(|d| d.claims)
    }

    pub async fn get_by_refresh_token(&self, refresh_token: &str) -> Option<SyndicationClient> {
        let data = self.store.find(CLASS_NAME, refresh_token).await.ok().flatten()?;
        SyndicationClient::from_row(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_store::document::InMemoryStore;

    fn client() -> Client {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::default());
        Client::new("refresh-secret", "access-secret", store)
    }

    #[tokio::test]
    async fn create_then_exchange_then_verify_round_trip() {
        let client = client();
        let registration = client.create("my-app", "alice").await.unwrap();
        let access_token = client.token(&registration.refresh_token).await.unwrap();

        let claims = client.verify(&access_token, false);
        assert!(claims.is_some());
        assert_eq!(claims.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn access_token_expires_sixty_seconds_after_issuance() {
        let client = client();
        let registration = client.create("my-app", "alice").await.unwrap();
        let access_token = client.token(&registration.refresh_token).await.unwrap();

        let mut validation = Validation::default();
        validation.validate_exp = false;
        let decoded = decode::<TokenClaims>(&access_token, &client.access_decoding_key, &validation).unwrap();
        assert_eq!(decoded.claims.exp, Some(decoded.claims.iat + ACCESS_TOKEN_TTL_SECONDS));
    }

    #[tokio::test]
    async fn token_rejects_an_unregistered_refresh_token() {
        let forged_refresh_client = client();
        let client = client();
        let forged = forged_refresh_client.create("other-app", "mallory").await.unwrap();
        // Forged token is signed with the right secret but never registered against `client`.
        assert!(client.token(&forged.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn bypass_capability_skips_verification() {
        let client = client();
        assert!(client.verify("not-even-a-jwt", true).is_some());
        assert!(client.verify("not-even-a-jwt", false).is_none());
    }

    #[tokio::test]
    async fn verify_rejects_a_token_once_its_exp_has_passed() {
        let client = client();
        let now = Utc::now().timestamp();
        let expired_claims = TokenClaims {
            username: "alice".to_string(),
            client: "my-app".to_string(),
            iat: now - ACCESS_TOKEN_TTL_SECONDS - 5,
            exp: Some(now - 1),
        };
        let expired_token = encode(&Header::default(), &expired_claims, &client.access_key).unwrap();

        assert!(client.verify(&expired_token, false).is_none());
    }

    #[tokio::test]
    async fn get_by_refresh_token_returns_the_persisted_row() {
        let client = client();
        let registration = client.create("my-app", "alice").await.unwrap();
        let fetched = client.get_by_refresh_token(&registration.refresh_token).await;
        assert_eq!(fetched.unwrap().user_ref, "alice");
    }
}
