//! Graph token client
//!
//! Resource-owner-password token acquisition against the Microsoft identity
//! authority. One POST, one token; no cache or refresh, since a token easily
//! outlives a run.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use super::types::{AccessToken, TokenResponse, UploadError};
use crate::safe_truncate;

/// Client for the identity authority's token endpoint
pub struct TokenClient {
    client: Client,
    authority: String,
    client_id: String,
}

impl TokenClient {
    /// Create a new token client
    pub fn new(authority: &str, client_id: &str) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| UploadError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            authority: authority.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        })
    }

    /// Acquire an access token with the resource-owner-password grant
    pub async fn acquire(
        &self,
        username: &str,
        password: &str,
        scope: &str,
    ) -> Result<AccessToken, UploadError> {
        let url = format!("{}/oauth2/v2.0/token", self.authority);
        info!("Requesting access token for {}", username);

        let form = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "password"),
            ("scope", scope),
            ("username", username),
            ("password", password),
        ];

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| UploadError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UploadError::NetworkError(e.to_string()))?;

        let body: TokenResponse = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(_) => {
                return Err(UploadError::TokenRequest(format!(
                    "HTTP {}: {}",
                    status,
                    safe_truncate(&text, 200)
                )));
            }
        };

        if !status.is_success() {
            let reason = body
                .error_description
                .or(body.error)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(UploadError::TokenRequest(reason));
        }

        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(UploadError::TokenMissing)?;

        debug!(
            "Token acquired (type: {}, expires_in: {:?})",
            body.token_type.as_deref().unwrap_or("Bearer"),
            body.expires_in
        );

        Ok(AccessToken::new(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_acquire_parses_access_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("client_id=app-123"))
            .and(body_string_contains("username=user%40example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "tok-abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TokenClient::new(&server.uri(), "app-123").unwrap();
        let token = client
            .acquire("user@example.com", "hunter2", "user.read")
            .await
            .unwrap();

        assert_eq!(token.as_str(), "tok-abc");
    }

    #[tokio::test]
    async fn test_acquire_surfaces_authority_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "AADSTS50126: invalid username or password"
            })))
            .mount(&server)
            .await;

        let client = TokenClient::new(&server.uri(), "app-123").unwrap();
        let err = client
            .acquire("user@example.com", "wrong", "user.read")
            .await
            .unwrap_err();

        match err {
            UploadError::TokenRequest(reason) => assert!(reason.contains("AADSTS50126")),
            other => panic!("expected TokenRequest, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_acquire_rejects_missing_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let client = TokenClient::new(&server.uri(), "app-123").unwrap();
        let err = client
            .acquire("user@example.com", "hunter2", "user.read")
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::TokenMissing));
    }
}
