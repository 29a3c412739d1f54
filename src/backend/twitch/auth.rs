use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::error::{Result, TwitchError};

pub const DEFAULT_AUTH_BASE_URL: &str = "https://id.twitch.tv/oauth2";

/// Tokens are refreshed this many seconds before they actually expire
const REFRESH_MARGIN_SECS: i64 = 60;

/// Response from the token endpoint (device code exchange or refresh)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub token_type: String,
}

/// Response from the validate endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidateResponse {
    pub client_id: String,
    pub login: String,
    pub user_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Refresh the access token using a refresh token
///
/// Device code grants issue public-client tokens, so no client secret is sent.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    auth_base_url: &str,
    client_id: &str,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let params = [
        ("client_id", client_id),
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
    ];

    let response = http
        .post(format!("{}/token", auth_base_url))
        .form(&params)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(TwitchError::AuthError(format!(
            "Token refresh failed: HTTP {} - {}",
            status, error_text
        )));
    }

    let token_response = response.json::<TokenResponse>().await?;

    Ok(token_response)
}

/// Validate an access token and look up the user it belongs to
pub async fn validate_token(
    http: &reqwest::Client,
    auth_base_url: &str,
    access_token: &str,
) -> Result<ValidateResponse> {
    let response = http
        .get(format!("{}/validate", auth_base_url))
        .header("Authorization", format!("OAuth {}", access_token))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(TwitchError::AuthError(format!(
            "Token validation failed: HTTP {}",
            response.status()
        )));
    }

    Ok(response.json::<ValidateResponse>().await?)
}

#[derive(Clone)]
struct TokenState {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    scopes: Vec<String>,
}

impl TokenState {
    fn from_response(token: TokenResponse, now: DateTime<Utc>) -> Result<Self> {
        let expires_at = token
            .expires_in
            .map(|secs| {
                i64::try_from(secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        TwitchError::AuthError(format!("Token lifetime out of range: {}s", secs))
                    })
            })
            .transpose()?;

        Ok(Self {
            expires_at,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            scopes: token.scope,
        })
    }

    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|at| at - Duration::seconds(REFRESH_MARGIN_SECS) <= now)
            .unwrap_or(false)
    }
}

/// Credential handle produced by a successful login
///
/// Cloning is cheap; clones share the same token storage, so a refresh
/// through one handle is visible to all of them. Tokens live in memory only.
#[derive(Clone)]
pub struct AuthProvider {
    client_id: String,
    auth_base_url: String,
    login: String,
    user_id: String,
    http: reqwest::Client,
    tokens: Arc<RwLock<TokenState>>,
}

impl AuthProvider {
    /// Build a provider from a freshly issued token and its validation result
    pub fn from_token(
        client_id: impl Into<String>,
        auth_base_url: impl Into<String>,
        identity: ValidateResponse,
        token: TokenResponse,
    ) -> Result<Self> {
        let tokens = TokenState::from_response(token, Utc::now())?;
        Ok(Self {
            client_id: client_id.into(),
            auth_base_url: auth_base_url.into(),
            login: identity.login,
            user_id: identity.user_id,
            http: reqwest::Client::new(),
            tokens: Arc::new(RwLock::new(tokens)),
        })
    }

    /// A provider around a fixed token that never expires or refreshes
    pub fn with_static_token(
        client_id: impl Into<String>,
        login: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            login: login.into(),
            user_id: String::new(),
            http: reqwest::Client::new(),
            tokens: Arc::new(RwLock::new(TokenState {
                access_token: access_token.into(),
                refresh_token: None,
                expires_at: None,
                scopes: Vec::new(),
            })),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Login name of the authorized user, used as the IRC nickname
    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn scopes(&self) -> Vec<String> {
        self.tokens.read().await.scopes.clone()
    }

    /// Get a usable access token, refreshing it first when it is about to expire
    pub async fn access_token(&self) -> Result<String> {
        let state = self.tokens.read().await.clone();
        if !state.needs_refresh(Utc::now()) {
            return Ok(state.access_token);
        }

        let Some(refresh_token) = state.refresh_token else {
            log::warn!("Access token for {} expired and cannot be refreshed", self.login);
            return Ok(state.access_token);
        };

        log::info!("Refreshing access token for {}", self.login);
        let token = refresh_access_token(
            &self.http,
            &self.auth_base_url,
            &self.client_id,
            &refresh_token,
        )
        .await?;

        let mut refreshed = TokenState::from_response(token, Utc::now())?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token);
        }
        let access_token = refreshed.access_token.clone();
        *self.tokens.write().await = refreshed;

        Ok(access_token)
    }
}

impl fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthProvider")
            .field("client_id", &self.client_id)
            .field("login", &self.login)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn identity() -> ValidateResponse {
        ValidateResponse {
            client_id: "cid".to_string(),
            login: "botname".to_string(),
            user_id: "42".to_string(),
            scopes: vec!["chat:read".to_string()],
            expires_in: Some(3600),
        }
    }

    fn token(access: &str, expires_in: Option<u64>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_in,
            scope: vec!["chat:read".to_string()],
            token_type: "bearer".to_string(),
        }
    }

    #[test]
    fn test_needs_refresh_within_margin() {
        let now = Utc::now();
        let state = TokenState::from_response(token("a", Some(30)), now).unwrap();
        assert!(state.needs_refresh(now));

        let state = TokenState::from_response(token("a", Some(3600)), now).unwrap();
        assert!(!state.needs_refresh(now));

        let state = TokenState::from_response(token("a", None), now).unwrap();
        assert!(!state.needs_refresh(now));
    }

    #[test]
    fn test_absurd_token_lifetime_is_rejected() {
        let now = Utc::now();
        for secs in [u64::MAX, i64::MAX as u64] {
            match TokenState::from_response(token("a", Some(secs)), now) {
                Err(TwitchError::AuthError(msg)) => assert!(msg.contains("out of range")),
                other => panic!("expected AuthError, got {:?}", other.map(|s| s.expires_at)),
            }
        }

        let err = AuthProvider::from_token("cid", DEFAULT_AUTH_BASE_URL, identity(), token("a", Some(u64::MAX)));
        assert!(matches!(err, Err(TwitchError::AuthError(_))));
    }

    #[tokio::test]
    async fn test_static_token() {
        let provider = AuthProvider::with_static_token("cid", "botname", "tok");
        assert_eq!(provider.login(), "botname");
        assert_eq!(provider.access_token().await.unwrap(), "tok");
        assert!(!format!("{:?}", provider).contains("tok\""));
    }

    #[tokio::test]
    async fn test_access_token_refreshes_when_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "refresh_token": "refresh-2",
                "expires_in": 14000,
                "scope": ["chat:read"],
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider =
            AuthProvider::from_token("cid", server.uri(), identity(), token("stale", Some(0)))
                .unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "fresh");
        // second call uses the stored token without hitting the server again
        assert_eq!(provider.access_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_validate_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/validate"))
            .and(header("Authorization", "OAuth good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_id": "cid",
                "login": "botname",
                "scopes": ["chat:read", "chat:edit"],
                "user_id": "42",
                "expires_in": 5000
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/validate"))
            .and(header("Authorization", "OAuth bad"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let valid = validate_token(&http, &server.uri(), "good").await.unwrap();
        assert_eq!(valid.login, "botname");
        assert_eq!(valid.scopes.len(), 2);

        let err = validate_token(&http, &server.uri(), "bad").await.unwrap_err();
        assert!(matches!(err, TwitchError::AuthError(_)));
    }
}
