//! OAuth Device Code Grant Flow for Twitch
//!
//! 1. Request a device code from `/device`
//! 2. User visits the verification URI and enters the user code
//! 3. Poll `/token` until the user completes (or refuses) authorization
//! 4. Validate the token to learn the login name of the authorized account

use serde::Deserialize;
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

use super::auth::{validate_token, AuthProvider, TokenResponse, DEFAULT_AUTH_BASE_URL};
use super::error::{Result, TwitchError};
use crate::backend::config::TwitchSettings;

const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Scopes needed to read and send chat messages
pub const DEFAULT_SCOPES: &[&str] = &["chat:read", "chat:edit"];

/// Response from the device code endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
}

/// Error body returned by the token endpoint while polling
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    message: String,
}

/// Outcome of a single poll of the token endpoint
#[derive(Debug)]
pub enum PollResult {
    Pending,
    SlowDown,
    Complete(TokenResponse),
}

/// Callback invoked with the code the user has to enter
pub type DevicePrompt = Arc<dyn Fn(&DeviceCodeResponse) + Send + Sync>;

#[derive(Clone)]
pub struct DeviceCodeGrantFlow {
    http: reqwest::Client,
    client_id: String,
    scopes: Vec<String>,
    auth_base_url: String,
    prompt: Option<DevicePrompt>,
}

impl DeviceCodeGrantFlow {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            prompt: None,
        }
    }

    pub fn from_settings(settings: &TwitchSettings) -> Self {
        Self::new(settings.client_id.clone())
            .with_scopes(settings.scopes.clone())
            .with_auth_base_url(settings.auth_base_url.clone())
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_auth_base_url(mut self, url: impl Into<String>) -> Self {
        self.auth_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_prompt<F>(mut self, prompt: F) -> Self
    where
        F: Fn(&DeviceCodeResponse) + Send + Sync + 'static,
    {
        self.prompt = Some(Arc::new(prompt));
        self
    }

    /// Run the whole flow and return a credential handle
    ///
    /// Blocks until the user authorizes the device, refuses, or the code expires.
    pub async fn login(&self) -> Result<AuthProvider> {
        if self.client_id.is_empty() {
            return Err(TwitchError::ConfigError(
                "Twitch client_id is not configured".to_string(),
            ));
        }

        let pending = self.request_device_code().await?;
        self.present(&pending);

        let token = self.poll_until_complete(&pending).await?;
        let identity = validate_token(&self.http, &self.auth_base_url, &token.access_token).await?;

        log::info!("Logged in to Twitch as {}", identity.login);
        AuthProvider::from_token(
            self.client_id.clone(),
            self.auth_base_url.clone(),
            identity,
            token,
        )
    }

    /// Request a new device code
    pub async fn request_device_code(&self) -> Result<DeviceCodeResponse> {
        let scopes = self.scopes.join(" ");
        let params = [("client_id", self.client_id.as_str()), ("scopes", scopes.as_str())];

        let response = self
            .http
            .post(format!("{}/device", self.auth_base_url))
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
                "Device code request failed: HTTP {} - {}",
                status, error_text
            )));
        }

        Ok(response.json::<DeviceCodeResponse>().await?)
    }

    /// Poll the token endpoint once
    pub async fn poll_once(&self, device_code: &str) -> Result<PollResult> {
        let scopes = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("scopes", scopes.as_str()),
            ("device_code", device_code),
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
        ];

        let response = self
            .http
            .post(format!("{}/token", self.auth_base_url))
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(PollResult::Complete(response.json::<TokenResponse>().await?));
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<OAuthErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);

        match message.as_str() {
            "authorization_pending" => Ok(PollResult::Pending),
            "slow_down" => Ok(PollResult::SlowDown),
            "access_denied" => Err(TwitchError::AuthError(
                "User denied the authorization request".to_string(),
            )),
            "expired_token" | "invalid device code" => Err(TwitchError::AuthError(
                "Device code expired".to_string(),
            )),
            _ => Err(TwitchError::AuthError(format!(
                "Token request failed: HTTP {} - {}",
                status, message
            ))),
        }
    }

    async fn poll_until_complete(&self, pending: &DeviceCodeResponse) -> Result<TokenResponse> {
        let deadline = Instant::now()
            .checked_add(Duration::from_secs(pending.expires_in))
            .ok_or_else(|| {
                TwitchError::AuthError(format!(
                    "Device code lifetime out of range: {}s",
                    pending.expires_in
                ))
            })?;
        let mut interval = Duration::from_secs(pending.interval);

        loop {
            sleep(interval).await;
            if Instant::now() >= deadline {
                return Err(TwitchError::AuthError("Device code expired".to_string()));
            }

            match self.poll_once(&pending.device_code).await? {
                PollResult::Complete(token) => return Ok(token),
                PollResult::Pending => {}
                PollResult::SlowDown => {
                    interval = interval.saturating_add(SLOW_DOWN_STEP);
                    log::debug!("Token endpoint asked to slow down, polling every {:?}", interval);
                }
            }
        }
    }

    fn present(&self, pending: &DeviceCodeResponse) {
        log::info!(
            "To authorize, visit {} and enter the code {}",
            pending.verification_uri,
            pending.user_code
        );
        if let Some(prompt) = &self.prompt {
            prompt(pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_device(server: &MockServer, interval: u64, expires_in: u64) {
        Mock::given(method("POST"))
            .and(path("/device"))
            .and(body_string_contains("client_id=cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "device_code": "dev-123",
                "user_code": "ABCDEFGH",
                "verification_uri": "https://www.twitch.tv/activate?device-code=ABCDEFGH",
                "expires_in": expires_in,
                "interval": interval
            })))
            .mount(server)
            .await;
    }

    async fn mount_validate(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_id": "cid",
                "login": "botname",
                "scopes": ["chat:read", "chat:edit"],
                "user_id": "42",
                "expires_in": 14000
            })))
            .mount(server)
            .await;
    }

    fn token_body() -> serde_json::Value {
        serde_json::json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_in": 14000,
            "scope": ["chat:read", "chat:edit"],
            "token_type": "bearer"
        })
    }

    fn flow(server: &MockServer) -> DeviceCodeGrantFlow {
        DeviceCodeGrantFlow::new("cid").with_auth_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_login_after_pending() {
        let server = MockServer::start().await;
        mount_device(&server, 0, 60).await;
        mount_validate(&server).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "status": 400,
                "message": "authorization_pending"
            })))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("device_code=dev-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .mount(&server)
            .await;

        let seen = Arc::new(Mutex::new(None));
        let seen_in_prompt = seen.clone();
        let provider = flow(&server)
            .with_prompt(move |pending| {
                *seen_in_prompt.lock().unwrap() = Some(pending.user_code.clone());
            })
            .login()
            .await
            .unwrap();

        assert_eq!(provider.login(), "botname");
        assert_eq!(provider.access_token().await.unwrap(), "access-1");
        assert_eq!(seen.lock().unwrap().as_deref(), Some("ABCDEFGH"));
    }

    #[tokio::test]
    async fn test_login_denied() {
        let server = MockServer::start().await;
        mount_device(&server, 0, 60).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "status": 400,
                "message": "access_denied"
            })))
            .mount(&server)
            .await;

        let err = flow(&server).login().await.unwrap_err();
        assert!(matches!(err, TwitchError::AuthError(_)));
    }

    #[tokio::test]
    async fn test_login_expires_locally() {
        let server = MockServer::start().await;
        mount_device(&server, 0, 0).await;

        let err = flow(&server).login().await.unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn test_login_rejects_absurd_lifetime() {
        let server = MockServer::start().await;
        mount_device(&server, 0, u64::MAX).await;

        match flow(&server).login().await {
            Err(TwitchError::AuthError(msg)) => assert!(msg.contains("out of range")),
            other => panic!("expected AuthError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_once_slow_down() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "status": 400,
                "message": "slow_down"
            })))
            .mount(&server)
            .await;

        let result = flow(&server).poll_once("dev-123").await.unwrap();
        assert!(matches!(result, PollResult::SlowDown));
    }

    #[tokio::test]
    async fn test_login_without_client_id() {
        let err = DeviceCodeGrantFlow::new("").login().await.unwrap_err();
        assert!(matches!(err, TwitchError::ConfigError(_)));
    }
}
