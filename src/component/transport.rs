use async_trait::async_trait;
use std::sync::Arc;

use crate::backend::twitch::{AuthProvider, ChatClient, DeviceCodeGrantFlow, MessageHandler, Result, IRC_WS_URL};

/// Produces a credential handle, possibly after user interaction
#[async_trait]
pub trait AuthFlow: Send + Sync {
    async fn login(&self) -> Result<AuthProvider>;
}

/// A chat connection scoped to a set of channels
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn say(&self, channel: &str, text: &str) -> Result<()>;

    async fn quit(&self);

    fn on_message(&self, handler: MessageHandler);
}

/// Builds chat connections from a credential handle
pub trait TransportFactory: Send + Sync {
    fn create(&self, auth: &AuthProvider, channels: Vec<String>) -> Arc<dyn ChatTransport>;
}

#[async_trait]
impl AuthFlow for DeviceCodeGrantFlow {
    async fn login(&self) -> Result<AuthProvider> {
        DeviceCodeGrantFlow::login(self).await
    }
}

#[async_trait]
impl ChatTransport for ChatClient {
    async fn connect(&self) -> Result<()> {
        ChatClient::connect(self).await
    }

    async fn say(&self, channel: &str, text: &str) -> Result<()> {
        ChatClient::say(self, channel, text).await
    }

    async fn quit(&self) {
        ChatClient::quit(self).await
    }

    fn on_message(&self, handler: MessageHandler) {
        ChatClient::on_message(self, handler)
    }
}

/// Creates [`ChatClient`]s against an IRC WebSocket endpoint
#[derive(Debug, Clone)]
pub struct ChatClientFactory {
    url: String,
}

impl ChatClientFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for ChatClientFactory {
    fn default() -> Self {
        Self::new(IRC_WS_URL)
    }
}

impl TransportFactory for ChatClientFactory {
    fn create(&self, auth: &AuthProvider, channels: Vec<String>) -> Arc<dyn ChatTransport> {
        Arc::new(ChatClient::with_url(self.url.clone(), auth.clone(), channels))
    }
}
