use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::config::{Mode, TwitchConfig, Variant};
use super::relay::{Listeners, MessageEvent};
use super::transport::{AuthFlow, ChatClientFactory, ChatTransport, TransportFactory};
use super::{Component, Emitter, Field};
use crate::backend::config::TwitchSettings;
use crate::backend::twitch::{
    normalize_channel, AuthProvider, DeviceCodeGrantFlow, Result, TwitchError,
};

/// Credential, connection and channel of the single chat session
#[derive(Default)]
struct Session {
    auth: Option<AuthProvider>,
    client: Option<Arc<dyn ChatTransport>>,
    channel: Option<String>,
}

/// Twitch chat component
///
/// Logs in with the device code flow on `start`, joins one channel in the
/// background, relays chat messages to every registered emitter, and sends
/// messages on `process` with a send configuration.
pub struct Twitch {
    variant: Variant,
    flow: Arc<dyn AuthFlow>,
    transports: Arc<dyn TransportFactory>,
    listeners: Arc<Listeners>,
    session: Arc<RwLock<Session>>,
    receive_task: Option<JoinHandle<()>>,
}

impl Twitch {
    pub fn new(settings: &TwitchSettings) -> Self {
        Self::with_collaborators(
            Arc::new(DeviceCodeGrantFlow::from_settings(settings)),
            Arc::new(ChatClientFactory::new(settings.irc_url.clone())),
        )
    }

    pub fn with_collaborators(
        flow: Arc<dyn AuthFlow>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            variant: Variant::default(),
            flow,
            transports,
            listeners: Arc::new(Listeners::new()),
            session: Arc::new(RwLock::new(Session::default())),
            receive_task: None,
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub async fn active_channel(&self) -> Option<String> {
        self.session.read().await.channel.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.auth.is_some()
    }

    /// True once a connection is established and the channel is joined
    pub async fn is_connected(&self) -> bool {
        let session = self.session.read().await;
        session.client.is_some() && session.channel.is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Run the device code flow, then connect to `channel` in the background
    ///
    /// Returns once credentials are acquired; connection failures are
    /// logged and relayed to listeners as an `error` event.
    pub async fn login(&mut self, channel: &str) -> Result<()> {
        let auth = self.flow.login().await?;
        self.session.write().await.auth = Some(auth.clone());

        self.start_receive_task(auth, normalize_channel(channel));
        Ok(())
    }

    fn start_receive_task(&mut self, auth: AuthProvider, channel: String) {
        if let Some(previous) = self.receive_task.take() {
            previous.abort();
        }

        let transports = self.transports.clone();
        let session = self.session.clone();
        let listeners = self.listeners.clone();

        self.receive_task = Some(tokio::spawn(async move {
            if let Err(e) = receive(transports, session, listeners.clone(), auth, &channel).await {
                log::error!("Failed to connect to #{}: {}", channel, e);
                listeners.broadcast(&json!({
                    "error": {
                        "source": "connect",
                        "channel": channel,
                        "message": e.to_string(),
                    }
                }));
            }
        }));
    }

    /// Send the configured message to the active channel
    ///
    /// Silently does nothing while not logged in or not yet connected.
    pub async fn send(&self, config: &TwitchConfig) -> Result<Field> {
        let (client, channel) = {
            let session = self.session.read().await;
            match (&session.client, &session.channel) {
                (Some(client), Some(channel)) => (client.clone(), channel.clone()),
                _ => {
                    log::debug!("Not connected to chat yet, message not sent");
                    return Ok(None);
                }
            }
        };

        let message = config.message().ok_or_else(|| {
            TwitchError::ConfigError("send requires args.message".to_string())
        })?;

        client.say(&channel, message).await?;
        Ok(None)
    }
}

/// Connect to `channel` and hook the relay up to inbound messages
async fn receive(
    transports: Arc<dyn TransportFactory>,
    session: Arc<RwLock<Session>>,
    listeners: Arc<Listeners>,
    auth: AuthProvider,
    channel: &str,
) -> Result<()> {
    let client = transports.create(&auth, vec![channel.to_string()]);
    session.write().await.client = Some(client.clone());

    if let Err(e) = client.connect().await {
        session.write().await.client = None;
        return Err(e);
    }

    session.write().await.channel = Some(channel.to_string());
    log::info!("Connected to #{}", channel);

    client.on_message(Arc::new(move |message| {
        listeners.broadcast(&MessageEvent { message }.to_field());
    }));

    Ok(())
}

#[async_trait]
impl Component<TwitchConfig> for Twitch {
    async fn initialize(&mut self, config: &TwitchConfig, emitter: Arc<dyn Emitter>) -> Result<()> {
        match self.variant.classify(config) {
            Mode::Login | Mode::Receive => self.listeners.register(emitter),
            Mode::Send => {}
            Mode::Unknown => log::warn!("Unknown action {:?}, ignoring", config.action),
        }
        Ok(())
    }

    async fn start(&mut self, config: &TwitchConfig) -> Result<()> {
        if self.variant.classify(config) != Mode::Login {
            return Ok(());
        }

        let channel = config
            .channel
            .as_deref()
            .filter(|channel| !channel.trim().is_empty())
            .ok_or_else(|| TwitchError::ConfigError("login requires a channel".to_string()))?
            .to_string();

        self.login(&channel).await
    }

    async fn process(&mut self, config: &TwitchConfig) -> Result<Field> {
        match self.variant.classify(config) {
            Mode::Send => self.send(config).await,
            Mode::Login | Mode::Receive => Ok(None),
            Mode::Unknown => {
                log::warn!("Unknown action {:?}, ignoring", config.action);
                Ok(None)
            }
        }
    }

    async fn stop(&mut self, _config: &TwitchConfig) -> Result<()> {
        if let Some(task) = self.receive_task.take() {
            task.abort();
            let _ = task.await;
        }

        let client = {
            let mut session = self.session.write().await;
            session.channel = None;
            session.client.take()
        };

        if let Some(client) = client {
            client.quit().await;
            log::info!("Disconnected from Twitch chat");
        }
        Ok(())
    }

    async fn uninitialize(&mut self) -> Result<()> {
        self.listeners.clear();
        Ok(())
    }
}

impl Drop for Twitch {
    fn drop(&mut self) {
        if let Some(task) = self.receive_task.take() {
            task.abort();
        }
    }
}
