use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

use super::auth::AuthProvider;
use super::error::{Result, TwitchError};
use super::messages::{
    normalize_channel, privmsg_line, split_message, ChatMessage, IrcMessage, MAX_MESSAGE_CHARS,
};
use super::websocket::{
    open, reconnect_with_backoff, ConnectionState, Frame, IrcReader, IrcWriter, IRC_WS_URL,
};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Twitch allows 20 messages per 30 seconds for regular users
const RATE_LIMIT_MESSAGES: usize = 20;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(30);

/// Callback invoked for each inbound chat message
pub type MessageHandler = Arc<dyn Fn(ChatMessage) + Send + Sync>;

enum Outgoing {
    Line {
        line: String,
        ack: oneshot::Sender<Result<()>>,
    },
    Quit,
}

struct Shared {
    url: String,
    auth: AuthProvider,
    channels: Vec<String>,
    handlers: Mutex<Vec<MessageHandler>>,
    state: RwLock<ConnectionState>,
}

impl Shared {
    fn handlers(&self) -> MutexGuard<'_, Vec<MessageHandler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, message: ChatMessage) {
        let handlers: Vec<MessageHandler> = self.handlers().clone();
        for handler in handlers {
            handler(message.clone());
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }
}

/// Chat client for one set of channels over Twitch IRC WebSocket
///
/// Owns reconnection and rate limiting; callers only `connect`, `say` and `quit`.
pub struct ChatClient {
    shared: Arc<Shared>,
    rate_limit: (usize, Duration),
    outgoing: tokio::sync::Mutex<Option<mpsc::Sender<Outgoing>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChatClient {
    pub fn new(auth: AuthProvider, channels: Vec<String>) -> Self {
        Self::with_url(IRC_WS_URL, auth, channels)
    }

    pub fn with_url(url: impl Into<String>, auth: AuthProvider, channels: Vec<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                auth,
                channels: channels.iter().map(|c| normalize_channel(c)).collect(),
                handlers: Mutex::new(Vec::new()),
                state: RwLock::new(ConnectionState::Disconnected),
            }),
            rate_limit: (RATE_LIMIT_MESSAGES, RATE_LIMIT_WINDOW),
            outgoing: tokio::sync::Mutex::new(None),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Allow at most `limit` lines per `window` instead of the Twitch default
    pub fn with_rate_limit(mut self, limit: usize, window: Duration) -> Self {
        self.rate_limit = (limit.max(1), window);
        self
    }

    pub fn channels(&self) -> &[String] {
        &self.shared.channels
    }

    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    /// Register a handler for inbound chat messages
    pub fn on_message(&self, handler: MessageHandler) {
        self.shared.handlers().push(handler);
    }

    /// Connect, authenticate and join the configured channels
    pub async fn connect(&self) -> Result<()> {
        self.shared.set_state(ConnectionState::Connecting).await;

        let (writer, reader) = match open(&self.shared.url, &self.shared.auth, &self.shared.channels).await {
            Ok(connection) => connection,
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected).await;
                return Err(e);
            }
        };

        self.shared.set_state(ConnectionState::Connected).await;

        let (tx, rx) = mpsc::channel::<Outgoing>(100);
        let shared = self.shared.clone();
        let limiter = RateLimiter::new(self.rate_limit.0, self.rate_limit.1);
        let task = tokio::spawn(run_connection(shared, writer, reader, rx, limiter));

        *self.outgoing.lock().await = Some(tx);
        if let Some(previous) = self.task.lock().await.replace(task) {
            previous.abort();
        }

        Ok(())
    }

    /// Send a chat message, waiting until every line has been written to the socket
    ///
    /// Line breaks in `text` start a new chat message; they are never written raw.
    pub async fn say(&self, channel: &str, text: &str) -> Result<()> {
        let tx = self
            .outgoing
            .lock()
            .await
            .clone()
            .ok_or_else(|| TwitchError::ConnectionClosed(1006, "Not connected".to_string()))?;

        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        if chunks.is_empty() {
            log::debug!("Nothing to send to #{}: message is blank", normalize_channel(channel));
            return Ok(());
        }

        for chunk in chunks {
            let (ack, done) = oneshot::channel();
            tx.send(Outgoing::Line {
                line: privmsg_line(channel, &chunk),
                ack,
            })
            .await
            .map_err(|_| TwitchError::ConnectionClosed(1006, "Connection task ended".to_string()))?;

            done.await
                .map_err(|e| TwitchError::ChannelError(e.to_string()))??;
        }

        Ok(())
    }

    /// Close the connection; later `say` calls fail
    pub async fn quit(&self) {
        if let Some(tx) = self.outgoing.lock().await.take() {
            let _ = tx.send(Outgoing::Quit).await;
        }
        if let Some(mut task) = self.task.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(2), &mut task).await.is_err() {
                log::warn!("Chat connection did not shut down in time");
                task.abort();
            }
        }
        self.shared.set_state(ConnectionState::Disconnected).await;
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

enum Next {
    Continue,
    Reconnect,
    Quit,
}

type Pending = VecDeque<(String, oneshot::Sender<Result<()>>)>;

async fn run_connection(
    shared: Arc<Shared>,
    mut writer: IrcWriter,
    mut reader: IrcReader,
    mut outgoing: mpsc::Receiver<Outgoing>,
    mut limiter: RateLimiter,
) {
    let mut pending: Pending = VecDeque::new();

    loop {
        let slot = limiter.next_slot(Instant::now());
        let next = tokio::select! {
            frame = reader.recv() => match frame {
                Ok(Frame::Lines(lines)) => handle_lines(&shared, &mut writer, lines).await,
                Ok(Frame::Ping(payload)) => match writer.pong(payload).await {
                    Ok(()) => Next::Continue,
                    Err(e) => {
                        log::error!("Failed to send pong: {}", e);
                        Next::Reconnect
                    }
                },
                Ok(Frame::Closed(_, _)) => Next::Reconnect,
                Err(e) => {
                    log::error!("Chat socket error: {}", e);
                    Next::Reconnect
                }
            },
            command = outgoing.recv() => match command {
                Some(Outgoing::Line { line, ack }) => {
                    pending.push_back((line, ack));
                    flush(&mut limiter, &mut pending, &mut writer).await;
                    Next::Continue
                }
                Some(Outgoing::Quit) | None => Next::Quit,
            },
            _ = sleep_until(slot), if !pending.is_empty() => {
                flush(&mut limiter, &mut pending, &mut writer).await;
                Next::Continue
            },
        };

        match next {
            Next::Continue => {}
            Next::Quit => {
                for (_, ack) in pending.drain(..) {
                    let _ = ack.send(Err(TwitchError::ConnectionClosed(
                        1000,
                        "Client quit".to_string(),
                    )));
                }
                let _ = writer.send_line("QUIT").await;
                writer.close().await;
                shared.set_state(ConnectionState::Disconnected).await;
                log::info!("Left Twitch chat");
                return;
            }
            Next::Reconnect => {
                shared.set_state(ConnectionState::Reconnecting).await;
                match reconnect_with_backoff(
                    &shared.url,
                    &shared.auth,
                    &shared.channels,
                    MAX_RECONNECT_ATTEMPTS,
                )
                .await
                {
                    Ok((new_writer, new_reader)) => {
                        writer = new_writer;
                        reader = new_reader;
                        shared.set_state(ConnectionState::Connected).await;
                        log::info!("Reconnected to Twitch chat");
                    }
                    Err(e) => {
                        log::error!("Failed to reconnect to Twitch chat: {}", e);
                        for (_, ack) in pending.drain(..) {
                            let _ = ack.send(Err(TwitchError::ConnectionClosed(
                                1006,
                                "Reconnect failed".to_string(),
                            )));
                        }
                        shared.set_state(ConnectionState::Disconnected).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Write queued lines while the rate limit allows; the rest stay queued
async fn flush(limiter: &mut RateLimiter, pending: &mut Pending, writer: &mut IrcWriter) {
    while !pending.is_empty() {
        let now = Instant::now();
        if limiter.next_slot(now) > now {
            log::debug!("Chat rate limit reached, {} line(s) queued", pending.len());
            return;
        }
        if let Some((line, ack)) = pending.pop_front() {
            limiter.record(now);
            let _ = ack.send(writer.send_line(&line).await);
        }
    }
}

async fn handle_lines(shared: &Shared, writer: &mut IrcWriter, lines: Vec<IrcMessage>) -> Next {
    for msg in lines {
        match msg.command.as_str() {
            "PRIVMSG" => {
                if let Some(chat) = ChatMessage::from_privmsg(&msg) {
                    shared.dispatch(chat);
                }
            }
            "PING" => {
                let payload = msg.trailing().unwrap_or("tmi.twitch.tv");
                if let Err(e) = writer.send_line(&format!("PONG :{}", payload)).await {
                    log::error!("Failed to answer PING: {}", e);
                    return Next::Reconnect;
                }
            }
            "RECONNECT" => {
                log::warn!("Server requested reconnect");
                return Next::Reconnect;
            }
            "NOTICE" => {
                log::warn!("Chat notice: {}", msg.trailing().unwrap_or_default());
            }
            _ => {
                log::debug!("Ignoring {} from chat", msg.command);
            }
        }
    }
    Next::Continue
}

/// Sliding-window limiter for outgoing chat lines
struct RateLimiter {
    limit: usize,
    window: Duration,
    sent: VecDeque<Instant>,
}

impl RateLimiter {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            sent: VecDeque::with_capacity(limit),
        }
    }

    /// Instant at which the next line may be sent
    fn next_slot(&mut self, now: Instant) -> Instant {
        while let Some(&oldest) = self.sent.front() {
            if now.duration_since(oldest) >= self.window {
                self.sent.pop_front();
            } else {
                break;
            }
        }
        match self.sent.front() {
            Some(&oldest) if self.sent.len() >= self.limit => oldest + self.window,
            _ => now,
        }
    }

    fn record(&mut self, now: Instant) {
        self.sent.push_back(now);
    }
}
