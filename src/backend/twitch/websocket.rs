use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::auth::AuthProvider;
use super::error::{Result, TwitchError};
use super::messages::{normalize_channel, IrcMessage};

pub const IRC_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

const CAPABILITIES: &str = "CAP REQ :twitch.tv/tags twitch.tv/commands";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// What came off the socket in one read
#[derive(Debug)]
pub enum Frame {
    Lines(Vec<IrcMessage>),
    Ping(Bytes),
    Closed(u16, String),
}

/// Write half of an IRC connection
pub struct IrcWriter {
    sink: SplitSink<WsStream, Message>,
}

impl IrcWriter {
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.sink.send(Message::Text(line.to_string().into())).await?;
        Ok(())
    }

    pub async fn pong(&mut self, payload: Bytes) -> Result<()> {
        self.sink.send(Message::Pong(payload)).await?;
        Ok(())
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            log::debug!("Error while closing chat socket: {}", e);
        }
    }
}

/// Read half of an IRC connection
pub struct IrcReader {
    stream: SplitStream<WsStream>,
}

impl IrcReader {
    /// Wait for the next batch of IRC lines, a WebSocket ping, or the close
    pub async fn recv(&mut self) -> Result<Frame> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let lines: Vec<IrcMessage> =
                        text.as_str().split("\r\n").filter_map(IrcMessage::parse).collect();
                    if !lines.is_empty() {
                        return Ok(Frame::Lines(lines));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map(|f| f.code.into()).unwrap_or(1000);
                    let reason = frame
                        .as_ref()
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "Unknown".to_string());

                    log::warn!("Chat socket closed: code={}, reason={}", code, reason);
                    return Ok(Frame::Closed(code, reason));
                }
                Some(Ok(Message::Ping(payload))) => return Ok(Frame::Ping(payload)),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(Frame::Closed(1006, "Stream ended".to_string())),
            }
        }
    }
}

/// Open a chat connection, register with the server and join `channels`
///
/// Resolves once the server has welcomed the user (numeric 001) and the
/// JOIN commands have been written.
pub async fn open(url: &str, auth: &AuthProvider, channels: &[String]) -> Result<(IrcWriter, IrcReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    let (sink, stream) = ws_stream.split();
    let mut writer = IrcWriter { sink };
    let mut reader = IrcReader { stream };

    let token = auth.access_token().await?;
    writer.send_line(CAPABILITIES).await?;
    writer.send_line(&format!("PASS oauth:{}", token)).await?;
    writer
        .send_line(&format!("NICK {}", auth.login().to_lowercase()))
        .await?;

    await_welcome(&mut reader, &mut writer).await?;
    log::info!("Registered with Twitch chat as {}", auth.login());

    for channel in channels {
        let channel = normalize_channel(channel);
        writer.send_line(&format!("JOIN #{}", channel)).await?;
        log::info!("Joining #{}", channel);
    }

    Ok((writer, reader))
}

async fn await_welcome(reader: &mut IrcReader, writer: &mut IrcWriter) -> Result<()> {
    loop {
        match reader.recv().await? {
            Frame::Lines(lines) => {
                for msg in lines {
                    match msg.command.as_str() {
                        "001" => return Ok(()),
                        "PING" => {
                            let payload = msg.trailing().unwrap_or("tmi.twitch.tv");
                            writer.send_line(&format!("PONG :{}", payload)).await?;
                        }
                        "NOTICE" => {
                            let text = msg.trailing().unwrap_or_default();
                            if is_auth_failure(text) {
                                return Err(TwitchError::AuthError(text.to_string()));
                            }
                            log::warn!("Notice during registration: {}", text);
                        }
                        _ => {}
                    }
                }
            }
            Frame::Ping(payload) => writer.pong(payload).await?,
            Frame::Closed(code, reason) => return Err(TwitchError::ConnectionClosed(code, reason)),
        }
    }
}

fn is_auth_failure(notice: &str) -> bool {
    notice.contains("Login authentication failed") || notice.contains("Improperly formatted auth")
}

/// Reconnect with exponential backoff
pub async fn reconnect_with_backoff(
    url: &str,
    auth: &AuthProvider,
    channels: &[String],
    max_retries: u32,
) -> Result<(IrcWriter, IrcReader)> {
    let mut retries = 0;
    let base_delay = Duration::from_secs(1);

    while retries < max_retries {
        retries += 1;
        let delay = base_delay * 2_u32.pow((retries - 1).min(6)); // Max 64 seconds

        sleep(delay).await;

        match open(url, auth, channels).await {
            Ok(connection) => {
                return Ok(connection);
            }
            Err(e) => {
                log::error!("Reconnection attempt {} failed: {}", retries, e);
                if retries >= max_retries {
                    return Err(e);
                }
            }
        }
    }

    Err(TwitchError::WebSocketError(
        "Max reconnection attempts reached".to_string(),
    ))
}
