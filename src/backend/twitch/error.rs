use std::fmt;

/// Errors that can occur during Twitch operations
#[derive(Debug)]
pub enum TwitchError {
    /// WebSocket connection error
    WebSocketError(String),

    /// HTTP request error
    HttpError(String),

    /// JSON parsing error
    JsonError(String),

    /// Authentication error (device code denied or expired, invalid token)
    AuthError(String),

    /// Configuration error
    ConfigError(String),

    /// Connection closed or not open
    ConnectionClosed(u16, String),

    /// Internal channel send error
    ChannelError(String),
}

impl fmt::Display for TwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwitchError::WebSocketError(msg) => write!(f, "WebSocket error: {}", msg),
            TwitchError::HttpError(msg) => write!(f, "HTTP error: {}", msg),
            TwitchError::JsonError(msg) => write!(f, "JSON error: {}", msg),
            TwitchError::AuthError(msg) => write!(f, "Authentication error: {}", msg),
            TwitchError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            TwitchError::ConnectionClosed(code, reason) => {
                write!(f, "Connection closed: code={}, reason={}", code, reason)
            }
            TwitchError::ChannelError(msg) => write!(f, "Channel error: {}", msg),
        }
    }
}

impl std::error::Error for TwitchError {}

impl From<serde_json::Error> for TwitchError {
    fn from(err: serde_json::Error) -> Self {
        TwitchError::JsonError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TwitchError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TwitchError::WebSocketError(err.to_string())
    }
}

impl From<reqwest::Error> for TwitchError {
    fn from(err: reqwest::Error) -> Self {
        TwitchError::HttpError(err.to_string())
    }
}

impl From<toml::de::Error> for TwitchError {
    fn from(err: toml::de::Error) -> Self {
        TwitchError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for TwitchError {
    fn from(err: std::io::Error) -> Self {
        TwitchError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TwitchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_connection_closed() {
        let err = TwitchError::ConnectionClosed(1006, "not connected".to_string());
        assert_eq!(
            err.to_string(),
            "Connection closed: code=1006, reason=not connected"
        );
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TwitchError = json_err.into();
        assert!(matches!(err, TwitchError::JsonError(_)));
    }
}
