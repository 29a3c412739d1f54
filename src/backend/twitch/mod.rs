//! Twitch chat integration module
//!
//! This module provides the Twitch side of the component:
//! - Logging in with the OAuth Device Code Grant Flow
//! - Joining a channel over the IRC WebSocket endpoint
//! - Receiving chat messages through registered handlers
//! - Sending chat messages (rate limited, split at 500 characters)
//! - Automatic reconnection handling
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use twitch_chat_component::backend::twitch::{ChatClient, ChatMessage, DeviceCodeGrantFlow};
//!
//! #[tokio::main]
//! async fn main() {
//!     let flow = DeviceCodeGrantFlow::new("your_client_id");
//!     let auth = flow.login().await.unwrap();
//!
//!     let client = ChatClient::new(auth, vec!["your_channel".to_string()]);
//!     client.connect().await.unwrap();
//!
//!     client.on_message(Arc::new(|msg: ChatMessage| {
//!         println!("[{}] {}: {}", msg.channel, msg.user, msg.message);
//!     }));
//!
//!     client.say("your_channel", "hello chat").await.unwrap();
//! }
//! ```

mod auth;
mod client;
mod device_flow;
mod error;
mod messages;
mod websocket;

// Re-export public types
pub use auth::{
    refresh_access_token, validate_token, AuthProvider, TokenResponse, ValidateResponse,
    DEFAULT_AUTH_BASE_URL,
};
pub use client::{ChatClient, MessageHandler};
pub use device_flow::{DeviceCodeGrantFlow, DeviceCodeResponse, DevicePrompt, PollResult, DEFAULT_SCOPES};
pub use error::{Result, TwitchError};
pub use messages::{normalize_channel, ChatMessage, IrcMessage};
pub use websocket::{ConnectionState, IRC_WS_URL};
