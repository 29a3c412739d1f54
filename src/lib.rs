//! Twitch chat component for a host automation system.
//!
//! The host drives [`component::Twitch`] through the
//! [`component::Component`] lifecycle: a login configuration runs the
//! OAuth device code flow and joins one channel, chat messages are relayed
//! to the host's emitters, and send configurations post messages to the
//! joined channel.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use twitch_chat_component::backend::config::TwitchSettings;
//! use twitch_chat_component::component::{ChannelEmitter, Component, Twitch, TwitchConfig};
//!
//! # async fn example() -> twitch_chat_component::backend::twitch::Result<()> {
//! let settings = TwitchSettings {
//!     client_id: "your_client_id".to_string(),
//!     ..TwitchSettings::default()
//! };
//! let mut twitch = Twitch::new(&settings);
//! let (emitter, mut events) = ChannelEmitter::channel();
//!
//! let login = TwitchConfig::login("your_channel");
//! twitch.initialize(&login, Arc::new(emitter)).await?;
//! twitch.start(&login).await?;
//!
//! twitch.process(&TwitchConfig::send("hello chat")).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod component;
